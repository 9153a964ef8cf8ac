// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use crate::errors::SimexpError;
use crate::experiment::ExperimentConfig;
use crate::layout::ResultLayout;
use crate::types::{Overrides, ResultTable};

/// Everything a backend needs to know about the current run.
///
/// * `config` - experiment configuration owned by the orchestrator
/// * `layout` - result directories
/// * `exp_name` - name of the experiment
/// * `out_file_name` - base name of all artifacts of this run
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    pub config: &'a ExperimentConfig,
    pub layout: &'a ResultLayout,
    pub exp_name: &'a str,
    pub out_file_name: &'a str,
}

impl RunContext<'_> {
    pub fn model_name_full(&self) -> String {
        self.config.model.model_name_full()
    }

    /// Absolute data directory.
    pub fn data_dir(&self) -> Result<PathBuf, SimexpError> {
        Ok(self.layout.data_dir(true)?)
    }

    /// Absolute result file path without extension.
    pub fn result_file(&self) -> Result<PathBuf, SimexpError> {
        Ok(self.data_dir()?.join(self.out_file_name))
    }
}

/// Capabilities of a simulation backend. One instance is owned by exactly one
/// orchestrator; all calls block until the engine returns.
pub trait SimulationBackend {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Backend-specific preparation, e.g. loading packages.
    fn setup(&mut self, _ctx: &RunContext<'_>) -> Result<(), SimexpError> {
        Ok(())
    }

    /// Prepare initial conditions before the first simulation of an experiment.
    fn init(&mut self, _ctx: &RunContext<'_>) -> Result<(), SimexpError> {
        Ok(())
    }

    /// Run one simulation with the configured parameters plus `additional` overrides.
    fn simulate(&mut self, ctx: &RunContext<'_>, additional: &Overrides) -> Result<(), SimexpError>;

    /// Results of the last simulation restricted to `trajectory_names`.
    fn extract_results(&mut self, ctx: &RunContext<'_>, trajectory_names: &[String]) -> Result<ResultTable, SimexpError>;

    /// Release external resources. Idempotent.
    fn terminate(&mut self) -> Result<(), SimexpError> {
        Ok(())
    }
}

impl<B: SimulationBackend + ?Sized> SimulationBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn setup(&mut self, ctx: &RunContext<'_>) -> Result<(), SimexpError> {
        (**self).setup(ctx)
    }

    fn init(&mut self, ctx: &RunContext<'_>) -> Result<(), SimexpError> {
        (**self).init(ctx)
    }

    fn simulate(&mut self, ctx: &RunContext<'_>, additional: &Overrides) -> Result<(), SimexpError> {
        (**self).simulate(ctx, additional)
    }

    fn extract_results(&mut self, ctx: &RunContext<'_>, trajectory_names: &[String]) -> Result<ResultTable, SimexpError> {
        (**self).extract_results(ctx, trajectory_names)
    }

    fn terminate(&mut self) -> Result<(), SimexpError> {
        (**self).terminate()
    }
}
