// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

//! Backend-agnostic experiment lifecycle.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::{info, warn};

use crate::backend::{RunContext, SimulationBackend};
use crate::errors::SimexpError;
use crate::layout::ResultLayout;
use crate::model_description::ModelDescriptor;
use crate::parameters::{InitializationParameters, SimulationParameters};
use crate::plot::PlottingService;
use crate::result_io::{write_csv, CsvOptions};
use crate::sweep::SweepRun;
use crate::types::{Overrides, ResultTable};

/// Configuration of one experiment.
///
/// * `workdir_path` - directory holding the model package
/// * `package_paths` - package files opened by the engine, relative to `workdir_path`
/// * `fmu_paths` - FMUs imported into the package during setup
/// * `model` - model under test
/// * `result_filename` - prefix of all result artifacts
/// * `result_root_dir` - root of the result directory layout
/// * `sim_params`, `init_params` - solver and initial-condition settings
/// * `csv` - format of persisted result tables
/// * `export_equations` - write the model equations before each simulation
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub workdir_path: PathBuf,
    pub package_paths: Vec<PathBuf>,
    pub fmu_paths: Vec<PathBuf>,
    pub model: ModelDescriptor,
    pub result_filename: String,
    pub result_root_dir: PathBuf,
    pub sim_params: SimulationParameters,
    pub init_params: InitializationParameters,
    pub csv: CsvOptions,
    pub export_equations: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        ExperimentConfig {
            workdir_path: PathBuf::from("."),
            package_paths: vec![PathBuf::from("package.mo")],
            fmu_paths: Vec::new(),
            model: ModelDescriptor::default(),
            result_filename: String::from("results"),
            result_root_dir: PathBuf::from("./"),
            sim_params: SimulationParameters::default(),
            init_params: InitializationParameters::default(),
            csv: CsvOptions::default(),
            export_equations: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentState {
    Idle,
    Configured,
    Initialized,
    Simulated,
    ResultsReady,
    Plotted,
}

/// Drives one backend through setup, initialization, simulation and result
/// extraction, and persists or plots the results.
pub struct Experiment<B: SimulationBackend> {
    config: ExperimentConfig,
    layout: ResultLayout,
    backend: B,
    plotter: Option<Box<dyn PlottingService>>,
    exp_name: String,
    state: ExperimentState,
}

impl<B: SimulationBackend> Experiment<B> {
    /// Create the orchestrator and its result directories.
    pub fn new(config: ExperimentConfig, backend: B) -> Result<Experiment<B>, SimexpError> {
        let layout = ResultLayout::new(&config.result_root_dir);
        layout.create_directories()?;
        Ok(Experiment {
            config,
            layout,
            backend,
            plotter: None,
            exp_name: String::new(),
            state: ExperimentState::Idle,
        })
    }

    pub fn with_plotter(mut self, plotter: Box<dyn PlottingService>) -> Experiment<B> {
        self.plotter = Some(plotter);
        self
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ExperimentConfig {
        &mut self.config
    }

    pub fn layout(&self) -> &ResultLayout {
        &self.layout
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn state(&self) -> ExperimentState {
        self.state
    }

    pub fn exp_name(&self) -> &str {
        &self.exp_name
    }

    /// Name of the artifacts of the current experiment: `{result_filename}_{exp_name}`.
    pub fn out_file_name(&self) -> String {
        format!("{}_{}", self.config.result_filename, self.exp_name)
    }

    pub fn data_dir(&self) -> Result<PathBuf, SimexpError> {
        Ok(self.layout.data_dir(true)?)
    }

    pub fn plot_dir(&self) -> Result<PathBuf, SimexpError> {
        Ok(self.layout.plot_dir(true)?)
    }

    pub fn set_start_time(&mut self, start_time: Option<f64>) {
        self.config.sim_params.set_start_time(start_time);
    }

    pub fn set_stop_time(&mut self, stop_time: Option<f64>) {
        self.config.sim_params.set_stop_time(stop_time);
    }

    pub fn set_sim_params(&mut self, sim_params: SimulationParameters) {
        self.config.sim_params = sim_params;
    }

    /// Use `init_file` as initial-condition file and `init_variables` as initial values.
    pub fn set_init_params_full(&mut self, init_file: &str, init_variables: BTreeMap<String, f64>) {
        self.config.init_params.set_initialization_parameters_full(init_file, &init_variables);
    }

    pub fn set_init_variables(&mut self, init_variables: BTreeMap<String, f64>) {
        self.config.init_params.set_init_variables(init_variables);
    }

    pub fn use_init_file(&mut self, enabled: bool) {
        self.config.init_params.set_use_init_file(enabled);
    }

    pub fn use_init_values(&mut self, enabled: bool) {
        self.config.init_params.set_use_init_values(enabled);
    }

    pub fn set_init_file(&mut self, init_filename: &str) {
        self.config.init_params.set_init_filename(init_filename);
    }

    /// Backend-specific preparation, e.g. loading packages into the engine.
    pub fn setup_experiment(&mut self) -> Result<(), SimexpError> {
        let out = self.out_file_name();
        let ctx = RunContext {
            config: &self.config,
            layout: &self.layout,
            exp_name: &self.exp_name,
            out_file_name: &out,
        };
        self.backend.setup(&ctx)?;
        self.state = ExperimentState::Configured;
        Ok(())
    }

    fn init_experiment(&mut self, out_file_name: &str) -> Result<(), SimexpError> {
        let ctx = RunContext {
            config: &self.config,
            layout: &self.layout,
            exp_name: &self.exp_name,
            out_file_name,
        };
        self.backend.init(&ctx)?;
        self.state = ExperimentState::Initialized;
        Ok(())
    }

    /// Run a complete experiment named `exp_name` and return its results.
    ///
    /// `start_time` and `stop_time` replace the configured bounds when given.
    pub fn run_experiment(
        &mut self,
        exp_name: &str,
        trajectory_names: &[String],
        start_time: Option<f64>,
        stop_time: Option<f64>,
        plot_enabled: bool,
        store_csv: bool,
    ) -> Result<ResultTable, SimexpError> {
        self.exp_name = exp_name.to_string();
        self.set_start_time(start_time);
        self.set_stop_time(stop_time);

        let out = self.out_file_name();
        info!(experiment = exp_name, backend = self.backend.name(), "running experiment");
        let results = self.run_named(&out, trajectory_names, &Overrides::new(), store_csv)?;
        if plot_enabled {
            self.plot_simulation_results(&results, Some(&out))?;
        }
        Ok(results)
    }

    /// Initialize, simulate with `overrides` and extract, naming all artifacts `out_file_name`.
    pub fn run_named(
        &mut self,
        out_file_name: &str,
        trajectory_names: &[String],
        overrides: &Overrides,
        store_csv: bool,
    ) -> Result<ResultTable, SimexpError> {
        self.config.sim_params.validate()?;
        self.init_experiment(out_file_name)?;
        self.simulate(out_file_name, trajectory_names, overrides, store_csv)
    }

    /// Simulate the current configuration and extract `trajectory_names`.
    pub fn run_simulation(&mut self, trajectory_names: &[String], store_csv: bool) -> Result<ResultTable, SimexpError> {
        let out = self.out_file_name();
        self.simulate(&out, trajectory_names, &Overrides::new(), store_csv)
    }

    fn simulate(
        &mut self,
        out_file_name: &str,
        trajectory_names: &[String],
        overrides: &Overrides,
        store_csv: bool,
    ) -> Result<ResultTable, SimexpError> {
        self.config.sim_params.validate()?;
        let ctx = RunContext {
            config: &self.config,
            layout: &self.layout,
            exp_name: &self.exp_name,
            out_file_name,
        };
        self.backend.simulate(&ctx, overrides)?;
        self.state = ExperimentState::Simulated;

        let results = self.backend.extract_results(&ctx, trajectory_names)?;
        self.state = ExperimentState::ResultsReady;

        if store_csv {
            let path = self.csv_path(out_file_name)?;
            match write_csv(&results, &path, &self.config.csv) {
                Ok(()) => info!(path = %path.display(), "stored results"),
                Err(e) => warn!(path = %path.display(), error = %e, "could not store results"),
            }
        }
        Ok(results)
    }

    fn plotter(&mut self) -> Option<&mut Box<dyn PlottingService>> {
        if self.plotter.is_none() {
            warn!("no plotting service configured");
        }
        self.plotter.as_mut()
    }

    /// Hand `results` to the plotting service under `out_file_name`
    /// (default: the configured result filename).
    pub fn plot_simulation_results(&mut self, results: &ResultTable, out_file_name: Option<&str>) -> Result<Option<PathBuf>, SimexpError> {
        let name = out_file_name.unwrap_or(&self.config.result_filename).to_string();
        let plot_dir = self.plot_dir()?;
        let artifact = match self.plotter() {
            Some(plotter) => Some(plotter.plot(results, &plot_dir, &name)?),
            None => None,
        };
        if artifact.is_some() {
            self.state = ExperimentState::Plotted;
        }
        Ok(artifact)
    }

    /// Several labelled results in one artifact.
    pub fn plot_multiple_results(
        &mut self,
        results: &[(String, ResultTable)],
        out_file_name: Option<&str>,
    ) -> Result<Option<PathBuf>, SimexpError> {
        let name = out_file_name.unwrap_or(&self.config.result_filename).to_string();
        let plot_dir = self.plot_dir()?;
        match self.plotter() {
            Some(plotter) => Ok(Some(plotter.plot_multiple(results, &plot_dir, &name)?)),
            None => Ok(None),
        }
    }

    /// One artifact per successful sweep element, named `{out_file_name}_{var}_{value}` with `.` replaced by `_`.
    pub fn plot_sweep_results(
        &mut self,
        runs: &[SweepRun],
        sweep_var: &str,
        out_file_name: Option<&str>,
    ) -> Result<Vec<PathBuf>, SimexpError> {
        let prefix = out_file_name.unwrap_or(&self.config.result_filename).to_string();
        let mut artifacts = Vec::new();
        for run in runs {
            if let Ok(results) = &run.result {
                let name = format!("{}_{}_{}", prefix, sweep_var, run.value).replace('.', "_");
                if let Some(path) = self.plot_simulation_results(results, Some(&name))? {
                    artifacts.push(path);
                }
            }
        }
        Ok(artifacts)
    }

    /// Release the backend's external resources.
    pub fn terminate(&mut self) -> Result<(), SimexpError> {
        self.backend.terminate()
    }

    /// Context for backend-specific calls outside the lifecycle, such as a model-variant switch.
    pub fn with_context<T>(&mut self, f: impl FnOnce(&mut B, &RunContext<'_>) -> T) -> T {
        let out = self.out_file_name();
        let ctx = RunContext {
            config: &self.config,
            layout: &self.layout,
            exp_name: &self.exp_name,
            out_file_name: &out,
        };
        f(&mut self.backend, &ctx)
    }

    /// Path of the persisted CSV for `out_file_name`.
    pub fn csv_path(&self, out_file_name: &str) -> Result<PathBuf, SimexpError> {
        Ok(self.data_dir()?.join(format!("{}.csv", out_file_name)))
    }
}

impl<B: SimulationBackend> Drop for Experiment<B> {
    fn drop(&mut self) {
        if let Err(e) = self.backend.terminate() {
            warn!(error = %e, "backend did not terminate cleanly");
        }
    }
}
