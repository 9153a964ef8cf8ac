// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

use std::fmt::Display;

use tracing::{info, warn};

use crate::backend::SimulationBackend;
use crate::errors::SimexpError;
use crate::experiment::Experiment;
use crate::types::{Overrides, ResultTable};

/// Outcome of one sweep element.
///
/// * `name` - artifact name of the run
/// * `value` - swept value as passed to the engine
/// * `result` - extracted results or the error of this element
#[derive(Debug)]
pub struct SweepRun {
    pub name: String,
    pub value: String,
    pub result: Result<ResultTable, SimexpError>,
}

impl SweepRun {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn table(&self) -> Option<&ResultTable> {
        self.result.as_ref().ok()
    }
}

/// Artifact name of one sweep element: `{model}_{var}_{value}` with every `.` replaced by `_`.
pub fn sweep_run_name(model_name_full: &str, sweep_var: &str, value: &str) -> String {
    format!("{}_{}_{}", model_name_full, sweep_var, value).replace('.', "_")
}

/// Run the experiment lifecycle once per value of `sweep_var`, in the order of `values`.
///
/// A failing element is recorded in its [`SweepRun`] and the sweep continues.
pub fn run_sweep<B, T>(
    experiment: &mut Experiment<B>,
    trajectory_names: &[String],
    sweep_var: &str,
    values: &[T],
    store_csv: bool,
) -> Vec<SweepRun>
where
    B: SimulationBackend,
    T: Display,
{
    let model = experiment.config().model.model_name_full();
    values
        .iter()
        .map(|value| {
            let value = value.to_string();
            let name = sweep_run_name(&model, sweep_var, &value);
            let mut overrides = Overrides::new();
            overrides.insert(sweep_var.to_string(), value.clone());

            info!(run = %name, variable = sweep_var, value = %value, "sweep element");
            let result = experiment.run_named(&name, trajectory_names, &overrides, store_csv);
            if let Err(e) = &result {
                warn!(run = %name, error = %e, "sweep element failed");
            }
            SweepRun { name, value, result }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_name_replaces_dots() {
        assert_eq!(sweep_run_name("Lib.Room", "heater.Q", "0.5"), "Lib_Room_heater_Q_0_5");
        assert_eq!(sweep_run_name("Room", "k", "2"), "Room_k_2");
    }
}
