// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::errors::SimError;

/// Time and solver settings of one simulation run.
///
/// * `start_time` - simulation start time in seconds
/// * `stop_time` - simulation stop time in seconds
/// * `num_intervals` - number of output intervals
/// * `output_interval` - distance between output points, `0.0` derives it from `num_intervals`
/// * `tolerance` - relative tolerance of the integrator
/// * `fixed_stepsize` - step size for fixed-step algorithms, `0.0` for variable step
/// * `algorithm` - name of the integration algorithm understood by the engine
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimulationParameters {
    pub start_time: f64,
    pub stop_time: f64,
    pub num_intervals: u32,
    pub output_interval: f64,
    pub tolerance: f64,
    pub fixed_stepsize: f64,
    pub algorithm: String,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        SimulationParameters {
            start_time: 0.0,
            stop_time: 1.0,
            num_intervals: 500,
            output_interval: 0.0,
            tolerance: 1e-4,
            fixed_stepsize: 0.0,
            algorithm: String::from("Dassl"),
        }
    }
}

impl SimulationParameters {
    /// Set the start time; `None` keeps the current value.
    pub fn set_start_time(&mut self, start_time: Option<f64>) {
        if let Some(t) = start_time {
            self.start_time = t;
        }
    }

    /// Set the stop time; `None` keeps the current value.
    pub fn set_stop_time(&mut self, stop_time: Option<f64>) {
        if let Some(t) = stop_time {
            self.stop_time = t;
        }
    }

    /// Output interval actually used for stepping and result sampling.
    pub fn effective_output_interval(&self) -> f64 {
        if self.output_interval > 0.0 {
            self.output_interval
        } else {
            (self.stop_time - self.start_time) / f64::from(self.num_intervals.max(1))
        }
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if !(self.stop_time > self.start_time) {
            return Err(SimError::InvalidParameters(format!(
                "stop time {} must be greater than start time {}",
                self.stop_time, self.start_time
            )));
        }
        if self.num_intervals == 0 {
            return Err(SimError::InvalidParameters(String::from("number of intervals must be positive")));
        }
        if self.output_interval < 0.0 {
            return Err(SimError::InvalidParameters(format!(
                "output interval {} must not be negative",
                self.output_interval
            )));
        }
        Ok(())
    }
}

/// Initial-condition settings.
///
/// Variable names are passed through to the engine unchecked.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct InitializationParameters {
    pub use_init_values: bool,
    pub init_variables: BTreeMap<String, f64>,
    pub use_init_file: bool,
    pub init_filename: String,
}

impl InitializationParameters {
    pub fn new() -> InitializationParameters {
        Default::default()
    }

    /// Replace the initialization values.
    pub fn set_init_variables(&mut self, init_variables: BTreeMap<String, f64>) {
        self.init_variables = init_variables;
    }

    pub fn set_use_init_file(&mut self, use_init_file: bool) {
        self.use_init_file = use_init_file;
    }

    pub fn set_use_init_values(&mut self, use_init_values: bool) {
        self.use_init_values = use_init_values;
    }

    pub fn set_init_filename(&mut self, init_filename: &str) {
        self.init_filename = init_filename.to_string();
    }

    /// Merge `init_variables` into the existing values, set the init file and
    /// activate both initialization mechanisms.
    pub fn set_initialization_parameters_full(&mut self, init_file: &str, init_variables: &BTreeMap<String, f64>) {
        self.init_variables
            .extend(init_variables.iter().map(|(k, v)| (k.clone(), *v)));
        self.use_init_file = true;
        self.init_filename = init_file.to_string();
        self.use_init_values = true;
    }
}
