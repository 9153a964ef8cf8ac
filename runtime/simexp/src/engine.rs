// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

//! Session abstraction over an external simulation engine and the handle that
//! owns it.

use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use simexp_base::errors::SimError;

use crate::errors::SimexpError;
use crate::parameters::SimulationParameters;
use crate::types::ResultTable;

/// Name of the time trajectory in engine result files.
pub const TIME_TRAJECTORY: &str = "Time";

/// Arguments of one engine simulate call.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulateRequest {
    pub problem: String,
    pub start_time: f64,
    pub stop_time: f64,
    pub number_of_intervals: u32,
    pub output_interval: f64,
    pub method: String,
    pub tolerance: f64,
    pub fixed_stepsize: f64,
    pub result_file: PathBuf,
}

impl SimulateRequest {
    pub fn new(problem: &str, sim_params: &SimulationParameters, result_file: &Path) -> SimulateRequest {
        SimulateRequest {
            problem: problem.to_string(),
            start_time: sim_params.start_time,
            stop_time: sim_params.stop_time,
            number_of_intervals: sim_params.num_intervals,
            output_interval: sim_params.output_interval,
            method: sim_params.algorithm.clone(),
            tolerance: sim_params.tolerance,
            fixed_stepsize: sim_params.fixed_stepsize,
            result_file: result_file.to_path_buf(),
        }
    }
}

/// A live, stateful session with the engine. Calls return the engine's own
/// success flag where it reports one.
pub trait EngineSession {
    fn add_modelica_path(&mut self, path: &Path) -> Result<bool, SimexpError>;
    fn open_model(&mut self, path: &Path) -> Result<bool, SimexpError>;
    fn execute_command(&mut self, command: &str) -> Result<bool, SimexpError>;
    fn simulate_model(&mut self, request: &SimulateRequest) -> Result<bool, SimexpError>;
    fn run_script(&mut self, script: &Path) -> Result<bool, SimexpError>;
    fn export_equations(&mut self, path: &Path) -> Result<bool, SimexpError>;
    fn get_class_text(&mut self, class_name: &str) -> Result<String, SimexpError>;
    fn exist_trajectory_names(&mut self, result_file: &Path, names: &[String]) -> Result<Vec<bool>, SimexpError>;
    fn read_trajectory_size(&mut self, result_file: &Path) -> Result<usize, SimexpError>;
    fn read_trajectory(&mut self, result_file: &Path, names: &[String], rows: usize) -> Result<Vec<Vec<f64>>, SimexpError>;
    fn last_error_log(&mut self) -> Result<String, SimexpError>;
    fn close(&mut self) -> Result<(), SimexpError>;
}

/// Opens new engine sessions.
pub trait EngineLauncher {
    fn launch(&self) -> Result<Box<dyn EngineSession>, SimexpError>;
}

/// Owner of at most one engine session.
///
/// The session is opened on first use and reused afterwards. It is released on
/// [`EngineHandle::close`], after any failed call made through
/// [`EngineHandle::run`], and when the handle is dropped.
pub struct EngineHandle {
    launcher: Box<dyn EngineLauncher>,
    session: Option<Box<dyn EngineSession>>,
}

impl EngineHandle {
    pub fn new(launcher: Box<dyn EngineLauncher>) -> EngineHandle {
        EngineHandle { launcher, session: None }
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// The current session, launching the engine if no session is open.
    pub fn session(&mut self) -> Result<&mut dyn EngineSession, SimexpError> {
        let session = match self.session.take() {
            Some(session) => session,
            None => {
                debug!("opening engine session");
                self.launcher.launch()?
            }
        };
        Ok(self.session.insert(session).as_mut())
    }

    /// Run `f` against the session. On failure the error is logged together
    /// with the engine's error log, the session is closed and the error is
    /// returned with the log attached.
    pub fn run<T, F>(&mut self, context: &str, f: F) -> Result<T, SimexpError>
    where
        F: FnOnce(&mut dyn EngineSession) -> Result<T, SimexpError>,
    {
        let result = match self.session() {
            Ok(session) => f(session),
            Err(e) => Err(e),
        };
        result.map_err(|e| self.handle_failure(context, e))
    }

    fn handle_failure(&mut self, context: &str, err: SimexpError) -> SimexpError {
        error!(context, error = %err, "engine call failed");

        let log = match self.session.as_mut().map(|s| s.last_error_log()) {
            Some(Ok(log)) => {
                error!(context, "engine error log:\n{}", log);
                log
            }
            Some(Err(e)) => {
                warn!(context, error = %e, "could not retrieve engine error log");
                String::new()
            }
            None => String::new(),
        };
        self.close();

        match err {
            SimexpError::SimError(SimError::SimulationFailure { model, .. }) => {
                SimError::SimulationFailure { model, log }.into()
            }
            SimexpError::SimError(SimError::ScriptExecutionFailure { script, .. }) => {
                SimError::ScriptExecutionFailure { script, log }.into()
            }
            other => other,
        }
    }

    /// Close the session if one is open. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            debug!("closing engine session");
            if let Err(e) = session.close() {
                warn!(error = %e, "engine did not close cleanly");
            }
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read `trajectory_names` from an engine result file into a table. Every
/// requested trajectory must exist in the file.
pub fn read_trajectories(
    session: &mut dyn EngineSession,
    result_file: &Path,
    trajectory_names: &[String],
) -> Result<ResultTable, SimexpError> {
    if !result_file.exists() {
        return Err(SimError::ResultFileMissing(result_file.to_path_buf()).into());
    }

    let mut names = vec![TIME_TRAJECTORY.to_string()];
    names.extend(trajectory_names.iter().cloned());

    let exist = session.exist_trajectory_names(result_file, &names)?;
    if let Some((name, _)) = names.iter().zip(exist.iter()).find(|(_, exists)| !**exists) {
        return Err(SimError::UnknownTrajectory(name.clone()).into());
    }
    if exist.len() != names.len() {
        return Err(SimexpError::EngineProtocol(format!(
            "engine answered {} existence flags for {} trajectories",
            exist.len(),
            names.len()
        )));
    }

    let rows = session.read_trajectory_size(result_file)?;
    let trajectories = session.read_trajectory(result_file, &names, rows)?;
    Ok(ResultTable::from_trajectories(trajectories, &names)?)
}
