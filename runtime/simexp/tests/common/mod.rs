#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use simexp::engine::{EngineLauncher, EngineSession, SimulateRequest, TIME_TRAJECTORY};
use simexp::errors::SimexpError;
use simexp::experiment::ExperimentConfig;
use simexp::model_description::ModelDescriptor;
use simexp_base::errors::SimError;

pub const FAKE_ERROR_LOG: &str = "Error: fake engine failure";

/// Observable state shared between a test and its fake engine sessions.
#[derive(Debug)]
pub struct FakeEngine {
    pub launches: usize,
    pub closes: usize,
    pub calls: Vec<String>,
    pub requests: Vec<SimulateRequest>,
    pub scripts: Vec<PathBuf>,
    pub simulate_ok: bool,
    pub script_ok: bool,
    pub unavailable: bool,
    pub class_text: String,
    pub trajectories: BTreeMap<String, Vec<f64>>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        let mut trajectories = BTreeMap::new();
        trajectories.insert(TIME_TRAJECTORY.to_string(), vec![0.0, 0.5, 1.0]);
        trajectories.insert("room.T".to_string(), vec![293.15, 294.0, 295.5]);
        trajectories.insert("heater.Q_flow".to_string(), vec![0.0, 100.0, 150.0]);
        FakeEngine {
            launches: 0,
            closes: 0,
            calls: Vec::new(),
            requests: Vec::new(),
            scripts: Vec::new(),
            simulate_ok: true,
            script_ok: true,
            unavailable: false,
            class_text: String::new(),
            trajectories,
        }
    }
}

pub type Shared = Rc<RefCell<FakeEngine>>;

pub struct FakeSession {
    state: Shared,
}

impl FakeSession {
    fn record(&self, call: String) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl EngineSession for FakeSession {
    fn add_modelica_path(&mut self, path: &Path) -> Result<bool, SimexpError> {
        self.record(format!("AddModelicaPath({})", path.display()));
        Ok(true)
    }

    fn open_model(&mut self, path: &Path) -> Result<bool, SimexpError> {
        self.record(format!("openModel({})", path.display()));
        Ok(true)
    }

    fn execute_command(&mut self, command: &str) -> Result<bool, SimexpError> {
        self.record(format!("ExecuteCommand({})", command));
        Ok(true)
    }

    fn simulate_model(&mut self, request: &SimulateRequest) -> Result<bool, SimexpError> {
        self.record(format!("simulateModel({})", request.problem));
        let mut state = self.state.borrow_mut();
        state.requests.push(request.clone());
        if state.simulate_ok {
            std::fs::write(format!("{}.mat", request.result_file.display()), b"")?;
        }
        Ok(state.simulate_ok)
    }

    fn run_script(&mut self, script: &Path) -> Result<bool, SimexpError> {
        self.record(format!("RunScript({})", script.display()));
        let mut state = self.state.borrow_mut();
        state.scripts.push(script.to_path_buf());
        Ok(state.script_ok)
    }

    fn export_equations(&mut self, path: &Path) -> Result<bool, SimexpError> {
        self.record(format!("exportEquations({})", path.display()));
        Ok(true)
    }

    fn get_class_text(&mut self, class_name: &str) -> Result<String, SimexpError> {
        self.record(format!("getClassText({})", class_name));
        Ok(self.state.borrow().class_text.clone())
    }

    fn exist_trajectory_names(&mut self, _result_file: &Path, names: &[String]) -> Result<Vec<bool>, SimexpError> {
        let state = self.state.borrow();
        Ok(names.iter().map(|n| state.trajectories.contains_key(n)).collect())
    }

    fn read_trajectory_size(&mut self, _result_file: &Path) -> Result<usize, SimexpError> {
        Ok(self.state.borrow().trajectories[TIME_TRAJECTORY].len())
    }

    fn read_trajectory(&mut self, _result_file: &Path, names: &[String], rows: usize) -> Result<Vec<Vec<f64>>, SimexpError> {
        let state = self.state.borrow();
        Ok(names.iter().map(|n| state.trajectories[n][..rows].to_vec()).collect())
    }

    fn last_error_log(&mut self) -> Result<String, SimexpError> {
        Ok(FAKE_ERROR_LOG.to_string())
    }

    fn close(&mut self) -> Result<(), SimexpError> {
        self.state.borrow_mut().closes += 1;
        Ok(())
    }
}

pub struct FakeLauncher {
    pub state: Shared,
}

impl EngineLauncher for FakeLauncher {
    fn launch(&self) -> Result<Box<dyn EngineSession>, SimexpError> {
        let mut state = self.state.borrow_mut();
        if state.unavailable {
            return Err(SimError::EngineUnavailable(String::from("fake engine not installed")).into());
        }
        state.launches += 1;
        Ok(Box::new(FakeSession { state: self.state.clone() }))
    }
}

pub fn fake_engine() -> (Shared, Box<FakeLauncher>) {
    let state = Rc::new(RefCell::new(FakeEngine::default()));
    let launcher = Box::new(FakeLauncher { state: state.clone() });
    (state, launcher)
}

/// Experiment configuration with results below `root`.
pub fn config_in(root: &Path) -> ExperimentConfig {
    ExperimentConfig {
        workdir_path: root.join("models"),
        model: ModelDescriptor::new("Buildings", "Room"),
        result_root_dir: root.to_path_buf(),
        ..Default::default()
    }
}

pub fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Create the engine result file of run `out_file_name`.
pub fn touch_result_file(data_dir: &Path, out_file_name: &str) {
    std::fs::write(data_dir.join(format!("{}.mat", out_file_name)), b"").unwrap();
}
