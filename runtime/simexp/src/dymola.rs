// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

//! Native engine binding: starts the engine executable with its JSON-RPC server
//! enabled and forwards session calls over HTTP.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use simexp_base::errors::SimError;

use crate::engine::{EngineLauncher, EngineSession, SimulateRequest};
use crate::errors::SimexpError;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Settings of the native engine binding.
///
/// * `engine_path` - engine executable
/// * `show_window` - show the engine GUI while it is running
/// * `server_port` - port of the engine's JSON-RPC server
/// * `startup_timeout_secs` - how long to wait for the server to answer after start
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NativeConfig {
    pub engine_path: PathBuf,
    pub show_window: bool,
    pub server_port: u16,
    pub startup_timeout_secs: u64,
}

impl Default for NativeConfig {
    fn default() -> Self {
        NativeConfig {
            engine_path: PathBuf::from("dymola"),
            show_window: false,
            server_port: 8082,
            startup_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    method: &'a str,
    params: Vec<Value>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Value,
}

/// JSON-RPC client for one running engine process.
pub struct DymolaSession {
    client: reqwest::blocking::Client,
    url: String,
    process: Option<Child>,
    request_id: u64,
}

impl DymolaSession {
    /// Attach to an engine server that is already listening on `port`.
    ///
    /// Engine calls block until the engine answers, however long a simulation takes.
    pub fn connect(port: u16) -> Result<DymolaSession, SimexpError> {
        let client = reqwest::blocking::Client::builder().timeout(None).build()?;
        Ok(DymolaSession {
            client,
            url: format!("http://127.0.0.1:{}/", port),
            process: None,
            request_id: 0,
        })
    }

    fn call_raw(&mut self, method: &str, params: Vec<Value>) -> Result<Value, SimexpError> {
        self.send(method, params, None)
    }

    fn send(&mut self, method: &str, params: Vec<Value>, timeout: Option<Duration>) -> Result<Value, SimexpError> {
        self.request_id += 1;
        let request = RpcRequest { method, params, id: self.request_id };
        debug!(method, id = self.request_id, "engine call");

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let response: RpcResponse = builder.send()?.json()?;
        if !response.error.is_null() {
            return Err(SimexpError::EngineProtocol(format!("{} failed: {}", method, response.error)));
        }
        Ok(response.result)
    }

    fn call<T: DeserializeOwned>(&mut self, method: &str, params: Vec<Value>) -> Result<T, SimexpError> {
        let value = self.call_raw(method, params)?;
        Ok(serde_json::from_value(value)?)
    }

    fn path_arg(path: &Path) -> Value {
        Value::String(path.display().to_string())
    }
}

impl EngineSession for DymolaSession {
    fn add_modelica_path(&mut self, path: &Path) -> Result<bool, SimexpError> {
        self.call("AddModelicaPath", vec![Self::path_arg(path), json!(false)])
    }

    fn open_model(&mut self, path: &Path) -> Result<bool, SimexpError> {
        self.call("openModel", vec![Self::path_arg(path), json!(true), json!(true)])
    }

    fn execute_command(&mut self, command: &str) -> Result<bool, SimexpError> {
        self.call("ExecuteCommand", vec![json!(command)])
    }

    fn simulate_model(&mut self, request: &SimulateRequest) -> Result<bool, SimexpError> {
        self.call(
            "simulateModel",
            vec![
                json!(request.problem),
                json!(request.start_time),
                json!(request.stop_time),
                json!(request.number_of_intervals),
                json!(request.output_interval),
                json!(request.method),
                json!(request.tolerance),
                json!(request.fixed_stepsize),
                Self::path_arg(&request.result_file),
            ],
        )
    }

    fn run_script(&mut self, script: &Path) -> Result<bool, SimexpError> {
        self.call("RunScript", vec![Self::path_arg(script)])
    }

    fn export_equations(&mut self, path: &Path) -> Result<bool, SimexpError> {
        self.call("exportEquations", vec![Self::path_arg(path)])
    }

    fn get_class_text(&mut self, class_name: &str) -> Result<String, SimexpError> {
        self.call("getClassText", vec![json!(class_name)])
    }

    fn exist_trajectory_names(&mut self, result_file: &Path, names: &[String]) -> Result<Vec<bool>, SimexpError> {
        self.call("existTrajectoryNames", vec![Self::path_arg(result_file), json!(names)])
    }

    fn read_trajectory_size(&mut self, result_file: &Path) -> Result<usize, SimexpError> {
        self.call("readTrajectorySize", vec![Self::path_arg(result_file)])
    }

    fn read_trajectory(&mut self, result_file: &Path, names: &[String], rows: usize) -> Result<Vec<Vec<f64>>, SimexpError> {
        self.call("readTrajectory", vec![Self::path_arg(result_file), json!(names), json!(rows)])
    }

    fn last_error_log(&mut self) -> Result<String, SimexpError> {
        self.call("getLastErrorLog", Vec::new())
    }

    fn close(&mut self) -> Result<(), SimexpError> {
        let exit = self.call_raw("exit", Vec::new());
        if let Some(mut child) = self.process.take() {
            let deadline = Instant::now() + Duration::from_secs(5);
            while child.try_wait()?.is_none() {
                if Instant::now() > deadline {
                    warn!("engine did not exit, killing process");
                    child.kill()?;
                    child.wait()?;
                    break;
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
        exit.map(|_| ())
    }
}

/// Starts engine processes for [`DymolaSession`]s.
#[derive(Debug, Clone)]
pub struct DymolaLauncher {
    config: NativeConfig,
}

impl DymolaLauncher {
    pub fn new(config: NativeConfig) -> DymolaLauncher {
        DymolaLauncher { config }
    }

    fn spawn(&self) -> Result<Child, SimexpError> {
        let mut cmd = Command::new(&self.config.engine_path);
        cmd.arg("-serverport")
            .arg(self.config.server_port.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if !self.config.show_window {
            cmd.arg("-nowindow");
        }

        cmd.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => SimError::EngineUnavailable(format!(
                "cannot start `{}` ({}) - probably no engine installation on this machine",
                self.config.engine_path.display(),
                e
            ))
            .into(),
            _ => SimexpError::IoError(e),
        })
    }
}

impl EngineLauncher for DymolaLauncher {
    fn launch(&self) -> Result<Box<dyn EngineSession>, SimexpError> {
        let mut child = self.spawn()?;
        info!(
            engine = %self.config.engine_path.display(),
            port = self.config.server_port,
            "started simulation engine"
        );

        let mut session = DymolaSession::connect(self.config.server_port)?;
        let deadline = Instant::now() + Duration::from_secs(self.config.startup_timeout_secs);
        loop {
            if let Some(status) = child.try_wait()? {
                return Err(SimError::EngineUnavailable(format!("engine exited during startup with {}", status)).into());
            }
            match session.send("ping", Vec::new(), Some(PING_TIMEOUT)) {
                Ok(_) => break,
                Err(SimexpError::HttpError(_)) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
                Err(SimexpError::HttpError(e)) => {
                    // Best effort: the engine never answered.
                    let _ = child.kill();
                    return Err(SimError::EngineUnavailable(format!("engine server not reachable: {}", e)).into());
                }
                // The server answered, even if with an error for the probe.
                Err(_) => break,
            }
        }

        session.process = Some(child);
        Ok(Box::new(session))
    }
}
