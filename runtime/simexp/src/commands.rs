// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

//! Builders for the statements of engine command scripts (`.mos`).
//!
//! Every builder is a pure function of its arguments. Values are interpolated
//! verbatim: callers must pass text that is already valid for the script grammar.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::model_description::ModelDescriptor;
use crate::parameters::SimulationParameters;
use crate::types::Overrides;

#[cfg(windows)]
pub const LINE_SEPARATOR: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_SEPARATOR: &str = "\n";

/// One engine statement. Rendered with the platform line separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command(String);

impl Command {
    pub fn new<S: Into<String>>(statement: S) -> Command {
        Command(statement.into())
    }

    /// The statement without line terminator.
    pub fn statement(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.0, LINE_SEPARATOR)
    }
}

/// Concatenate commands into script text.
pub fn render_script(commands: &[Command]) -> String {
    commands.iter().map(|c| c.to_string()).collect()
}

/// Load initial conditions from a previous result file (`.mat` is appended).
pub fn load_init_cond_cmds(start_time: f64, init_file: &Path) -> Vec<Command> {
    vec![Command::new(format!(
        "importInitialResult(\"{}.mat\", {});",
        init_file.display(),
        start_time
    ))]
}

pub fn set_workdir_cmds(workdir_path: &Path) -> Vec<Command> {
    vec![Command::new(format!(
        "Modelica.Utilities.System.setWorkDirectory(\"{}\");",
        workdir_path.display()
    ))]
}

/// Import FMUs into `package_name`; empty paths are skipped.
pub fn fmu_import_cmds(package_name: &str, fmu_paths: &[PathBuf]) -> Vec<Command> {
    fmu_paths
        .iter()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| {
            Command::new(format!(
                "importFMU(\"{}\", true, false, false, \"{}\");",
                p.display(),
                package_name
            ))
        })
        .collect()
}

/// Open model files; empty paths are skipped.
pub fn open_model_cmds(package_paths: &[PathBuf]) -> Vec<Command> {
    package_paths
        .iter()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| Command::new(format!("openModel(\"{}\");", p.display())))
        .collect()
}

/// Parameter assignments `key=value;`; entries with an empty key are skipped.
pub fn additional_param_cmds(additional_parameters: &Overrides) -> Vec<Command> {
    additional_parameters
        .iter()
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| Command::new(format!("{}={};", key, value)))
        .collect()
}

/// Simulation time settings for imported FMUs.
pub fn fmi_sim_time_cmds(sim_params: &SimulationParameters) -> Vec<Command> {
    vec![
        Command::new(format!("fmi_StartTime={};", sim_params.start_time)),
        Command::new(format!("fmi_StopTime={};", sim_params.stop_time)),
        Command::new(format!("fmi_NumberOfSteps={};", sim_params.num_intervals)),
    ]
}

/// Named-argument call `function("model", key1=val1,key2=val2);`.
fn named_call(function: &str, model_name_full: &str, args: &[(&str, String)]) -> Command {
    let joined = args
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",");
    Command::new(format!("{}(\"{}\", {});", function, model_name_full, joined))
}

/// Full simulation script body: working directory, parameter overrides, then the
/// extended simulate call. With `init_variables` set, the call carries
/// `initialNames`/`initialValues`.
pub fn sim_cmds_extended(
    sim_params: &SimulationParameters,
    workdir_path: &Path,
    model_name_full: &str,
    resultfile_path: &Path,
    init_variables: Option<&BTreeMap<String, f64>>,
    additional_parameters: &Overrides,
) -> Vec<Command> {
    let mut args = vec![
        ("startTime", sim_params.start_time.to_string()),
        ("stopTime", sim_params.stop_time.to_string()),
        ("numberOfIntervals", sim_params.num_intervals.to_string()),
        ("outputInterval", sim_params.output_interval.to_string()),
        ("method", format!("\"{}\"", sim_params.algorithm)),
        ("tolerance", sim_params.tolerance.to_string()),
        ("fixedstepsize", sim_params.fixed_stepsize.to_string()),
        ("resultFile", format!("\"{}\"", resultfile_path.display())),
    ];
    if let Some(init) = init_variables {
        let names = init.keys().map(|k| format!("\"{}\"", k)).collect::<Vec<_>>().join(",");
        let values = init.values().map(|v| v.to_string()).collect::<Vec<_>>().join(",");
        args.push(("initialNames", format!("{{{}}}", names)));
        args.push(("initialValues", format!("{{{}}}", values)));
    }

    let mut cmds = set_workdir_cmds(workdir_path);
    cmds.extend(additional_param_cmds(additional_parameters));
    cmds.push(named_call("simulateExtendedModel", model_name_full, &args));
    cmds
}

/// Setup script: working directory, model files, then FMU imports into the package.
pub fn setup_cmds(
    workdir_path: &Path,
    package_paths: &[PathBuf],
    package_name: &str,
    fmu_paths: &[PathBuf],
) -> Vec<Command> {
    let mut cmds = set_workdir_cmds(workdir_path);
    cmds.extend(open_model_cmds(package_paths));
    cmds.extend(fmu_import_cmds(package_name, fmu_paths));
    cmds
}

/// Declaration text `<type> <instance> (<k=v,...>);` used by the variant switch.
pub fn declaration(type_name: &str, instance_name: &str, parameters: &BTreeMap<String, String>) -> String {
    let params = parameters
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",");
    format!("{} {} ({});", type_name, instance_name, params)
}

/// Replace the declaration of `old` inside `package_name.model_name` by a
/// declaration of `new`, then check the model.
pub fn model_switch_cmds(
    package_name: &str,
    model_name: &str,
    old: &ModelDescriptor,
    new: &ModelDescriptor,
    instance_name: &str,
) -> Vec<Command> {
    let model_full = ModelDescriptor::new(package_name, model_name).model_name_full();
    let replacement = declaration(&new.model_name, instance_name, &new.parameters);
    vec![
        Command::new(format!("text = getClassText(\"{}\");", model_full)),
        Command::new(format!(
            "start_index = Modelica.Utilities.Strings.find(text, \"{}\");",
            old.model_name
        )),
        Command::new("end_index = Modelica.Utilities.Strings.find(text, \";\", startIndex=start_index);"),
        Command::new("text_to_replace = Modelica.Utilities.Strings.substring(text, start_index, end_index);"),
        Command::new(format!("replacement_text = \"{}\";", replacement)),
        Command::new("text_new = Modelica.Utilities.Strings.replace(text, text_to_replace, replacement_text);"),
        Command::new(format!("setClassText(\"{}\", text_new);", package_name)),
        Command::new(format!("checkModel(\"{}\");", model_full)),
    ]
}
