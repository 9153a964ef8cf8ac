// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use simexp_base::errors::SimError;

use crate::backend::{RunContext, SimulationBackend};
use crate::commands::{self, Command};
use crate::dymola::{DymolaLauncher, NativeConfig};
use crate::engine::{EngineHandle, EngineLauncher};
use crate::errors::SimexpError;
use crate::model_description::ModelDescriptor;
use crate::native::{export_equations, extract_engine_results};
use crate::types::{Overrides, ResultTable};
use crate::variant::locate_declaration;

/// Settings of the script-driven backend.
///
/// * `native` - engine binding used to execute the scripts
/// * `script_dir` - directory below the result root where scripts are written
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    pub native: NativeConfig,
    pub script_dir: PathBuf,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        ScriptConfig { native: NativeConfig::default(), script_dir: PathBuf::from("Scripts") }
    }
}

/// Backend that renders every action as a command script and lets the engine
/// execute the script file as a whole.
pub struct ScriptBackend {
    engine: EngineHandle,
    script_dir: PathBuf,
}

impl ScriptBackend {
    pub fn new(config: ScriptConfig) -> ScriptBackend {
        let launcher = Box::new(DymolaLauncher::new(config.native));
        ScriptBackend::with_launcher(launcher, config.script_dir)
    }

    pub fn with_launcher(launcher: Box<dyn EngineLauncher>, script_dir: PathBuf) -> ScriptBackend {
        ScriptBackend { engine: EngineHandle::new(launcher), script_dir }
    }

    pub fn engine(&mut self) -> &mut EngineHandle {
        &mut self.engine
    }

    /// Absolute script directory below the result root.
    pub fn script_dir(&self, ctx: &RunContext<'_>) -> Result<PathBuf, SimexpError> {
        Ok(ctx.layout.root_dir(true)?.join(&self.script_dir))
    }

    /// Write `commands` to `filename` in the script directory, creating it if needed.
    pub fn create_script(&self, ctx: &RunContext<'_>, commands: &[Command], filename: &str) -> Result<PathBuf, SimexpError> {
        let dir = self.script_dir(ctx)?;
        fs::create_dir_all(&dir)?;
        let path = dir.join(filename);
        fs::write(&path, commands::render_script(commands))?;
        Ok(path)
    }

    /// Execute one script file in the engine.
    pub fn run_script(&mut self, script_path: &Path) -> Result<(), SimexpError> {
        self.engine.run("run script", |session| {
            info!(script = %script_path.display(), "running script");
            if !session.run_script(script_path)? {
                return Err(SimError::ScriptExecutionFailure {
                    script: script_path.to_path_buf(),
                    log: String::new(),
                }
                .into());
            }
            Ok(())
        })
    }

    /// Execute several scripts in order; empty paths are skipped. Stops at the first failure.
    pub fn run_scripts(&mut self, script_paths: &[PathBuf]) -> Result<(), SimexpError> {
        for path in script_paths.iter().filter(|p| !p.as_os_str().is_empty()) {
            self.run_script(path)?;
        }
        Ok(())
    }

    /// Write `commands` to a script and execute it.
    pub fn execute_commands(&mut self, ctx: &RunContext<'_>, commands: &[Command], filename: &str) -> Result<PathBuf, SimexpError> {
        let path = self.create_script(ctx, commands, filename)?;
        self.run_script(&path)?;
        Ok(path)
    }

    /// Replace the declaration of `old` in the experiment's model by an instance
    /// `instance_name` of `new` and check the modified model.
    ///
    /// The model source is inspected first: the switch is refused if `old` is not
    /// declared or if the engine's first textual match would not be the only declaration.
    pub fn switch_model_variant(
        &mut self,
        ctx: &RunContext<'_>,
        old: &ModelDescriptor,
        new: &ModelDescriptor,
        instance_name: &str,
    ) -> Result<PathBuf, SimexpError> {
        let model = &ctx.config.model;
        let model_full = model.model_name_full();
        let text = self.engine.run("get class text", |session| session.get_class_text(&model_full))?;

        let span = locate_declaration(&text, &old.model_name, &model_full)?;
        if text.find(&old.model_name) != Some(span.start) {
            return Err(SimError::AmbiguousDeclaration {
                pattern: old.model_name.clone(),
                model: model_full,
                occurrences: text.matches(&old.model_name).count(),
            }
            .into());
        }

        let cmds = commands::model_switch_cmds(&model.package_name, &model.model_name, old, new, instance_name);
        self.execute_commands(ctx, &cmds, &format!("switch_script_{}.mos", instance_name))
    }
}

impl SimulationBackend for ScriptBackend {
    fn name(&self) -> &'static str {
        "script"
    }

    fn setup(&mut self, ctx: &RunContext<'_>) -> Result<(), SimexpError> {
        let config = ctx.config;
        let cmds = commands::setup_cmds(
            &config.workdir_path,
            &config.package_paths,
            &config.model.package_name,
            &config.fmu_paths,
        );
        self.execute_commands(ctx, &cmds, &format!("setup_script_{}.mos", ctx.exp_name))?;
        Ok(())
    }

    fn init(&mut self, ctx: &RunContext<'_>) -> Result<(), SimexpError> {
        let config = ctx.config;
        if config.init_params.use_init_file {
            let init_file = ctx.data_dir()?.join(&config.init_params.init_filename);
            let cmds = commands::load_init_cond_cmds(config.sim_params.start_time, &init_file);
            self.execute_commands(ctx, &cmds, &format!("init_script_{}.mos", ctx.exp_name))?;
        }
        Ok(())
    }

    fn simulate(&mut self, ctx: &RunContext<'_>, additional: &Overrides) -> Result<(), SimexpError> {
        let config = ctx.config;
        if config.export_equations {
            export_equations(&mut self.engine, ctx)?;
        }

        let init_variables = if config.init_params.use_init_values {
            Some(&config.init_params.init_variables)
        } else {
            None
        };
        let mut cmds = commands::sim_cmds_extended(
            &config.sim_params,
            &config.workdir_path,
            &ctx.model_name_full(),
            &ctx.result_file()?,
            init_variables,
            additional,
        );
        // imported FMUs take their time settings from the fmi_* variables
        if !config.fmu_paths.is_empty() {
            let at = cmds.len() - 1;
            cmds.splice(at..at, commands::fmi_sim_time_cmds(&config.sim_params));
        }
        self.execute_commands(ctx, &cmds, &format!("simulation_script_{}.mos", ctx.out_file_name))?;
        Ok(())
    }

    fn extract_results(&mut self, ctx: &RunContext<'_>, trajectory_names: &[String]) -> Result<ResultTable, SimexpError> {
        extract_engine_results(&mut self.engine, ctx, trajectory_names)
    }

    fn terminate(&mut self) -> Result<(), SimexpError> {
        self.engine.close();
        Ok(())
    }
}
