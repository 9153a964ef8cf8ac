// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

use tracing::{info, warn};

use simexp_base::errors::SimError;

use crate::backend::{RunContext, SimulationBackend};
use crate::dymola::{DymolaLauncher, NativeConfig};
use crate::engine::{read_trajectories, EngineHandle, EngineLauncher, SimulateRequest};
use crate::errors::SimexpError;
use crate::types::{Overrides, ResultTable};

/// Backend issuing structured calls to a persistent engine session.
pub struct NativeBackend {
    engine: EngineHandle,
}

impl NativeBackend {
    pub fn new(config: NativeConfig) -> NativeBackend {
        NativeBackend::with_launcher(Box::new(DymolaLauncher::new(config)))
    }

    pub fn with_launcher(launcher: Box<dyn EngineLauncher>) -> NativeBackend {
        NativeBackend { engine: EngineHandle::new(launcher) }
    }

    pub fn engine(&mut self) -> &mut EngineHandle {
        &mut self.engine
    }
}

/// Write the model equations of the current model next to the results.
pub(crate) fn export_equations(engine: &mut EngineHandle, ctx: &RunContext<'_>) -> Result<(), SimexpError> {
    let path = ctx.data_dir()?.join(format!("{}_equations.mml", ctx.out_file_name));
    engine.run("export equations", |session| {
        if !session.export_equations(&path)? {
            warn!(path = %path.display(), "engine could not export equations");
        }
        Ok(())
    })
}

/// Read the `.mat` result file of the current run through the engine.
pub(crate) fn extract_engine_results(
    engine: &mut EngineHandle,
    ctx: &RunContext<'_>,
    trajectory_names: &[String],
) -> Result<ResultTable, SimexpError> {
    let result_path = ctx.data_dir()?.join(format!("{}.mat", ctx.out_file_name));
    engine.run("read results", |session| read_trajectories(session, &result_path, trajectory_names))
}

impl SimulationBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn simulate(&mut self, ctx: &RunContext<'_>, additional: &Overrides) -> Result<(), SimexpError> {
        if ctx.config.export_equations {
            export_equations(&mut self.engine, ctx)?;
        }

        let config = ctx.config;
        let model = ctx.model_name_full();
        let request = SimulateRequest::new(&model, &config.sim_params, &ctx.result_file()?);

        self.engine.run("simulate", |session| {
            session.add_modelica_path(&config.workdir_path)?;
            for package in &config.package_paths {
                let path = config.workdir_path.join(package);
                if !session.open_model(&path)? {
                    warn!(path = %path.display(), "engine could not open model");
                }
            }

            for (key, value) in additional.iter().filter(|(k, _)| !k.is_empty()) {
                if !session.execute_command(&format!("{}={}", key, value))? {
                    warn!(parameter = %key, value = %value, "parameter override rejected");
                }
            }

            info!(model = %model, result = %request.result_file.display(), "simulating");
            if !session.simulate_model(&request)? {
                return Err(SimError::SimulationFailure { model: model.clone(), log: String::new() }.into());
            }
            Ok(())
        })
    }

    fn extract_results(&mut self, ctx: &RunContext<'_>, trajectory_names: &[String]) -> Result<ResultTable, SimexpError> {
        extract_engine_results(&mut self.engine, ctx, trajectory_names)
    }

    fn terminate(&mut self) -> Result<(), SimexpError> {
        self.engine.close();
        Ok(())
    }
}
