// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::{debug, info, warn};

use simexp_base::errors::SimError;

use crate::backend::{RunContext, SimulationBackend};
use crate::errors::SimexpError;
use crate::fmu::{CoSimSlave, Fmi2Slave, FmuArchive};
use crate::parameters::InitializationParameters;
use crate::types::{Overrides, ResultTable};

/// Prefix of the raw input columns paired with output columns.
pub const INPUT_COLUMN_PREFIX: &str = "data_";

const STEP_TOLERANCE: f64 = 1e-6;

/// Settings of the co-simulation backend.
///
/// * `fmu_path` - packaged FMU
/// * `instance_name` - name of the slave instance
/// * `input_feature_names` - FMU inputs fed from the input time series
/// * `output_feature_names` - FMU outputs recorded during simulation
/// * `include_input_columns` - pair every requested output with its raw input column
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CoSimConfig {
    pub fmu_path: PathBuf,
    pub instance_name: String,
    pub input_feature_names: Vec<String>,
    pub output_feature_names: Vec<String>,
    pub include_input_columns: bool,
}

impl Default for CoSimConfig {
    fn default() -> Self {
        CoSimConfig {
            fmu_path: PathBuf::new(),
            instance_name: String::from("FMU1"),
            input_feature_names: Vec::new(),
            output_feature_names: Vec::new(),
            include_input_columns: true,
        }
    }
}

/// Creates slaves from unpacked archives.
pub trait SlaveFactory {
    fn instantiate(&self, archive: &FmuArchive, instance_name: &str) -> Result<Box<dyn CoSimSlave>, SimexpError>;
}

/// Loads the FMU's FMI 2.0 shared library.
#[derive(Debug, Default, Clone, Copy)]
pub struct Fmi2SlaveFactory;

impl SlaveFactory for Fmi2SlaveFactory {
    fn instantiate(&self, archive: &FmuArchive, instance_name: &str) -> Result<Box<dyn CoSimSlave>, SimexpError> {
        Ok(Box::new(Fmi2Slave::instantiate(archive, instance_name)?))
    }
}

/// Backend stepping a single FMU with a fixed communication step.
pub struct CoSimBackend {
    config: CoSimConfig,
    factory: Box<dyn SlaveFactory>,
    input_data: Option<ResultTable>,
    // declared before `archive`: the slave must be released before its files are removed
    slave: Option<Box<dyn CoSimSlave>>,
    archive: Option<FmuArchive>,
    start_values: BTreeMap<String, f64>,
    needs_reset: bool,
    results: Option<ResultTable>,
}

impl CoSimBackend {
    pub fn new(config: CoSimConfig, input_data: Option<ResultTable>) -> CoSimBackend {
        CoSimBackend::with_factory(config, input_data, Box::new(Fmi2SlaveFactory))
    }

    pub fn with_factory(config: CoSimConfig, input_data: Option<ResultTable>, factory: Box<dyn SlaveFactory>) -> CoSimBackend {
        CoSimBackend {
            config,
            factory,
            input_data,
            slave: None,
            archive: None,
            start_values: BTreeMap::new(),
            needs_reset: false,
            results: None,
        }
    }

    pub fn set_input_data(&mut self, input_data: ResultTable) {
        self.input_data = Some(input_data);
    }

    pub fn archive(&self) -> Option<&FmuArchive> {
        self.archive.as_ref()
    }

    pub fn start_values(&self) -> &BTreeMap<String, f64> {
        &self.start_values
    }

    fn feature_names(&self) -> impl Iterator<Item = &String> {
        self.config
            .input_feature_names
            .iter()
            .chain(self.config.output_feature_names.iter())
    }

    /// Start values for all feature names: explicit init values if enabled,
    /// otherwise the first row of the input series.
    fn create_start_values(&self, init_params: &InitializationParameters) -> BTreeMap<String, f64> {
        let mut values = BTreeMap::new();
        for name in self.feature_names() {
            let value = if init_params.use_init_values {
                init_params.init_variables.get(name).copied()
            } else {
                self.input_data
                    .as_ref()
                    .and_then(|d| d.column(name))
                    .and_then(|c| c.first().copied())
            };
            match value {
                Some(v) => {
                    values.insert(name.clone(), v);
                }
                None => debug!(variable = %name, "no start value"),
            }
        }
        values
    }

    fn release(&mut self) {
        self.results = None;
        self.slave = None;
        self.archive = None;
        self.needs_reset = false;
    }
}

fn parse_overrides(additional: &Overrides) -> Result<BTreeMap<String, f64>, SimexpError> {
    additional
        .iter()
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| {
            v.trim()
                .parse::<f64>()
                .map(|value| (k.clone(), value))
                .map_err(|_| SimError::InvalidParameters(format!("override {}={} is not numeric", k, v)).into())
        })
        .collect()
}

impl SimulationBackend for CoSimBackend {
    fn name(&self) -> &'static str {
        "cosim"
    }

    /// Unpack the FMU, instantiate the slave and derive start values.
    fn init(&mut self, ctx: &RunContext<'_>) -> Result<(), SimexpError> {
        self.release();

        let archive = FmuArchive::extract(&self.config.fmu_path)?;
        let slave = self.factory.instantiate(&archive, &self.config.instance_name)?;
        info!(
            fmu = %self.config.fmu_path.display(),
            instance = %self.config.instance_name,
            "instantiated co-simulation slave"
        );

        self.start_values = self.create_start_values(&ctx.config.init_params);
        self.archive = Some(archive);
        self.slave = Some(slave);
        Ok(())
    }

    fn simulate(&mut self, ctx: &RunContext<'_>, additional: &Overrides) -> Result<(), SimexpError> {
        if self.slave.is_none() {
            self.init(ctx)?;
        }
        let sim = &ctx.config.sim_params;
        sim.validate()?;

        let mut start_values = self.start_values.clone();
        start_values.extend(parse_overrides(additional)?);

        let (start_refs, start_vals, input_refs, output_refs) = {
            let md = self
                .archive
                .as_ref()
                .ok_or_else(|| SimexpError::FmuError(String::from("FMU not extracted")))?
                .model_description();
            let mut start_refs = Vec::new();
            let mut start_vals = Vec::new();
            for (name, value) in &start_values {
                start_refs.push(md.real_value_reference(name)?);
                start_vals.push(*value);
            }
            let mut input_refs = Vec::new();
            if let Some(input) = &self.input_data {
                for name in &self.config.input_feature_names {
                    if input.column(name).is_some() {
                        input_refs.push((name.clone(), md.real_value_reference(name)?));
                    } else {
                        warn!(input = %name, "input not present in input data, not fed");
                    }
                }
            }
            let output_refs = self
                .config
                .output_feature_names
                .iter()
                .map(|name| md.real_value_reference(name))
                .collect::<Result<Vec<_>, _>>()?;
            (start_refs, start_vals, input_refs, output_refs)
        };

        let input_data = self.input_data.as_ref();
        let set_inputs = |slave: &mut Box<dyn CoSimSlave>, t: f64| -> Result<(), SimexpError> {
            if let Some(input) = input_data {
                for (name, vr) in &input_refs {
                    if let Some(value) = input.interpolate(name, t) {
                        slave.set_real(&[*vr], &[value])?;
                    }
                }
            }
            Ok(())
        };

        let slave = self
            .slave
            .as_mut()
            .ok_or_else(|| SimexpError::FmuError(String::from("no slave instantiated")))?;
        if self.needs_reset {
            slave.reset()?;
        }
        self.needs_reset = true;

        let dt = sim.effective_output_interval();
        // The last step is shortened so that no step passes the declared stop time.
        let n_steps = ((sim.stop_time - sim.start_time) / dt - STEP_TOLERANCE).ceil().max(0.0) as usize;
        let step_end = |step: usize| {
            if step + 1 >= n_steps {
                sim.stop_time
            } else {
                sim.start_time + (step + 1) as f64 * dt
            }
        };

        slave.setup_experiment(Some(sim.tolerance), sim.start_time, Some(sim.stop_time))?;
        slave.enter_initialization_mode()?;
        slave.set_real(&start_refs, &start_vals)?;
        set_inputs(&mut *slave, sim.start_time)?;
        slave.exit_initialization_mode()?;

        let mut time = Vec::with_capacity(n_steps + 1);
        let mut outputs: Vec<Vec<f64>> = vec![Vec::with_capacity(n_steps + 1); output_refs.len()];
        let mut record = |slave: &mut Box<dyn CoSimSlave>, t: f64| -> Result<(), SimexpError> {
            time.push(t);
            for (column, value) in outputs.iter_mut().zip(slave.get_real(&output_refs)?) {
                column.push(value);
            }
            Ok(())
        };

        record(&mut *slave, sim.start_time)?;
        let mut t = sim.start_time;
        for step in 0..n_steps {
            let next = step_end(step);
            set_inputs(&mut *slave, t)?;
            slave.do_step(t, next - t)?;
            record(&mut *slave, next)?;
            t = next;
        }
        slave.terminate()?;

        let mut table = ResultTable::new(time);
        for (name, column) in self.config.output_feature_names.iter().zip(outputs) {
            table.push_column(name, column)?;
        }
        debug!(rows = table.row_count(), "co-simulation finished");
        self.results = Some(table);
        Ok(())
    }

    /// Requested output columns, each followed by its raw input column
    /// (`data_<name>`) when input columns are included.
    fn extract_results(&mut self, _ctx: &RunContext<'_>, trajectory_names: &[String]) -> Result<ResultTable, SimexpError> {
        let results = self
            .results
            .as_ref()
            .ok_or_else(|| SimexpError::FmuError(String::from("no simulation results available")))?;
        let rows = results.row_count();

        if let Some(input) = &self.input_data {
            if rows > input.row_count() {
                return Err(SimError::ResultSizeMismatch { output_rows: rows, input_rows: input.row_count() }.into());
            }
        }

        let mut table = ResultTable::new(results.time().to_vec());
        for name in trajectory_names {
            let values = results
                .column(name)
                .ok_or_else(|| SimError::UnknownTrajectory(name.clone()))?;
            table.push_column(name, values.to_vec())?;

            if self.config.include_input_columns {
                match self.input_data.as_ref().and_then(|d| d.column(name)) {
                    Some(raw) => table.push_column(&format!("{}{}", INPUT_COLUMN_PREFIX, name), raw[..rows].to_vec())?,
                    None => debug!(trajectory = %name, "no input column to pair"),
                }
            }
        }
        Ok(table)
    }

    fn terminate(&mut self) -> Result<(), SimexpError> {
        self.release();
        Ok(())
    }
}
