// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

use simexp::backend::SimulationBackend;
use simexp::cosim::{CoSimBackend, CoSimConfig};
use simexp::dymola::NativeConfig;
use simexp::experiment::{Experiment, ExperimentConfig};
use simexp::native::NativeBackend;
use simexp::plot::TableExport;
use simexp::script::{ScriptBackend, ScriptConfig};
use simexp::sweep::run_sweep;
use simexp_base::result_io::read_csv;
use simexp_base::types::ResultTable;

use anyhow::{Context, Result};
use serde::Deserialize;
use structopt::StructOpt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use std::path::{Path, PathBuf};

#[derive(Debug, StructOpt)]
#[structopt(name = "simexp", about = "Runs simulation experiments against a native engine, engine scripts or an FMU")]
struct Opt {
    /// Experiment configuration (TOML)
    #[structopt(long, parse(from_os_str))]
    config: PathBuf,
    /// Experiment name, appended to the result filename
    #[structopt(long, default_value = "")]
    name: String,
    /// Trajectories to extract
    #[structopt(long = "traj")]
    trajectories: Vec<String>,
    #[structopt(long)]
    start: Option<f64>,
    #[structopt(long)]
    stop: Option<f64>,
    /// Export the results to the plot directory
    #[structopt(long)]
    plot: bool,
    /// Do not store results as CSV
    #[structopt(long)]
    no_csv: bool,
    /// Variable to sweep; requires --sweep-values
    #[structopt(long)]
    sweep_var: Option<String>,
    #[structopt(long, use_delimiter = true)]
    sweep_values: Vec<String>,
    /// Input time series for the co-simulation backend (CSV)
    #[structopt(long, parse(from_os_str))]
    input: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum BackendKind {
    Native,
    Script,
    Cosim,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Native
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    backend: BackendKind,
    experiment: ExperimentConfig,
    native: NativeConfig,
    script: ScriptConfig,
    cosim: CoSimConfig,
}

fn load_config(path: &Path) -> Result<ConfigFile> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    let config = toml::from_str(&text).with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}

fn create_backend(config: &ConfigFile, input: Option<ResultTable>) -> Box<dyn SimulationBackend> {
    match config.backend {
        BackendKind::Native => Box::new(NativeBackend::new(config.native.clone())),
        BackendKind::Script => Box::new(ScriptBackend::new(config.script.clone())),
        BackendKind::Cosim => Box::new(CoSimBackend::new(config.cosim.clone(), input)),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let opt = Opt::from_args();
    let config = load_config(&opt.config)?;

    let input = match &opt.input {
        Some(path) => Some(
            read_csv(path, &config.experiment.csv).with_context(|| format!("Could not read input {}", path.display()))?,
        ),
        None => None,
    };

    let backend = create_backend(&config, input);
    let mut experiment = Experiment::new(config.experiment.clone(), backend)?.with_plotter(Box::new(TableExport::new(config.experiment.csv.clone())));
    experiment.setup_experiment()?;

    let store_csv = !opt.no_csv;
    match &opt.sweep_var {
        Some(var) => {
            if opt.sweep_values.is_empty() {
                anyhow::bail!("--sweep-var requires --sweep-values");
            }
            experiment.set_start_time(opt.start);
            experiment.set_stop_time(opt.stop);

            let runs = run_sweep(&mut experiment, &opt.trajectories, var, &opt.sweep_values, store_csv);
            for run in &runs {
                match &run.result {
                    Ok(table) => info!(run = %run.name, rows = table.row_count(), "sweep element finished"),
                    Err(e) => error!(run = %run.name, error = %e, "sweep element failed"),
                }
            }
            if opt.plot {
                experiment.plot_sweep_results(&runs, var, None)?;
            }
            let failed = runs.iter().filter(|r| !r.is_ok()).count();
            if failed > 0 {
                anyhow::bail!("{} of {} sweep elements failed", failed, runs.len());
            }
        }
        None => {
            let results = experiment.run_experiment(&opt.name, &opt.trajectories, opt.start, opt.stop, opt.plot, store_csv)?;
            info!(
                experiment = %experiment.out_file_name(),
                rows = results.row_count(),
                columns = ?results.column_names(),
                "experiment finished"
            );
        }
    }

    experiment.terminate()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_configuration_parses() {
        let config: ConfigFile = toml::from_str(include_str!("../experiment.toml")).unwrap();
        assert_eq!(config.backend, BackendKind::Script);
        assert_eq!(config.experiment.model.model_name_full(), "Buildings.Room");
        assert_eq!(config.experiment.sim_params.num_intervals, 1440);
        assert_eq!(config.experiment.csv.delimiter, ';');
        assert_eq!(config.cosim.output_feature_names, vec!["room.T".to_string()]);
        assert_eq!(config.script.native.server_port, 8082);
    }

    #[test]
    fn empty_configuration_uses_defaults() {
        let config: ConfigFile = toml::from_str("").unwrap();
        assert_eq!(config.backend, BackendKind::Native);
        assert_eq!(config.experiment.result_filename, "results");
        assert_eq!(config.cosim.instance_name, "FMU1");
    }
}
