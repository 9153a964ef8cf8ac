// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Simulation engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("Execution of script `{script}` failed. Engine log: {log}")]
    ScriptExecutionFailure { script: PathBuf, log: String },
    #[error("Simulation of model `{model}` failed. Engine log: {log}")]
    SimulationFailure { model: String, log: String },
    #[error("Result file `{0}` does not exist. Possible reason: simulation not successful")]
    ResultFileMissing(PathBuf),
    #[error("Sizes of simulation results ({output_rows} rows) and input data ({input_rows} rows) do not match")]
    ResultSizeMismatch { output_rows: usize, input_rows: usize },
    #[error("Declaration of type `{pattern}` not found in source of `{model}`")]
    ModelTextNotFound { pattern: String, model: String },
    #[error("Type `{pattern}` is declared {occurrences} times in `{model}`; refusing to patch an ambiguous declaration")]
    AmbiguousDeclaration { pattern: String, model: String, occurrences: usize },
    #[error("Invalid simulation parameters: {0}")]
    InvalidParameters(String),
    #[error("Unknown trajectory `{0}`")]
    UnknownTrajectory(String),
    #[error("Malformed result table: {0}")]
    MalformedTable(String),
    #[error(transparent)]
    CsvError(#[from] csv::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}
