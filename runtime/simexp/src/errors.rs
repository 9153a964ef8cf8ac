// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT
use thiserror::Error;
use simexp_base::errors;

#[derive(Error, Debug)]
pub enum SimexpError {
    #[error(transparent)]
    SimError(#[from] errors::SimError),
    #[error("Engine protocol error: {0}")]
    EngineProtocol(String),
    #[error("FMU error: {0}")]
    FmuError(String),
    #[error(transparent)]
    HttpError(#[from] reqwest::Error),
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
    #[error(transparent)]
    ArchiveError(#[from] zip::result::ZipError),
    #[error(transparent)]
    XmlError(#[from] roxmltree::Error),
    #[error(transparent)]
    LibraryError(#[from] libloading::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

impl SimexpError {
    /// The domain error, if this is one.
    pub fn sim_error(&self) -> Option<&errors::SimError> {
        match self {
            SimexpError::SimError(e) => Some(e),
            _ => None,
        }
    }
}
