// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

pub const DEFAULT_RESULT_ROOT_DIR: &str = "SimulationResults";
pub const DEFAULT_DATA_DIR: &str = "ResultData";
pub const DEFAULT_PLOT_DIR: &str = "Plots";

/// Directory convention for simulation results:
/// `root/`, `root/result_root/data/` and `root/result_root/plot/`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultLayout {
    pub root_dir: PathBuf,
    pub result_root_dir: PathBuf,
    pub data_dir: PathBuf,
    pub plot_dir: PathBuf,
}

impl ResultLayout {
    /// Layout with the default sub-directory names below `root_dir`.
    pub fn new<P: AsRef<Path>>(root_dir: P) -> ResultLayout {
        ResultLayout::with_dirs(root_dir, DEFAULT_RESULT_ROOT_DIR, DEFAULT_DATA_DIR, DEFAULT_PLOT_DIR)
    }

    pub fn with_dirs<P: AsRef<Path>>(root_dir: P, result_root_dir: &str, data_dir: &str, plot_dir: &str) -> ResultLayout {
        ResultLayout {
            root_dir: root_dir.as_ref().to_path_buf(),
            result_root_dir: PathBuf::from(result_root_dir),
            data_dir: PathBuf::from(data_dir),
            plot_dir: PathBuf::from(plot_dir),
        }
    }

    pub fn root_dir(&self, abspath: bool) -> io::Result<PathBuf> {
        resolve(self.root_dir.clone(), abspath)
    }

    pub fn data_dir(&self, abspath: bool) -> io::Result<PathBuf> {
        resolve(self.root_dir.join(&self.result_root_dir).join(&self.data_dir), abspath)
    }

    pub fn plot_dir(&self, abspath: bool) -> io::Result<PathBuf> {
        resolve(self.root_dir.join(&self.result_root_dir).join(&self.plot_dir), abspath)
    }

    /// All paths managed by this layout, root first.
    pub fn paths(&self, abspath: bool) -> io::Result<Vec<PathBuf>> {
        Ok(vec![self.root_dir(abspath)?, self.data_dir(abspath)?, self.plot_dir(abspath)?])
    }

    /// Create all directories, including missing parents. Existing directories are left untouched.
    pub fn create_directories(&self) -> io::Result<Vec<PathBuf>> {
        let paths = self.paths(true)?;
        for path in &paths {
            fs::create_dir_all(path)?;
            debug!(path = %path.display(), "result directory ready");
        }
        Ok(paths)
    }
}

fn resolve(path: PathBuf, abspath: bool) -> io::Result<PathBuf> {
    if abspath {
        std::path::absolute(path)
    } else {
        Ok(path)
    }
}
