// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

//! Seam to the plotting service. Rendering lives outside this crate; the
//! bundled [`TableExport`] only writes the tabular export of a plot.

use std::path::{Path, PathBuf};

use tracing::debug;

use simexp_base::errors::SimError;

use crate::errors::SimexpError;
use crate::result_io::{write_csv, CsvOptions};
use crate::types::ResultTable;

pub trait PlottingService {
    /// Produce the artifact for one table in `plot_dir`, named after `name`.
    fn plot(&mut self, table: &ResultTable, plot_dir: &Path, name: &str) -> Result<PathBuf, SimexpError>;

    /// Several labelled tables in one artifact.
    fn plot_multiple(&mut self, tables: &[(String, ResultTable)], plot_dir: &Path, name: &str) -> Result<PathBuf, SimexpError>;
}

/// Writes `{name}.csv` into the plot directory.
#[derive(Debug, Clone, Default)]
pub struct TableExport {
    options: CsvOptions,
}

impl TableExport {
    pub fn new(options: CsvOptions) -> TableExport {
        TableExport { options }
    }
}

/// Merge tables sharing a time axis; columns are prefixed with their label.
pub fn merge_labelled(tables: &[(String, ResultTable)]) -> Result<ResultTable, SimError> {
    let time = match tables.first() {
        Some((_, first)) => first.time().to_vec(),
        None => return Ok(ResultTable::default()),
    };
    let mut merged = ResultTable::new(time);
    for (label, table) in tables {
        if table.time() != merged.time() {
            return Err(SimError::MalformedTable(format!("time axis of '{}' differs", label)));
        }
        for column in table.columns() {
            merged.push_column(&format!("{}.{}", label, column.name), column.values.clone())?;
        }
    }
    Ok(merged)
}

impl PlottingService for TableExport {
    fn plot(&mut self, table: &ResultTable, plot_dir: &Path, name: &str) -> Result<PathBuf, SimexpError> {
        let path = plot_dir.join(format!("{}.csv", name));
        write_csv(table, &path, &self.options)?;
        debug!(path = %path.display(), "exported plot table");
        Ok(path)
    }

    fn plot_multiple(&mut self, tables: &[(String, ResultTable)], plot_dir: &Path, name: &str) -> Result<PathBuf, SimexpError> {
        let merged = merge_labelled(tables)?;
        self.plot(&merged, plot_dir, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(values: Vec<f64>) -> ResultTable {
        let mut t = ResultTable::new(vec![0.0, 1.0]);
        t.push_column("x", values).unwrap();
        t
    }

    #[test]
    fn merge_prefixes_labels() {
        let merged = merge_labelled(&[("a".to_string(), table(vec![1.0, 2.0])), ("b".to_string(), table(vec![3.0, 4.0]))]).unwrap();
        assert_eq!(merged.column_names(), vec!["a.x", "b.x"]);
        assert_eq!(merged.column("b.x"), Some(&[3.0, 4.0][..]));
    }

    #[test]
    fn merge_rejects_different_time_axis() {
        let other = ResultTable::new(vec![0.0, 2.0]);
        let res = merge_labelled(&[("a".to_string(), table(vec![1.0, 2.0])), ("b".to_string(), other)]);
        assert!(matches!(res, Err(SimError::MalformedTable(_))));
    }

    #[test]
    fn export_writes_named_csv() {
        let dir = tempfile::tempdir().unwrap();
        let mut export = TableExport::default();
        let path = export.plot(&table(vec![1.0, 2.0]), dir.path(), "run_1").unwrap();
        assert_eq!(path, dir.path().join("run_1.csv"));
        assert!(path.exists());
    }
}
