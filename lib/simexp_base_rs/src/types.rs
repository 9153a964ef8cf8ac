// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;

use crate::errors::SimError;

/// One-off parameter overrides applied before a simulation, e.g. by a sweep.
pub type Overrides = BTreeMap<String, String>;

/// A named trajectory of a result table.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<f64>,
}

/// Output of one simulation: a time index in seconds and named numeric columns
/// of the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    time: Vec<f64>,
    columns: Vec<Column>,
}

impl ResultTable {
    pub fn new(time: Vec<f64>) -> ResultTable {
        ResultTable { time, columns: Vec::new() }
    }

    /// Build a table from engine trajectories where the first trajectory is the time axis
    /// and `labels[i]` names `trajectories[i]`.
    pub fn from_trajectories(trajectories: Vec<Vec<f64>>, labels: &[String]) -> Result<ResultTable, SimError> {
        if trajectories.len() != labels.len() {
            return Err(SimError::MalformedTable(format!(
                "{} trajectories for {} labels",
                trajectories.len(),
                labels.len()
            )));
        }
        let mut iter = trajectories.into_iter();
        let time = iter
            .next()
            .ok_or_else(|| SimError::MalformedTable(String::from("missing time trajectory")))?;

        let mut table = ResultTable::new(time);
        for (values, name) in iter.zip(labels.iter().skip(1)) {
            table.push_column(name, values)?;
        }
        Ok(table)
    }

    /// Append a column; its length must match the time index.
    pub fn push_column(&mut self, name: &str, values: Vec<f64>) -> Result<(), SimError> {
        if values.len() != self.time.len() {
            return Err(SimError::MalformedTable(format!(
                "column `{}` has {} rows, time index has {}",
                name,
                values.len(),
                self.time.len()
            )));
        }
        self.columns.push(Column { name: name.to_string(), values });
        Ok(())
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn row_count(&self) -> usize {
        self.time.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Values of all columns at row `idx`, in column order.
    pub fn row(&self, idx: usize) -> Option<Vec<f64>> {
        if idx >= self.time.len() {
            return None;
        }
        Some(self.columns.iter().map(|c| c.values[idx]).collect())
    }

    /// Linearly interpolated value of column `name` at time `t`, held constant outside the index.
    pub fn interpolate(&self, name: &str, t: f64) -> Option<f64> {
        let values = self.column(name)?;
        let time = &self.time;
        let first = *time.first()?;
        let last = *time.last()?;
        if t <= first {
            return values.first().copied();
        }
        if t >= last {
            return values.last().copied();
        }
        let upper = time.partition_point(|&x| x <= t);
        let (t0, t1) = (time[upper - 1], time[upper]);
        let (v0, v1) = (values[upper - 1], values[upper]);
        if t1 == t0 {
            return Some(v1);
        }
        Some(v0 + (v1 - v0) * (t - t0) / (t1 - t0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn builds_from_trajectories() {
        let table = ResultTable::from_trajectories(
            vec![vec![0.0, 1.0, 2.0], vec![10.0, 11.0, 12.0], vec![5.0, 4.0, 3.0]],
            &labels(&["Time", "a", "b"]),
        )
        .unwrap();

        assert_eq!(table.row_count(), 3);
        assert_eq!(table.column_names(), vec!["a", "b"]);
        assert_eq!(table.column("b").unwrap(), &[5.0, 4.0, 3.0]);
        assert_eq!(table.row(1).unwrap(), vec![11.0, 4.0]);
    }

    #[test]
    fn rejects_ragged_columns() {
        let res = ResultTable::from_trajectories(vec![vec![0.0, 1.0], vec![1.0]], &labels(&["Time", "a"]));
        assert!(matches!(res, Err(SimError::MalformedTable(_))));
    }

    #[test]
    fn interpolates_between_rows() {
        let mut table = ResultTable::new(vec![0.0, 10.0]);
        table.push_column("u", vec![0.0, 100.0]).unwrap();

        assert_eq!(table.interpolate("u", 2.5), Some(25.0));
        assert_eq!(table.interpolate("u", -1.0), Some(0.0));
        assert_eq!(table.interpolate("u", 11.0), Some(100.0));
        assert_eq!(table.interpolate("missing", 1.0), None);
    }
}
