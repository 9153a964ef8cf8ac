// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

use std::path::Path;

use chrono::{Duration, NaiveDateTime};
use serde::Deserialize;
use tracing::debug;

use crate::errors::SimError;
use crate::types::ResultTable;

/// Format of persisted result tables.
///
/// * `delimiter` - field separator
/// * `index_label` - header of the time column
/// * `date_format` - `strftime` pattern used when `epoch` is set
/// * `epoch` - if set, the time index is written as date-time relative to this instant
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    pub delimiter: char,
    pub index_label: String,
    pub date_format: String,
    pub epoch: Option<NaiveDateTime>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            delimiter: ';',
            index_label: String::from("Zeitraum"),
            date_format: String::from("%d.%m.%Y %H:%M"),
            epoch: None,
        }
    }
}

impl CsvOptions {
    fn delimiter_byte(&self) -> Result<u8, SimError> {
        if !self.delimiter.is_ascii() {
            return Err(SimError::MalformedTable(format!("delimiter `{}` is not an ASCII character", self.delimiter)));
        }
        Ok(self.delimiter as u8)
    }

    fn format_time(&self, t: f64) -> String {
        match self.epoch {
            None => t.to_string(),
            Some(epoch) => {
                let stamp = epoch + Duration::milliseconds((t * 1000.0).round() as i64);
                stamp.format(&self.date_format).to_string()
            }
        }
    }

    fn parse_time(&self, field: &str) -> Result<f64, SimError> {
        match self.epoch {
            None => parse_value(field),
            Some(epoch) => {
                let stamp = NaiveDateTime::parse_from_str(field, &self.date_format)
                    .map_err(|e| SimError::MalformedTable(format!("invalid time stamp `{}`: {}", field, e)))?;
                Ok((stamp - epoch).num_milliseconds() as f64 / 1000.0)
            }
        }
    }
}

fn parse_value(field: &str) -> Result<f64, SimError> {
    field
        .trim()
        .parse::<f64>()
        .map_err(|_| SimError::MalformedTable(format!("invalid numeric value `{}`", field)))
}

/// Write `table` to `path`, index column first.
pub fn write_csv<P: AsRef<Path>>(table: &ResultTable, path: P, options: &CsvOptions) -> Result<(), SimError> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(options.delimiter_byte()?)
        .from_path(path.as_ref())?;

    let mut header = vec![options.index_label.clone()];
    header.extend(table.column_names().into_iter().map(String::from));
    wtr.write_record(&header)?;

    for (idx, t) in table.time().iter().enumerate() {
        let mut line = vec![options.format_time(*t)];
        for column in table.columns() {
            line.push(column.values[idx].to_string());
        }
        wtr.write_record(&line)?;
    }
    wtr.flush()?;

    debug!(path = %path.as_ref().display(), rows = table.row_count(), "stored result table");
    Ok(())
}

/// Read a table written by [`write_csv`] (or any delimited file whose first column is time).
pub fn read_csv<P: AsRef<Path>>(path: P, options: &CsvOptions) -> Result<ResultTable, SimError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(options.delimiter_byte()?)
        .from_path(path.as_ref())?;

    let header: Vec<String> = rdr.headers()?.iter().map(String::from).collect();
    if header.is_empty() {
        return Err(SimError::MalformedTable(String::from("missing header")));
    }

    let mut time = Vec::new();
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); header.len() - 1];
    for record in rdr.records() {
        let record = record?;
        let mut fields = record.iter();
        let t = fields
            .next()
            .ok_or_else(|| SimError::MalformedTable(String::from("empty row")))?;
        time.push(options.parse_time(t)?);
        for (column, field) in values.iter_mut().zip(fields) {
            column.push(parse_value(field)?);
        }
    }

    let mut table = ResultTable::new(time);
    for (name, column) in header.iter().skip(1).zip(values) {
        table.push_column(name, column)?;
    }
    Ok(table)
}
