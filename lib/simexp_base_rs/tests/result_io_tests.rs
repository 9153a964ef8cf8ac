use simexp_base::errors::SimError;
use simexp_base::result_io::{read_csv, write_csv, CsvOptions};
use simexp_base::types::ResultTable;

use chrono::NaiveDate;
use float_cmp::approx_eq;
use rstest::{fixture, rstest};

#[fixture]
fn table() -> ResultTable {
    let mut table = ResultTable::new(vec![0.0, 60.0, 120.0, 180.0]);
    table.push_column("room.T", vec![293.15, 293.4, 293.71, 294.0]).unwrap();
    table.push_column("heater.Q_flow", vec![0.0, 1000.0 / 3.0, -2.5e-7, 1.0e12]).unwrap();
    table
}

#[rstest]
fn round_trip_preserves_names_values_and_order(table: ResultTable) {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("results_exp.csv");
    let options = CsvOptions::default();

    write_csv(&table, &path, &options).unwrap();
    let read = read_csv(&path, &options).unwrap();

    assert_eq!(read.column_names(), table.column_names());
    assert_eq!(read.row_count(), table.row_count());
    for (a, b) in read.time().iter().zip(table.time()) {
        assert!(approx_eq!(f64, *a, *b, ulps = 2));
    }
    for (ca, cb) in read.columns().iter().zip(table.columns()) {
        for (a, b) in ca.values.iter().zip(&cb.values) {
            assert!(approx_eq!(f64, *a, *b, ulps = 2));
        }
    }
}

#[rstest]
fn header_uses_separator_and_index_label(table: ResultTable) {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("out.csv");

    write_csv(&table, &path, &CsvOptions::default()).unwrap();
    let content = std::fs::read_to_string(&path).unwrap();

    assert_eq!(content.lines().next().unwrap(), "Zeitraum;room.T;heater.Q_flow");
}

#[rstest]
fn date_index_uses_date_format(table: ResultTable) {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("dated.csv");
    let epoch = NaiveDate::from_ymd_opt(2021, 6, 2).unwrap().and_hms_opt(11, 0, 0).unwrap();
    let options = CsvOptions { epoch: Some(epoch), ..Default::default() };

    write_csv(&table, &path, &options).unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    let second_line = content.lines().nth(2).unwrap();
    assert!(second_line.starts_with("02.06.2021 11:01;"));

    let read = read_csv(&path, &options).unwrap();
    assert_eq!(read.time(), table.time());
}

#[rstest]
fn malformed_value_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("bad.csv");
    std::fs::write(&path, "Zeitraum;a\n0;1.0\n1;abc\n").unwrap();

    assert!(read_csv(&path, &CsvOptions::default()).is_err());
}

#[rstest]
#[case('§')]
#[case('ä')]
#[case('→')]
fn non_ascii_delimiter_is_rejected(table: ResultTable, #[case] delimiter: char) {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("sep.csv");
    let options = CsvOptions { delimiter, ..Default::default() };

    let err = write_csv(&table, &path, &options).unwrap_err();
    assert!(matches!(err, SimError::MalformedTable(_)));
    assert!(!path.exists());
}

#[rstest]
fn ascii_delimiter_is_used(table: ResultTable) {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("tab.csv");
    let options = CsvOptions { delimiter: '\t', ..Default::default() };

    write_csv(&table, &path, &options).unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().next().unwrap(), "Zeitraum\troom.T\theater.Q_flow");
}
