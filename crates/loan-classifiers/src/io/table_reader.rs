//! Delimited-text reader for exported loan spreadsheets.
use std::fs::File;
use std::path::Path;

use crate::data_handling::{Table, Value};
use crate::error::{LoanError, Result};

/// Configuration for reading a delimited table.
#[derive(Debug, Clone)]
pub struct TableReaderConfig {
    /// Field delimiter. When `None` it is chosen from the file extension.
    pub delimiter: Option<u8>,
    /// Trim whitespace around every field.
    pub trim: bool,
}

impl Default for TableReaderConfig {
    fn default() -> Self {
        Self {
            delimiter: None,
            trim: true,
        }
    }
}

fn delimiter_for(path: &Path) -> Result<u8> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());
    match ext.as_deref() {
        Some("csv") => Ok(b','),
        Some("tsv") | Some("tab") => Ok(b'\t'),
        _ => Err(LoanError::parse(
            path,
            "file must have a .csv or .tsv extension (export spreadsheets to delimited text first)",
        )),
    }
}

/// Read a CSV/TSV file into a `Table`.
pub fn read_table<P: AsRef<Path>>(path: P) -> Result<Table> {
    read_table_with_config(path, &TableReaderConfig::default())
}

/// Read a delimited file using a custom configuration.
pub fn read_table_with_config<P: AsRef<Path>>(path: P, config: &TableReaderConfig) -> Result<Table> {
    let path = path.as_ref();
    let delimiter = match config.delimiter {
        Some(d) => d,
        None => delimiter_for(path)?,
    };
    let file = File::open(path).map_err(|e| LoanError::io(path, e))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(if config.trim {
            csv::Trim::All
        } else {
            csv::Trim::None
        })
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| LoanError::parse(path, format!("failed to read header row: {}", e)))?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.is_empty() {
        return Err(LoanError::parse(path, "header row is empty"));
    }

    let mut rows = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result
            .map_err(|e| LoanError::parse(path, format!("row {}: {}", row_idx + 1, e)))?;
        rows.push(record.iter().map(Value::parse).collect::<Vec<_>>());
    }

    Table::from_rows(headers, rows).map_err(|e| LoanError::parse(path, e.to_string()))
}

/// Load the train and test tables.
///
/// Failures are logged before being returned so callers can simply abort.
pub fn load_datasets<P: AsRef<Path>, Q: AsRef<Path>>(train_path: P, test_path: Q) -> Result<(Table, Table)> {
    let load = |path: &Path| {
        read_table(path).map_err(|e| {
            log::error!("Error loading datasets: {}", e);
            e
        })
    };
    let train = load(train_path.as_ref())?;
    let test = load(test_path.as_ref())?;

    log::info!(
        "Datasets loaded: train {:?}, test {:?}",
        train.shape(),
        test.shape()
    );
    log::info!("Train data columns: {:?}", train.column_names());
    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn reads_csv_with_mixed_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "train.csv",
            "customer_id,income,grade,loan_status\nC1, 52.5 ,A,0\nC2,,B,1\n",
        );
        let table = read_table(&path).unwrap();
        assert_eq!(table.shape(), (2, 4));
        assert_eq!(
            table.column("income").unwrap(),
            &[Value::Numeric(52.5), Value::Missing]
        );
        assert_eq!(table.column("grade").unwrap()[1], Value::Text("B".into()));
    }

    #[test]
    fn reads_tsv_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "train.tsv", "a\tb\n1\t2\n");
        let table = read_table(&path).unwrap();
        assert_eq!(table.column("b").unwrap(), &[Value::Numeric(2.0)]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_table("/nonexistent/path/train.csv").unwrap_err();
        assert!(matches!(err, LoanError::Io { .. }));
    }

    #[test]
    fn unsupported_extension_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "train.xlsx", "a,b\n1,2\n");
        assert!(matches!(read_table(&path).unwrap_err(), LoanError::Parse { .. }));
    }

    #[test]
    fn ragged_rows_are_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "train.csv", "a,b\n1,2\n3\n");
        assert!(matches!(read_table(&path).unwrap_err(), LoanError::Parse { .. }));
    }
}
