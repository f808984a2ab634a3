//! In-memory tables and the labelled matrices derived from them.
//!
//! `Table` is a small column-oriented container of parsed cells. Train and
//! test tables are stacked into a `TaggedTable` for joint preprocessing; the
//! partition tag lives beside the columns, never inside them, so it cannot
//! reach a feature matrix.
use std::collections::HashSet;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{LoanError, Result};

const MISSING_TOKENS: [&str; 7] = ["", "na", "nan", "null", "none", "n/a", "nat"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];

/// A single parsed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Numeric(f64),
    Text(String),
    DateTime(NaiveDateTime),
    Missing,
}

impl Value {
    /// Parse a raw text cell. Missing tokens are checked first so that
    /// `NaN` is never read as a float; infinite numbers are missing too.
    pub fn parse(raw: &str) -> Value {
        let s = raw.trim();
        let lowered = s.to_lowercase();
        if MISSING_TOKENS.contains(&lowered.as_str()) {
            return Value::Missing;
        }
        if let Ok(v) = s.parse::<f64>() {
            return if v.is_finite() {
                Value::Numeric(v)
            } else {
                Value::Missing
            };
        }
        for fmt in DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Value::DateTime(dt);
            }
        }
        for fmt in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
                if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                    return Value::DateTime(dt);
                }
            }
        }
        Value::Text(s.to_string())
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Numeric(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Numeric(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
            Value::DateTime(dt) => write!(f, "{}", dt),
            Value::Missing => f.write_str(""),
        }
    }
}

/// Inferred type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    DateTime,
}

impl ColumnKind {
    /// A column is numeric (or datetime) when every non-missing cell is.
    /// Entirely missing columns count as numeric.
    pub fn infer<'a, I>(values: I) -> ColumnKind
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut numeric = true;
        let mut datetime = true;
        let mut seen = false;
        for value in values {
            match value {
                Value::Missing => continue,
                Value::Numeric(_) => datetime = false,
                Value::DateTime(_) => numeric = false,
                Value::Text(_) => return ColumnKind::Categorical,
            }
            seen = true;
            if !numeric && !datetime {
                return ColumnKind::Categorical;
            }
        }
        if !seen || numeric {
            ColumnKind::Numeric
        } else {
            ColumnKind::DateTime
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Vec<Value>>,
    nrows: usize,
}

impl Table {
    pub fn new(names: Vec<String>, columns: Vec<Vec<Value>>) -> Result<Self> {
        if names.len() != columns.len() {
            return Err(LoanError::Schema(format!(
                "{} column names for {} columns",
                names.len(),
                columns.len()
            )));
        }
        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(LoanError::Schema(format!("duplicate column '{}'", name)));
            }
        }
        let nrows = columns.first().map_or(0, Vec::len);
        if let Some((name, col)) = names
            .iter()
            .zip(columns.iter())
            .find(|(_, col)| col.len() != nrows)
        {
            return Err(LoanError::Schema(format!(
                "column '{}' has {} rows, expected {}",
                name,
                col.len(),
                nrows
            )));
        }
        Ok(Self {
            names,
            columns,
            nrows,
        })
    }

    /// Build a table from row-major cells.
    pub fn from_rows(names: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); names.len()];
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != names.len() {
                return Err(LoanError::Schema(format!(
                    "row {} has {} cells, expected {}",
                    i,
                    row.len(),
                    names.len()
                )));
            }
            for (col, value) in columns.iter_mut().zip(row) {
                col.push(value);
            }
        }
        Table::new(names, columns)
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.names.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols())
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.position(name).map(|i| self.columns[i].as_slice())
    }

    pub fn kind(&self, name: &str) -> Option<ColumnKind> {
        self.column(name).map(ColumnKind::infer)
    }

    /// Copy of the table restricted to `indices`, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|col| indices.iter().map(|&i| col[i].clone()).collect())
            .collect();
        Table {
            names: self.names.clone(),
            columns,
            nrows: indices.len(),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn log_summary(&self, title: &str) {
        println!("{} Data Shape: ({}, {})", title, self.nrows, self.ncols());
        println!("{} Data Columns: {:?}", title, self.names);
    }
}

/// Which partition a stacked row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Test,
}

/// Train and test rows stacked under the train column order.
#[derive(Debug, Clone)]
pub struct TaggedTable {
    table: Table,
    split: Vec<Split>,
}

impl TaggedTable {
    /// Stack `test` under `train`. Every train column must exist in `test`;
    /// columns only present in `test` are dropped.
    pub fn stack(train: &Table, test: &Table) -> Result<Self> {
        let missing: Vec<&str> = train
            .column_names()
            .iter()
            .filter(|name| !test.has_column(name))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(LoanError::SchemaMismatch(format!(
                "test data is missing columns {:?}",
                missing
            )));
        }
        for extra in test
            .column_names()
            .iter()
            .filter(|name| !train.has_column(name))
        {
            log::warn!("Ignoring column '{}' present only in the test data", extra);
        }

        let mut columns = Vec::with_capacity(train.ncols());
        for name in train.column_names() {
            let mut col = Vec::with_capacity(train.nrows() + test.nrows());
            col.extend_from_slice(train.column(name).unwrap_or_default());
            col.extend_from_slice(test.column(name).unwrap_or_default());
            columns.push(col);
        }
        let mut split = vec![Split::Train; train.nrows()];
        split.extend(std::iter::repeat(Split::Test).take(test.nrows()));

        Ok(Self {
            table: Table::new(train.column_names().to_vec(), columns)?,
            split,
        })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn split(&self) -> &[Split] {
        &self.split
    }

    /// Row indices belonging to `which`, in original order.
    pub fn rows(&self, which: Split) -> Vec<usize> {
        self.split
            .iter()
            .enumerate()
            .filter_map(|(i, s)| if *s == which { Some(i) } else { None })
            .collect()
    }
}

/// A feature matrix with its binary labels.
#[derive(Debug, Clone)]
pub struct LabeledMatrix {
    pub feature_names: Vec<String>,
    pub x: Array2<f64>,
    pub y: Array1<usize>,
    /// Identifier column values, when the table had one.
    pub ids: Option<Vec<String>>,
}

impl LabeledMatrix {
    pub fn nrows(&self) -> usize {
        self.x.nrows()
    }

    pub fn positives(&self) -> usize {
        self.y.iter().filter(|&&v| v == 1).count()
    }

    pub fn log_summary(&self, title: &str) {
        println!("----- {} Summary -----", title);
        println!(
            "Info: {} defaulted and {} repaid loans",
            self.positives(),
            self.nrows() - self.positives()
        );
        println!("Info: {} feature columns", self.x.ncols());
        println!("-------------------------------");
    }
}

/// Fail unless both feature lists are identical, including order.
pub fn ensure_same_schema(expected: &[String], actual: &[String]) -> Result<()> {
    if expected == actual {
        return Ok(());
    }
    let missing: Vec<&String> = expected.iter().filter(|n| !actual.contains(n)).collect();
    let extra: Vec<&String> = actual.iter().filter(|n| !expected.contains(n)).collect();
    Err(LoanError::SchemaMismatch(if missing.is_empty() && extra.is_empty() {
        "feature columns are in a different order".to_string()
    } else {
        format!("missing features {:?}, unexpected features {:?}", missing, extra)
    }))
}

/// Map a raw `loan_status` cell to 0/1.
pub fn parse_label(value: &Value) -> Result<usize> {
    match value {
        Value::Numeric(v) if *v == 0.0 => Ok(0),
        Value::Numeric(v) if *v == 1.0 => Ok(1),
        Value::Text(s) => match s.to_lowercase().as_str() {
            "true" | "yes" => Ok(1),
            "false" | "no" => Ok(0),
            _ => Err(LoanError::InvalidLabel(format!("'{}' is not a binary label", s))),
        },
        other => Err(LoanError::InvalidLabel(format!(
            "'{}' is not a binary label",
            other
        ))),
    }
}
