//! Table → feature matrix conversion.
//!
//! `FittedPreprocessor::fit` learns one plan per feature column from the
//! training partition only (means, category sets, label encoders); the same
//! plans are then applied to the test partition and to any later table
//! passed for prediction.
use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDateTime};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::config::{PreprocessConfig, PreprocessStrategy};
use crate::data_handling::{
    ensure_same_schema, parse_label, ColumnKind, LabeledMatrix, Split, Table, TaggedTable, Value,
};
use crate::error::{LoanError, Result};
use crate::preprocessing::encoding::{LabelEncoder, OneHotEncoder};
use crate::preprocessing::numeric::mean;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
enum ColumnPlan {
    /// Numeric column, missing cells filled with the training mean.
    Numeric { column: String, fill: f64 },
    /// Numeric column left raw (`NaN` for missing) for the numeric pipeline.
    RawNumeric { column: String },
    OneHot { column: String, encoder: OneHotEncoder },
    Label { column: String, encoder: LabelEncoder },
    /// Datetime as nanoseconds since the Unix epoch.
    EpochNanos { column: String, fill: f64 },
    /// Datetime split into `_year`, `_month` and `_day`.
    DateParts { column: String },
}

impl ColumnPlan {
    fn column(&self) -> &str {
        match self {
            ColumnPlan::Numeric { column, .. }
            | ColumnPlan::RawNumeric { column }
            | ColumnPlan::OneHot { column, .. }
            | ColumnPlan::Label { column, .. }
            | ColumnPlan::EpochNanos { column, .. }
            | ColumnPlan::DateParts { column } => column,
        }
    }

    fn feature_names(&self) -> Vec<String> {
        match self {
            ColumnPlan::OneHot { encoder, .. } => encoder.feature_names(),
            ColumnPlan::DateParts { column } => ["year", "month", "day"]
                .iter()
                .map(|part| format!("{}_{}", column, part))
                .collect(),
            other => vec![other.column().to_string()],
        }
    }

    /// Whether the numeric pipeline should transform these outputs.
    fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnPlan::Numeric { .. }
                | ColumnPlan::RawNumeric { .. }
                | ColumnPlan::EpochNanos { .. }
                | ColumnPlan::DateParts { .. }
        )
    }
}

fn epoch_nanos(dt: &NaiveDateTime) -> f64 {
    let utc = dt.and_utc();
    utc.timestamp() as f64 * 1e9 + utc.timestamp_subsec_nanos() as f64
}

fn category_of(value: &Value, unknown: &str) -> String {
    match value {
        Value::Missing => unknown.to_string(),
        other => other.to_string(),
    }
}

fn type_error(column: &str, expected: &str, found: &Value) -> LoanError {
    LoanError::SchemaMismatch(format!(
        "column '{}' expected {} values, found '{}'",
        column, expected, found
    ))
}

/// Per-column plans learned from the training rows.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FittedPreprocessor {
    strategy: PreprocessStrategy,
    label_column: String,
    id_column: Option<String>,
    unknown_token: String,
    plans: Vec<ColumnPlan>,
    feature_names: Vec<String>,
    numeric_features: Vec<usize>,
}

impl FittedPreprocessor {
    /// Learn column plans from `train`. Label and identifier columns are
    /// excluded from the features.
    pub fn fit(train: &Table, config: &PreprocessConfig) -> Result<Self> {
        let mut plans = Vec::new();
        for name in train.column_names() {
            if *name == config.label_column || config.id_column.as_deref() == Some(name.as_str()) {
                continue;
            }
            let values = train.column(name).unwrap_or_default();
            let kind = ColumnKind::infer(values);
            let plan = match (config.strategy, kind) {
                (PreprocessStrategy::Baseline, ColumnKind::Numeric) => {
                    let observed: Vec<f64> = values
                        .iter()
                        .filter_map(Value::as_f64)
                        .filter(|v| !v.is_nan())
                        .collect();
                    ColumnPlan::Numeric {
                        column: name.clone(),
                        fill: mean(&observed).unwrap_or(0.0),
                    }
                }
                (PreprocessStrategy::Enhanced, ColumnKind::Numeric) => ColumnPlan::RawNumeric {
                    column: name.clone(),
                },
                (PreprocessStrategy::Baseline, ColumnKind::Categorical) => {
                    let cats: Vec<String> = values
                        .iter()
                        .map(|v| category_of(v, &config.unknown_token))
                        .collect();
                    ColumnPlan::OneHot {
                        column: name.clone(),
                        encoder: OneHotEncoder::fit(
                            name,
                            cats.iter().map(String::as_str),
                            config.drop_first,
                        ),
                    }
                }
                (PreprocessStrategy::Enhanced, ColumnKind::Categorical) => {
                    let cats: Vec<String> = values
                        .iter()
                        .map(|v| category_of(v, &config.unknown_token))
                        .collect();
                    ColumnPlan::Label {
                        column: name.clone(),
                        encoder: LabelEncoder::fit(cats.iter().map(String::as_str)),
                    }
                }
                (PreprocessStrategy::Baseline, ColumnKind::DateTime) => {
                    let observed: Vec<f64> = values
                        .iter()
                        .filter_map(|v| match v {
                            Value::DateTime(dt) => Some(epoch_nanos(dt)),
                            _ => None,
                        })
                        .collect();
                    ColumnPlan::EpochNanos {
                        column: name.clone(),
                        fill: mean(&observed).unwrap_or(0.0),
                    }
                }
                (PreprocessStrategy::Enhanced, ColumnKind::DateTime) => ColumnPlan::DateParts {
                    column: name.clone(),
                },
            };
            log::trace!("Column '{}' ({:?}) -> {:?}", name, kind, plan);
            plans.push(plan);
        }

        let mut feature_names = Vec::new();
        let mut numeric_features = Vec::new();
        for plan in &plans {
            for feature in plan.feature_names() {
                if plan.is_numeric() {
                    numeric_features.push(feature_names.len());
                }
                feature_names.push(feature);
            }
        }
        if feature_names.is_empty() {
            return Err(LoanError::Schema(
                "no feature columns remain after removing label and identifier".to_string(),
            ));
        }

        Ok(Self {
            strategy: config.strategy,
            label_column: config.label_column.clone(),
            id_column: config.id_column.clone(),
            unknown_token: config.unknown_token.clone(),
            plans,
            feature_names,
            numeric_features,
        })
    }

    pub fn strategy(&self) -> PreprocessStrategy {
        self.strategy
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Indices of the features the numeric pipeline transforms.
    pub fn numeric_features(&self) -> &[usize] {
        &self.numeric_features
    }

    /// Fitted label encoders by column (enhanced strategy only).
    pub fn label_encoders(&self) -> BTreeMap<&str, &LabelEncoder> {
        self.plans
            .iter()
            .filter_map(|plan| match plan {
                ColumnPlan::Label { column, encoder } => Some((column.as_str(), encoder)),
                _ => None,
            })
            .collect()
    }

    /// Build the feature matrix for every row of `table`.
    pub fn transform(&self, table: &Table) -> Result<Array2<f64>> {
        let nrows = table.nrows();
        let ncols = self.feature_names.len();
        let mut x = Array2::<f64>::zeros((nrows, ncols));
        let mut offset = 0;

        for plan in &self.plans {
            let name = plan.column();
            let values = table.column(name).ok_or_else(|| {
                LoanError::SchemaMismatch(format!("missing feature column '{}'", name))
            })?;
            let width = plan.feature_names().len();

            match plan {
                ColumnPlan::Numeric { fill, .. } => {
                    for (r, v) in values.iter().enumerate() {
                        x[(r, offset)] = match v {
                            Value::Numeric(n) if !n.is_nan() => *n,
                            Value::Numeric(_) | Value::Missing => *fill,
                            other => return Err(type_error(name, "numeric", other)),
                        };
                    }
                }
                ColumnPlan::RawNumeric { .. } => {
                    for (r, v) in values.iter().enumerate() {
                        x[(r, offset)] = match v {
                            Value::Numeric(n) => *n,
                            Value::Missing => f64::NAN,
                            other => return Err(type_error(name, "numeric", other)),
                        };
                    }
                }
                ColumnPlan::OneHot { encoder, .. } => {
                    for (r, v) in values.iter().enumerate() {
                        let row = encoder.encode(&category_of(v, &self.unknown_token));
                        for (j, bit) in row.into_iter().enumerate() {
                            x[(r, offset + j)] = bit;
                        }
                    }
                }
                ColumnPlan::Label { encoder, .. } => {
                    let mut unseen = 0usize;
                    for (r, v) in values.iter().enumerate() {
                        let code = encoder
                            .transform(&category_of(v, &self.unknown_token))
                            .unwrap_or_else(|| {
                                unseen += 1;
                                encoder.unknown_code()
                            });
                        x[(r, offset)] = code as f64;
                    }
                    if unseen > 0 {
                        log::warn!(
                            "Column '{}': {} values with categories unseen during fitting",
                            name,
                            unseen
                        );
                    }
                }
                ColumnPlan::EpochNanos { fill, .. } => {
                    for (r, v) in values.iter().enumerate() {
                        x[(r, offset)] = match v {
                            Value::DateTime(dt) => epoch_nanos(dt),
                            Value::Missing => *fill,
                            other => return Err(type_error(name, "datetime", other)),
                        };
                    }
                }
                ColumnPlan::DateParts { .. } => {
                    for (r, v) in values.iter().enumerate() {
                        let parts = match v {
                            Value::DateTime(dt) => {
                                [dt.year() as f64, dt.month() as f64, dt.day() as f64]
                            }
                            Value::Missing => [f64::NAN; 3],
                            other => return Err(type_error(name, "datetime", other)),
                        };
                        for (j, p) in parts.into_iter().enumerate() {
                            x[(r, offset + j)] = p;
                        }
                    }
                }
            }
            offset += width;
        }

        Ok(x)
    }

    /// Feature matrix plus labels (and identifiers, when present).
    pub fn transform_labeled(&self, table: &Table) -> Result<LabeledMatrix> {
        let labels = table.column(&self.label_column).ok_or_else(|| {
            LoanError::Schema(format!("missing label column '{}'", self.label_column))
        })?;
        let y = labels
            .iter()
            .enumerate()
            .map(|(r, v)| {
                parse_label(v).map_err(|e| match e {
                    LoanError::InvalidLabel(msg) => {
                        LoanError::InvalidLabel(format!("row {}: {}", r + 1, msg))
                    }
                    other => other,
                })
            })
            .collect::<Result<Array1<usize>>>()?;
        let ids = self
            .id_column
            .as_deref()
            .and_then(|id| table.column(id))
            .map(|col| col.iter().map(Value::to_string).collect());

        Ok(LabeledMatrix {
            feature_names: self.feature_names.clone(),
            x: self.transform(table)?,
            y,
            ids,
        })
    }
}

/// Output of the preprocessing stage.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub train: LabeledMatrix,
    pub test: LabeledMatrix,
    pub preprocessor: FittedPreprocessor,
}

impl PreparedData {
    pub fn feature_names(&self) -> &[String] {
        self.preprocessor.feature_names()
    }

    pub fn numeric_features(&self) -> &[usize] {
        self.preprocessor.numeric_features()
    }
}

fn split_rows(all: &LabeledMatrix, rows: &[usize]) -> LabeledMatrix {
    LabeledMatrix {
        feature_names: all.feature_names.clone(),
        x: all.x.select(Axis(0), rows),
        y: all.y.select(Axis(0), rows),
        ids: all
            .ids
            .as_ref()
            .map(|ids| rows.iter().map(|&r| ids[r].clone()).collect()),
    }
}

/// Stack train and test, fit on the train rows, transform both and split
/// back by partition.
pub fn preprocess(train: &Table, test: &Table, config: &PreprocessConfig) -> Result<PreparedData> {
    for (which, table) in [("train", train), ("test", test)] {
        if !table.has_column(&config.label_column) {
            return Err(LoanError::Schema(format!(
                "{} data has no '{}' column",
                which, config.label_column
            )));
        }
    }
    if let Some(id) = &config.id_column {
        if !train.has_column(id) {
            log::debug!("Identifier column '{}' not present", id);
        }
    }

    let stacked = TaggedTable::stack(train, test)?;
    let train_rows = stacked.rows(Split::Train);
    let test_rows = stacked.rows(Split::Test);

    let preprocessor = FittedPreprocessor::fit(&stacked.table().select_rows(&train_rows), config)?;
    let all = preprocessor.transform_labeled(stacked.table())?;

    let train = split_rows(&all, &train_rows);
    let test = split_rows(&all, &test_rows);
    ensure_same_schema(&train.feature_names, &test.feature_names)?;

    log::info!(
        "Preprocessing completed ({:?}): {} features, {} train rows, {} test rows",
        config.strategy,
        preprocessor.feature_names().len(),
        train.nrows(),
        test.nrows()
    );
    Ok(PreparedData {
        train,
        test,
        preprocessor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(names: &[&str], rows: &[&[&str]]) -> Table {
        Table::from_rows(
            names.iter().map(|s| s.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| Value::parse(c)).collect())
                .collect(),
        )
        .unwrap()
    }

    fn baseline() -> PreprocessConfig {
        PreprocessConfig::default()
    }

    fn enhanced() -> PreprocessConfig {
        PreprocessConfig {
            strategy: PreprocessStrategy::Enhanced,
            ..PreprocessConfig::default()
        }
    }

    const COLS: [&str; 5] = ["customer_id", "income", "grade", "opened", "loan_status"];

    #[test]
    fn baseline_one_hot_and_train_mean() {
        let train = table(
            &COLS,
            &[
                &["c1", "10", "A", "2020-01-01", "0"],
                &["c2", "", "B", "", "1"],
                &["c3", "30", "", "2020-01-03", "1"],
            ],
        );
        let test = table(&COLS, &[&["c4", "", "C", "2020-01-02", "0"]]);
        let data = preprocess(&train, &test, &baseline()).unwrap();

        // drop_first removes the first sorted category ("A").
        assert_eq!(
            data.feature_names(),
            &["income", "grade_B", "grade_Unknown", "opened"]
        );
        assert_eq!(data.train.x[(1, 0)], 20.0);
        assert_eq!(data.test.x[(0, 0)], 20.0);
        // unseen test category encodes as all zeros
        assert_eq!(&data.test.x.row(0).to_vec()[1..3], &[0.0, 0.0]);
        assert_eq!(data.train.x[(2, 2)], 1.0);
        assert_eq!(data.train.y.to_vec(), vec![0, 1, 1]);
        assert_eq!(data.test.ids.as_ref().unwrap(), &vec!["c4".to_string()]);
        // missing datetime takes the train mean
        let day = 86_400f64 * 1e9;
        assert_eq!(data.train.x[(1, 3)] - data.train.x[(0, 3)], day);
    }

    #[test]
    fn test_statistics_do_not_leak_into_train() {
        let train = table(&COLS, &[&["c1", "10", "A", "", "0"], &["c2", "", "B", "", "1"]]);
        let test_small = table(&COLS, &[&["c3", "1", "A", "", "0"]]);
        let test_huge = table(&COLS, &[&["c3", "1000000", "Z", "", "0"]]);

        let a = preprocess(&train, &test_small, &baseline()).unwrap();
        let b = preprocess(&train, &test_huge, &baseline()).unwrap();
        assert_eq!(a.train.x, b.train.x);
        assert_eq!(a.feature_names(), b.feature_names());
    }

    #[test]
    fn enhanced_label_encodes_and_splits_dates() {
        let train = table(
            &COLS,
            &[
                &["c1", "10", "B", "2021-06-15", "0"],
                &["c2", "", "A", "", "1"],
            ],
        );
        let test = table(&COLS, &[&["c3", "5", "Q", "2022-02-01", "1"]]);
        let data = preprocess(&train, &test, &enhanced()).unwrap();

        assert_eq!(
            data.feature_names(),
            &["income", "grade", "opened_year", "opened_month", "opened_day"]
        );
        assert_eq!(data.numeric_features(), &[0, 2, 3, 4]);
        assert!(data.train.x[(1, 0)].is_nan());
        assert_eq!(data.train.x.row(0).to_vec(), vec![10.0, 1.0, 2021.0, 6.0, 15.0]);
        // unseen category maps past the last code
        assert_eq!(data.test.x[(0, 1)], 2.0);

        let encoders = data.preprocessor.label_encoders();
        assert_eq!(encoders["grade"].inverse_transform(0), Some("A"));
    }

    #[test]
    fn missing_label_column_is_schema_error() {
        let train = table(&["customer_id", "income"], &[&["c1", "1"]]);
        let test = table(&["customer_id", "income"], &[&["c2", "2"]]);
        assert!(matches!(
            preprocess(&train, &test, &baseline()).unwrap_err(),
            LoanError::Schema(_)
        ));
    }

    #[test]
    fn test_missing_feature_column_is_schema_mismatch() {
        let train = table(&COLS, &[&["c1", "10", "A", "", "0"]]);
        let test = table(&["customer_id", "income", "loan_status"], &[&["c2", "1", "1"]]);
        assert!(matches!(
            preprocess(&train, &test, &baseline()).unwrap_err(),
            LoanError::SchemaMismatch(_)
        ));
    }

    #[test]
    fn text_in_numeric_column_is_schema_mismatch() {
        let pre = FittedPreprocessor::fit(&table(&COLS, &[&["c1", "10", "A", "", "0"]]), &baseline())
            .unwrap();
        let bad = table(&COLS, &[&["c2", "lots", "A", "", "0"]]);
        assert!(matches!(
            pre.transform(&bad).unwrap_err(),
            LoanError::SchemaMismatch(_)
        ));
    }
}
