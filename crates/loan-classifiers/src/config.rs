use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{LoanError, Result};

/// The classifier families the workflow can train.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    LogisticRegression,
    RandomForest,
}

impl ClassifierKind {
    pub fn key(&self) -> &'static str {
        match self {
            ClassifierKind::LogisticRegression => "logistic_regression",
            ClassifierKind::RandomForest => "random_forest",
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Lowercase and strip separators so `LogisticRegression`,
/// `logistic_regression` and `logistic-regression` compare equal.
fn normalize_tag(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

impl FromStr for ClassifierKind {
    type Err = LoanError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize_tag(s).as_str() {
            "logisticregression" => Ok(ClassifierKind::LogisticRegression),
            "randomforest" => Ok(ClassifierKind::RandomForest),
            _ => Err(LoanError::InvalidArgument(format!(
                "Unsupported model type: {}. Valid options are: LogisticRegression, RandomForest",
                s
            ))),
        }
    }
}

/// Registry key for a trained model.
///
/// Keys are stable snake_case strings and double as artifact file stems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelKind {
    /// A classifier fit directly on the preprocessed matrix.
    Plain(ClassifierKind),
    /// Numeric transformer + feature selection + classifier.
    Pipeline(ClassifierKind),
}

impl ModelKind {
    pub fn key(&self) -> &'static str {
        match self {
            ModelKind::Plain(ClassifierKind::LogisticRegression) => "logistic_regression",
            ModelKind::Plain(ClassifierKind::RandomForest) => "random_forest",
            ModelKind::Pipeline(ClassifierKind::LogisticRegression) => {
                "pipeline_logistic_regression"
            }
            ModelKind::Pipeline(ClassifierKind::RandomForest) => "pipeline_random_forest",
        }
    }

    pub fn classifier(&self) -> ClassifierKind {
        match self {
            ModelKind::Plain(c) | ModelKind::Pipeline(c) => *c,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ModelKind {
    type Err = LoanError;

    fn from_str(s: &str) -> Result<Self> {
        let tag = normalize_tag(s);
        // `advanced_ensemble` was the key of the scaled logistic pipeline.
        if tag == "advancedensemble" {
            return Ok(ModelKind::Pipeline(ClassifierKind::LogisticRegression));
        }
        if let Some(rest) = tag.strip_prefix("pipeline") {
            return rest.parse().map(ModelKind::Pipeline);
        }
        tag.parse().map(ModelKind::Plain)
    }
}

impl TryFrom<String> for ModelKind {
    type Error = LoanError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ModelKind> for String {
    fn from(kind: ModelKind) -> Self {
        kind.key().to_string()
    }
}

/// How many features each random-forest tree sees.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    All,
    Sqrt,
    Log2,
    Count(usize),
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = match self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().floor() as usize,
            MaxFeatures::Count(k) => *k,
        };
        n.clamp(1, n_features.max(1))
    }
}

/// Supported model types and their hyper-parameters.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub enum ModelType {
    LogisticRegression {
        /// Inverse L2 regularisation strength.
        c: f64,
        max_iterations: u64,
    },
    RandomForest {
        n_estimators: usize,
        max_depth: Option<usize>,
        max_features: MaxFeatures,
    },
}

impl Default for ModelType {
    fn default() -> Self {
        ModelType::LogisticRegression {
            c: 1.0,
            max_iterations: 500,
        }
    }
}

impl ModelType {
    pub fn defaults_for(kind: ClassifierKind) -> Self {
        match kind {
            ClassifierKind::LogisticRegression => ModelType::default(),
            ClassifierKind::RandomForest => ModelType::RandomForest {
                n_estimators: 100,
                max_depth: None,
                max_features: MaxFeatures::Sqrt,
            },
        }
    }

    pub fn kind(&self) -> ClassifierKind {
        match self {
            ModelType::LogisticRegression { .. } => ClassifierKind::LogisticRegression,
            ModelType::RandomForest { .. } => ClassifierKind::RandomForest,
        }
    }
}

impl FromStr for ModelType {
    type Err = LoanError;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<ClassifierKind>().map(ModelType::defaults_for)
    }
}

/// Central configuration for a single model.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub random_state: u64,

    #[serde(flatten)]
    pub model_type: ModelType,
}

impl ModelConfig {
    pub fn new(random_state: u64, model_type: ModelType) -> Self {
        Self {
            random_state,
            model_type,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            random_state: 42,
            model_type: ModelType::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessStrategy {
    /// Mean imputation, one-hot encoding, datetimes as epoch nanoseconds.
    Baseline,
    /// Label encoding and date-part features; numeric columns left raw for
    /// the numeric pipeline.
    Enhanced,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PreprocessConfig {
    pub label_column: String,
    pub id_column: Option<String>,
    pub strategy: PreprocessStrategy,
    /// Drop the first (sorted) category of every one-hot encoded column.
    pub drop_first: bool,
    pub unknown_token: String,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            label_column: "loan_status".to_string(),
            id_column: Some("customer_id".to_string()),
            strategy: PreprocessStrategy::Baseline,
            drop_first: true,
            unknown_token: "Unknown".to_string(),
        }
    }
}

/// Parameters for running the whole workflow.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    pub output_dir: PathBuf,
    pub preprocessing: PreprocessConfig,
    pub random_state: u64,
    pub cv_folds: usize,
    pub logistic_regression: ModelType,
    pub random_forest: ModelType,
    /// Classifier at the end of the numeric pipeline.
    pub pipeline_classifier: ModelType,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            train_path: PathBuf::from("train_data.csv"),
            test_path: PathBuf::from("test_data.csv"),
            output_dir: PathBuf::from("models"),
            preprocessing: PreprocessConfig::default(),
            random_state: 42,
            cv_folds: 5,
            logistic_regression: ModelType::defaults_for(ClassifierKind::LogisticRegression),
            random_forest: ModelType::defaults_for(ClassifierKind::RandomForest),
            pipeline_classifier: ModelType::LogisticRegression {
                c: 1.0,
                max_iterations: 1000,
            },
        }
    }
}

impl PipelineConfig {
    /// Configuration for a plain classifier of the given kind.
    pub fn model_config(&self, kind: ClassifierKind) -> Result<ModelConfig> {
        let model_type = match kind {
            ClassifierKind::LogisticRegression => &self.logistic_regression,
            ClassifierKind::RandomForest => &self.random_forest,
        };
        if model_type.kind() != kind {
            return Err(LoanError::InvalidArgument(format!(
                "config entry for {} holds {} parameters",
                kind,
                model_type.kind()
            )));
        }
        Ok(ModelConfig::new(self.random_state, model_type.clone()))
    }

    pub fn pipeline_config(&self) -> ModelConfig {
        ModelConfig::new(self.random_state, self.pipeline_classifier.clone())
    }
}

/// Load a workflow configuration from a JSON file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| LoanError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| LoanError::parse(path, e.to_string()))
}
