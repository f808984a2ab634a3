//! Stateful driver tying the stages together.
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};

use crate::config::{ModelKind, PipelineConfig};
use crate::data_handling::Table;
use crate::error::{LoanError, Result};
use crate::evaluation::evaluate_registry;
use crate::io::model_store;
use crate::io::table_reader::load_datasets;
use crate::model_selection::{CrossValidationSummary, ParamGrid};
use crate::preprocessing::{preprocess, FittedPreprocessor, PreparedData};
use crate::registry::{ModelRegistry, Performance};
use crate::training;

fn not_preprocessed() -> LoanError {
    LoanError::InvalidState("data has not been preprocessed; call preprocess first".to_string())
}

/// Load → preprocess → train → evaluate → save, with predictions served
/// from the trained registry.
///
/// Reloading data invalidates the prepared matrices but keeps the trained
/// models and the preprocessor they were trained behind.
#[derive(Debug, Default)]
pub struct LoanDefaultWorkflow {
    config: PipelineConfig,
    tables: Option<(Table, Table)>,
    data: Option<PreparedData>,
    preprocessor: Option<FittedPreprocessor>,
    registry: ModelRegistry,
}

impl LoanDefaultWorkflow {
    pub fn new(config: PipelineConfig) -> Self {
        LoanDefaultWorkflow {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn prepared(&self) -> Option<&PreparedData> {
        self.data.as_ref()
    }

    /// Preprocessor from the last `preprocess` or `load_models`.
    pub fn preprocessor(&self) -> Option<&FittedPreprocessor> {
        self.preprocessor.as_ref()
    }

    /// Read the train and test files.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(&mut self, train_path: P, test_path: Q) -> Result<()> {
        let (train, test) = load_datasets(train_path, test_path)?;
        println!("Datasets loaded successfully.");
        train.log_summary("Train");
        test.log_summary("Test");
        self.tables = Some((train, test));
        self.data = None;
        Ok(())
    }

    /// Read the files named in the configuration.
    pub fn load_configured(&mut self) -> Result<()> {
        let (train, test) = (self.config.train_path.clone(), self.config.test_path.clone());
        self.load(train, test)
    }

    pub fn preprocess(&mut self) -> Result<&PreparedData> {
        let (train, test) = self.tables.as_ref().ok_or_else(|| {
            LoanError::InvalidState("no data loaded; call load first".to_string())
        })?;
        let data = preprocess(train, test, &self.config.preprocessing)?;
        println!("Preprocessing completed.");
        data.train.log_summary("Train");
        self.preprocessor = Some(data.preprocessor.clone());
        Ok(self.data.insert(data))
    }

    /// Train a plain classifier, optionally via grid search.
    pub fn train(&mut self, model_type: &str, grid: Option<&ParamGrid>) -> Result<ModelKind> {
        let data = self.data.as_ref().ok_or_else(not_preprocessed)?;
        training::train(&mut self.registry, &data.train, model_type, grid, &self.config)
    }

    /// Cross-validate and train the numeric pipeline.
    pub fn train_pipeline(&mut self) -> Result<CrossValidationSummary> {
        let data = self.data.as_ref().ok_or_else(not_preprocessed)?;
        let (_, summary) = training::train_pipeline(
            &mut self.registry,
            &data.train,
            data.numeric_features(),
            &self.config,
        )?;
        Ok(summary)
    }

    /// Evaluate every trained model on the test partition.
    pub fn evaluate(&mut self) -> Result<Vec<(ModelKind, Performance)>> {
        let data = self.data.as_ref().ok_or_else(not_preprocessed)?;
        if self.registry.is_empty() {
            return Err(LoanError::InvalidState("no models have been trained".to_string()));
        }
        evaluate_registry(&mut self.registry, &data.test)
    }

    /// Persist all models, and the preprocessor when there is one, into the
    /// configured output directory.
    pub fn save_models(&self) -> Result<Vec<PathBuf>> {
        let mut written = model_store::save_models(&self.registry, &self.config.output_dir)?;
        if let Some(preprocessor) = &self.preprocessor {
            written.push(model_store::save_preprocessor(preprocessor, &self.config.output_dir)?);
        }
        Ok(written)
    }

    /// Replace the registry and preprocessor with the artifacts stored in
    /// `dir`.
    pub fn load_models<P: AsRef<Path>>(&mut self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        let registry = model_store::load_registry(dir)?;
        let path = model_store::preprocessor_path(dir);
        self.preprocessor = if path.exists() {
            Some(model_store::load_preprocessor(&path)?)
        } else {
            log::warn!("No preprocessor in {}; raw tables cannot be scored", dir.display());
            None
        };
        self.registry = registry;
        Ok(())
    }

    /// Predict labels for an already encoded feature matrix.
    pub fn predict(&self, x: &Array2<f64>, key: Option<&str>) -> Result<Array1<usize>> {
        self.registry.predict(x, key)
    }

    pub fn predict_proba(&self, x: &Array2<f64>, key: Option<&str>) -> Result<Array1<f64>> {
        self.registry.predict_proba(x, key)
    }

    /// Encode a raw table with the fitted preprocessor, then predict.
    pub fn predict_table(&self, table: &Table, key: Option<&str>) -> Result<Array1<usize>> {
        let x = self
            .preprocessor
            .as_ref()
            .ok_or_else(not_preprocessed)?
            .transform(table)?;
        self.predict(&x, key)
    }
}
