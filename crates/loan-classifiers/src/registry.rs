//! Fitted models keyed by kind, with their evaluation records.
use std::collections::BTreeMap;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::config::ModelKind;
use crate::error::{LoanError, Result};
use crate::model_selection::CrossValidationSummary;
use crate::models::classifier_trait::ClassifierModel;
use crate::models::Model;
use crate::stats::{ClassificationReport, ConfusionMatrix};

/// Held-out metrics of one model.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Performance {
    pub accuracy: f64,
    pub roc_auc: f64,
    pub average_precision: f64,
    pub classification_report: ClassificationReport,
    pub confusion_matrix: ConfusionMatrix,
    /// Training-time cross-validation, pipeline models only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_validation: Option<CrossValidationSummary>,
}

#[derive(Debug, Clone)]
struct Entry {
    model: Model,
    performance: Option<Performance>,
    cross_validation: Option<CrossValidationSummary>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    entries: BTreeMap<ModelKind, Entry>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `model` under its kind. Replacing an existing model drops the
    /// old model's performance record.
    pub fn insert(&mut self, model: Model) -> ModelKind {
        self.insert_with_cv(model, None)
    }

    pub fn insert_with_cv(&mut self, model: Model, cv: Option<CrossValidationSummary>) -> ModelKind {
        let kind = model.kind();
        let previous = self.entries.insert(
            kind,
            Entry {
                model,
                performance: None,
                cross_validation: cv,
            },
        );
        if previous.is_some() {
            log::info!("Replaced previously trained {} model", kind);
        }
        kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, kind: ModelKind) -> bool {
        self.entries.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<ModelKind> {
        self.entries.keys().copied().collect()
    }

    pub fn get(&self, kind: ModelKind) -> Option<&Model> {
        self.entries.get(&kind).map(|e| &e.model)
    }

    pub fn models(&self) -> impl Iterator<Item = (ModelKind, &Model)> {
        self.entries.iter().map(|(k, e)| (*k, &e.model))
    }

    pub fn performance(&self, kind: ModelKind) -> Option<&Performance> {
        self.entries.get(&kind).and_then(|e| e.performance.as_ref())
    }

    pub fn performances(&self) -> impl Iterator<Item = (ModelKind, &Performance)> {
        self.entries
            .iter()
            .filter_map(|(k, e)| e.performance.as_ref().map(|p| (*k, p)))
    }

    pub fn cross_validation(&self, kind: ModelKind) -> Option<&CrossValidationSummary> {
        self.entries.get(&kind).and_then(|e| e.cross_validation.as_ref())
    }

    /// Attach (or overwrite) the performance record of a registered model.
    pub fn set_performance(&mut self, kind: ModelKind, mut performance: Performance) -> Result<()> {
        let entry = self.entries.get_mut(&kind).ok_or_else(|| {
            LoanError::InvalidState(format!("no {} model has been trained", kind))
        })?;
        if performance.cross_validation.is_none() {
            performance.cross_validation = entry.cross_validation.clone();
        }
        entry.performance = Some(performance);
        Ok(())
    }

    /// Model with the highest recorded ROC-AUC; ties go to the first kind.
    pub fn best_by_roc_auc(&self) -> Option<ModelKind> {
        let mut best: Option<(ModelKind, f64)> = None;
        for (kind, perf) in self.performances() {
            match best {
                Some((_, auc)) if perf.roc_auc <= auc => {}
                _ => best = Some((kind, perf.roc_auc)),
            }
        }
        best.map(|(kind, _)| kind)
    }

    /// Resolve which model serves a prediction.
    ///
    /// A registered `key` wins. Otherwise a lone model is used, and with
    /// several models the best by ROC-AUC. An unknown key with several
    /// models is logged and falls back to the best.
    pub fn select(&self, key: Option<&str>) -> Result<(ModelKind, &Model)> {
        if self.entries.is_empty() {
            return Err(LoanError::InvalidState(
                "no models have been trained".to_string(),
            ));
        }
        if let Some(key) = key {
            match key.parse::<ModelKind>() {
                Ok(kind) if self.contains(kind) => return Ok((kind, &self.entries[&kind].model)),
                _ if self.entries.len() > 1 => {
                    log::warn!("Model '{}' is not registered, using the best model instead", key);
                }
                _ => {}
            }
        }
        if self.entries.len() == 1 {
            if let Some((kind, entry)) = self.entries.iter().next() {
                return Ok((*kind, &entry.model));
            }
        }
        let kind = self.best_by_roc_auc().ok_or_else(|| {
            LoanError::InvalidState(
                "several models are registered but none has been evaluated; run evaluate first"
                    .to_string(),
            )
        })?;
        Ok((kind, &self.entries[&kind].model))
    }

    pub fn predict(&self, x: &Array2<f64>, key: Option<&str>) -> Result<Array1<usize>> {
        let (kind, model) = self.select(key)?;
        log::debug!("Predicting {} rows with {}", x.nrows(), kind);
        model.predict(x)
    }

    pub fn predict_proba(&self, x: &Array2<f64>, key: Option<&str>) -> Result<Array1<f64>> {
        let (_, model) = self.select(key)?;
        model.predict_proba(x)
    }
}
