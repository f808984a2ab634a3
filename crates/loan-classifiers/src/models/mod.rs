//! Classifier wrappers and the serialisable `Model` enum stored in the
//! registry.
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::config::{ClassifierKind, ModelKind};
use crate::error::Result;

pub mod classifier_trait;
pub mod factory;
pub mod logistic;
pub mod pipeline;
pub mod random_forest;

use classifier_trait::ClassifierModel;
use logistic::LogisticClassifier;
use pipeline::PipelineClassifier;
use random_forest::RandomForestClassifier;

/// Any fitted (or fit-ready) model the workflow can hold.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub enum Model {
    LogisticRegression(LogisticClassifier),
    RandomForest(RandomForestClassifier),
    Pipeline(PipelineClassifier),
}

impl Model {
    pub fn kind(&self) -> ModelKind {
        match self {
            Model::LogisticRegression(_) => ModelKind::Plain(ClassifierKind::LogisticRegression),
            Model::RandomForest(_) => ModelKind::Plain(ClassifierKind::RandomForest),
            Model::Pipeline(p) => ModelKind::Pipeline(p.classifier().kind().classifier()),
        }
    }

    fn inner(&self) -> &dyn ClassifierModel {
        match self {
            Model::LogisticRegression(m) => m,
            Model::RandomForest(m) => m,
            Model::Pipeline(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn ClassifierModel {
        match self {
            Model::LogisticRegression(m) => m,
            Model::RandomForest(m) => m,
            Model::Pipeline(m) => m,
        }
    }
}

impl ClassifierModel for Model {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        self.inner_mut().fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        self.inner().predict(x)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner().predict_proba(x)
    }

    fn name(&self) -> &str {
        self.inner().name()
    }

    fn n_features(&self) -> Option<usize> {
        self.inner().n_features()
    }
}
