use crate::config::{ModelConfig, ModelType};
use crate::error::Result;
use crate::feature_selection::SelectK;
use crate::models::logistic::LogisticClassifier;
use crate::models::pipeline::PipelineClassifier;
use crate::models::random_forest::RandomForestClassifier;
use crate::models::Model;

/// Build an unfitted classifier from a `ModelConfig`.
pub fn build_model(params: ModelConfig) -> Result<Model> {
    match params.model_type {
        ModelType::LogisticRegression { .. } => {
            Ok(Model::LogisticRegression(LogisticClassifier::new(&params)?))
        }
        ModelType::RandomForest { .. } => {
            Ok(Model::RandomForest(RandomForestClassifier::new(&params)?))
        }
    }
}

/// Build an unfitted pipeline that transforms `numeric_columns`, keeps every
/// feature through `SelectKBest` and ends in the configured classifier.
pub fn build_pipeline(params: ModelConfig, numeric_columns: &[usize]) -> Result<Model> {
    let classifier = build_model(params)?;
    Ok(Model::Pipeline(PipelineClassifier::new(
        numeric_columns.to_vec(),
        SelectK::All,
        classifier,
    )?))
}
