//! Fitting classifiers into the registry.
use crate::config::{ClassifierKind, ModelKind, PipelineConfig};
use crate::data_handling::LabeledMatrix;
use crate::error::{LoanError, Result};
use crate::model_selection::{
    cross_val_score, grid_search, CrossValidationSummary, ParamGrid, Scoring, StratifiedKFold,
};
use crate::models::classifier_trait::ClassifierModel;
use crate::models::factory::{build_model, build_pipeline};
use crate::registry::ModelRegistry;

/// Fit a plain classifier and store it under its kind.
///
/// `model_type` is a classifier tag such as `LogisticRegression` or
/// `random_forest`. With a non-empty `grid` the parameters are chosen by
/// stratified k-fold grid search on accuracy and the winner is refit on the
/// whole training set. The registry is only touched once fitting succeeded.
pub fn train(
    registry: &mut ModelRegistry,
    train: &LabeledMatrix,
    model_type: &str,
    grid: Option<&ParamGrid>,
    config: &PipelineConfig,
) -> Result<ModelKind> {
    let kind: ClassifierKind = model_type.parse()?;
    let base = config.model_config(kind)?;

    let params = match grid {
        Some(grid) if !grid.is_empty() => {
            let cv = StratifiedKFold::new(config.cv_folds);
            let result = grid_search(&base, grid, &train.x, &train.y, &cv, Scoring::Accuracy)?;
            let best = result.best();
            println!("Best parameters: {:?}", best.params);
            println!("Best cross-validation accuracy: {:.4}", best.summary.mean);
            log::info!(
                "Grid search over {} candidates selected {:?}",
                result.candidates.len(),
                best.params
            );
            result.best_config
        }
        _ => base,
    };

    let mut model = build_model(params)?;
    model.fit(&train.x, &train.y)?;
    let key = registry.insert(model);
    println!("{} trained successfully.", model_type);
    log::info!("Trained {} on {} samples", key, train.nrows());
    Ok(key)
}

/// Cross-validate and fit the numeric pipeline, then store it under its
/// pipeline kind.
///
/// The cross-validation folds are stratified and shuffled with the
/// configured seed and scored by ROC-AUC. The scores are reported and kept
/// with the model; they do not affect which model serves predictions.
pub fn train_pipeline(
    registry: &mut ModelRegistry,
    train: &LabeledMatrix,
    numeric_features: &[usize],
    config: &PipelineConfig,
) -> Result<(ModelKind, CrossValidationSummary)> {
    if let Some(&bad) = numeric_features.iter().find(|&&c| c >= train.x.ncols()) {
        return Err(LoanError::InvalidArgument(format!(
            "numeric feature index {} out of range for {} features",
            bad,
            train.x.ncols()
        )));
    }
    let params = config.pipeline_config();
    let cv = StratifiedKFold::shuffled(config.cv_folds, config.random_state);

    let summary = cross_val_score(
        || build_pipeline(params.clone(), numeric_features),
        &train.x,
        &train.y,
        &cv,
        Scoring::RocAuc,
    )?;
    println!("Cross-Validation ROC-AUC Scores: {:?}", summary.scores);
    println!("Mean CV Score: {}", summary);

    let mut model = build_pipeline(params, numeric_features)?;
    model.fit(&train.x, &train.y)?;
    let key = registry.insert_with_cv(model, Some(summary.clone()));
    log::info!("Trained {} on {} samples", key, train.nrows());
    Ok((key, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn data() -> LabeledMatrix {
        let n = 40;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            let sign = if i % 2 == 0 { -1.0 } else { 1.0 };
            if j == 0 {
                sign * (1.0 + (i % 7) as f64)
            } else {
                (i % 5) as f64
            }
        });
        LabeledMatrix {
            feature_names: vec!["a".into(), "b".into()],
            x,
            y: Array1::from_shape_fn(n, |i| i % 2),
            ids: None,
        }
    }

    #[test]
    fn unsupported_tag_leaves_registry_unchanged() {
        let mut registry = ModelRegistry::new();
        let err = train(&mut registry, &data(), "SVM", None, &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, LoanError::InvalidArgument(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn bad_grid_leaves_registry_unchanged() {
        let mut registry = ModelRegistry::new();
        let grid = ParamGrid::new().with("n_estimators", [10i64]);
        let err = train(
            &mut registry,
            &data(),
            "LogisticRegression",
            Some(&grid),
            &PipelineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, LoanError::InvalidArgument(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn grid_search_result_is_registered() {
        let mut registry = ModelRegistry::new();
        let grid = ParamGrid::new()
            .with("n_estimators", [5i64, 10])
            .with("max_depth", [Some(2i64), None]);
        let key = train(
            &mut registry,
            &data(),
            "RandomForest",
            Some(&grid),
            &PipelineConfig::default(),
        )
        .unwrap();
        assert_eq!(key, ModelKind::Plain(ClassifierKind::RandomForest));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn pipeline_records_cross_validation() {
        let mut registry = ModelRegistry::new();
        let (key, summary) =
            train_pipeline(&mut registry, &data(), &[0, 1], &PipelineConfig::default()).unwrap();
        assert_eq!(key, ModelKind::Pipeline(ClassifierKind::LogisticRegression));
        assert_eq!(summary.scores.len(), 5);
        assert!(summary.scores.iter().all(|s| (0.0..=1.0).contains(s)));
        assert_eq!(registry.cross_validation(key), Some(&summary));
    }
}
