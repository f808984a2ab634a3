//! Held-out evaluation of registered models.
use crate::config::ModelKind;
use crate::data_handling::LabeledMatrix;
use crate::error::{LoanError, Result};
use crate::models::classifier_trait::ClassifierModel;
use crate::registry::{ModelRegistry, Performance};
use crate::stats::{accuracy, average_precision, roc_auc, ClassificationReport, ConfusionMatrix};

/// Score one model on `test`.
///
/// Fails with `Capability` if the model has no probability output and with
/// `Metric` if `test` holds a single class.
pub fn evaluate_model(model: &dyn ClassifierModel, test: &LabeledMatrix) -> Result<Performance> {
    let y_pred = model.predict(&test.x)?;
    let y_proba = model.predict_proba(&test.x)?;

    let confusion_matrix = ConfusionMatrix::from_predictions(&test.y, &y_pred)?;
    Ok(Performance {
        accuracy: accuracy(&test.y, &y_pred)?,
        roc_auc: roc_auc(&test.y, &y_proba)?,
        average_precision: average_precision(&test.y, &y_proba)?,
        classification_report: ClassificationReport::from_predictions(&test.y, &y_pred)?,
        confusion_matrix,
        cross_validation: None,
    })
}

/// Evaluate every registered model, store its record and print a summary.
///
/// The returned records are the stored ones, including any training-time
/// cross-validation summary.
pub fn evaluate_registry(
    registry: &mut ModelRegistry,
    test: &LabeledMatrix,
) -> Result<Vec<(ModelKind, Performance)>> {
    let evaluated = registry
        .models()
        .map(|(kind, model)| evaluate_model(model, test).map(|p| (kind, p)))
        .collect::<Result<Vec<_>>>()?;

    let mut results = Vec::with_capacity(evaluated.len());
    for (kind, performance) in evaluated {
        log::info!(
            "{}: accuracy {:.4}, ROC-AUC {:.4}",
            kind,
            performance.accuracy,
            performance.roc_auc
        );
        registry.set_performance(kind, performance)?;
        let stored = registry.performance(kind).cloned().ok_or_else(|| {
            LoanError::InvalidState(format!("performance of {} was not recorded", kind))
        })?;
        print_performance(kind, &stored);
        results.push((kind, stored));
    }
    Ok(results)
}

pub fn print_performance(kind: ModelKind, performance: &Performance) {
    println!("\n--- {} Model Performance ---", kind);
    println!("Accuracy: {:.4}", performance.accuracy);
    println!("ROC-AUC: {:.4}", performance.roc_auc);
    println!("Average Precision Score: {:.4}", performance.average_precision);
    if let Some(cv) = &performance.cross_validation {
        println!("Cross-Validation ROC-AUC: {}", cv);
    }
    println!("\nConfusion Matrix:\n{}", performance.confusion_matrix);
    println!("\nDetailed Classification Report:");
    println!("{}", performance.classification_report);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClassifierKind, ModelConfig, ModelType};
    use crate::model_selection::{CrossValidationSummary, Scoring};
    use crate::models::factory::build_model;
    use ndarray::{array, Array1, Array2};

    /// Hard-label only model.
    struct Threshold;

    impl ClassifierModel for Threshold {
        fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<usize>) -> Result<()> {
            Ok(())
        }

        fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
            Ok(x.column(0).mapv(|v| usize::from(v > 0.0)))
        }

        fn n_features(&self) -> Option<usize> {
            Some(1)
        }
    }

    fn test_set(y: Array1<usize>) -> LabeledMatrix {
        LabeledMatrix {
            feature_names: vec!["score".into()],
            x: array![[-1.0], [1.0], [2.0], [-2.0]],
            y,
            ids: None,
        }
    }

    #[test]
    fn model_without_probabilities_is_capability_error() {
        let err = evaluate_model(&Threshold, &test_set(array![0, 1, 1, 0])).unwrap_err();
        assert!(matches!(err, LoanError::Capability(_)));
    }

    /// Constant-probability model.
    struct Coin;

    impl ClassifierModel for Coin {
        fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<usize>) -> Result<()> {
            Ok(())
        }

        fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
            Ok(Array1::zeros(x.nrows()))
        }

        fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
            Ok(x.column(0).mapv(|v| if v > 0.0 { 0.9 } else { 0.1 }))
        }

        fn n_features(&self) -> Option<usize> {
            Some(1)
        }
    }

    #[test]
    fn metrics_are_computed_from_labels_and_scores() {
        let perf = evaluate_model(&Coin, &test_set(array![0, 1, 1, 0])).unwrap();
        assert_eq!(perf.accuracy, 0.5);
        assert_eq!(perf.roc_auc, 1.0);
        assert_eq!(perf.average_precision, 1.0);
        assert_eq!(perf.confusion_matrix.matrix, [[2, 0], [2, 0]]);
        assert_eq!(perf.classification_report.classes[1].recall, 0.0);
    }

    #[test]
    fn single_class_test_set_is_metric_error() {
        let err = evaluate_model(&Coin, &test_set(array![1, 1, 1, 1])).unwrap_err();
        assert!(matches!(err, LoanError::Metric(_)));
    }

    #[test]
    fn registry_evaluation_returns_stored_cross_validation() {
        let train_x = array![[-2.0], [-1.5], [-1.0], [-0.5], [0.5], [1.0], [1.5], [2.0]];
        let train_y = array![0, 0, 0, 0, 1, 1, 1, 1];
        let mut model = build_model(ModelConfig::new(
            42,
            ModelType::defaults_for(ClassifierKind::LogisticRegression),
        ))
        .unwrap();
        model.fit(&train_x, &train_y).unwrap();

        let cv = CrossValidationSummary::new(Scoring::RocAuc, vec![0.8, 1.0]);
        let mut registry = ModelRegistry::new();
        let kind = registry.insert_with_cv(model, Some(cv.clone()));

        let results = evaluate_registry(&mut registry, &test_set(array![0, 1, 1, 0])).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, kind);
        assert_eq!(results[0].1.cross_validation.as_ref(), Some(&cv));
        assert_eq!(registry.performance(kind), Some(&results[0].1));
    }
}
