use linfa::traits::{Fit, Predict};
use linfa::Dataset;
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::config::{ModelConfig, ModelType};
use crate::error::{LoanError, Result};
use crate::models::classifier_trait::{check_input, check_training_data, ensure_finite, ClassifierModel};

/// L2-regularised logistic regression backed by `linfa-logistic`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LogisticClassifier {
    c: f64,
    max_iterations: u64,
    model: Option<FittedLogisticRegression<f64, usize>>,
    n_features: Option<usize>,
}

impl LogisticClassifier {
    pub fn new(params: &ModelConfig) -> Result<Self> {
        match params.model_type {
            ModelType::LogisticRegression { c, max_iterations } => {
                if !(c > 0.0) {
                    return Err(LoanError::InvalidArgument(format!(
                        "C must be positive, got {}",
                        c
                    )));
                }
                Ok(LogisticClassifier {
                    c,
                    max_iterations,
                    model: None,
                    n_features: None,
                })
            }
            ref other => Err(LoanError::InvalidArgument(format!(
                "expected logistic regression parameters, got {:?}",
                other
            ))),
        }
    }

    pub fn c(&self) -> f64 {
        self.c
    }

    pub fn max_iterations(&self) -> u64 {
        self.max_iterations
    }

    fn fitted(&self) -> Result<&FittedLogisticRegression<f64, usize>> {
        self.model
            .as_ref()
            .ok_or_else(|| LoanError::InvalidState("logistic regression is not fitted".to_string()))
    }
}

impl ClassifierModel for LogisticClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_training_data(self.name(), x, y)?;
        let dataset = Dataset::new(x.clone(), y.clone());
        let fitted = LogisticRegression::default()
            .alpha(1.0 / self.c)
            .max_iterations(self.max_iterations)
            .fit(&dataset)
            .map_err(|e| LoanError::Model(e.to_string()))?;

        log::debug!(
            "Fitted logistic regression (C = {}, max_iter = {}) on {} samples",
            self.c,
            self.max_iterations,
            x.nrows()
        );
        self.model = Some(fitted);
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        check_input(self, x)?;
        ensure_finite(self.name(), x)?;
        Ok(self.fitted()?.predict(x))
    }

    /// Probability of label `1`.
    ///
    /// linfa reports the probability of whichever class it picked as
    /// positive during fit (the majority class, or the first seen on a tie).
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_input(self, x)?;
        ensure_finite(self.name(), x)?;
        let fitted = self.fitted()?;
        let proba = fitted.predict_probabilities(x);
        if fitted.labels().pos.class == 1 {
            Ok(proba)
        } else {
            Ok(proba.mapv(|p| 1.0 - p))
        }
    }

    fn name(&self) -> &str {
        "logistic_regression"
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierKind;
    use ndarray::array;

    fn separable() -> (Array2<f64>, Array1<usize>) {
        let x = array![
            [-2.0, 0.5],
            [-1.5, -0.3],
            [-1.0, 0.2],
            [-0.8, 0.1],
            [0.9, -0.2],
            [1.1, 0.4],
            [1.6, -0.1],
            [2.2, 0.3]
        ];
        let y = array![0, 0, 0, 0, 1, 1, 1, 1];
        (x, y)
    }

    fn classifier() -> LogisticClassifier {
        LogisticClassifier::new(&ModelConfig::new(
            42,
            ModelType::defaults_for(ClassifierKind::LogisticRegression),
        ))
        .unwrap()
    }

    #[test]
    fn learns_separable_problem() {
        let (x, y) = separable();
        let mut model = classifier();
        model.fit(&x, &y).unwrap();

        assert_eq!(model.predict(&x).unwrap(), y);
        let proba = model.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(proba[7] > 0.5 && proba[0] < 0.5);
    }

    #[test]
    fn probabilities_refer_to_label_one_on_imbalanced_data() {
        // 30 negatives listed first, then 10 positives
        let x = Array2::from_shape_fn((40, 1), |(i, _)| {
            if i < 30 {
                -3.0 + i as f64 / 12.0
            } else {
                0.5 + (i - 30) as f64 / 4.0
            }
        });
        let y = Array1::from_shape_fn(40, |i| usize::from(i >= 30));
        let mut model = classifier();
        model.fit(&x, &y).unwrap();

        let proba = model.predict_proba(&x).unwrap();
        assert!(proba[39] > 0.5, "positive row scored {}", proba[39]);
        assert!(proba[0] < 0.5, "negative row scored {}", proba[0]);
        assert_eq!(crate::stats::roc_auc(&y, &proba).unwrap(), 1.0);

        // majority class listed first, positives in the minority
        let flipped_x = array![[2.0], [-2.0], [-1.5], [-1.0], [1.5], [-2.5]];
        let flipped_y = array![1, 0, 0, 0, 1, 0];
        model.fit(&flipped_x, &flipped_y).unwrap();
        let proba = model.predict_proba(&flipped_x).unwrap();
        assert!(proba[0] > proba[1]);
        assert_eq!(crate::stats::roc_auc(&flipped_y, &proba).unwrap(), 1.0);
    }

    #[test]
    fn predict_before_fit_is_invalid_state() {
        let (x, _) = separable();
        assert!(matches!(
            classifier().predict(&x).unwrap_err(),
            LoanError::InvalidState(_)
        ));
    }

    #[test]
    fn rejects_missing_values_and_wrong_width() {
        let (x, y) = separable();
        let mut model = classifier();
        let mut holes = x.clone();
        holes[(0, 0)] = f64::NAN;
        assert!(matches!(
            model.fit(&holes, &y).unwrap_err(),
            LoanError::InvalidArgument(_)
        ));

        model.fit(&x, &y).unwrap();
        let narrow = Array2::<f64>::zeros((2, 1));
        assert!(matches!(
            model.predict(&narrow).unwrap_err(),
            LoanError::SchemaMismatch(_)
        ));
    }

    #[test]
    fn rejects_forest_parameters() {
        let cfg = ModelConfig::new(42, ModelType::defaults_for(ClassifierKind::RandomForest));
        assert!(LogisticClassifier::new(&cfg).is_err());
    }
}
