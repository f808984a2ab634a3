use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{LoanError, Result};
use crate::feature_selection::{SelectK, SelectKBest};
use crate::models::classifier_trait::{check_input, ClassifierModel};
use crate::models::Model;
use crate::preprocessing::NumericTransformer;

/// Numeric transformer, univariate selection and a classifier fit as one
/// estimator.
///
/// `numeric_columns` are median-imputed, scaled and power transformed and
/// are the only columns the selector sees; every other column is dropped.
/// Fitting the pipeline fits every stage on the same rows, so
/// cross-validating it never leaks statistics from the held-out fold.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PipelineClassifier {
    numeric_columns: Vec<usize>,
    transformer: Option<NumericTransformer>,
    selector: SelectKBest,
    classifier: Box<Model>,
    n_features: Option<usize>,
}

impl PipelineClassifier {
    pub fn new(numeric_columns: Vec<usize>, k: SelectK, classifier: Model) -> Result<Self> {
        if matches!(classifier, Model::Pipeline(_)) {
            return Err(LoanError::InvalidArgument(
                "a pipeline cannot wrap another pipeline".to_string(),
            ));
        }
        Ok(PipelineClassifier {
            numeric_columns,
            transformer: None,
            selector: SelectKBest::new(k),
            classifier: Box::new(classifier),
            n_features: None,
        })
    }

    pub fn classifier(&self) -> &Model {
        &self.classifier
    }

    /// Positions within `numeric_columns` kept by the selector, available
    /// after fit.
    pub fn selected_features(&self) -> Option<&[usize]> {
        self.selector.selected()
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        check_input(self, x)?;
        let transformer = self
            .transformer
            .as_ref()
            .ok_or_else(|| LoanError::InvalidState("pipeline is not fitted".to_string()))?;
        self.selector.transform(&transformer.transform(x)?)
    }
}

impl ClassifierModel for PipelineClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(LoanError::InvalidArgument(format!(
                "pipeline: {} samples but {} labels",
                x.nrows(),
                y.len()
            )));
        }
        let transformer = NumericTransformer::fit(x, &self.numeric_columns)?;
        let transformed = transformer.transform(x)?;
        let kept = self.selector.fit(&transformed, y)?;
        let selected = self.selector.transform(&transformed)?;
        self.classifier.fit(&selected, y)?;

        log::debug!(
            "Fitted pipeline: {} numeric columns transformed, {} of {} features selected",
            self.numeric_columns.len(),
            kept.len(),
            x.ncols()
        );
        self.transformer = Some(transformer);
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        self.classifier.predict(&self.transform(x)?)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.classifier.predict_proba(&self.transform(x)?)
    }

    fn name(&self) -> &str {
        "pipeline"
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }
}
