use ndarray::{Array1, Array2};

use crate::error::{LoanError, Result};

/// The contract shared by every classifier in the registry.
///
/// Labels use the crate convention: `1` for a defaulted loan, `0` otherwise.
pub trait ClassifierModel {
    /// Fit the model on `x`/`y`, replacing any earlier fit.
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()>;

    /// Predict hard 0/1 labels.
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>>;

    /// Probability of the positive class for each row. Models that cannot
    /// produce probabilities keep the default, which fails with `Capability`.
    fn predict_proba(&self, _x: &Array2<f64>) -> Result<Array1<f64>> {
        Err(LoanError::Capability(format!(
            "{} does not produce probabilities",
            self.name()
        )))
    }

    /// Optional human readable name for the model
    fn name(&self) -> &str {
        "classifier"
    }

    /// Width of the matrices seen during fitting, `None` before fit.
    fn n_features(&self) -> Option<usize>;
}

/// Shared input checks for `predict`/`predict_proba`.
pub(crate) fn check_input(model: &dyn ClassifierModel, x: &Array2<f64>) -> Result<()> {
    let expected = model
        .n_features()
        .ok_or_else(|| LoanError::InvalidState(format!("{} is not fitted", model.name())))?;
    if x.ncols() != expected {
        return Err(LoanError::SchemaMismatch(format!(
            "{} was fitted on {} features, got {}",
            model.name(),
            expected,
            x.ncols()
        )));
    }
    Ok(())
}

/// Shared fit-time checks: matching lengths and no `NaN` cells.
pub(crate) fn check_training_data(name: &str, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(LoanError::InvalidArgument(format!(
            "{}: {} samples but {} labels",
            name,
            x.nrows(),
            y.len()
        )));
    }
    if x.nrows() == 0 {
        return Err(LoanError::InvalidArgument(format!("{}: no training samples", name)));
    }
    ensure_finite(name, x)
}

pub(crate) fn ensure_finite(name: &str, x: &Array2<f64>) -> Result<()> {
    if x.iter().any(|v| v.is_nan()) {
        return Err(LoanError::InvalidArgument(format!(
            "{} cannot handle missing values; impute them first",
            name
        )));
    }
    Ok(())
}
