//! Column-wise numeric transforms shared by the preprocessing pipeline.
//!
//! Provides a missing-value imputer, a mean/std standard scaler and the
//! Yeo-Johnson power transform. Every transform is fit on one matrix and
//! applied to any other matrix with the same column layout, so statistics
//! learned on the training rows are reused unchanged on test rows.

use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{LoanError, Result};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy {
    Mean,
    Median,
}

/// Per-column fill values for `NaN` cells.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Imputer {
    pub strategy: ImputeStrategy,
    pub fill: Vec<f64>,
}

fn finite_values(col: ArrayView1<f64>) -> Vec<f64> {
    col.iter().copied().filter(|v| !v.is_nan()).collect()
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub(crate) fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Fit an `Imputer` ignoring `NaN` cells. Columns with no observed value
/// are filled with 0.
pub fn fit_imputer(x: &Array2<f64>, strategy: ImputeStrategy) -> Imputer {
    let fill = x
        .axis_iter(Axis(1))
        .enumerate()
        .map(|(c, col)| {
            let values = finite_values(col);
            let stat = match strategy {
                ImputeStrategy::Mean => mean(&values),
                ImputeStrategy::Median => median(&values),
            };
            stat.unwrap_or_else(|| {
                log::warn!("Column {} has no observed values; imputing 0", c);
                0.0
            })
        })
        .collect();
    Imputer { strategy, fill }
}

pub fn impute_all(x: &Array2<f64>, imputer: &Imputer) -> Array2<f64> {
    let mut out = x.clone();
    for (mut col, &fill) in out.axis_iter_mut(Axis(1)).zip(imputer.fill.iter()) {
        col.mapv_inplace(|v| if v.is_nan() { fill } else { v });
    }
    out
}

/// Simple standard scaler (per-column mean/std).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Scaler {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl Scaler {
    /// Columns with a smaller stddev are only centred.
    const MIN_STD: f64 = 1e-12;
}

/// Fit a `Scaler` from an `Array2<f64>` where rows are samples and
/// columns are features. Uses the population standard deviation.
pub fn fit_scaler(x: &Array2<f64>) -> Result<Scaler> {
    let (nrows, ncols) = x.dim();
    if nrows == 0 || ncols == 0 {
        return Err(LoanError::InvalidArgument(
            "fit_scaler requires a non-empty matrix".to_string(),
        ));
    }

    let mut mean = vec![0.0f64; ncols];
    for r in 0..nrows {
        for c in 0..ncols {
            mean[c] += x[(r, c)];
        }
    }
    let nrows_f = nrows as f64;
    for v in mean.iter_mut() {
        *v /= nrows_f;
    }

    let mut var = vec![0.0f64; ncols];
    for r in 0..nrows {
        for c in 0..ncols {
            let d = x[(r, c)] - mean[c];
            var[c] += d * d;
        }
    }
    for v in var.iter_mut() {
        let std = (*v / nrows_f).sqrt();
        *v = if std < Scaler::MIN_STD { 1.0 } else { std };
    }

    Ok(Scaler { mean, std: var })
}

/// Transform all rows using the provided `Scaler` and return a new matrix.
pub fn transform_all(x: &Array2<f64>, sc: &Scaler) -> Array2<f64> {
    let mut out = x.clone();
    for ((mut col, &m), &s) in out
        .axis_iter_mut(Axis(1))
        .zip(sc.mean.iter())
        .zip(sc.std.iter())
    {
        col.mapv_inplace(|v| (v - m) / s);
    }
    out
}

/// Fit a scaler and return the transformed matrix in one call.
pub fn fit_transform(x: &Array2<f64>) -> Result<Array2<f64>> {
    let sc = fit_scaler(x)?;
    Ok(transform_all(x, &sc))
}

/// Yeo-Johnson transform of a single value.
pub fn yeo_johnson(x: f64, lambda: f64) -> f64 {
    if x >= 0.0 {
        if lambda.abs() < f64::EPSILON {
            x.ln_1p()
        } else {
            ((x + 1.0).powf(lambda) - 1.0) / lambda
        }
    } else if (lambda - 2.0).abs() > f64::EPSILON {
        -((1.0 - x).powf(2.0 - lambda) - 1.0) / (2.0 - lambda)
    } else {
        -(-x).ln_1p()
    }
}

/// Profile log-likelihood of `lambda` for one column.
pub fn yeo_johnson_log_likelihood(values: &[f64], lambda: f64) -> f64 {
    let n = values.len() as f64;
    let transformed: Vec<f64> = values.iter().map(|&v| yeo_johnson(v, lambda)).collect();
    let m = transformed.iter().sum::<f64>() / n;
    let var = transformed.iter().map(|t| (t - m).powi(2)).sum::<f64>() / n;
    let jacobian: f64 = values.iter().map(|v| v.signum() * v.abs().ln_1p()).sum();
    -n / 2.0 * var.ln() + (lambda - 1.0) * jacobian
}

const LAMBDA_BOUNDS: (f64, f64) = (-5.0, 5.0);
const GOLDEN_TOL: f64 = 1e-7;

/// Maximise the log-likelihood by golden-section search.
fn optimize_lambda(values: &[f64]) -> f64 {
    let variance = {
        let m = values.iter().sum::<f64>() / values.len() as f64;
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
    };
    if values.len() < 2 || variance < Scaler::MIN_STD {
        return 1.0;
    }

    let inv_phi = (5f64.sqrt() - 1.0) / 2.0;
    let (mut a, mut b) = LAMBDA_BOUNDS;
    let mut c = b - inv_phi * (b - a);
    let mut d = a + inv_phi * (b - a);
    let mut fc = yeo_johnson_log_likelihood(values, c);
    let mut fd = yeo_johnson_log_likelihood(values, d);
    while (b - a).abs() > GOLDEN_TOL {
        if fc > fd {
            b = d;
            d = c;
            fd = fc;
            c = b - inv_phi * (b - a);
            fc = yeo_johnson_log_likelihood(values, c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + inv_phi * (b - a);
            fd = yeo_johnson_log_likelihood(values, d);
        }
    }
    let lambda = (a + b) / 2.0;
    if lambda.is_finite() {
        lambda
    } else {
        1.0
    }
}

/// Yeo-Johnson power transform followed by standardisation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PowerTransform {
    pub lambdas: Vec<f64>,
    pub scaler: Scaler,
}

fn apply_lambdas(x: &Array2<f64>, lambdas: &[f64]) -> Array2<f64> {
    let mut out = x.clone();
    for (mut col, &lambda) in out.axis_iter_mut(Axis(1)).zip(lambdas.iter()) {
        col.mapv_inplace(|v| yeo_johnson(v, lambda));
    }
    out
}

pub fn fit_power_transform(x: &Array2<f64>) -> Result<PowerTransform> {
    let lambdas: Vec<f64> = x
        .axis_iter(Axis(1))
        .map(|col| optimize_lambda(&col.to_vec()))
        .collect();
    let scaler = fit_scaler(&apply_lambdas(x, &lambdas))?;
    Ok(PowerTransform { lambdas, scaler })
}

impl PowerTransform {
    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        transform_all(&apply_lambdas(x, &self.lambdas), &self.scaler)
    }
}

/// Median imputation, standard scaling and Yeo-Johnson on a subset of
/// columns. Only those columns are kept, in the order given; the rest of
/// the matrix is dropped.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NumericTransformer {
    pub columns: Vec<usize>,
    pub n_features: usize,
    imputer: Imputer,
    scaler: Scaler,
    power: PowerTransform,
}

impl NumericTransformer {
    pub fn fit(x: &Array2<f64>, columns: &[usize]) -> Result<Self> {
        if columns.is_empty() {
            return Err(LoanError::InvalidArgument(
                "numeric transformer needs at least one column".to_string(),
            ));
        }
        if let Some(&bad) = columns.iter().find(|&&c| c >= x.ncols()) {
            return Err(LoanError::InvalidArgument(format!(
                "numeric column {} out of range for {} features",
                bad,
                x.ncols()
            )));
        }
        let sub = x.select(Axis(1), columns);
        let imputer = fit_imputer(&sub, ImputeStrategy::Median);
        let imputed = impute_all(&sub, &imputer);
        let scaler = fit_scaler(&imputed)?;
        let power = fit_power_transform(&transform_all(&imputed, &scaler))?;
        log::debug!(
            "Fitted numeric transformer on {} of {} columns (lambdas {:?})",
            columns.len(),
            x.ncols(),
            power.lambdas
        );
        Ok(Self {
            columns: columns.to_vec(),
            n_features: x.ncols(),
            imputer,
            scaler,
            power,
        })
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features {
            return Err(LoanError::SchemaMismatch(format!(
                "expected {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        let sub = x.select(Axis(1), &self.columns);
        Ok(self
            .power
            .transform(&transform_all(&impute_all(&sub, &self.imputer), &self.scaler)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skewness(values: &[f64]) -> f64 {
        let n = values.len() as f64;
        let m = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
        values.iter().map(|v| (v - m).powi(3)).sum::<f64>() / n / var.powf(1.5)
    }

    #[test]
    fn fit_scaler_computes_mean_and_std() {
        let x = Array2::from_shape_vec((4, 2), vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0, 4.0, 40.0])
            .unwrap();
        let sc = fit_scaler(&x).unwrap();
        assert!((sc.mean[0] - 2.5).abs() < 1e-12);
        assert!((sc.mean[1] - 25.0).abs() < 1e-12);
        assert!((sc.std[0] - 1.25f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn constant_column_is_only_centred() {
        let x = Array2::from_shape_vec((3, 1), vec![7.0, 7.0, 7.0]).unwrap();
        let t = fit_transform(&x).unwrap();
        assert!(t.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn fit_scaler_rejects_empty_matrix() {
        let x = Array2::<f64>::zeros((0, 3));
        assert!(fit_scaler(&x).is_err());
    }

    #[test]
    fn imputer_skips_nan_cells() {
        let x = Array2::from_shape_vec(
            (4, 2),
            vec![1.0, f64::NAN, 2.0, 4.0, f64::NAN, 6.0, 10.0, 8.0],
        )
        .unwrap();
        let median = fit_imputer(&x, ImputeStrategy::Median);
        assert_eq!(median.fill, vec![2.0, 6.0]);
        let mean = fit_imputer(&x, ImputeStrategy::Mean);
        assert!((mean.fill[0] - 13.0 / 3.0).abs() < 1e-12);

        let filled = impute_all(&x, &median);
        assert_eq!(filled[(2, 0)], 2.0);
        assert_eq!(filled[(0, 1)], 6.0);
        assert_eq!(filled[(3, 0)], 10.0);
    }

    #[test]
    fn yeo_johnson_identity_at_lambda_one() {
        for v in [-3.5, -1.0, 0.0, 0.25, 8.0] {
            assert!((yeo_johnson(v, 1.0) - v).abs() < 1e-12);
        }
        assert!((yeo_johnson(1.0, 0.0) - 2f64.ln()).abs() < 1e-12);
        assert!((yeo_johnson(-1.0, 2.0) + 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn power_transform_reduces_skew() {
        let values = vec![0.1, 0.2, 0.3, 0.5, 0.8, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 120.0];
        let x = Array2::from_shape_vec((values.len(), 1), values.clone()).unwrap();
        let pt = fit_power_transform(&x).unwrap();
        let out = pt.transform(&x);
        let out_col = out.column(0).to_vec();

        assert!(pt.lambdas[0] < 1.0, "lambda = {}", pt.lambdas[0]);
        assert!(skewness(&out_col).abs() < skewness(&values).abs());
        let m = out_col.iter().sum::<f64>() / out_col.len() as f64;
        assert!(m.abs() < 1e-9);
    }

    #[test]
    fn numeric_transformer_keeps_only_its_columns() {
        let x = Array2::from_shape_vec(
            (4, 3),
            vec![
                1.0, 0.0, 10.0, //
                f64::NAN, 1.0, 20.0, //
                3.0, 2.0, 30.0, //
                5.0, 0.0, 40.0,
            ],
        )
        .unwrap();
        let nt = NumericTransformer::fit(&x, &[2, 0]).unwrap();
        let out = nt.transform(&x).unwrap();
        assert_eq!(out.dim(), (4, 2));
        assert!(out.iter().all(|v| v.is_finite()));
        // column order follows the fitted list
        assert!(out[(0, 0)] < out[(3, 0)]);

        let mut recoded = x.clone();
        recoded.column_mut(1).fill(9.0);
        assert_eq!(nt.transform(&recoded).unwrap(), out);

        assert!(matches!(
            NumericTransformer::fit(&x, &[]).unwrap_err(),
            LoanError::InvalidArgument(_)
        ));

        let narrow = Array2::<f64>::zeros((2, 2));
        assert!(matches!(
            nt.transform(&narrow).unwrap_err(),
            LoanError::SchemaMismatch(_)
        ));
    }
}
