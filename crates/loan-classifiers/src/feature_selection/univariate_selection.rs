//! Univariate feature selection against a class label.
//!
//! See: https://scikit-learn.org/stable/modules/feature_selection.html#univariate-feature-selection

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use crate::error::{LoanError, Result};

/// One-way ANOVA F-test of each feature against the class label.
///
/// For every column the samples are grouped by class and the ratio of the
/// between-group to the within-group mean square is returned together with
/// its p-value under `F(k - 1, n - k)`.
///
/// Columns with zero within-group variance get an infinite statistic when the
/// group means differ and `NaN` when they are all equal. With `force_finite`
/// these become `f64::MAX` (p = 0) and `0` (p = 1).
///
/// # Errors
///
/// `InvalidArgument` when `x` and `y` disagree in length or fewer than two
/// classes are present, or when there are no more samples than classes.
pub fn f_classif(
    x: &Array2<f64>,
    y: &Array1<usize>,
    force_finite: bool,
) -> Result<(Array1<f64>, Array1<f64>)> {
    if x.nrows() != y.len() {
        return Err(LoanError::InvalidArgument(format!(
            "{} samples but {} labels",
            x.nrows(),
            y.len()
        )));
    }
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (row, &label) in y.iter().enumerate() {
        groups.entry(label).or_default().push(row);
    }
    let n_samples = y.len();
    let n_classes = groups.len();
    if n_classes < 2 || n_samples <= n_classes {
        return Err(LoanError::InvalidArgument(format!(
            "f_classif needs at least two classes and more samples than classes \
             (got {} classes, {} samples)",
            n_classes, n_samples
        )));
    }

    let df_between = (n_classes - 1) as f64;
    let df_within = (n_samples - n_classes) as f64;
    let f_dist = FisherSnedecor::new(df_between, df_within)
        .map_err(|e| LoanError::InvalidArgument(e.to_string()))?;

    let mut f_statistic = Array1::<f64>::zeros(x.ncols());
    let mut p_values = Array1::<f64>::zeros(x.ncols());
    for (j, column) in x.columns().into_iter().enumerate() {
        let f = anova_f(column, &groups, df_between, df_within);
        let (f, p) = match (f.is_finite(), force_finite) {
            (true, _) => (f, 1.0 - f_dist.cdf(f)),
            (false, true) if f.is_infinite() => (f64::MAX, 0.0),
            (false, true) => (0.0, 1.0),
            (false, false) => (f, f64::NAN),
        };
        f_statistic[j] = f;
        p_values[j] = p;
    }

    Ok((f_statistic, p_values))
}

fn anova_f(
    column: ArrayView1<f64>,
    groups: &BTreeMap<usize, Vec<usize>>,
    df_between: f64,
    df_within: f64,
) -> f64 {
    let grand_mean = column.mean().unwrap_or(0.0);
    let mut ss_between = 0.0;
    let mut ss_within = 0.0;
    for rows in groups.values() {
        let n = rows.len() as f64;
        let group_mean = rows.iter().map(|&r| column[r]).sum::<f64>() / n;
        ss_between += n * (group_mean - grand_mean).powi(2);
        ss_within += rows
            .iter()
            .map(|&r| (column[r] - group_mean).powi(2))
            .sum::<f64>();
    }
    (ss_between / df_between) / (ss_within / df_within)
}

/// How many features `SelectKBest` keeps.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectK {
    All,
    Count(usize),
}

impl Default for SelectK {
    fn default() -> Self {
        SelectK::All
    }
}

/// Select the `k` highest scoring features by ANOVA F.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SelectKBest {
    k: SelectK,
    selected: Option<Vec<usize>>,
    scores: Option<Vec<f64>>,
}

impl SelectKBest {
    pub fn new(k: SelectK) -> Self {
        SelectKBest {
            k,
            selected: None,
            scores: None,
        }
    }

    /// Fit on `x`/`y` and return the kept column indices in ascending order.
    ///
    /// Ties in score are broken towards the lower column index.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<Vec<usize>> {
        let (f_scores, _) = f_classif(x, y, true)?;
        let n_features = f_scores.len();
        let k = match self.k {
            SelectK::All => n_features,
            SelectK::Count(k) if k <= n_features => k,
            SelectK::Count(k) => {
                return Err(LoanError::InvalidArgument(format!(
                    "k = {} exceeds the {} available features",
                    k, n_features
                )))
            }
        };

        let mut indices: Vec<usize> = (0..n_features).collect();
        // Stable sort, descending score.
        indices.sort_by(|&i, &j| {
            f_scores[j]
                .partial_cmp(&f_scores[i])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut kept: Vec<usize> = indices.into_iter().take(k).collect();
        kept.sort_unstable();

        self.scores = Some(f_scores.to_vec());
        self.selected = Some(kept.clone());
        Ok(kept)
    }

    pub fn scores(&self) -> Option<&[f64]> {
        self.scores.as_deref()
    }

    pub fn selected(&self) -> Option<&[usize]> {
        self.selected.as_deref()
    }

    /// Keep only the selected columns of `x`.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let selected = self.selected.as_ref().ok_or_else(|| {
            LoanError::InvalidState("SelectKBest used before fit".to_string())
        })?;
        if let Some(&max) = selected.last() {
            if max >= x.ncols() {
                return Err(LoanError::SchemaMismatch(format!(
                    "selector expects at least {} columns, got {}",
                    max + 1,
                    x.ncols()
                )));
            }
        }
        Ok(x.select(ndarray::Axis(1), selected))
    }
}
