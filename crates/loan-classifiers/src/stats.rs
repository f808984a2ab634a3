//! Binary classification metrics.
//!
//! Labels are `0`/`1` with `1` the positive (defaulted) class. Scores are
//! positive-class probabilities or any monotone equivalent.
use std::collections::HashMap;
use std::fmt;

use linfa::dataset::{AsTargets, Labels};
use linfa::metrics::ToConfusionMatrix;
use ndarray::{Array1, ArrayView1, Ix1};
use serde::{Deserialize, Serialize};

use crate::error::{LoanError, Result};

fn check_lengths(y_true: &Array1<usize>, len: usize, what: &str) -> Result<()> {
    if y_true.len() != len {
        return Err(LoanError::InvalidArgument(format!(
            "{} labels but {} {}",
            y_true.len(),
            len,
            what
        )));
    }
    if len == 0 {
        return Err(LoanError::Metric("no samples to score".to_string()));
    }
    Ok(())
}

/// Fraction of predictions equal to the true labels.
pub fn accuracy(y_true: &Array1<usize>, y_pred: &Array1<usize>) -> Result<f64> {
    check_lengths(y_true, y_pred.len(), "predictions")?;
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| t == p)
        .count();
    Ok(correct as f64 / y_true.len() as f64)
}

/// 1-based ranks of `values`, tied values sharing their average rank.
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end hold ranks start+1 ..= end
        let rank = (start + 1 + end) as f64 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = rank;
        }
        start = end;
    }
    ranks
}

/// Area under the ROC curve.
///
/// Computed as the Mann-Whitney U statistic of the positive-class scores,
/// normalised by `n_pos * n_neg`. Ties between a positive and a negative
/// count one half.
///
/// # Errors
///
/// `Metric` when `y_true` holds a single class, since the curve is then
/// undefined.
pub fn roc_auc(y_true: &Array1<usize>, scores: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, scores.len(), "scores")?;
    if scores.iter().any(|s| s.is_nan()) {
        return Err(LoanError::Metric("scores contain NaN".to_string()));
    }
    let n_pos = y_true.iter().filter(|&&y| y == 1).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(LoanError::Metric(
            "ROC-AUC is undefined when only one class is present".to_string(),
        ));
    }

    let ranks = average_ranks(&scores.to_vec());
    let pos_rank_sum: f64 = ranks
        .iter()
        .zip(y_true.iter())
        .filter(|(_, &y)| y == 1)
        .map(|(r, _)| r)
        .sum();
    let n_pos = n_pos as f64;
    let u = pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0;
    Ok(u / (n_pos * n_neg as f64))
}

/// Average precision: the step-wise area under the precision-recall curve,
/// `sum_n (R_n - R_{n-1}) * P_n` over the distinct score thresholds taken
/// from highest to lowest.
pub fn average_precision(y_true: &Array1<usize>, scores: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, scores.len(), "scores")?;
    let n_pos = y_true.iter().filter(|&&y| y == 1).count();
    if n_pos == 0 {
        return Err(LoanError::Metric(
            "average precision is undefined without positive samples".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut prev_recall = 0.0;
    let mut ap = 0.0;
    let mut i = 0;
    while i < order.len() {
        let threshold = scores[order[i]];
        // consume every sample at this threshold
        while i < order.len() && scores[order[i]] == threshold {
            if y_true[order[i]] == 1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        let precision = tp as f64 / (tp + fp) as f64;
        let recall = tp as f64 / n_pos as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
    }
    Ok(ap)
}

/// Targets with the label set fixed to `[0, 1]`, so linfa's confusion
/// matrix is always 2x2 with class `0` first.
struct BinaryTargets<'a>(ArrayView1<'a, usize>);

impl AsTargets for BinaryTargets<'_> {
    type Elem = usize;
    type Ix = Ix1;

    fn as_targets(&self) -> ArrayView1<usize> {
        self.0.view()
    }
}

impl Labels for BinaryTargets<'_> {
    type Elem = usize;

    fn label_count(&self) -> Vec<HashMap<usize, usize>> {
        self.0.label_count()
    }

    fn labels(&self) -> Vec<usize> {
        BINARY_CLASSES.to_vec()
    }
}

const BINARY_CLASSES: [usize; 2] = [0, 1];

fn check_binary(labels: &Array1<usize>, what: &str) -> Result<()> {
    match labels.iter().find(|&&l| l > 1) {
        Some(l) => Err(LoanError::InvalidLabel(format!(
            "expected 0/1 {}, got {}",
            what, l
        ))),
        None => Ok(()),
    }
}

/// linfa reports undefined ratios as NaN; they are scored `0.0` here.
fn defined(value: f32) -> f64 {
    if value.is_finite() {
        value as f64
    } else {
        0.0
    }
}

/// Counts indexed as `matrix[true][predicted]`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfusionMatrix {
    pub matrix: [[usize; 2]; 2],
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &Array1<usize>, y_pred: &Array1<usize>) -> Result<Self> {
        check_lengths(y_true, y_pred.len(), "predictions")?;
        check_binary(y_true, "labels")?;
        check_binary(y_pred, "predictions")?;
        let mut matrix = [[0usize; 2]; 2];
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            matrix[t][p] += 1;
        }
        Ok(ConfusionMatrix { matrix })
    }

    pub fn true_negatives(&self) -> usize {
        self.matrix[0][0]
    }

    pub fn false_positives(&self) -> usize {
        self.matrix[0][1]
    }

    pub fn false_negatives(&self) -> usize {
        self.matrix[1][0]
    }

    pub fn true_positives(&self) -> usize {
        self.matrix[1][1]
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[[{:>5} {:>5}]", self.matrix[0][0], self.matrix[0][1])?;
        write!(f, " [{:>5} {:>5}]]", self.matrix[1][0], self.matrix[1][1])
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Per-class precision, recall and F1 together with accuracy and the macro
/// and support-weighted averages. Undefined ratios are reported as `0.0`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    /// Indexed by class label.
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    /// Score `y_pred` against `y_true` with linfa's confusion matrix, one
    /// class against the rest.
    pub fn from_predictions(y_true: &Array1<usize>, y_pred: &Array1<usize>) -> Result<Self> {
        check_lengths(y_true, y_pred.len(), "predictions")?;
        check_binary(y_true, "labels")?;
        check_binary(y_pred, "predictions")?;

        let truth = y_true.as_standard_layout();
        let predicted = y_pred.as_standard_layout();
        let targets = BinaryTargets(truth.view());
        let cm = targets
            .confusion_matrix(&predicted)
            .map_err(|e| LoanError::Metric(e.to_string()))?;
        let support = targets.label_count().into_iter().next().unwrap_or_default();

        let classes: Vec<ClassMetrics> = cm
            .split_one_vs_all()
            .iter()
            .zip(BINARY_CLASSES)
            .map(|(one, class)| ClassMetrics {
                precision: defined(one.precision()),
                recall: defined(one.recall()),
                f1_score: defined(one.f1_score()),
                support: support.get(&class).copied().unwrap_or(0),
            })
            .collect();
        let total = y_true.len();

        let n = classes.len() as f64;
        let macro_avg = ClassMetrics {
            precision: classes.iter().map(|m| m.precision).sum::<f64>() / n,
            recall: classes.iter().map(|m| m.recall).sum::<f64>() / n,
            f1_score: classes.iter().map(|m| m.f1_score).sum::<f64>() / n,
            support: total,
        };
        let weight = |get: fn(&ClassMetrics) -> f64| {
            classes
                .iter()
                .map(|m| get(m) * m.support as f64)
                .sum::<f64>()
                / total as f64
        };
        let weighted_avg = ClassMetrics {
            precision: weight(|m| m.precision),
            recall: weight(|m| m.recall),
            f1_score: weight(|m| m.f1_score),
            support: total,
        };

        Ok(ClassificationReport {
            accuracy: defined(cm.accuracy()),
            classes,
            macro_avg,
            weighted_avg,
        })
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for (label, m) in self.classes.iter().enumerate() {
            writeln!(
                f,
                "{:>12} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                label, m.precision, m.recall, m.f1_score, m.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for (title, m) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>12} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                title, m.precision, m.recall, m.f1_score, m.support
            )?;
        }
        Ok(())
    }
}

/// Population mean and standard deviation.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn accuracy_counts_matches() {
        let y = array![0, 1, 1, 0];
        assert_eq!(accuracy(&y, &array![0, 1, 0, 0]).unwrap(), 0.75);
        assert!(accuracy(&y, &array![0, 1]).is_err());
    }

    #[test]
    fn roc_auc_perfect_inverted_and_tied() {
        let y = array![0, 0, 1, 1];
        assert_eq!(roc_auc(&y, &array![0.1, 0.2, 0.8, 0.9]).unwrap(), 1.0);
        assert_eq!(roc_auc(&y, &array![0.9, 0.8, 0.2, 0.1]).unwrap(), 0.0);
        assert_eq!(roc_auc(&y, &array![0.5, 0.5, 0.5, 0.5]).unwrap(), 0.5);
        // one of four pairs misordered
        assert_eq!(roc_auc(&y, &array![0.1, 0.6, 0.5, 0.9]).unwrap(), 0.75);
    }

    #[test]
    fn roc_auc_single_class_is_metric_error() {
        let err = roc_auc(&array![1, 1, 1], &array![0.2, 0.4, 0.6]).unwrap_err();
        assert!(matches!(err, LoanError::Metric(_)));
    }

    #[test]
    fn average_precision_hand_computed() {
        let y = array![0, 1, 1, 0];
        // thresholds 0.9 (neg), 0.8 (pos), 0.4 (pos), 0.1 (neg)
        // recall steps 0 -> 0.5 at P = 1/2, 0.5 -> 1 at P = 2/3
        let ap = average_precision(&y, &array![0.9, 0.8, 0.4, 0.1]).unwrap();
        assert!((ap - (0.25 + 1.0 / 3.0)).abs() < 1e-12);

        assert_eq!(
            average_precision(&array![0, 1], &array![0.1, 0.9]).unwrap(),
            1.0
        );
        // all tied: precision is the positive rate
        assert_eq!(
            average_precision(&y, &array![0.5, 0.5, 0.5, 0.5]).unwrap(),
            0.5
        );
    }

    #[test]
    fn report_from_confusion_matrix() {
        let y_true = array![0, 0, 0, 1, 1];
        let y_pred = array![0, 0, 1, 1, 0];
        let cm = ConfusionMatrix::from_predictions(&y_true, &y_pred).unwrap();
        assert_eq!(cm.matrix, [[2, 1], [1, 1]]);

        let report = ClassificationReport::from_predictions(&y_true, &y_pred).unwrap();
        assert_eq!(report.classes[0].support, 3);
        assert_eq!(report.classes[1].support, 2);
        assert!((report.classes[0].precision - 2.0 / 3.0).abs() < 1e-6);
        assert!((report.classes[0].recall - 2.0 / 3.0).abs() < 1e-6);
        assert!((report.classes[1].precision - 0.5).abs() < 1e-6);
        assert!((report.classes[1].recall - 0.5).abs() < 1e-6);
        assert!((report.accuracy - 0.6).abs() < 1e-6);
        assert_eq!(report.weighted_avg.support, 5);

        let text = report.to_string();
        assert!(text.contains("macro avg"));
        assert!(text.contains("weighted avg"));
    }

    #[test]
    fn report_handles_absent_predicted_class() {
        let report = ClassificationReport::from_predictions(&array![0, 1], &array![0, 0]).unwrap();
        assert_eq!(report.classes.len(), 2);
        assert_eq!(report.classes[1].precision, 0.0);
        assert_eq!(report.classes[1].recall, 0.0);
        assert_eq!(report.classes[1].f1_score, 0.0);
        assert_eq!(report.classes[1].support, 1);
        assert!((report.classes[0].precision - 0.5).abs() < 1e-6);
        assert_eq!(report.classes[0].recall, 1.0);
    }

    #[test]
    fn report_keeps_class_order_when_only_positives_are_true() {
        // labels missing from the truth still get a row
        let report = ClassificationReport::from_predictions(&array![1, 1, 1], &array![1, 0, 1]).unwrap();
        assert_eq!(report.classes[0].support, 0);
        assert_eq!(report.classes[1].support, 3);
        assert!((report.classes[1].recall - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(report.classes[1].precision, 1.0);
    }

    #[test]
    fn non_binary_labels_are_rejected() {
        let err = ClassificationReport::from_predictions(&array![0, 2], &array![0, 1]).unwrap_err();
        assert!(matches!(err, LoanError::InvalidLabel(_)));
    }

    #[test]
    fn mean_std_is_population() {
        let (m, s) = mean_std(&[1.0, 3.0]);
        assert_eq!(m, 2.0);
        assert_eq!(s, 1.0);
    }
}
