//! Stratified folds, hyper-parameter grids and cross-validation.
use std::collections::BTreeMap;
use std::fmt;

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{MaxFeatures, ModelConfig, ModelType};
use crate::error::{LoanError, Result};
use crate::models::classifier_trait::ClassifierModel;
use crate::models::factory::build_model;
use crate::models::Model;
use crate::stats;

/// K-fold split that keeps the class proportions of every fold close to
/// those of the whole label vector.
///
/// Rows of each class are dealt to folds in order (or in a seeded random
/// order when `shuffle` is set); every row lands in exactly one test fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StratifiedKFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub random_state: u64,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        StratifiedKFold {
            n_splits,
            shuffle: false,
            random_state: 0,
        }
    }

    pub fn shuffled(n_splits: usize, random_state: u64) -> Self {
        StratifiedKFold {
            n_splits,
            shuffle: true,
            random_state,
        }
    }

    /// Fold id of every row.
    fn test_folds(&self, y: &Array1<usize>) -> Result<Vec<usize>> {
        if self.n_splits < 2 {
            return Err(LoanError::InvalidArgument(format!(
                "n_splits must be at least 2, got {}",
                self.n_splits
            )));
        }
        let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (row, &label) in y.iter().enumerate() {
            by_class.entry(label).or_default().push(row);
        }
        if by_class.len() < 2 {
            return Err(LoanError::InvalidArgument(
                "stratified folds need at least two classes".to_string(),
            ));
        }
        if let Some((label, rows)) = by_class.iter().find(|(_, rows)| rows.len() < self.n_splits) {
            return Err(LoanError::InvalidArgument(format!(
                "class {} has only {} members, fewer than n_splits = {}",
                label,
                rows.len(),
                self.n_splits
            )));
        }

        // Deal the label-sorted sequence round-robin to get per-fold class
        // counts, then hand each class its fold ids in fold order.
        let sorted: Vec<usize> = by_class
            .iter()
            .flat_map(|(&label, rows)| std::iter::repeat(label).take(rows.len()))
            .collect();
        let mut allocation: BTreeMap<usize, Vec<usize>> = by_class
            .keys()
            .map(|&label| (label, vec![0; self.n_splits]))
            .collect();
        for (i, label) in sorted.iter().enumerate() {
            if let Some(counts) = allocation.get_mut(label) {
                counts[i % self.n_splits] += 1;
            }
        }

        let mut rng = StdRng::seed_from_u64(self.random_state);
        let mut folds = vec![0; y.len()];
        for (label, rows) in &by_class {
            let mut fold_ids: Vec<usize> = allocation[label]
                .iter()
                .enumerate()
                .flat_map(|(fold, &count)| std::iter::repeat(fold).take(count))
                .collect();
            if self.shuffle {
                fold_ids.shuffle(&mut rng);
            }
            for (&row, fold) in rows.iter().zip(fold_ids) {
                folds[row] = fold;
            }
        }
        Ok(folds)
    }

    /// `(train, test)` row indices for each fold, both ascending.
    pub fn split(&self, y: &Array1<usize>) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
        let folds = self.test_folds(y)?;
        Ok((0..self.n_splits)
            .map(|k| {
                let (test, train): (Vec<usize>, Vec<usize>) =
                    (0..y.len()).partition(|&row| folds[row] == k);
                (train, test)
            })
            .collect())
    }
}

/// A single hyper-parameter value in a grid.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(s) => write!(f, "'{}'", s),
            ParamValue::Null => f.write_str("None"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ParamValue::Null, Into::into)
    }
}

/// One point of a grid: parameter name to value.
pub type ParamSet = BTreeMap<String, ParamValue>;

/// Candidate values per parameter name.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct ParamGrid {
    params: BTreeMap<String, Vec<ParamValue>>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<V: Into<ParamValue>>(mut self, name: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.params
            .insert(name.to_string(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Cartesian product in sorted-name order, last name varying fastest.
    pub fn candidates(&self) -> Result<Vec<ParamSet>> {
        if let Some((name, _)) = self.params.iter().find(|(_, values)| values.is_empty()) {
            return Err(LoanError::InvalidArgument(format!(
                "grid parameter '{}' has no values",
                name
            )));
        }
        let mut out = vec![ParamSet::new()];
        for (name, values) in &self.params {
            out = out
                .into_iter()
                .flat_map(|set| {
                    values.iter().map(move |v| {
                        let mut next = set.clone();
                        next.insert(name.clone(), v.clone());
                        next
                    })
                })
                .collect();
        }
        Ok(out)
    }
}

fn positive_int(name: &str, value: &ParamValue) -> Result<usize> {
    match value {
        ParamValue::Int(v) if *v > 0 => Ok(*v as usize),
        other => Err(LoanError::InvalidArgument(format!(
            "'{}' must be a positive integer, got {}",
            name, other
        ))),
    }
}

fn max_features(value: &ParamValue) -> Result<MaxFeatures> {
    match value {
        ParamValue::Null => Ok(MaxFeatures::All),
        ParamValue::Text(s) => match s.to_lowercase().as_str() {
            "sqrt" | "auto" => Ok(MaxFeatures::Sqrt),
            "log2" => Ok(MaxFeatures::Log2),
            "all" => Ok(MaxFeatures::All),
            _ => Err(LoanError::InvalidArgument(format!(
                "unsupported max_features '{}'",
                s
            ))),
        },
        other => positive_int("max_features", other).map(MaxFeatures::Count),
    }
}

/// Overlay `params` on `base`. Names that do not belong to the model type
/// are rejected.
pub fn apply_params(base: &ModelConfig, params: &ParamSet) -> Result<ModelConfig> {
    let mut config = base.clone();
    for (name, value) in params {
        match (&mut config.model_type, name.as_str()) {
            (ModelType::LogisticRegression { c, .. }, "C") => {
                *c = match value {
                    ParamValue::Float(v) if *v > 0.0 => *v,
                    ParamValue::Int(v) if *v > 0 => *v as f64,
                    other => {
                        return Err(LoanError::InvalidArgument(format!(
                            "'C' must be a positive number, got {}",
                            other
                        )))
                    }
                };
            }
            (ModelType::LogisticRegression { max_iterations, .. }, "max_iter") => {
                *max_iterations = positive_int(name, value)? as u64;
            }
            (ModelType::RandomForest { n_estimators, .. }, "n_estimators") => {
                *n_estimators = positive_int(name, value)?;
            }
            (ModelType::RandomForest { max_depth, .. }, "max_depth") => {
                *max_depth = match value {
                    ParamValue::Null => None,
                    other => Some(positive_int(name, other)?),
                };
            }
            (ModelType::RandomForest { max_features: mf, .. }, "max_features") => {
                *mf = max_features(value)?;
            }
            (model_type, _) => {
                return Err(LoanError::InvalidArgument(format!(
                    "unknown parameter '{}' for {}",
                    name,
                    model_type.kind()
                )))
            }
        }
    }
    Ok(config)
}

/// Scoring rule for cross-validation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
    Accuracy,
    RocAuc,
}

impl Scoring {
    fn score(&self, model: &Model, x: &Array2<f64>, y: &Array1<usize>) -> Result<f64> {
        match self {
            Scoring::Accuracy => stats::accuracy(y, &model.predict(x)?),
            Scoring::RocAuc => stats::roc_auc(y, &model.predict_proba(x)?),
        }
    }
}

/// Per-fold scores with their mean and population standard deviation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CrossValidationSummary {
    pub scoring: Scoring,
    pub scores: Vec<f64>,
    pub mean: f64,
    pub std: f64,
}

impl CrossValidationSummary {
    pub fn new(scoring: Scoring, scores: Vec<f64>) -> Self {
        let (mean, std) = stats::mean_std(&scores);
        CrossValidationSummary {
            scoring,
            scores,
            mean,
            std,
        }
    }
}

impl fmt::Display for CrossValidationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4} (+/- {:.4})", self.mean, 2.0 * self.std)
    }
}

/// Fit a fresh model from `build` on every training fold and score it on
/// the matching test fold.
pub fn cross_val_score<F>(
    build: F,
    x: &Array2<f64>,
    y: &Array1<usize>,
    cv: &StratifiedKFold,
    scoring: Scoring,
) -> Result<CrossValidationSummary>
where
    F: Fn() -> Result<Model>,
{
    let mut scores = Vec::with_capacity(cv.n_splits);
    for (fold, (train, test)) in cv.split(y)?.into_iter().enumerate() {
        let mut model = build()?;
        model.fit(&x.select(Axis(0), &train), &y.select(Axis(0), &train))?;
        let score = scoring.score(&model, &x.select(Axis(0), &test), &y.select(Axis(0), &test))?;
        log::trace!("Fold {}: {:?} = {:.4}", fold, scoring, score);
        scores.push(score);
    }
    Ok(CrossValidationSummary::new(scoring, scores))
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub params: ParamSet,
    pub summary: CrossValidationSummary,
}

/// Outcome of an exhaustive grid search.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSearchResult {
    pub candidates: Vec<CandidateScore>,
    pub best_index: usize,
    pub best_config: ModelConfig,
}

impl GridSearchResult {
    pub fn best(&self) -> &CandidateScore {
        &self.candidates[self.best_index]
    }
}

/// Cross-validate every candidate of `grid` on top of `base`.
///
/// Candidates are scored in parallel; the best mean score wins, ties going
/// to the earliest candidate in grid order. The returned `best_config` is
/// not fitted.
pub fn grid_search(
    base: &ModelConfig,
    grid: &ParamGrid,
    x: &Array2<f64>,
    y: &Array1<usize>,
    cv: &StratifiedKFold,
    scoring: Scoring,
) -> Result<GridSearchResult> {
    let sets = grid.candidates()?;
    // Reject bad names before spending any time fitting.
    let configs = sets
        .iter()
        .map(|set| apply_params(base, set))
        .collect::<Result<Vec<_>>>()?;

    let summaries = configs
        .par_iter()
        .map(|config| cross_val_score(|| build_model(config.clone()), x, y, cv, scoring))
        .collect::<Result<Vec<_>>>()?;

    let mut best_index = 0;
    for (i, summary) in summaries.iter().enumerate() {
        if summary.mean > summaries[best_index].mean {
            best_index = i;
        }
    }
    let candidates: Vec<CandidateScore> = sets
        .into_iter()
        .zip(summaries)
        .map(|(params, summary)| CandidateScore { params, summary })
        .collect();
    for c in &candidates {
        log::debug!("{:?} -> {}", c.params, c.summary);
    }

    Ok(GridSearchResult {
        best_config: configs[best_index].clone(),
        candidates,
        best_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierKind;

    fn labels(pattern: &[usize], repeat: usize) -> Array1<usize> {
        pattern.iter().cycle().take(pattern.len() * repeat).copied().collect()
    }

    #[test]
    fn folds_cover_each_row_once_and_keep_proportions() {
        // 30 negatives, 10 positives
        let y = labels(&[0, 0, 0, 1], 10);
        for cv in [StratifiedKFold::new(5), StratifiedKFold::shuffled(5, 42)] {
            let splits = cv.split(&y).unwrap();
            let mut seen = vec![0; y.len()];
            for (train, test) in &splits {
                assert_eq!(train.len() + test.len(), y.len());
                assert_eq!(test.len(), 8);
                assert_eq!(test.iter().filter(|&&r| y[r] == 1).count(), 2);
                for &r in test {
                    seen[r] += 1;
                }
            }
            assert!(seen.iter().all(|&n| n == 1));
        }
    }

    #[test]
    fn unshuffled_folds_are_contiguous_per_class() {
        let y = labels(&[0, 1], 4);
        let splits = StratifiedKFold::new(2).split(&y).unwrap();
        assert_eq!(splits[0].1, vec![0, 1, 2, 3]);
        assert_eq!(splits[1].1, vec![4, 5, 6, 7]);
    }

    #[test]
    fn too_few_members_is_rejected() {
        let y = labels(&[0, 0, 0, 0, 0, 1], 2);
        assert!(StratifiedKFold::new(5).split(&y).is_err());
        assert!(StratifiedKFold::new(2).split(&Array1::from(vec![1, 1, 1])).is_err());
    }

    #[test]
    fn candidates_follow_sorted_names() {
        let grid = ParamGrid::new()
            .with("n_estimators", [10i64, 20])
            .with("max_depth", [Some(3i64), None]);
        let sets = grid.candidates().unwrap();
        assert_eq!(sets.len(), 4);
        assert_eq!(sets[0]["max_depth"], ParamValue::Int(3));
        assert_eq!(sets[0]["n_estimators"], ParamValue::Int(10));
        assert_eq!(sets[1]["n_estimators"], ParamValue::Int(20));
        assert_eq!(sets[2]["max_depth"], ParamValue::Null);
    }

    #[test]
    fn empty_value_list_is_invalid() {
        let grid = ParamGrid::new().with("C", Vec::<f64>::new());
        assert!(matches!(
            grid.candidates().unwrap_err(),
            LoanError::InvalidArgument(_)
        ));
    }

    #[test]
    fn apply_params_updates_and_validates() {
        let base = ModelConfig::new(42, ModelType::defaults_for(ClassifierKind::RandomForest));
        let mut set = ParamSet::new();
        set.insert("max_depth".into(), ParamValue::Null);
        set.insert("max_features".into(), ParamValue::Text("log2".into()));
        set.insert("n_estimators".into(), ParamValue::Int(7));
        let cfg = apply_params(&base, &set).unwrap();
        assert_eq!(
            cfg.model_type,
            ModelType::RandomForest {
                n_estimators: 7,
                max_depth: None,
                max_features: MaxFeatures::Log2,
            }
        );

        let mut bad = ParamSet::new();
        bad.insert("C".into(), ParamValue::Float(1.0));
        assert!(apply_params(&base, &bad).is_err());
    }

    #[test]
    fn grid_values_deserialize_untagged() {
        let grid: ParamGrid =
            serde_json::from_str(r#"{"C": [0.1, 1], "max_depth": [null, 5], "max_features": ["sqrt"]}"#)
                .unwrap();
        let sets = grid.candidates().unwrap();
        assert_eq!(sets.len(), 4);
        assert_eq!(sets[0]["C"], ParamValue::Float(0.1));
        assert_eq!(sets[2]["C"], ParamValue::Int(1));
    }

    #[test]
    fn grid_search_prefers_first_on_ties() {
        // Perfectly separable: every C reaches accuracy 1.0.
        let n = 20;
        let x = Array2::from_shape_fn((n, 1), |(i, _)| if i % 2 == 0 { -1.0 - i as f64 } else { 1.0 + i as f64 });
        let y = Array1::from_shape_fn(n, |i| i % 2);
        let base = ModelConfig::new(42, ModelType::defaults_for(ClassifierKind::LogisticRegression));
        let grid = ParamGrid::new().with("C", [0.5, 1.0, 2.0]);

        let result = grid_search(&base, &grid, &x, &y, &StratifiedKFold::new(5), Scoring::Accuracy).unwrap();
        assert_eq!(result.candidates.len(), 3);
        assert_eq!(result.best_index, 0);
        assert_eq!(result.best().summary.mean, 1.0);
        assert_eq!(
            result.best_config.model_type,
            ModelType::LogisticRegression {
                c: 0.5,
                max_iterations: 500
            }
        );
    }
}
