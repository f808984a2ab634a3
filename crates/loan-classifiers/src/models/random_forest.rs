//! Bagged ensemble of `linfa-trees` decision trees.
//!
//! Each tree is fit on a bootstrap sample of the rows and a random subset of
//! `max_features` columns; the subset is drawn once per tree. The tree with
//! index `i` is seeded with `random_state + i`.
//!
//! A fitted tree is flattened and its leaves keep the share of positive
//! bootstrap rows that reached them. The forest probability is the mean of
//! those shares, so it never depends on how linfa breaks ties between
//! equally frequent classes in a leaf.
use linfa::traits::Fit;
use linfa::Dataset;
use linfa_trees::{DecisionTree, SplitQuality, TreeNode};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{MaxFeatures, ModelConfig, ModelType};
use crate::error::{LoanError, Result};
use crate::models::classifier_trait::{check_input, check_training_data, ensure_finite, ClassifierModel};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        positive: f64,
    },
}

/// Pre-order copy of `node`'s subtree; returns the index of `node`.
fn flatten(node: &TreeNode<f64, usize>, nodes: &mut Vec<Node>) -> Result<usize> {
    let index = nodes.len();
    if let Some(label) = node.prediction() {
        nodes.push(Node::Leaf {
            positive: if label == 1 { 1.0 } else { 0.0 },
        });
        return Ok(index);
    }

    let (feature, threshold, _) = node.split();
    let children = node.children();
    let (Some(left), Some(right)) = (children[0].as_deref(), children[1].as_deref()) else {
        return Err(LoanError::Model(
            "decision tree has a split without two children".to_string(),
        ));
    };
    nodes.push(Node::Leaf { positive: 0.0 });
    let left = flatten(left, nodes)?;
    let right = flatten(right, nodes)?;
    nodes[index] = Node::Split {
        feature,
        threshold,
        left,
        right,
    };
    Ok(index)
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct ForestTree {
    features: Vec<usize>,
    nodes: Vec<Node>,
}

impl ForestTree {
    /// Flatten `tree` and set every leaf to the positive share of the rows
    /// of `x` (already restricted to `features`) routed to it.
    fn new(
        tree: &DecisionTree<f64, usize>,
        features: Vec<usize>,
        x: &Array2<f64>,
        y: &Array1<usize>,
    ) -> Result<Self> {
        let mut nodes = Vec::new();
        flatten(tree.root_node(), &mut nodes)?;
        let mut forest_tree = ForestTree { features, nodes };

        let mut counts = vec![(0usize, 0usize); forest_tree.nodes.len()];
        for (row, &label) in x.rows().into_iter().zip(y.iter()) {
            let leaf = forest_tree.leaf(row)?;
            counts[leaf].0 += 1;
            counts[leaf].1 += usize::from(label == 1);
        }
        for (node, (rows, positives)) in forest_tree.nodes.iter_mut().zip(counts) {
            if let Node::Leaf { positive } = node {
                if rows > 0 {
                    *positive = positives as f64 / rows as f64;
                }
            }
        }
        Ok(forest_tree)
    }

    /// Index of the leaf reached by `row`, following linfa's rule of going
    /// left when the value is below the threshold.
    fn leaf(&self, row: ArrayView1<f64>) -> Result<usize> {
        let corrupt = || LoanError::Model("random forest tree is corrupt".to_string());
        let mut index = 0;
        for _ in 0..self.nodes.len() {
            match self.nodes.get(index).ok_or_else(corrupt)? {
                Node::Leaf { .. } => return Ok(index),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = row.get(*feature).ok_or_else(corrupt)?;
                    index = if value < threshold { *left } else { *right };
                }
            }
        }
        Err(corrupt())
    }

    fn positive_share(&self, row: ArrayView1<f64>) -> Result<f64> {
        match self.nodes.get(self.leaf(row)?) {
            Some(Node::Leaf { positive }) => Ok(*positive),
            _ => Err(LoanError::Model("random forest tree is corrupt".to_string())),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RandomForestClassifier {
    n_estimators: usize,
    max_depth: Option<usize>,
    max_features: MaxFeatures,
    random_state: u64,
    trees: Vec<ForestTree>,
    n_features: Option<usize>,
}

impl RandomForestClassifier {
    pub fn new(params: &ModelConfig) -> Result<Self> {
        match params.model_type {
            ModelType::RandomForest {
                n_estimators,
                max_depth,
                max_features,
            } => {
                if n_estimators == 0 {
                    return Err(LoanError::InvalidArgument(
                        "n_estimators must be at least 1".to_string(),
                    ));
                }
                if max_depth == Some(0) {
                    return Err(LoanError::InvalidArgument(
                        "max_depth must be at least 1".to_string(),
                    ));
                }
                Ok(RandomForestClassifier {
                    n_estimators,
                    max_depth,
                    max_features,
                    random_state: params.random_state,
                    trees: Vec::new(),
                    n_features: None,
                })
            }
            ref other => Err(LoanError::InvalidArgument(format!(
                "expected random forest parameters, got {:?}",
                other
            ))),
        }
    }

    pub fn n_estimators(&self) -> usize {
        self.n_estimators
    }

    fn fit_tree(&self, index: usize, x: &Array2<f64>, y: &Array1<usize>) -> Result<ForestTree> {
        let mut rng = StdRng::seed_from_u64(self.random_state.wrapping_add(index as u64));
        let n_samples = x.nrows();
        let n_features = x.ncols();

        let rows: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
        let k = self.max_features.resolve(n_features);
        let mut features = rand::seq::index::sample(&mut rng, n_features, k).into_vec();
        features.sort_unstable();

        let sample_x = x.select(Axis(0), &rows).select(Axis(1), &features);
        let sample_y = y.select(Axis(0), &rows);
        let dataset = Dataset::new(sample_x, sample_y);
        let tree = DecisionTree::params()
            .split_quality(SplitQuality::Gini)
            .max_depth(self.max_depth)
            .fit(&dataset)
            .map_err(|e| LoanError::Model(e.to_string()))?;

        ForestTree::new(&tree, features, dataset.records(), dataset.targets())
    }

    fn fitted_trees(&self) -> Result<&[ForestTree]> {
        if self.trees.is_empty() {
            return Err(LoanError::InvalidState(
                "random forest is not fitted".to_string(),
            ));
        }
        Ok(&self.trees)
    }
}

impl ClassifierModel for RandomForestClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_training_data(self.name(), x, y)?;
        if x.ncols() == 0 {
            return Err(LoanError::InvalidArgument(
                "random forest needs at least one feature".to_string(),
            ));
        }

        let trees = (0..self.n_estimators)
            .into_par_iter()
            .map(|i| self.fit_tree(i, x, y))
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "Fitted random forest with {} trees (max_depth = {:?}, {} features per tree)",
            trees.len(),
            self.max_depth,
            self.max_features.resolve(x.ncols())
        );
        self.trees = trees;
        self.n_features = Some(x.ncols());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.mapv(|p| usize::from(p > 0.5)))
    }

    /// Mean over trees of the positive share in the leaf each row reaches.
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_input(self, x)?;
        ensure_finite(self.name(), x)?;
        let trees = self.fitted_trees()?;

        let mut total = Array1::<f64>::zeros(x.nrows());
        for t in trees {
            let sub = x.select(Axis(1), &t.features);
            for (acc, row) in total.iter_mut().zip(sub.rows()) {
                *acc += t.positive_share(row)?;
            }
        }
        Ok(total / trees.len() as f64)
    }

    fn name(&self) -> &str {
        "random_forest"
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }
}
