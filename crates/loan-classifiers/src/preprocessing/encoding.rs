//! Categorical encoders.
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Maps each category to its rank among the sorted training categories.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let classes: BTreeSet<&str> = values.into_iter().collect();
        Self {
            classes: classes.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Code for `value`, or `None` if it was not seen during fitting.
    pub fn transform(&self, value: &str) -> Option<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(value))
            .ok()
    }

    /// Code used for categories unseen during fitting.
    pub fn unknown_code(&self) -> usize {
        self.classes.len()
    }

    pub fn inverse_transform(&self, code: usize) -> Option<&str> {
        self.classes.get(code).map(String::as_str)
    }
}

/// Indicator columns for the training categories of one column.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OneHotEncoder {
    column: String,
    categories: Vec<String>,
    drop_first: bool,
}

impl OneHotEncoder {
    pub fn fit<'a, I>(column: &str, values: I, drop_first: bool) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let categories: BTreeSet<&str> = values.into_iter().collect();
        Self {
            column: column.to_string(),
            categories: categories.into_iter().map(str::to_string).collect(),
            drop_first,
        }
    }

    fn kept(&self) -> &[String] {
        if self.drop_first && !self.categories.is_empty() {
            &self.categories[1..]
        } else {
            &self.categories
        }
    }

    /// Output column names, `<column>_<category>`.
    pub fn feature_names(&self) -> Vec<String> {
        self.kept()
            .iter()
            .map(|c| format!("{}_{}", self.column, c))
            .collect()
    }

    pub fn width(&self) -> usize {
        self.kept().len()
    }

    /// Indicator row for `value`. Unseen and dropped categories are all zeros.
    pub fn encode(&self, value: &str) -> Vec<f64> {
        self.kept()
            .iter()
            .map(|c| if c == value { 1.0 } else { 0.0 })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_encoder_sorts_and_inverts() {
        let enc = LabelEncoder::fit(["B", "A", "C", "A"]);
        assert_eq!(enc.classes(), &["A", "B", "C"]);
        assert_eq!(enc.transform("C"), Some(2));
        assert_eq!(enc.transform("Z"), None);
        assert_eq!(enc.unknown_code(), 3);
        assert_eq!(enc.inverse_transform(1), Some("B"));
    }

    #[test]
    fn one_hot_drops_first_category() {
        let enc = OneHotEncoder::fit("grade", ["B", "A", "C"], true);
        assert_eq!(enc.feature_names(), vec!["grade_B", "grade_C"]);
        assert_eq!(enc.encode("A"), vec![0.0, 0.0]);
        assert_eq!(enc.encode("C"), vec![0.0, 1.0]);
        assert_eq!(enc.encode("unseen"), vec![0.0, 0.0]);
    }

    #[test]
    fn one_hot_keeps_all_without_drop_first() {
        let enc = OneHotEncoder::fit("home", ["RENT", "OWN"], false);
        assert_eq!(enc.width(), 2);
        assert_eq!(enc.encode("OWN"), vec![1.0, 0.0]);
    }
}
