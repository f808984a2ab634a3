//! Feature selection utilities.
//!
//! Univariate scoring of features against the class label and a
//! `SelectKBest` selector built on it.
pub mod univariate_selection;

pub use univariate_selection::{f_classif, SelectK, SelectKBest};
