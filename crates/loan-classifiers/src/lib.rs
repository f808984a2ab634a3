//! loan-classifiers: loan-default classification on tabular exports.
//!
//! The crate loads train/test tables, encodes them into feature matrices
//! (one-hot baseline or label-encoded enhanced variant), fits logistic
//! regression and random-forest classifiers (directly, via grid search, or
//! inside a numeric transform pipeline), scores them on the held-out rows
//! and persists the fitted models as JSON.
//!
//! `workflow::LoanDefaultWorkflow` drives the stages in order; every stage
//! is also exposed as a free function.
pub mod config;
pub mod data_handling;
pub mod error;
pub mod evaluation;
pub mod feature_selection;
pub mod io;
pub mod model_selection;
pub mod models;
pub mod preprocessing;
pub mod registry;
pub mod stats;
pub mod training;
pub mod workflow;

pub use error::{LoanError, Result};
pub use workflow::LoanDefaultWorkflow;
