//! Baseline workflow: one-hot encoding, grid-searched logistic regression
//! and a default random forest.
//!
//! Reads `train_data.csv` and `test_data.csv` from the working directory
//! unless a JSON config path is given as the first argument.
use anyhow::{Context, Result};
use log::LevelFilter;

use loan_classifiers::config::{load_config, PipelineConfig, PreprocessStrategy};
use loan_classifiers::model_selection::ParamGrid;
use loan_classifiers::LoanDefaultWorkflow;

fn main() -> Result<()> {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("LOAN_LOG", "error,loan_classifiers=info"))
        .init();

    let mut config = match std::env::args().nth(1) {
        Some(path) => load_config(&path).with_context(|| format!("loading config {}", path))?,
        None => PipelineConfig::default(),
    };
    config.preprocessing.strategy = PreprocessStrategy::Baseline;

    let mut workflow = LoanDefaultWorkflow::new(config);
    workflow.load_configured().context("loading datasets")?;
    workflow.preprocess()?;

    let grid = ParamGrid::new()
        .with("C", [0.01, 0.1, 1.0, 10.0])
        .with("max_iter", [500i64]);
    workflow.train("LogisticRegression", Some(&grid))?;
    workflow.train("RandomForest", None)?;

    workflow.evaluate()?;
    workflow
        .save_models()
        .with_context(|| format!("saving models to {}", workflow.config().output_dir.display()))?;
    Ok(())
}
