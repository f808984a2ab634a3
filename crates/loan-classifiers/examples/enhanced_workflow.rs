//! Enhanced workflow: label encoding, date-part features and the numeric
//! transform pipeline with cross-validated logistic regression.
use anyhow::{Context, Result};
use log::LevelFilter;

use loan_classifiers::config::{load_config, PipelineConfig, PreprocessStrategy};
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
    config.preprocessing.strategy = PreprocessStrategy::Enhanced;

    let mut workflow = LoanDefaultWorkflow::new(config);
    workflow.load_configured().context("loading datasets")?;
    let data = workflow.preprocess()?;
    for (column, encoder) in data.preprocessor.label_encoders() {
        log::info!("{} classes: {:?}", column, encoder.classes());
    }

    workflow.train_pipeline()?;
    workflow.evaluate()?;
    workflow.save_models()?;

    let test_preview = workflow
        .prepared()
        .map(|d| d.test.x.slice(ndarray::s![..d.test.nrows().min(5), ..]).to_owned());
    if let Some(x) = test_preview {
        let predictions = workflow.predict(&x, Some("pipeline_logistic_regression"))?;
        println!("Sample predictions: {:?}", predictions.to_vec());
    }
    Ok(())
}
