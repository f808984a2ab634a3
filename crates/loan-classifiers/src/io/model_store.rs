//! JSON persistence of trained models and their performance records.
//!
//! Every model is written to `<dir>/<key>_model.json` and, once evaluated,
//! its record to `<dir>/<key>_performance.json`. The fitted preprocessor
//! goes to `<dir>/preprocessor.json`. Files are overwritten in place; a
//! crash mid-write can leave a truncated file.
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ModelKind;
use crate::error::{LoanError, Result};
use crate::models::Model;
use crate::preprocessing::FittedPreprocessor;
use crate::registry::{ModelRegistry, Performance};

const MODEL_SUFFIX: &str = "_model.json";
const PERFORMANCE_SUFFIX: &str = "_performance.json";
const PREPROCESSOR_FILE: &str = "preprocessor.json";

pub fn model_path(dir: &Path, kind: ModelKind) -> PathBuf {
    dir.join(format!("{}{}", kind.key(), MODEL_SUFFIX))
}

pub fn performance_path(dir: &Path, kind: ModelKind) -> PathBuf {
    dir.join(format!("{}{}", kind.key(), PERFORMANCE_SUFFIX))
}

pub fn preprocessor_path(dir: &Path) -> PathBuf {
    dir.join(PREPROCESSOR_FILE)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).map_err(|e| LoanError::io(path, e))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| LoanError::io(path, e))?;
    Ok(serde_json::from_str(&content)?)
}

/// Write every registered model (and its performance, when present) into
/// `dir`, creating it if needed. Returns the written paths.
pub fn save_models<P: AsRef<Path>>(registry: &ModelRegistry, dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(|e| LoanError::io(dir, e))?;

    let mut written = Vec::new();
    for (kind, model) in registry.models() {
        let path = model_path(dir, kind);
        write_json(&path, model)?;
        written.push(path.clone());

        match registry.performance(kind) {
            Some(performance) => {
                let perf_path = performance_path(dir, kind);
                write_json(&perf_path, performance)?;
                println!(
                    "Model {} saved to {}. Performance details saved to {}",
                    kind,
                    path.display(),
                    perf_path.display()
                );
                written.push(perf_path);
            }
            None => {
                println!("Model {} saved to {}", kind, path.display());
                log::warn!("{} has no performance record to save", kind);
            }
        }
    }
    log::info!("Saved {} artifacts to {}", written.len(), dir.display());
    Ok(written)
}

/// Write the fitted preprocessor into `dir`, creating it if needed.
pub fn save_preprocessor<P: AsRef<Path>>(preprocessor: &FittedPreprocessor, dir: P) -> Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(|e| LoanError::io(dir, e))?;
    let path = preprocessor_path(dir);
    write_json(&path, preprocessor)?;
    println!("Preprocessor saved to {}", path.display());
    Ok(path)
}

pub fn load_preprocessor<P: AsRef<Path>>(path: P) -> Result<FittedPreprocessor> {
    read_json(path.as_ref())
}

pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Model> {
    read_json(path.as_ref())
}

pub fn load_performance<P: AsRef<Path>>(path: P) -> Result<Performance> {
    read_json(path.as_ref())
}

/// Rebuild a registry from the artifacts in `dir`.
///
/// Each `<key>_model.json` is loaded under the kind parsed from `<key>`;
/// a matching `<key>_performance.json` is attached when present. Models
/// whose stored kind disagrees with their file name are rejected.
pub fn load_registry<P: AsRef<Path>>(dir: P) -> Result<ModelRegistry> {
    let dir = dir.as_ref();
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| LoanError::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    paths.sort();

    let mut registry = ModelRegistry::new();
    for path in paths {
        let Some(stem) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(MODEL_SUFFIX))
        else {
            continue;
        };
        let kind: ModelKind = stem.parse()?;
        let model = load_model(&path)?;
        if model.kind() != kind {
            return Err(LoanError::parse(
                &path,
                format!("file holds a {} model", model.kind()),
            ));
        }
        registry.insert(model);

        let perf_path = performance_path(dir, kind);
        if perf_path.exists() {
            registry.set_performance(kind, load_performance(&perf_path)?)?;
        }
        log::debug!("Loaded {} from {}", kind, path.display());
    }
    Ok(registry)
}
