//! Per-unit and run-level summary documents

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, TransformError};
use crate::models::{RunSummary, TransformResult};

use super::publish::write_json_atomically;

/// File name of the run-level summary inside the silver location
pub const RUN_SUMMARY_FILE: &str = "_run_summary.json";

/// Path of a unit's summary document
#[must_use]
pub fn summary_path(output_dir: &Path, name: &str) -> PathBuf {
    output_dir.join(format!("{name}.summary.json"))
}

/// Persist a unit's transform result, replacing any earlier summary
pub fn write_unit_summary(output_dir: &Path, result: &TransformResult) -> Result<()> {
    write_json_atomically(output_dir, &result.summary, result)
}

/// Persist the run summary
pub fn write_run_summary(output_dir: &Path, summary: &RunSummary) -> Result<PathBuf> {
    let path = output_dir.join(RUN_SUMMARY_FILE);
    write_json_atomically(output_dir, &path, summary)?;
    Ok(path)
}

/// Load a unit summary written by an earlier run
pub fn read_unit_summary(path: &Path) -> Result<TransformResult> {
    let content = fs::read(path).map_err(|e| TransformError::read(path, e.to_string()))?;
    Ok(serde_json::from_slice(&content)?)
}

/// Load a run summary written by an earlier run
pub fn read_run_summary(output_dir: &Path) -> Result<RunSummary> {
    let path = output_dir.join(RUN_SUMMARY_FILE);
    let content = fs::read(&path).map_err(|e| TransformError::read(&path, e.to_string()))?;
    Ok(serde_json::from_slice(&content)?)
}
