//! Staged output publishing
//!
//! Every output is written under `<silver>/.staging/` first and moved into
//! place with `rename` once complete. A unit that fails before publishing
//! leaves nothing behind: the staging directory is removed on drop.

use std::fs;
use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use chrono::Utc;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::parquet::write_parquet;
use crate::config::OutputFormat;
use crate::error::{Result, TransformError};

/// Name of the staging directory inside the silver location
pub const STAGING_DIR: &str = ".staging";
/// Data file of a versioned table
pub const PART_FILE: &str = "part-00000.parquet";
/// Commit log directory of a versioned table
pub const LOG_DIR: &str = "_log";

/// A per-unit scratch directory under `<silver>/.staging/`
#[derive(Debug)]
pub struct StagingArea {
    root: PathBuf,
    dir: PathBuf,
}

impl StagingArea {
    /// Create a fresh staging directory for the named output
    pub fn create(output_dir: &Path, name: &str) -> Result<Self> {
        let root = output_dir.join(STAGING_DIR);
        let dir = root.join(format!("{name}-{}", std::process::id()));
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| TransformError::write(&dir, e.to_string()))?;
        }
        create_staging_dir(&dir)?;
        Ok(Self { root, dir })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Move `staged` to `target`, replacing whatever was there
    ///
    /// The previous output is renamed aside first and restored if the final
    /// rename fails, so `target` is never left half-written.
    pub fn publish(&self, staged: &Path, target: &Path) -> Result<()> {
        let previous = self.dir.join(".previous");
        let had_previous = target.exists();

        if had_previous {
            fs::rename(target, &previous)
                .map_err(|e| TransformError::write(target, format!("cannot move old output aside: {e}")))?;
        }

        if let Err(e) = fs::rename(staged, target) {
            if had_previous {
                let _ = fs::rename(&previous, target);
            }
            return Err(TransformError::write(target, format!("cannot publish output: {e}")));
        }

        if had_previous {
            let removed = if previous.is_dir() {
                fs::remove_dir_all(&previous)
            } else {
                fs::remove_file(&previous)
            };
            if let Err(e) = removed {
                log::debug!("Leaving old output for staging cleanup: {e}");
            }
        }
        Ok(())
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to clean staging directory {}: {e}", self.dir.display());
            }
        }
        // Only succeeds once the last unit has cleaned up
        let _ = fs::remove_dir(&self.root);
    }
}

/// Attempts at creating a staging directory whose parent another unit may be removing
const STAGING_ATTEMPTS: usize = 5;

/// `create_dir_all` that tolerates `.staging` vanishing under it when a
/// concurrent unit drops the last other staging area
fn create_staging_dir(dir: &Path) -> Result<()> {
    let mut attempt = 1;
    loop {
        match fs::create_dir_all(dir) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && attempt < STAGING_ATTEMPTS => {
                log::debug!("Staging root vanished while creating {}; retrying", dir.display());
                attempt += 1;
            }
            Err(e) => return Err(TransformError::write(dir, e.to_string())),
        }
    }
}

/// Column entry of a commit log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

/// One commit of a versioned table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub version: u64,
    pub operation: String,
    pub timestamp: String,
    pub rows: usize,
    pub schema: Vec<LogColumn>,
    pub files: Vec<String>,
}

/// Path a unit's output is published to
#[must_use]
pub fn output_path(output_dir: &Path, name: &str, format: OutputFormat) -> PathBuf {
    match format {
        OutputFormat::Flat => output_dir.join(format!("{name}.parquet")),
        OutputFormat::Versioned => output_dir.join(name),
    }
}

/// Stage and publish a unit's output; returns the published path
pub fn publish_output(
    output_dir: &Path,
    name: &str,
    format: OutputFormat,
    batch: &RecordBatch,
) -> Result<PathBuf> {
    let staging = StagingArea::create(output_dir, name)?;
    let target = output_path(output_dir, name, format);

    let staged = match format {
        OutputFormat::Flat => {
            let staged = staging.path().join(format!("{name}.parquet"));
            write_parquet(&staged, batch)?;
            staged
        }
        OutputFormat::Versioned => stage_versioned_table(staging.path(), &target, name, batch)?,
    };

    staging.publish(&staged, &target)?;
    Ok(target)
}

/// Remove a published output again, file or table directory
pub fn retract_output(output: &Path) {
    let removed = if output.is_dir() {
        fs::remove_dir_all(output)
    } else {
        fs::remove_file(output)
    };
    match removed {
        Ok(()) => log::warn!("Retracted {}", output.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::error!("Failed to retract {}: {e}", output.display()),
    }
}

fn stage_versioned_table(
    staging: &Path,
    target: &Path,
    name: &str,
    batch: &RecordBatch,
) -> Result<PathBuf> {
    let table = staging.join(name);
    let log_dir = table.join(LOG_DIR);
    fs::create_dir_all(&log_dir).map_err(|e| TransformError::write(&log_dir, e.to_string()))?;

    // Carry the existing commit history forward
    let existing = existing_versions(&target.join(LOG_DIR))?;
    for version in &existing {
        let file = log_file_name(*version);
        fs::copy(target.join(LOG_DIR).join(&file), log_dir.join(&file))
            .map_err(|e| TransformError::write(&log_dir, format!("cannot copy commit log: {e}")))?;
    }
    let version = existing.last().map_or(0, |v| v + 1);

    write_parquet(&table.join(PART_FILE), batch)?;

    let entry = LogEntry {
        version,
        operation: "overwrite".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        rows: batch.num_rows(),
        schema: batch
            .schema()
            .fields()
            .iter()
            .map(|f| LogColumn {
                name: f.name().clone(),
                data_type: f.data_type().to_string(),
            })
            .collect(),
        files: vec![PART_FILE.to_string()],
    };
    let entry_path = log_dir.join(log_file_name(version));
    let json = serde_json::to_vec_pretty(&entry)?;
    fs::write(&entry_path, json).map_err(|e| TransformError::write(&entry_path, e.to_string()))?;

    Ok(table)
}

fn log_file_name(version: u64) -> String {
    format!("{version:020}.json")
}

/// Versions recorded in a table's commit log, ascending
pub fn existing_versions(log_dir: &Path) -> Result<Vec<u64>> {
    if !log_dir.is_dir() {
        return Ok(Vec::new());
    }
    let versions = fs::read_dir(log_dir)?
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                path.file_stem()?.to_str()?.parse::<u64>().ok()
            } else {
                None
            }
        })
        .sorted()
        .collect_vec();
    Ok(versions)
}

/// Write a JSON document atomically through the staging directory
pub fn write_json_atomically<T: Serialize>(output_dir: &Path, target: &Path, value: &T) -> Result<()> {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "summary.json".to_string());
    let staging = StagingArea::create(output_dir, &file_name)?;
    let staged = staging.path().join(&file_name);

    let json = serde_json::to_vec_pretty(value)?;
    fs::write(&staged, json).map_err(|e| TransformError::write(&staged, e.to_string()))?;
    staging.publish(&staged, target)
}
