//! Async discovery of input units
//!
//! Walks the bronze location with `tokio::fs`, collecting every regular
//! `*.parquet` file. Hidden entries (`.staging`, `.git`) and entries that
//! start with `_` (commit logs, run summaries) are not units.

use std::path::{Path, PathBuf};

use itertools::Itertools;
use tokio::fs;

use crate::error::util::validate_input_directory;
use crate::error::{Result, TransformError};
use crate::models::InputUnit;
use crate::utils::logging::{log_operation_complete, log_operation_start, log_warning};

fn is_ignored(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') || n.starts_with('_'))
}

/// Find all Parquet input units under `root`, sorted by relative path
pub async fn discover_units(root: &Path) -> Result<Vec<InputUnit>> {
    log_operation_start("Discovering input units in", root);
    validate_input_directory(root)?;

    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];
    let mut files = Vec::new();

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await.map_err(|e| {
            TransformError::Configuration(format!(
                "Failed to read directory {}: {e}",
                dir.display()
            ))
        })?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_ignored(&path) {
                continue;
            }
            let metadata = fs::metadata(&path).await?;
            if metadata.is_dir() {
                pending.push(path);
            } else if metadata.is_file() && path.extension().is_some_and(|ext| ext == "parquet") {
                files.push(path);
            }
        }
    }

    let units = files
        .into_iter()
        .map(|path| InputUnit::new(root, path))
        .sorted_by(|a, b| a.relative.cmp(&b.relative))
        .collect_vec();

    if units.is_empty() {
        log_warning("No Parquet input units found", Some(root));
    } else {
        log_operation_complete("discovered", root, units.len(), None);
    }

    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_discovery_is_recursive_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("site_b")).unwrap();
        std::fs::create_dir_all(root.join(".staging")).unwrap();
        std::fs::write(root.join("site_b").join("visits.parquet"), b"x").unwrap();
        std::fs::write(root.join("a.parquet"), b"x").unwrap();
        std::fs::write(root.join("notes.txt"), b"x").unwrap();
        std::fs::write(root.join(".staging").join("tmp.parquet"), b"x").unwrap();

        let units = discover_units(root).await.unwrap();
        let relative = units.iter().map(|u| u.relative.clone()).collect_vec();
        assert_eq!(
            relative,
            vec![PathBuf::from("a.parquet"), PathBuf::from("site_b/visits.parquet")]
        );
    }

    #[tokio::test]
    async fn test_empty_directory_is_no_work() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_units(dir.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_units(&dir.path().join("bronze")).await.unwrap_err();
        assert!(err.is_fatal_to_run());
    }
}
