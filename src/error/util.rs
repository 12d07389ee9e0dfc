//! Utility functions for error handling
//!
//! Precondition checks on the bronze and silver locations, reported as
//! configuration errors so the run aborts before any unit is touched.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{Result, TransformError};

/// Check that the input directory exists and is readable
pub fn validate_input_directory(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(TransformError::Configuration(
            "Input directory is not configured".to_string(),
        ));
    }

    if !path.exists() {
        return Err(TransformError::Configuration(format!(
            "Input directory not found: {}",
            path.display()
        )));
    }

    if !path.is_dir() {
        return Err(TransformError::Configuration(format!(
            "Input path is not a directory: {}",
            path.display()
        )));
    }

    match fs::read_dir(path) {
        Ok(_) => Ok(()),
        Err(e) => {
            let context = match e.kind() {
                io::ErrorKind::PermissionDenied => {
                    "Permission denied - check directory permissions".to_string()
                }
                _ => format!("Failed to access input directory: {e}"),
            };
            Err(TransformError::Configuration(format!(
                "{context}: {}",
                path.display()
            )))
        }
    }
}

/// Make sure the output directory exists, creating it when needed
pub fn ensure_output_directory(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(TransformError::Configuration(
            "Output directory is not configured".to_string(),
        ));
    }

    if path.exists() && !path.is_dir() {
        return Err(TransformError::Configuration(format!(
            "Output path is not a directory: {}",
            path.display()
        )));
    }

    fs::create_dir_all(path).map_err(|e| {
        let context = match e.kind() {
            io::ErrorKind::PermissionDenied => {
                "Permission denied creating output directory".to_string()
            }
            _ => format!("Output directory cannot be created: {e}"),
        };
        TransformError::Configuration(format!("{context}: {}", path.display()))
    })
}

/// Reject layouts where outputs would be rediscovered as inputs
pub fn ensure_disjoint_locations(input: &Path, output: &Path) -> Result<()> {
    let input = fs::canonicalize(input).unwrap_or_else(|_| input.to_path_buf());
    let output = fs::canonicalize(output).unwrap_or_else(|_| output.to_path_buf());

    if output.starts_with(&input) {
        return Err(TransformError::Configuration(format!(
            "Output directory {} must not be inside input directory {}",
            output.display(),
            input.display()
        )));
    }
    Ok(())
}
