//! Logging utilities
//!
//! Standardized log lines for unit-level operations.

use std::path::Path;
use std::time::Duration;

use crate::models::{StageOutcome, StageStatus};

/// Log an operation start with consistent format
pub fn log_operation_start(operation: &str, path: &Path) {
    log::info!("{} {}", operation, path.display());
}

/// Log an operation completion; `operation` is past tense, e.g. "wrote"
pub fn log_operation_complete(
    operation: &str,
    path: &Path,
    items: usize,
    elapsed: Option<Duration>,
) {
    if let Some(duration) = elapsed {
        log::info!(
            "Successfully {} {} records from {} in {:?}",
            operation,
            items,
            path.display(),
            duration
        );
    } else {
        log::info!(
            "Successfully {} {} records from {}",
            operation,
            items,
            path.display()
        );
    }
}

/// Log an operation warning with consistent format
pub fn log_warning(message: &str, path: Option<&Path>) {
    if let Some(path) = path {
        log::warn!("{}: {}", message, path.display());
    } else {
        log::warn!("{message}");
    }
}

/// Log how a stage ended for a unit; anything short of applied is a warning
pub fn log_stage_outcome(unit: &Path, outcome: &StageOutcome) {
    let detail = outcome.detail.as_deref().unwrap_or("");
    match outcome.status {
        StageStatus::Applied | StageStatus::NotApplicable => log::debug!(
            "{:?} stage {} for {} {}",
            outcome.stage,
            outcome.status,
            unit.display(),
            detail
        ),
        _ => log::warn!(
            "{:?} stage {} for {} {}",
            outcome.stage,
            outcome.status,
            unit.display(),
            detail
        ),
    }
}
