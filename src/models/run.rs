//! Run-level summary consumed by the invoking runner

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::result::{TransformResult, UnitError};
use super::unit::UnitState;

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Nothing was discovered
    NoWork,
    Success,
    PartialSuccess,
    Failure,
    /// Stopped between units; some units were skipped
    Cancelled,
}

impl RunStatus {
    /// Process exit code: zero only for full success (or no work)
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::NoWork | Self::Success => 0,
            Self::Failure => 1,
            Self::PartialSuccess => 2,
            Self::Cancelled => 130,
        }
    }

    /// Derive the status from unit counts
    #[must_use]
    pub fn from_counts(succeeded: usize, failed: usize, skipped: usize) -> Self {
        if skipped > 0 {
            Self::Cancelled
        } else if succeeded == 0 && failed == 0 {
            Self::NoWork
        } else if failed == 0 {
            Self::Success
        } else if succeeded == 0 {
            Self::Failure
        } else {
            Self::PartialSuccess
        }
    }
}

/// One line of the run summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSummary {
    pub unit: PathBuf,
    pub state: UnitState,
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<UnitError>,
}

impl From<&TransformResult> for UnitSummary {
    fn from(result: &TransformResult) -> Self {
        Self {
            unit: result.unit.clone(),
            state: result.state,
            degraded: result.is_degraded(),
            output: result.output.clone(),
            error: result.error.clone(),
        }
    }
}

/// Run-level summary, persisted as `_run_summary.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub discovered: usize,
    pub succeeded: usize,
    /// Subset of `succeeded` with a stage below full fidelity
    pub degraded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub units: Vec<UnitSummary>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl RunSummary {
    /// Build the summary from the unit lines, sorted by unit path
    #[must_use]
    pub fn from_units(
        mut units: Vec<UnitSummary>,
        started_at: DateTime<Utc>,
        elapsed_ms: u64,
    ) -> Self {
        units.sort_by(|a, b| a.unit.cmp(&b.unit));

        let succeeded = units
            .iter()
            .filter(|u| u.state == UnitState::Completed)
            .count();
        let degraded = units
            .iter()
            .filter(|u| u.state == UnitState::Completed && u.degraded)
            .count();
        let failed = units.iter().filter(|u| u.state == UnitState::Failed).count();
        let skipped = units.iter().filter(|u| u.state == UnitState::Skipped).count();

        Self {
            status: RunStatus::from_counts(succeeded, failed, skipped),
            discovered: units.len(),
            succeeded,
            degraded,
            failed,
            skipped,
            units,
            started_at,
            elapsed_ms,
        }
    }

    /// Summary for a run that found no input units
    #[must_use]
    pub fn no_work(started_at: DateTime<Utc>, elapsed_ms: u64) -> Self {
        Self::from_units(Vec::new(), started_at, elapsed_ms)
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}
