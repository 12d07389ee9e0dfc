//! Per-unit transform results and stage reports
//!
//! These structures are the audit trail handed to compliance review: one
//! `TransformResult` per input unit, persisted next to its output.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::unit::UnitState;
use crate::config::{OutputFormat, PiiMode};
use crate::error::TransformError;

/// Pipeline stages in their fixed order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Redact,
    Geo,
    Vocabulary,
    Write,
}

/// How a stage ended for one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Ran at full fidelity
    Applied,
    /// Ran in a lower-fidelity fallback mode
    Degraded,
    /// Not run because no credential or resolver was configured
    Skipped,
    /// Nothing to do for this unit (no matching fields)
    NotApplicable,
    /// The stage gave up; records passed through or the unit failed
    Failed,
}

impl StageStatus {
    /// Whether this status makes the unit count as degraded
    #[must_use]
    pub fn is_degraded(self) -> bool {
        matches!(self, Self::Degraded | Self::Skipped | Self::Failed)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Applied => "applied",
            Self::Degraded => "degraded",
            Self::Skipped => "skipped",
            Self::NotApplicable => "not_applicable",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Stage outcome recorded in the summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: Stage,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StageOutcome {
    #[must_use]
    pub fn new(stage: Stage, status: StageStatus) -> Self {
        Self {
            stage,
            status,
            detail: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Redactor counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionReport {
    /// Values redacted per field name
    pub redactions: BTreeMap<String, usize>,
    /// Content detector matches per detector name
    pub detector_hits: BTreeMap<String, usize>,
    /// Date and timestamp values moved by date shifting
    pub dates_shifted: usize,
    /// Fields classified as PHI by name
    pub phi_fields: Vec<String>,
    /// Unclassified text fields scanned with content detectors
    pub scanned_fields: Vec<String>,
}

impl RedactionReport {
    #[must_use]
    pub fn total_redactions(&self) -> usize {
        self.redactions.values().sum()
    }
}

/// Geo enrichment mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentMode {
    /// External geocoding service with a credential
    Full,
    /// Offline gazetteer fallback
    #[default]
    Degraded,
}

/// Geo enricher counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentReport {
    pub mode: EnrichmentMode,
    /// Records that carried at least one usable location field
    pub attempted: usize,
    pub enriched: usize,
    pub failures: usize,
    /// External calls issued
    pub lookups: usize,
    /// Coordinates coarsened or nulled
    pub coordinates_coarsened: usize,
    /// The dependency tripped the consecutive-failure threshold
    pub dependency_unavailable: bool,
}

/// Vocabulary mapping status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MappingStatus {
    Applied,
    #[default]
    Skipped,
    Failed,
}

/// Hits and misses for a single field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub hits: usize,
    pub misses: usize,
}

/// Vocabulary mapper counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingReport {
    pub status: MappingStatus,
    /// Resolver that answered (`umls`, `local`), absent when skipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub hits: usize,
    pub misses: usize,
    /// External resolutions issued (one per distinct term at most)
    pub lookups: usize,
    pub per_field: BTreeMap<String, FieldMapping>,
}

/// Error recorded for a failed unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitError {
    pub kind: String,
    pub message: String,
}

impl From<&TransformError> for UnitError {
    fn from(error: &TransformError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Per-unit outcome, persisted as `<output name>.summary.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformResult {
    /// Input path relative to the bronze root
    pub unit: PathBuf,
    /// Published output (file or table directory); absent when the unit failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    pub summary: PathBuf,
    pub output_format: OutputFormat,
    pub state: UnitState,
    pub records_in: usize,
    pub records_out: usize,
    pub columns_in: usize,
    pub columns_out: usize,
    pub stages: Vec<StageOutcome>,
    pub redactions: BTreeMap<String, usize>,
    pub detector_hits: BTreeMap<String, usize>,
    pub dates_shifted: usize,
    pub enrichment: EnrichmentReport,
    pub mapping: MappingReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<UnitError>,
    pub pii_mode: PiiMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_shift_days: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl TransformResult {
    /// A freshly discovered unit with nothing recorded yet
    #[must_use]
    pub fn pending(
        unit: PathBuf,
        summary: PathBuf,
        output_format: OutputFormat,
        pii_mode: PiiMode,
    ) -> Self {
        let now = Utc::now();
        Self {
            unit,
            output: None,
            summary,
            output_format,
            state: UnitState::Discovered,
            records_in: 0,
            records_out: 0,
            columns_in: 0,
            columns_out: 0,
            stages: Vec::new(),
            redactions: BTreeMap::new(),
            detector_hits: BTreeMap::new(),
            dates_shifted: 0,
            enrichment: EnrichmentReport::default(),
            mapping: MappingReport::default(),
            error: None,
            pii_mode,
            date_shift_days: None,
            started_at: now,
            finished_at: now,
            elapsed_ms: 0,
        }
    }

    /// Status of a stage, if it ran
    #[must_use]
    pub fn stage_status(&self, stage: Stage) -> Option<StageStatus> {
        self.stages
            .iter()
            .find(|s| s.stage == stage)
            .map(|s| s.status)
    }

    /// A completed unit with any stage below full fidelity
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.state == UnitState::Completed && self.stages.iter().any(|s| s.status.is_degraded())
    }
}
