//! The per-unit pipeline: read, redact, enrich, map, publish, summarise

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::async_io::read_unit_async;
use crate::config::{OutputFormat, PiiMode};
use crate::error::{Result, TransformError};
use crate::models::{
    ClinicalBatch, InputUnit, Stage, StageOutcome, StageStatus, TransformResult, UnitError,
    UnitState, Value, ValueKind,
};
use crate::transform::{GeoEnricher, Redactor, VocabularyMapper};
use crate::utils::arrow::clinical_to_record_batch;
use crate::utils::io::{publish_output, retract_output, summary_path, write_unit_summary};
use crate::utils::logging::{log_operation_complete, log_stage_outcome};

/// Provenance column naming the bronze file a row came from
pub const SOURCE_FILE_COLUMN: &str = "source_file";
/// Provenance column naming the producing pipeline
pub const PIPELINE_COLUMN: &str = "processing_pipeline";
/// Value of the pipeline provenance column
pub const PIPELINE_NAME: &str = "bronze_to_silver";

/// The three transform stages plus the output settings, shared by all workers
pub struct UnitPipeline {
    redactor: Arc<Redactor>,
    geo: GeoEnricher,
    vocabulary: VocabularyMapper,
    output_dir: PathBuf,
    output_format: OutputFormat,
    date_shift_days: Option<i64>,
}

impl UnitPipeline {
    #[must_use]
    pub fn new(
        redactor: Redactor,
        geo: GeoEnricher,
        vocabulary: VocabularyMapper,
        output_dir: PathBuf,
        output_format: OutputFormat,
        date_shift_days: Option<i64>,
    ) -> Self {
        Self {
            redactor: Arc::new(redactor),
            geo,
            vocabulary,
            output_dir,
            output_format,
            date_shift_days,
        }
    }

    #[must_use]
    pub fn pii_mode(&self) -> PiiMode {
        self.redactor.mode()
    }

    /// Transform one unit and persist its summary
    ///
    /// Never returns an error: a failing unit is reported through the
    /// returned result, which is also written next to the outputs.
    pub async fn process(&self, unit: &InputUnit) -> TransformResult {
        let start = Instant::now();
        let name = unit.output_name();
        let mut result = TransformResult::pending(
            unit.relative.clone(),
            summary_path(&self.output_dir, &name),
            self.output_format,
            self.pii_mode(),
        );
        result.date_shift_days = self.date_shift_days;

        match self.run_stages(unit, &name, &mut result).await {
            Ok(output) => {
                result.output = Some(output);
                result.state = UnitState::Completed;
            }
            Err(error) => fail_unit(&mut result, &error),
        }

        result.finished_at = Utc::now();
        result.elapsed_ms = elapsed_ms(start);

        persist_summary(&self.output_dir, &mut result);
        result
    }

    async fn run_stages(
        &self,
        unit: &InputUnit,
        name: &str,
        result: &mut TransformResult,
    ) -> Result<PathBuf> {
        let batch = read_unit_async(&unit.path).await?;
        result.records_in = batch.num_rows();
        result.columns_in = batch.num_columns();

        result.state = result.state.advance();
        let redactor = Arc::clone(&self.redactor);
        let (batch, redaction) = tokio::task::spawn_blocking(move || redactor.redact(batch)).await??;
        record_stage(result, StageOutcome::new(Stage::Redact, StageStatus::Applied));
        result.redactions = redaction.redactions;
        result.detector_hits = redaction.detector_hits;
        result.dates_shifted = redaction.dates_shifted;

        result.state = result.state.advance();
        let (batch, enrichment, outcome) = self.geo.enrich(batch).await;
        record_stage(result, outcome);
        result.enrichment = enrichment;

        result.state = result.state.advance();
        let (mut batch, mapping, outcome) = self.vocabulary.map_terms(batch).await;
        record_stage(result, outcome);
        result.mapping = mapping;

        result.state = result.state.advance();
        add_provenance(&mut batch, &unit.file_name());
        result.records_out = batch.num_rows();
        result.columns_out = batch.num_columns();

        let output = self.publish(batch, name).await?;
        record_stage(result, StageOutcome::new(Stage::Write, StageStatus::Applied));
        log_operation_complete("wrote", &output, result.records_out, None);
        Ok(output)
    }

    async fn publish(&self, batch: ClinicalBatch, name: &str) -> Result<PathBuf> {
        let output_dir = self.output_dir.clone();
        let name = name.to_string();
        let format = self.output_format;
        tokio::task::spawn_blocking(move || {
            let record_batch = clinical_to_record_batch(&batch)?;
            publish_output(&output_dir, &name, format, &record_batch)
        })
        .await?
    }
}

/// Write the unit summary; a unit that cannot be audited keeps no output
fn persist_summary(output_dir: &Path, result: &mut TransformResult) {
    let Err(error) = write_unit_summary(output_dir, result) else {
        return;
    };
    fail_unit(result, &error);
    if let Some(output) = result.output.take() {
        retract_output(&output);
    }
}

fn fail_unit(result: &mut TransformResult, error: &TransformError) {
    log::error!(
        "Unit {} failed while {}: {error}",
        result.unit.display(),
        result.state
    );
    if let Some(stage) = stage_for(result.state) {
        result
            .stages
            .push(StageOutcome::new(stage, StageStatus::Failed).with_detail(error.kind()));
    }
    result.state = UnitState::Failed;
    result.error = Some(UnitError::from(error));
}

fn record_stage(result: &mut TransformResult, outcome: StageOutcome) {
    log_stage_outcome(&result.unit, &outcome);
    result.stages.push(outcome);
}

/// Stage that was running in a given state
fn stage_for(state: UnitState) -> Option<Stage> {
    match state {
        UnitState::Redacting => Some(Stage::Redact),
        UnitState::Enriching => Some(Stage::Geo),
        UnitState::Mapping => Some(Stage::Vocabulary),
        UnitState::Writing => Some(Stage::Write),
        _ => None,
    }
}

fn add_provenance(batch: &mut ClinicalBatch, source_file: &str) {
    batch.ensure_column(SOURCE_FILE_COLUMN, ValueKind::Text);
    batch.ensure_column(PIPELINE_COLUMN, ValueKind::Text);
    for record in &mut batch.records {
        record.set(SOURCE_FILE_COLUMN, Value::from(source_file));
        record.set(PIPELINE_COLUMN, Value::from(PIPELINE_NAME));
    }
}

pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
