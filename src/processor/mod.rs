//! Batch processor
//!
//! Discovers bronze input units and runs each through
//! Redactor -> Geo Enricher -> Vocabulary Mapper -> publish. Units are
//! independent: a failing unit is recorded and the run carries on. Up to
//! `workers` units are in flight at once.

pub mod cancel;
pub mod unit;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt};

pub use cancel::CancellationFlag;
pub use unit::{PIPELINE_COLUMN, PIPELINE_NAME, SOURCE_FILE_COLUMN, UnitPipeline};

use crate::async_io::discover_units;
use crate::config::{Credentials, TransformConfig};
use crate::error::{Result, TransformError};
use crate::error::util::ensure_output_directory;
use crate::models::{
    EnrichmentMode, InputUnit, RunSummary, UnitError, UnitState, UnitSummary, output_collisions,
};
use crate::transform::{
    GeoEnricher, Geocoder, Redactor, TerminologyService, TokenSalt, VocabularyMapper,
};
use crate::utils::io::write_run_summary;
use crate::utils::logging::{
    create_spinner, create_unit_progress_bar, finish_progress_bar, log_warning,
};
use self::unit::elapsed_ms;

/// Runs the bronze-to-silver transform over a directory of input units
pub struct BatchProcessor {
    config: TransformConfig,
    credentials: Credentials,
    geocoder: Option<Arc<dyn Geocoder>>,
    terminology: Option<Arc<dyn TerminologyService>>,
    cancellation: CancellationFlag,
}

impl BatchProcessor {
    /// Credentials are resolved once by the caller and shared by all units
    #[must_use]
    pub fn new(config: TransformConfig, credentials: Credentials) -> Self {
        Self {
            config,
            credentials,
            geocoder: None,
            terminology: None,
            cancellation: CancellationFlag::new(),
        }
    }

    /// Use this geocoder instead of the HTTP client; enables full-fidelity enrichment
    #[must_use]
    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    /// Use this resolver instead of the UMLS client or a local index
    #[must_use]
    pub fn with_terminology(mut self, terminology: Arc<dyn TerminologyService>) -> Self {
        self.terminology = Some(terminology);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.cancellation = cancellation;
        self
    }

    #[must_use]
    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancellation
    }

    /// Build the shared stages for this run
    fn build_pipeline(&self) -> Result<UnitPipeline> {
        let config = &self.config;

        let salt = TokenSalt::from_config(config.token_salt.as_deref());
        let redactor = Redactor::new(config.pii_mode, salt)?
            .with_classifier(config.classifier.clone())
            .with_strict(config.strict_schema)
            .with_date_shift(config.date_shift_days);

        let geo = match &self.geocoder {
            Some(geocoder) => GeoEnricher::offline(&config.geo).with_geocoder(Arc::clone(geocoder)),
            None => GeoEnricher::from_credential(&config.geo, self.credentials.geo.as_ref())?,
        }
        .with_classifier(config.classifier.clone());

        let vocabulary = match &self.terminology {
            Some(service) => {
                VocabularyMapper::disabled(&config.vocabulary)?.with_service(Arc::clone(service))
            }
            None => {
                VocabularyMapper::from_config(&config.vocabulary, self.credentials.vocabulary.as_ref())?
            }
        }
        .with_classifier(config.classifier.clone());

        if geo.mode() == EnrichmentMode::Degraded {
            log_warning("No geocoding credential; geo enrichment runs degraded", None);
        }
        if !vocabulary.is_enabled() {
            log_warning("No terminology credential; vocabulary mapping is skipped", None);
        }

        Ok(UnitPipeline::new(
            redactor,
            geo,
            vocabulary,
            config.output_dir.clone(),
            config.output_format,
            config.date_shift_days.filter(|d| *d != 0),
        ))
    }

    /// Run the transform once over every discovered unit
    ///
    /// Only configuration problems, an undiscoverable input location, or an
    /// unwritable run summary fail the run itself. Everything that goes
    /// wrong inside a unit is reported in that unit's summary.
    pub async fn run(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let start = Instant::now();
        let config = &self.config;

        config.validate()?;
        ensure_output_directory(&config.output_dir)?;

        let spinner = create_spinner("Discovering input units", config.show_progress);
        let units = discover_units(&config.input_dir).await?;
        finish_progress_bar(
            &spinner,
            Some(format!("Found {} input units", units.len()).as_str()),
        );

        if units.is_empty() {
            log::info!("No input units found in {}", config.input_dir.display());
            let summary = RunSummary::no_work(started_at, elapsed_ms(start));
            write_run_summary(&config.output_dir, &summary)?;
            return Ok(summary);
        }

        log::info!(
            "Transforming {} input units with {} workers ({} mode, {} output)",
            units.len(),
            config.workers,
            config.pii_mode,
            config.output_format
        );

        let collisions = output_collisions(&units);
        for (name, claimants) in &collisions {
            log::error!(
                "Output name {} is claimed by {} units ({}); none of them will be written",
                name,
                claimants.len(),
                claimants.join(", ")
            );
        }

        let pipeline = self.build_pipeline()?;
        let pb = create_unit_progress_bar(units.len() as u64, config.show_progress);

        let lines = stream::iter(units)
            .map(|unit| {
                let pipeline = &pipeline;
                let pb = &pb;
                let name = unit.output_name();
                let collision = collisions
                    .get(&name)
                    .map(|units| TransformError::OutputCollision {
                        name: name.clone(),
                        units: units.clone(),
                    });
                async move {
                    let line = self.process_unit(pipeline, unit, collision).await;
                    pb.inc(1);
                    line
                }
            })
            .buffer_unordered(config.workers)
            .collect::<Vec<_>>()
            .await;

        finish_progress_bar(&pb, Some("Transform complete"));

        let summary = RunSummary::from_units(lines, started_at, elapsed_ms(start));
        let path = write_run_summary(&config.output_dir, &summary)?;

        log::info!(
            "Run {:?}: {} succeeded ({} degraded), {} failed, {} skipped; summary at {}",
            summary.status,
            summary.succeeded,
            summary.degraded,
            summary.failed,
            summary.skipped,
            path.display()
        );
        Ok(summary)
    }

    async fn process_unit(
        &self,
        pipeline: &UnitPipeline,
        unit: InputUnit,
        collision: Option<TransformError>,
    ) -> UnitSummary {
        // A colliding unit gets no output and no unit summary, both of which would be shared
        if let Some(error) = collision {
            return UnitSummary {
                unit: unit.relative,
                state: UnitState::Failed,
                degraded: false,
                output: None,
                error: Some(UnitError::from(&error)),
            };
        }
        if self.cancellation.is_cancelled() {
            log::info!("Skipping {} after cancellation", unit);
            return UnitSummary {
                unit: unit.relative,
                state: UnitState::Skipped,
                degraded: false,
                output: None,
                error: Some(UnitError::from(&TransformError::Cancelled)),
            };
        }
        let result = pipeline.process(&unit).await;
        UnitSummary::from(&result)
    }
}
