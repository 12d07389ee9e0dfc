//! Geographic enrichment
//!
//! Derives `region`, `locality` and `geo_source` from the raw location
//! fields of each record. With a geocoding credential every distinct
//! location is looked up once per unit; without one the offline gazetteer
//! answers at lower fidelity. Latitude and longitude are coarsened before
//! any lookup and in the output.

pub mod gazetteer;
pub mod http;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustc_hash::FxHashMap;

pub use gazetteer::Gazetteer;
pub use http::HttpGeocoder;

use super::FailureTracker;
use crate::config::{EnrichmentCredential, GeoConfig};
use crate::error::{LookupError, Result};
use crate::models::{
    ClinicalBatch, EnrichmentMode, EnrichmentReport, FieldClass, FieldClassifier, LocationKind,
    Record, Stage, StageOutcome, StageStatus, Value, ValueKind,
};

/// Derived region column (`US-IL`, or a country code)
pub const REGION_COLUMN: &str = "region";
/// Derived locality column
pub const LOCALITY_COLUMN: &str = "locality";
/// Which path produced the derived columns (`api` or `offline`)
pub const GEO_SOURCE_COLUMN: &str = "geo_source";

/// Location fields of one record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoQuery {
    pub city: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    /// Coarsened latitude and longitude
    pub coordinates: Option<(f64, f64)>,
}

impl GeoQuery {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.city.is_none()
            && self.county.is_none()
            && self.state.is_none()
            && self.country.is_none()
            && self.coordinates.is_none()
    }

    /// Free-text form used for forward geocoding
    #[must_use]
    pub fn text(&self) -> String {
        [&self.city, &self.county, &self.state, &self.country]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// De-duplication key; equal keys give equal answers
    #[must_use]
    pub fn cache_key(&self) -> String {
        let text = gazetteer::normalize_name(&self.text());
        match self.coordinates {
            Some((lat, lng)) => format!("{text}|{lat},{lng}"),
            None => text,
        }
    }
}

/// A resolved place
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoPlace {
    pub region: Option<String>,
    pub locality: Option<String>,
}

/// External geocoding service
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve a query; `Ok(None)` means the service found nothing
    async fn lookup(&self, query: &GeoQuery) -> std::result::Result<Option<GeoPlace>, LookupError>;
}

/// Column names by location kind
#[derive(Debug, Default)]
struct LocationColumns {
    city: Option<String>,
    county: Option<String>,
    state: Option<String>,
    country: Option<String>,
    latitude: Option<String>,
    longitude: Option<String>,
}

impl LocationColumns {
    fn from_batch(batch: &ClinicalBatch, classifier: &FieldClassifier) -> Self {
        let mut columns = Self::default();
        for column in batch.columns() {
            if is_derived_column(&column.name) {
                continue;
            }
            let Some(FieldClass::Location(kind)) = classifier.classify(&column.name) else {
                continue;
            };
            let slot = match kind {
                LocationKind::City => &mut columns.city,
                LocationKind::County => &mut columns.county,
                LocationKind::State => &mut columns.state,
                LocationKind::Country => &mut columns.country,
                LocationKind::Latitude => &mut columns.latitude,
                LocationKind::Longitude => &mut columns.longitude,
            };
            slot.get_or_insert_with(|| column.name.clone());
        }
        columns
    }

    fn is_empty(&self) -> bool {
        self.city.is_none()
            && self.county.is_none()
            && self.state.is_none()
            && self.country.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
    }

    fn query(&self, record: &Record) -> GeoQuery {
        let text = |column: &Option<String>| {
            column
                .as_deref()
                .and_then(|name| record.get(name).to_text())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let number = |column: &Option<String>| {
            column
                .as_deref()
                .and_then(|name| record.get(name).as_f64())
        };

        GeoQuery {
            city: text(&self.city),
            county: text(&self.county),
            state: text(&self.state),
            country: text(&self.country),
            coordinates: number(&self.latitude).zip(number(&self.longitude)),
        }
    }
}

fn is_derived_column(name: &str) -> bool {
    matches!(name, REGION_COLUMN | LOCALITY_COLUMN | GEO_SOURCE_COLUMN)
}

/// Round to `precision` decimal places
#[must_use]
pub fn coarsen(value: f64, precision: u32) -> f64 {
    let factor = 10_f64.powi(i32::try_from(precision).unwrap_or(6));
    (value * factor).round() / factor
}

/// Geographic enrichment stage
pub struct GeoEnricher {
    classifier: FieldClassifier,
    geocoder: Option<Arc<dyn Geocoder>>,
    gazetteer: Gazetteer,
    timeout: Duration,
    failure_threshold: usize,
    precision: u32,
}

impl GeoEnricher {
    /// An enricher using the offline gazetteer only
    #[must_use]
    pub fn offline(config: &GeoConfig) -> Self {
        Self {
            classifier: FieldClassifier::default(),
            geocoder: None,
            gazetteer: Gazetteer::default(),
            timeout: config.timeout,
            failure_threshold: config.failure_threshold,
            precision: config.coordinate_precision,
        }
    }

    /// Full fidelity with a credential, degraded to the gazetteer without one
    pub fn from_credential(
        config: &GeoConfig,
        credential: Option<&EnrichmentCredential>,
    ) -> Result<Self> {
        let enricher = Self::offline(config);
        match credential {
            Some(credential) => {
                let geocoder = HttpGeocoder::new(&config.endpoint, credential, config.timeout)?;
                Ok(enricher.with_geocoder(Arc::new(geocoder)))
            }
            None => Ok(enricher),
        }
    }

    #[must_use]
    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: FieldClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    #[must_use]
    pub fn mode(&self) -> EnrichmentMode {
        if self.geocoder.is_some() {
            EnrichmentMode::Full
        } else {
            EnrichmentMode::Degraded
        }
    }

    /// Enrich a batch; never drops a record
    pub async fn enrich(
        &self,
        mut batch: ClinicalBatch,
    ) -> (ClinicalBatch, EnrichmentReport, StageOutcome) {
        let mut report = EnrichmentReport {
            mode: self.mode(),
            ..EnrichmentReport::default()
        };

        let columns = LocationColumns::from_batch(&batch, &self.classifier);
        if columns.is_empty() {
            let outcome = StageOutcome::new(Stage::Geo, StageStatus::NotApplicable)
                .with_detail("no location fields");
            return (batch, report, outcome);
        }

        let invalid_coordinates = self.coarsen_coordinates(&mut batch, &columns, &mut report);

        batch.ensure_column(REGION_COLUMN, ValueKind::Text);
        batch.ensure_column(LOCALITY_COLUMN, ValueKind::Text);
        batch.ensure_column(GEO_SOURCE_COLUMN, ValueKind::Text);

        let queries: Vec<GeoQuery> = batch.records.iter().map(|r| columns.query(r)).collect();

        let outcome = match &self.geocoder {
            Some(geocoder) => {
                self.enrich_online(geocoder.as_ref(), &mut batch, &queries, &mut report)
                    .await
            }
            None => self.enrich_offline(&mut batch, &queries, &mut report),
        };

        // Records that only lost an invalid coordinate still count as failed lookups
        for (row, query) in queries.iter().enumerate() {
            if query.is_empty() && invalid_coordinates[row] {
                report.attempted += 1;
                report.failures += 1;
            }
        }

        log::debug!(
            "Geo enrichment ({:?}): {} attempted, {} enriched, {} failures",
            report.mode,
            report.attempted,
            report.enriched,
            report.failures
        );
        (batch, report, outcome)
    }

    /// Round valid coordinates in place and null invalid ones; returns
    /// which rows had an invalid coordinate
    fn coarsen_coordinates(
        &self,
        batch: &mut ClinicalBatch,
        columns: &LocationColumns,
        report: &mut EnrichmentReport,
    ) -> Vec<bool> {
        let mut invalid = vec![false; batch.num_rows()];

        for (column, limit) in [(&columns.latitude, 90.0), (&columns.longitude, 180.0)] {
            let Some(name) = column else {
                continue;
            };
            for (row, record) in batch.records.iter_mut().enumerate() {
                let Some(value) = record.get_mut(name) else {
                    continue;
                };
                if value.is_null() {
                    continue;
                }
                match value.as_f64() {
                    Some(v) if v.is_finite() && v.abs() <= limit => {
                        *value = Value::Float(coarsen(v, self.precision));
                        report.coordinates_coarsened += 1;
                    }
                    _ => {
                        *value = Value::Null;
                        invalid[row] = true;
                    }
                }
            }
            batch.set_column_kind(name, ValueKind::Float);
        }
        invalid
    }

    async fn enrich_online(
        &self,
        geocoder: &dyn Geocoder,
        batch: &mut ClinicalBatch,
        queries: &[GeoQuery],
        report: &mut EnrichmentReport,
    ) -> StageOutcome {
        let mut tracker = FailureTracker::new("geocoder", self.failure_threshold);
        let mut answers: FxHashMap<String, Option<GeoPlace>> = FxHashMap::default();

        for (record, query) in batch.records.iter_mut().zip(queries) {
            if query.is_empty() {
                continue;
            }
            report.attempted += 1;

            if tracker.is_tripped() {
                report.failures += 1;
                continue;
            }

            let key = query.cache_key();
            let cached = answers.get(&key).cloned();
            let answer = match cached {
                Some(answer) => answer,
                None => {
                    report.lookups += 1;
                    let result = tokio::time::timeout(self.timeout, geocoder.lookup(query))
                        .await
                        .unwrap_or_else(|_| {
                            Err(LookupError::Unavailable(format!(
                                "timed out after {:?}",
                                self.timeout
                            )))
                        });
                    match result {
                        Ok(answer) => {
                            tracker.record_success();
                            answers.insert(key, answer.clone());
                            answer
                        }
                        Err(error) => {
                            if tracker.record_failure(&error) {
                                log::warn!(
                                    "Geocoder unavailable after {} consecutive failures; passing the rest of the unit through",
                                    self.failure_threshold
                                );
                            }
                            None
                        }
                    }
                }
            };

            match answer {
                Some(place) => {
                    apply_place(record, place, "api");
                    report.enriched += 1;
                }
                None => report.failures += 1,
            }
        }

        match tracker.error() {
            Some(error) => {
                report.dependency_unavailable = true;
                StageOutcome::new(Stage::Geo, StageStatus::Failed).with_detail(error.to_string())
            }
            None => StageOutcome::new(Stage::Geo, StageStatus::Applied),
        }
    }

    fn enrich_offline(
        &self,
        batch: &mut ClinicalBatch,
        queries: &[GeoQuery],
        report: &mut EnrichmentReport,
    ) -> StageOutcome {
        for (record, query) in batch.records.iter_mut().zip(queries) {
            if query.is_empty() {
                continue;
            }
            report.attempted += 1;
            match self.gazetteer.resolve(query) {
                Some(place) => {
                    apply_place(record, place, "offline");
                    report.enriched += 1;
                }
                None => report.failures += 1,
            }
        }
        StageOutcome::new(Stage::Geo, StageStatus::Degraded)
            .with_detail("no geocoding credential; offline gazetteer")
    }
}

fn apply_place(record: &mut Record, place: GeoPlace, source: &str) {
    record.set(REGION_COLUMN, place.region.into());
    record.set(LOCALITY_COLUMN, place.locality.into());
    record.set(GEO_SOURCE_COLUMN, Value::from(source));
}
