//! The three transform stages applied to every input unit, in order:
//! redaction, geographic enrichment and vocabulary mapping.

pub mod detectors;
pub mod geo;
pub mod redactor;
pub mod tokenize;
pub mod vocabulary;

pub use geo::{GeoEnricher, GeoPlace, GeoQuery, Geocoder};
pub use redactor::Redactor;
pub use tokenize::TokenSalt;
pub use vocabulary::{Concept, TermQuery, TerminologyService, VocabularyMapper};

use crate::error::{LookupError, TransformError};

/// Counts consecutive dependency failures of an external service
///
/// Unresolvable answers and successes reset the count. Once the count
/// reaches the threshold the tracker stays tripped for the rest of the unit.
#[derive(Debug, Clone)]
pub struct FailureTracker {
    service: &'static str,
    threshold: usize,
    consecutive: usize,
    last_error: Option<String>,
    tripped: bool,
}

impl FailureTracker {
    #[must_use]
    pub fn new(service: &'static str, threshold: usize) -> Self {
        Self {
            service,
            threshold: threshold.max(1),
            consecutive: 0,
            last_error: None,
            tripped: false,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Record a failed lookup; returns whether the tracker just tripped
    pub fn record_failure(&mut self, error: &LookupError) -> bool {
        if !error.is_dependency_failure() {
            self.consecutive = 0;
            return false;
        }
        self.consecutive += 1;
        self.last_error = Some(error.to_string());
        if !self.tripped && self.consecutive >= self.threshold {
            self.tripped = true;
            return true;
        }
        false
    }

    #[must_use]
    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    /// The dependency error once tripped
    #[must_use]
    pub fn error(&self) -> Option<TransformError> {
        self.tripped.then(|| TransformError::DependencyUnavailable {
            service: self.service.to_string(),
            failures: self.consecutive,
            last_error: self.last_error.clone().unwrap_or_default(),
        })
    }
}
