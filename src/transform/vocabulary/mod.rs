//! Controlled-vocabulary mapping
//!
//! Resolves the raw terms and codes of vocabulary-bearing fields to UMLS
//! concepts and writes them next to the original value as `<field>_cui`
//! and `<field>_concept`. The raw value is never touched. Without a
//! resolver the stage is skipped and the batch passes through unchanged.

pub mod local;
pub mod umls;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use rustc_hash::FxHashMap;

pub use local::{LocalTerminology, MRCONSO_FILE};
pub use umls::UmlsClient;

use super::FailureTracker;
use crate::config::{EnrichmentCredential, VocabularyConfig};
use crate::error::{LookupError, Result, TransformError};
use crate::models::{
    ClinicalBatch, FieldClass, FieldClassifier, FieldMapping, MappingReport, MappingStatus, Stage,
    StageOutcome, StageStatus, Value, ValueKind,
};

/// Suffix of the derived concept identifier column
pub const CUI_SUFFIX: &str = "_cui";
/// Suffix of the derived preferred-name column
pub const CONCEPT_SUFFIX: &str = "_concept";

/// Source vocabularies a code can be recognised as
pub const ICD10CM: &str = "ICD10CM";
pub const CPT: &str = "CPT";
pub const SNOMEDCT_US: &str = "SNOMEDCT_US";

/// Recognises which source vocabulary a raw code belongs to
#[derive(Debug, Clone)]
pub struct CodeShapes {
    shapes: Vec<(&'static str, Regex)>,
}

impl CodeShapes {
    pub fn compile() -> Result<Self> {
        let shapes = [
            (ICD10CM, r"^[A-TV-Z]\d{2}(\.\d{1,4})?$"),
            (CPT, r"^\d{5}$"),
            (SNOMEDCT_US, r"^\d{6,18}$"),
        ]
        .into_iter()
        .map(|(system, pattern)| {
            Regex::new(pattern).map(|regex| (system, regex)).map_err(|e| {
                TransformError::Configuration(format!("Invalid {system} code pattern: {e}"))
            })
        })
        .collect::<Result<Vec<_>>>()?;
        Ok(Self { shapes })
    }

    /// Source vocabulary of a code-shaped term
    #[must_use]
    pub fn detect(&self, term: &str) -> Option<&'static str> {
        let upper = term.to_uppercase();
        self.shapes
            .iter()
            .find(|(_, regex)| regex.is_match(&upper))
            .map(|(system, _)| *system)
    }
}

/// A raw term to resolve
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TermQuery {
    /// Trimmed raw value
    pub term: String,
    /// Source vocabulary when the term looks like a code
    pub code_system: Option<&'static str>,
}

impl TermQuery {
    #[must_use]
    pub fn is_code(&self) -> bool {
        self.code_system.is_some()
    }
}

/// A resolved UMLS concept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Concept {
    pub cui: String,
    pub name: String,
    /// Source vocabulary the match came from
    pub source: String,
}

/// Terminology resolver
#[async_trait]
pub trait TerminologyService: Send + Sync {
    /// Short label recorded in the mapping report
    fn name(&self) -> &str;

    /// Resolve a term; `Ok(None)` is a miss
    async fn resolve(&self, query: &TermQuery) -> std::result::Result<Option<Concept>, LookupError>;
}

/// Vocabulary mapping stage
pub struct VocabularyMapper {
    classifier: FieldClassifier,
    service: Option<Arc<dyn TerminologyService>>,
    shapes: CodeShapes,
    timeout: Duration,
    failure_threshold: usize,
}

impl VocabularyMapper {
    /// A mapper with no resolver; every batch is skipped
    pub fn disabled(config: &VocabularyConfig) -> Result<Self> {
        Ok(Self {
            classifier: FieldClassifier::default(),
            service: None,
            shapes: CodeShapes::compile()?,
            timeout: config.timeout,
            failure_threshold: config.failure_threshold,
        })
    }

    /// Pick a resolver: the UMLS API with a credential, otherwise a local
    /// `MRCONSO.RRF` extract when one is configured, otherwise none
    pub fn from_config(
        config: &VocabularyConfig,
        credential: Option<&EnrichmentCredential>,
    ) -> Result<Self> {
        let mapper = Self::disabled(config)?;

        if let Some(credential) = credential {
            let client = UmlsClient::new(&config.endpoint, credential, config.timeout)?;
            return Ok(mapper.with_service(Arc::new(client)));
        }

        match config.local_data_path.as_deref().map(|dir| dir.join(MRCONSO_FILE)) {
            Some(path) if path.is_file() => {
                let local = LocalTerminology::load(&path)?;
                log::info!(
                    "Loaded {} local concept entries from {}",
                    local.len(),
                    path.display()
                );
                Ok(mapper.with_service(Arc::new(local)))
            }
            Some(path) => {
                log::warn!(
                    "No {MRCONSO_FILE} at {}; vocabulary mapping needs a credential",
                    path.parent().unwrap_or(Path::new(".")).display()
                );
                Ok(mapper)
            }
            None => Ok(mapper),
        }
    }

    #[must_use]
    pub fn with_service(mut self, service: Arc<dyn TerminologyService>) -> Self {
        self.service = Some(service);
        self
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: FieldClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.service.is_some()
    }

    fn query(&self, value: &Value) -> Option<TermQuery> {
        let term = value.to_text()?.trim().to_string();
        if term.is_empty() {
            return None;
        }
        let code_system = self.shapes.detect(&term);
        Some(TermQuery { term, code_system })
    }

    fn vocabulary_fields(&self, batch: &ClinicalBatch) -> Vec<String> {
        let names: Vec<&str> = batch.columns().iter().map(|c| c.name.as_str()).collect();
        names
            .iter()
            .filter(|name| {
                // Derived columns of a field that is itself mapped
                let derived = [CUI_SUFFIX, CONCEPT_SUFFIX].into_iter().any(|suffix| {
                    name.strip_suffix(suffix)
                        .is_some_and(|stem| names.contains(&stem))
                });
                !derived && self.classifier.classify(name) == Some(FieldClass::Vocabulary)
            })
            .map(|name| (*name).to_string())
            .collect()
    }

    /// Map the vocabulary fields of a batch
    pub async fn map_terms(
        &self,
        mut batch: ClinicalBatch,
    ) -> (ClinicalBatch, MappingReport, StageOutcome) {
        let mut report = MappingReport::default();

        let Some(service) = &self.service else {
            let outcome = StageOutcome::new(Stage::Vocabulary, StageStatus::Skipped)
                .with_detail("no terminology credential or local index");
            return (batch, report, outcome);
        };
        report.source = Some(service.name().to_string());

        let fields = self.vocabulary_fields(&batch);
        if fields.is_empty() {
            report.status = MappingStatus::Applied;
            let outcome = StageOutcome::new(Stage::Vocabulary, StageStatus::NotApplicable)
                .with_detail("no vocabulary fields");
            return (batch, report, outcome);
        }

        for field in &fields {
            batch.ensure_column(&format!("{field}{CUI_SUFFIX}"), ValueKind::Text);
            batch.ensure_column(&format!("{field}{CONCEPT_SUFFIX}"), ValueKind::Text);
        }

        let mut tracker = FailureTracker::new("terminology service", self.failure_threshold);
        let mut cache: FxHashMap<String, std::result::Result<Option<Concept>, LookupError>> =
            FxHashMap::default();

        for field in &fields {
            let cui_column = format!("{field}{CUI_SUFFIX}");
            let concept_column = format!("{field}{CONCEPT_SUFFIX}");
            let mut counts = FieldMapping::default();

            for record in &mut batch.records {
                let Some(query) = self.query(record.get(field)) else {
                    continue;
                };

                let cached = cache.get(&query.term).cloned();
                let resolved = match cached {
                    Some(cached) => cached,
                    None if tracker.is_tripped() => {
                        counts.misses += 1;
                        continue;
                    }
                    None => {
                        report.lookups += 1;
                        let result = self.resolve_once(service.as_ref(), &query).await;
                        match &result {
                            Ok(_) => tracker.record_success(),
                            Err(error) => {
                                log::debug!("Lookup of {:?} failed: {error}", query.term);
                                if tracker.record_failure(error) {
                                    log::warn!(
                                        "Terminology service unavailable after {} consecutive failures; passing the rest of the unit through",
                                        self.failure_threshold
                                    );
                                }
                            }
                        }
                        cache.insert(query.term.clone(), result.clone());
                        result
                    }
                };

                match resolved {
                    Ok(Some(concept)) => {
                        record.set(&cui_column, Value::Text(concept.cui));
                        record.set(&concept_column, Value::Text(concept.name));
                        counts.hits += 1;
                    }
                    Ok(None) | Err(_) => counts.misses += 1,
                }
            }

            report.hits += counts.hits;
            report.misses += counts.misses;
            report.per_field.insert(field.clone(), counts);
        }

        log::debug!(
            "Vocabulary mapping via {}: {} hits, {} misses, {} lookups",
            service.name(),
            report.hits,
            report.misses,
            report.lookups
        );

        let outcome = match tracker.error() {
            Some(error) => {
                report.status = MappingStatus::Failed;
                StageOutcome::new(Stage::Vocabulary, StageStatus::Failed).with_detail(error.to_string())
            }
            None => {
                report.status = MappingStatus::Applied;
                StageOutcome::new(Stage::Vocabulary, StageStatus::Applied)
            }
        };
        (batch, report, outcome)
    }

    async fn resolve_once(
        &self,
        service: &dyn TerminologyService,
        query: &TermQuery,
    ) -> std::result::Result<Option<Concept>, LookupError> {
        tokio::time::timeout(self.timeout, service.resolve(query))
            .await
            .unwrap_or_else(|_| {
                Err(LookupError::Unavailable(format!(
                    "timed out after {:?}",
                    self.timeout
                )))
            })
    }
}
