//! Bronze-to-silver transform for clinical records stored as Parquet.
//!
//! Each input file is redacted of PHI, geographically enriched and mapped to
//! a controlled vocabulary, then published to the silver location with a
//! per-file summary for compliance review.

pub mod async_io;
pub mod config;
pub mod error;
pub mod models;
pub mod processor;
pub mod transform;
pub mod utils;

// Core types
pub use config::{Credentials, EnrichmentCredential, OutputFormat, PiiMode, TransformConfig};
pub use error::{LookupError, Result, TransformError};
pub use processor::{BatchProcessor, CancellationFlag};

// Data model
pub use models::{
    ClinicalBatch, FieldClass, FieldClassifier, InputUnit, Record, RunStatus, RunSummary,
    TransformResult, UnitState, Value,
};

// Stages and their service seams
pub use transform::{
    Concept, GeoEnricher, GeoPlace, GeoQuery, Geocoder, Redactor, TermQuery, TerminologyService,
    TokenSalt, VocabularyMapper,
};

// Arrow types
pub use arrow::record_batch::RecordBatch;

pub use utils::DEFAULT_BATCH_SIZE;
