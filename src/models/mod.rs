//! Data model for the bronze-to-silver stage

pub mod classify;
pub mod record;
pub mod result;
pub mod run;
pub mod unit;
pub mod value;

pub use classify::{FieldClass, FieldClassifier, LocationKind};
pub use record::{ClinicalBatch, Column, Record};
pub use result::{
    EnrichmentMode, EnrichmentReport, FieldMapping, MappingReport, MappingStatus,
    RedactionReport, Stage, StageOutcome, StageStatus, TransformResult, UnitError,
};
pub use run::{RunStatus, RunSummary, UnitSummary};
pub use unit::{InputUnit, UnitState, output_collisions};
pub use value::{Value, ValueKind};
