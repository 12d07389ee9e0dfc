//! Arrow data handling utilities

pub mod conversion;

pub use conversion::{clinical_to_record_batch, record_batches_to_clinical};
