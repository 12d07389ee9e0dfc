//! IO utilities for file operations
//!
//! Parquet reading and writing, staged publishing of outputs, and the
//! JSON summary documents.

pub mod parquet;
pub mod publish;
pub mod summary;

pub use parquet::{read_unit, write_parquet};
pub use publish::{StagingArea, output_path, publish_output, retract_output};
pub use summary::{summary_path, write_run_summary, write_unit_summary};
