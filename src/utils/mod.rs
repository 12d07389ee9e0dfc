//! Utilities shared by the pipeline stages
//!
//! Arrow conversion, Parquet and summary IO, and logging helpers.

pub mod arrow;
pub mod io;
pub mod logging;

pub use io::parquet::DEFAULT_BATCH_SIZE;
