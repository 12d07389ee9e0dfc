//! Logging utilities for output and progress tracking
//!
//! Log lines carry field names, counts and paths only. Record values never
//! reach the log.

pub mod log;
pub mod progress;

pub use log::{log_operation_complete, log_operation_start, log_stage_outcome, log_warning};
pub use progress::{create_spinner, create_unit_progress_bar, finish_progress_bar};
