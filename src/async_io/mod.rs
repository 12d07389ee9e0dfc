//! Async discovery and reading of bronze input units

pub mod batch_ops;
pub mod file_ops;

pub use batch_ops::read_unit_async;
pub use file_ops::discover_units;
