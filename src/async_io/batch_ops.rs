//! Async Parquet reading of a single input unit

use std::path::Path;
use std::time::Instant;

use futures::TryStreamExt;
use parquet::arrow::async_reader::ParquetRecordBatchStreamBuilder;
use tokio::fs::File;

use crate::error::{Result, TransformError};
use crate::models::ClinicalBatch;
use crate::utils::DEFAULT_BATCH_SIZE;
use crate::utils::arrow::conversion::record_batches_to_clinical;
use crate::utils::logging::{log_operation_complete, log_operation_start};

/// Read a Parquet input unit asynchronously into a clinical batch
///
/// Open, decode and type-normalisation failures all surface as a read or
/// schema error for the unit; they never abort the run.
pub async fn read_unit_async(path: &Path) -> Result<ClinicalBatch> {
    let start = Instant::now();
    log_operation_start("Reading input unit", path);

    let file = File::open(path)
        .await
        .map_err(|e| TransformError::read(path, format!("cannot open file: {e}")))?;

    let builder = ParquetRecordBatchStreamBuilder::new(file)
        .await
        .map_err(|e| TransformError::read(path, format!("not a valid Parquet file: {e}")))?;
    let schema = builder.schema().clone();

    let stream = builder
        .with_batch_size(DEFAULT_BATCH_SIZE)
        .build()
        .map_err(|e| TransformError::read(path, format!("failed to build reader: {e}")))?;

    let batches = stream
        .try_collect::<Vec<_>>()
        .await
        .map_err(|e| TransformError::read(path, format!("failed to read record batch: {e}")))?;

    let clinical = record_batches_to_clinical(&schema, &batches)?;
    log_operation_complete("read", path, clinical.num_rows(), Some(start.elapsed()));
    Ok(clinical)
}
