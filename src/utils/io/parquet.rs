//! Parquet file operations
//!
//! Reading an input unit into a clinical batch and writing an Arrow record
//! batch to a single ZSTD-compressed Parquet file.

use std::fs::File;
use std::path::Path;
use std::time::Instant;

use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

use crate::error::{Result, TransformError};
use crate::models::ClinicalBatch;
use crate::utils::arrow::conversion::record_batches_to_clinical;
use crate::utils::logging::{log_operation_complete, log_operation_start};

/// Default batch size for Parquet reading
pub const DEFAULT_BATCH_SIZE: usize = 16384;

/// Read a Parquet input unit into a clinical batch
///
/// Any failure to open, decode or normalise the file is reported as a read
/// error for the unit.
pub fn read_unit(path: &Path) -> Result<ClinicalBatch> {
    let start = Instant::now();
    log_operation_start("Reading input unit", path);

    let file = File::open(path)
        .map_err(|e| TransformError::read(path, format!("cannot open file: {e}")))?;

    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| TransformError::read(path, format!("not a valid Parquet file: {e}")))?;
    let schema = builder.schema().clone();

    let reader = builder
        .with_batch_size(DEFAULT_BATCH_SIZE)
        .build()
        .map_err(|e| TransformError::read(path, format!("failed to build reader: {e}")))?;

    let batches = reader
        .collect::<std::result::Result<Vec<RecordBatch>, _>>()
        .map_err(|e| TransformError::read(path, format!("failed to read record batch: {e}")))?;

    let clinical = record_batches_to_clinical(&schema, &batches)?;
    log_operation_complete("read", path, clinical.num_rows(), Some(start.elapsed()));
    Ok(clinical)
}

/// Writer properties for silver outputs
pub fn writer_properties() -> Result<WriterProperties> {
    Ok(WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::try_new(3)?))
        .build())
}

/// Write a record batch to a new Parquet file
pub fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path).map_err(|e| TransformError::write(path, e.to_string()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(writer_properties()?))
        .map_err(|e| TransformError::write(path, e.to_string()))?;
    writer
        .write(batch)
        .map_err(|e| TransformError::write(path, e.to_string()))?;
    writer
        .close()
        .map_err(|e| TransformError::write(path, e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};

    use super::*;
    use crate::models::Value;

    #[test]
    fn test_write_then_read_unit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visits.parquet");

        let schema = Arc::new(Schema::new(vec![
            Field::new("city", DataType::Utf8, true),
            Field::new("visits", DataType::Int64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["Springfield", "Boston"])),
                Arc::new(Int64Array::from(vec![1, 2])),
            ],
        )
        .unwrap();

        write_parquet(&path, &batch).unwrap();
        let clinical = read_unit(&path).unwrap();
        assert_eq!(clinical.num_rows(), 2);
        assert_eq!(clinical.records[1].get("city"), &Value::from("Boston"));
    }

    #[test]
    fn test_garbage_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.parquet");
        std::fs::write(&path, b"definitely not parquet").unwrap();

        let err = read_unit(&path).unwrap_err();
        assert_eq!(err.kind(), "read");
    }
}
