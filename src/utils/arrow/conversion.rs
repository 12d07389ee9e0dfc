//! Conversion between Arrow record batches and clinical batches
//!
//! Input columns are normalised to a handful of Arrow types on the way in
//! (all integers to `Int64`, floats to `Float64`, dates to `Date32`,
//! timestamps to microsecond precision keeping their time zone) and written
//! back from the effective kind of each column. A value the normalised type
//! cannot hold is a schema error, never a silent null.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::compute::{CastOptions, cast_with_options};
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema, TimeUnit};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use chrono::{Datelike, NaiveDate};

use crate::error::{Result, TransformError};
use crate::models::{ClinicalBatch, Column, Record, Value, ValueKind};

/// Days between 0001-01-01 (CE day 1) and the Unix epoch
const UNIX_EPOCH_FROM_CE: i32 = 719_163;

/// Kind and normalised Arrow type for an input column type
#[must_use]
pub fn kind_for_data_type(data_type: &DataType) -> (ValueKind, DataType) {
    match data_type {
        DataType::Boolean => (ValueKind::Boolean, DataType::Boolean),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => (ValueKind::Integer, DataType::Int64),
        DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _) => (ValueKind::Float, DataType::Float64),
        DataType::Date32 | DataType::Date64 => (ValueKind::Date, DataType::Date32),
        DataType::Timestamp(_, tz) => (
            ValueKind::Timestamp,
            DataType::Timestamp(TimeUnit::Microsecond, tz.clone()),
        ),
        _ => (ValueKind::Text, DataType::Utf8),
    }
}

/// Arrow type written for a value kind
#[must_use]
pub fn data_type_for_kind(kind: ValueKind) -> DataType {
    match kind {
        ValueKind::Boolean => DataType::Boolean,
        ValueKind::Integer => DataType::Int64,
        ValueKind::Float => DataType::Float64,
        ValueKind::Text => DataType::Utf8,
        ValueKind::Date => DataType::Date32,
        ValueKind::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
    }
}

/// Convert the record batches of one input unit into a clinical batch
pub fn record_batches_to_clinical(schema: &Schema, batches: &[RecordBatch]) -> Result<ClinicalBatch> {
    let mut columns = Vec::with_capacity(schema.fields().len());
    let mut targets = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let (kind, target) = kind_for_data_type(field.data_type());
        let timezone = match &target {
            DataType::Timestamp(_, Some(tz)) => Some(tz.to_string()),
            _ => None,
        };
        columns.push(Column::new(field.name().as_str(), kind).with_timezone(timezone));
        targets.push(target);
    }

    let options = CastOptions {
        safe: false,
        ..Default::default()
    };

    let total_rows = batches.iter().map(RecordBatch::num_rows).sum();
    let mut records = Vec::with_capacity(total_rows);

    for batch in batches {
        let offset = records.len();
        records.extend((0..batch.num_rows()).map(|_| Record::new()));

        for ((column, target), array) in columns.iter().zip(&targets).zip(batch.columns()) {
            let normalised = cast_with_options(array, target, &options).map_err(|e| {
                TransformError::Schema(format!(
                    "Column '{}' of type {} cannot be read: {e}",
                    column.name,
                    array.data_type()
                ))
            })?;
            let values = array_values(&column.name, column.kind, &normalised)?;
            for (row, value) in values.into_iter().enumerate() {
                if !value.is_null() {
                    records[offset + row].set(&column.name, value);
                }
            }
        }
    }

    Ok(ClinicalBatch::new(columns, records))
}

fn array_values(name: &str, kind: ValueKind, array: &ArrayRef) -> Result<Vec<Value>> {
    let mismatch = || TransformError::Schema(format!("Column '{name}' has an unexpected layout"));
    let len = array.len();

    let values = match kind {
        ValueKind::Text => {
            let strings = array.as_string_opt::<i32>().ok_or_else(mismatch)?;
            (0..len)
                .map(|i| {
                    if strings.is_null(i) {
                        Value::Null
                    } else {
                        Value::Text(strings.value(i).to_string())
                    }
                })
                .collect()
        }
        ValueKind::Integer => {
            let ints = array.as_primitive_opt::<Int64Type>().ok_or_else(mismatch)?;
            (0..len)
                .map(|i| {
                    if ints.is_null(i) {
                        Value::Null
                    } else {
                        Value::Integer(ints.value(i))
                    }
                })
                .collect()
        }
        ValueKind::Float => {
            let floats = array.as_primitive_opt::<Float64Type>().ok_or_else(mismatch)?;
            (0..len)
                .map(|i| {
                    if floats.is_null(i) {
                        Value::Null
                    } else {
                        Value::Float(floats.value(i))
                    }
                })
                .collect()
        }
        ValueKind::Boolean => {
            let bools = array.as_boolean_opt().ok_or_else(mismatch)?;
            (0..len)
                .map(|i| {
                    if bools.is_null(i) {
                        Value::Null
                    } else {
                        Value::Boolean(bools.value(i))
                    }
                })
                .collect()
        }
        ValueKind::Date => {
            let dates = array
                .as_any()
                .downcast_ref::<Date32Array>()
                .ok_or_else(mismatch)?;
            (0..len)
                .map(|i| {
                    if dates.is_null(i) {
                        Value::Null
                    } else {
                        date32_to_naive(dates.value(i)).map_or(Value::Null, Value::Date)
                    }
                })
                .collect()
        }
        ValueKind::Timestamp => {
            let stamps = array
                .as_any()
                .downcast_ref::<TimestampMicrosecondArray>()
                .ok_or_else(mismatch)?;
            (0..len)
                .map(|i| {
                    if stamps.is_null(i) {
                        Value::Null
                    } else {
                        stamps.value_as_datetime(i).map_or(Value::Null, Value::Timestamp)
                    }
                })
                .collect()
        }
    };
    Ok(values)
}

/// Convert Arrow Date32 days since the epoch to a `NaiveDate`
#[must_use]
pub fn date32_to_naive(days_since_epoch: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days_since_epoch.checked_add(UNIX_EPOCH_FROM_CE)?)
}

/// Convert a `NaiveDate` to Arrow Date32 days since the epoch
#[must_use]
pub fn naive_to_date32(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_FROM_CE
}

/// Convert a clinical batch back into a single Arrow record batch
pub fn clinical_to_record_batch(batch: &ClinicalBatch) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());

    for column in batch.columns() {
        let kind = batch.effective_kind(column);
        let (data_type, array) = match (kind, column.timezone.as_deref()) {
            (ValueKind::Timestamp, Some(tz)) => {
                let stamps = timestamp_array(batch, &column.name).with_timezone(tz);
                (stamps.data_type().clone(), Arc::new(stamps) as ArrayRef)
            }
            _ => (data_type_for_kind(kind), build_array(batch, &column.name, kind)),
        };
        fields.push(Field::new(column.name.as_str(), data_type, true));
        arrays.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    Ok(RecordBatch::try_new_with_options(schema, arrays, &options)?)
}

fn build_array(batch: &ClinicalBatch, name: &str, kind: ValueKind) -> ArrayRef {
    let values = batch.records.iter().map(|r| r.get(name));

    match kind {
        ValueKind::Text => Arc::new(values.map(Value::to_text).collect::<StringArray>()),
        ValueKind::Integer => Arc::new(
            values
                .map(|v| match v {
                    Value::Integer(i) => Some(*i),
                    _ => None,
                })
                .collect::<Int64Array>(),
        ),
        ValueKind::Float => Arc::new(values.map(Value::as_f64).collect::<Float64Array>()),
        ValueKind::Boolean => Arc::new(
            values
                .map(|v| match v {
                    Value::Boolean(b) => Some(*b),
                    _ => None,
                })
                .collect::<BooleanArray>(),
        ),
        ValueKind::Date => Arc::new(
            values
                .map(|v| match v {
                    Value::Date(d) => Some(naive_to_date32(*d)),
                    _ => None,
                })
                .collect::<Date32Array>(),
        ),
        ValueKind::Timestamp => Arc::new(timestamp_array(batch, name)),
    }
}

fn timestamp_array(batch: &ClinicalBatch, name: &str) -> TimestampMicrosecondArray {
    batch
        .records
        .iter()
        .map(|r| match r.get(name) {
            Value::Timestamp(ts) => Some(ts.and_utc().timestamp_micros()),
            _ => None,
        })
        .collect()
}
