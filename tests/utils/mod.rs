use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use arrow::array::{ArrayRef, Date32Array, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use clinic_silver::models::ClinicalBatch;
use clinic_silver::utils::io::read_unit;
use clinic_silver::{
    Concept, GeoPlace, GeoQuery, Geocoder, LookupError, TermQuery, TerminologyService,
    TransformConfig,
};
use parquet::arrow::ArrowWriter;

/// Known PHI literals seeded into the fixtures
pub const PHI_LITERALS: &[&str] = &[
    "Jane Doe",
    "John Smith",
    "1980-01-01",
    "1975-06-15",
    "MRN-000123",
    "MRN-000456",
    "jane.doe@example.com",
    "555-867-5309",
];

/// Scratch bronze and silver locations for one test
pub struct Workspace {
    _root: tempfile::TempDir,
    pub bronze: PathBuf,
    pub silver: PathBuf,
}

impl Workspace {
    #[must_use]
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        let bronze = root.path().join("bronze");
        let silver = root.path().join("silver");
        fs::create_dir_all(&bronze).expect("create bronze dir");
        Self {
            _root: root,
            bronze,
            silver,
        }
    }

    /// Test configuration: fixed salt, no progress bars, two workers
    #[must_use]
    pub fn config(&self) -> TransformConfig {
        TransformConfig::new(&self.bronze, &self.silver)
            .with_token_salt("test-salt")
            .with_workers(2)
            .with_progress(false)
    }

    /// Write a record batch as a bronze Parquet file at `relative`
    pub fn write_unit(&self, relative: &str, batch: &RecordBatch) -> PathBuf {
        let path = self.bronze.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create unit dir");
        }
        let file = File::create(&path).expect("create unit file");
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None).expect("open writer");
        writer.write(batch).expect("write batch");
        writer.close().expect("close writer");
        path
    }

    /// Write bytes that are not a Parquet file
    pub fn write_garbage(&self, relative: &str) -> PathBuf {
        let path = self.bronze.join(relative);
        fs::write(&path, b"PAR1 but not really").expect("write garbage");
        path
    }

    #[must_use]
    pub fn flat_output(&self, name: &str) -> PathBuf {
        self.silver.join(format!("{name}.parquet"))
    }

    #[must_use]
    pub fn summary(&self, name: &str) -> PathBuf {
        self.silver.join(format!("{name}.summary.json"))
    }
}

fn text_column(values: &[Option<&str>]) -> ArrayRef {
    Arc::new(StringArray::from(values.to_vec()))
}

/// The single-record example: name, date of birth and city
#[must_use]
pub fn jane_doe_batch() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("name", DataType::Utf8, true),
        Field::new("dob", DataType::Utf8, true),
        Field::new("city", DataType::Utf8, true),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            text_column(&[Some("Jane Doe")]),
            text_column(&[Some("1980-01-01")]),
            text_column(&[Some("Springfield")]),
        ],
    )
    .expect("jane doe batch")
}

/// A wider visit extract with PHI, location, vocabulary and free-text fields
#[must_use]
pub fn visits_batch() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("patient_name", DataType::Utf8, true),
        Field::new("mrn", DataType::Utf8, true),
        Field::new("email", DataType::Utf8, true),
        Field::new("city", DataType::Utf8, true),
        Field::new("state", DataType::Utf8, true),
        Field::new("lat", DataType::Float64, true),
        Field::new("lng", DataType::Float64, true),
        Field::new("diagnosis_code", DataType::Utf8, true),
        Field::new("admission_date", DataType::Date32, true),
        Field::new("notes", DataType::Utf8, true),
    ]));

    // 2024-03-01 and 2024-03-05 as days since the Unix epoch
    let admissions = Date32Array::from(vec![Some(19_783), Some(19_787), None]);

    RecordBatch::try_new(
        schema,
        vec![
            text_column(&[Some("Jane Doe"), Some("John Smith"), Some("Jane Doe")]),
            text_column(&[Some("MRN-000123"), Some("MRN-000456"), Some("MRN-000123")]),
            text_column(&[Some("jane.doe@example.com"), None, None]),
            text_column(&[Some("Springfield"), Some("Boston"), Some("Springfield")]),
            text_column(&[Some("IL"), Some("Massachusetts"), Some("IL")]),
            Arc::new(Float64Array::from(vec![Some(39.78172), Some(42.36008), None])),
            Arc::new(Float64Array::from(vec![Some(-89.65015), Some(-71.05888), None])),
            text_column(&[Some("E11.9"), Some("I10"), Some("E11.9")]),
            Arc::new(admissions),
            text_column(&[
                Some("Call 555-867-5309 to confirm"),
                Some("Routine follow-up"),
                None,
            ]),
        ],
    )
    .expect("visits batch")
}

/// Person columns spelled without separators, as many exports name them
#[must_use]
pub fn concatenated_names_batch() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("firstname", DataType::Utf8, true),
        Field::new("lastname", DataType::Utf8, true),
        Field::new("patientname", DataType::Utf8, true),
        Field::new("fullname", DataType::Utf8, true),
        Field::new("phonenumber", DataType::Utf8, true),
        Field::new("city", DataType::Utf8, true),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            text_column(&[Some("Jane")]),
            text_column(&[Some("Doe")]),
            text_column(&[Some("Jane Doe")]),
            text_column(&[Some("Jane Doe")]),
            text_column(&[Some("555-867-5309")]),
            text_column(&[Some("Springfield")]),
        ],
    )
    .expect("concatenated names batch")
}

/// A batch none of whose columns matches a classification rule
#[must_use]
pub fn unclassifiable_batch() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("foo", DataType::Utf8, true),
        Field::new("bar", DataType::Float64, true),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            text_column(&[Some("x"), Some("y")]),
            Arc::new(Float64Array::from(vec![Some(1.0), Some(2.0)])),
        ],
    )
    .expect("unclassifiable batch")
}

/// Read a published flat output back
#[must_use]
pub fn read_output(path: &Path) -> ClinicalBatch {
    read_unit(path).expect("read published output")
}

/// Every text value of a batch, for literal scans
#[must_use]
pub fn all_text(batch: &ClinicalBatch) -> Vec<String> {
    batch
        .records
        .iter()
        .flat_map(|record| record.iter().filter_map(|(_, value)| value.to_text()))
        .collect()
}

/// How a mock service answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Answer,
    Unavailable,
    /// Answers only after a pause longer than any test timeout
    Slow,
}

/// In-process geocoder counting its calls
pub struct MockGeocoder {
    pub calls: AtomicUsize,
    behaviour: Behaviour,
}

impl MockGeocoder {
    #[must_use]
    pub fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            behaviour,
        })
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn lookup(&self, query: &GeoQuery) -> Result<Option<GeoPlace>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Unavailable => Err(LookupError::Unavailable("connection refused".into())),
            Behaviour::Slow => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(None)
            }
            Behaviour::Answer => Ok(query.city.as_ref().map(|city| GeoPlace {
                region: Some("US-XX".to_string()),
                locality: Some(city.clone()),
            })),
        }
    }
}

/// In-process terminology service with a fixed concept table
pub struct MockTerminology {
    pub calls: AtomicUsize,
    concepts: HashMap<String, Concept>,
}

impl MockTerminology {
    #[must_use]
    pub fn new() -> Arc<Self> {
        let concepts = HashMap::from([
            (
                "E11.9".to_string(),
                Concept {
                    cui: "C0011860".to_string(),
                    name: "Type 2 diabetes mellitus".to_string(),
                    source: "ICD10CM".to_string(),
                },
            ),
            (
                "I10".to_string(),
                Concept {
                    cui: "C0020538".to_string(),
                    name: "Hypertensive disease".to_string(),
                    source: "ICD10CM".to_string(),
                },
            ),
        ]);
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            concepts,
        })
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TerminologyService for MockTerminology {
    fn name(&self) -> &str {
        "mock"
    }

    async fn resolve(&self, query: &TermQuery) -> Result<Option<Concept>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.concepts.get(&query.term).cloned())
    }
}
