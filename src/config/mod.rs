//! Configuration for the bronze-to-silver transform.

pub mod credentials;
pub mod file;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::util::{ensure_disjoint_locations, validate_input_directory};
use crate::error::{Result, TransformError};
use crate::models::FieldClassifier;

pub use credentials::{Credentials, EnrichmentCredential};

/// Environment variable naming an optional TOML configuration file
pub const CONFIG_PATH_VAR: &str = "CLINIC_CONFIG";

/// How PHI-bearing values are neutralised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiMode {
    /// Replace with null
    #[default]
    Remove,
    /// Replace with a salted, non-reversible token
    Tokenize,
}

impl FromStr for PiiMode {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "remove" => Ok(Self::Remove),
            "tokenize" | "tokenise" => Ok(Self::Tokenize),
            other => Err(TransformError::Configuration(format!(
                "Unknown PII mode '{other}' (expected remove or tokenize)"
            ))),
        }
    }
}

impl fmt::Display for PiiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remove => f.write_str("remove"),
            Self::Tokenize => f.write_str("tokenize"),
        }
    }
}

/// Output layout for each unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// A single Parquet file per unit
    #[default]
    Flat,
    /// A table directory with a data part and a commit log
    Versioned,
}

impl FromStr for OutputFormat {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "flat" | "flat-columnar" | "parquet" => Ok(Self::Flat),
            "versioned" | "versioned-table" | "delta" => Ok(Self::Versioned),
            other => Err(TransformError::Configuration(format!(
                "Unknown output format '{other}' (expected flat or versioned)"
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flat => f.write_str("flat"),
            Self::Versioned => f.write_str("versioned"),
        }
    }
}

/// Geo enricher settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoConfig {
    /// Base URL of a Nominatim-compatible geocoding API
    pub endpoint: String,
    /// Per-call timeout
    pub timeout: Duration,
    /// Consecutive dependency failures before the stage gives up for a unit
    pub failure_threshold: usize,
    /// Decimal places kept on latitude and longitude
    pub coordinate_precision: u32,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://us1.locationiq.com/v1".to_string(),
            timeout: Duration::from_secs(5),
            failure_threshold: 5,
            coordinate_precision: 2,
        }
    }
}

/// Vocabulary mapper settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabularyConfig {
    /// Base URL of the UMLS UTS REST API
    pub endpoint: String,
    pub timeout: Duration,
    pub failure_threshold: usize,
    /// Directory holding a local `MRCONSO.RRF` extract
    pub local_data_path: Option<PathBuf>,
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://uts-ws.nlm.nih.gov/rest".to_string(),
            timeout: Duration::from_secs(10),
            failure_threshold: 5,
            local_data_path: None,
        }
    }
}

/// Configuration for a transform run
#[derive(Debug, Clone)]
pub struct TransformConfig {
    /// Bronze location scanned for `*.parquet` units
    pub input_dir: PathBuf,
    /// Silver location receiving outputs and summaries
    pub output_dir: PathBuf,
    pub pii_mode: PiiMode,
    pub output_format: OutputFormat,
    /// Fail a unit when none of its columns can be classified
    pub strict_schema: bool,
    /// Fixed tokenization salt; a random per-run salt is used when absent
    pub token_salt: Option<String>,
    /// Shift remaining dates by this many days after redaction
    pub date_shift_days: Option<i64>,
    /// Units processed concurrently
    pub workers: usize,
    pub show_progress: bool,
    pub geo: GeoConfig,
    pub vocabulary: VocabularyConfig,
    pub classifier: FieldClassifier,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data/bronze"),
            output_dir: PathBuf::from("data/silver"),
            pii_mode: PiiMode::default(),
            output_format: OutputFormat::default(),
            strict_schema: false,
            token_salt: None,
            date_shift_days: None,
            workers: num_cpus::get(),
            show_progress: true,
            geo: GeoConfig::default(),
            vocabulary: VocabularyConfig::default(),
            classifier: FieldClassifier::default(),
        }
    }
}

impl TransformConfig {
    /// Create a configuration for the given bronze and silver locations
    #[must_use]
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_pii_mode(mut self, mode: PiiMode) -> Self {
        self.pii_mode = mode;
        self
    }

    #[must_use]
    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    #[must_use]
    pub fn with_strict_schema(mut self, strict: bool) -> Self {
        self.strict_schema = strict;
        self
    }

    #[must_use]
    pub fn with_token_salt(mut self, salt: impl Into<String>) -> Self {
        self.token_salt = Some(salt.into());
        self
    }

    #[must_use]
    pub fn with_date_shift_days(mut self, days: i64) -> Self {
        self.date_shift_days = Some(days);
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    #[must_use]
    pub fn with_geo(mut self, geo: GeoConfig) -> Self {
        self.geo = geo;
        self
    }

    #[must_use]
    pub fn with_vocabulary(mut self, vocabulary: VocabularyConfig) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: FieldClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Check option combinations and the bronze/silver locations
    pub fn validate(&self) -> Result<()> {
        validate_input_directory(&self.input_dir)?;

        if self.output_dir.as_os_str().is_empty() {
            return Err(TransformError::Configuration(
                "Output directory is not configured".to_string(),
            ));
        }
        ensure_disjoint_locations(&self.input_dir, &self.output_dir)?;

        if self.workers == 0 {
            return Err(TransformError::Configuration(
                "Worker count must be at least 1".to_string(),
            ));
        }
        if self.geo.failure_threshold == 0 || self.vocabulary.failure_threshold == 0 {
            return Err(TransformError::Configuration(
                "Consecutive failure threshold must be at least 1".to_string(),
            ));
        }
        if self.geo.timeout.is_zero() || self.vocabulary.timeout.is_zero() {
            return Err(TransformError::Configuration(
                "Per-call timeout must be greater than zero".to_string(),
            ));
        }
        if self.geo.coordinate_precision > 6 {
            return Err(TransformError::Configuration(format!(
                "Coordinate precision {} keeps street-level detail (maximum 6)",
                self.geo.coordinate_precision
            )));
        }
        if matches!(&self.token_salt, Some(salt) if salt.is_empty()) {
            return Err(TransformError::Configuration(
                "Token salt must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Defaults, then the optional TOML file, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => file::ConfigFile::read(path)?.apply(Self::default())?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())
    }

    /// Overlay environment settings resolved through `lookup`
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("CLINIC_BRONZE_DIR") {
            self.input_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("CLINIC_SILVER_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(mode) = get("CLINIC_PII_MODE") {
            self.pii_mode = mode.parse()?;
        }
        if let Some(format) = get("CLINIC_OUTPUT_FORMAT") {
            self.output_format = format.parse()?;
        }
        if let Some(workers) = get("CLINIC_WORKERS") {
            self.workers = parse_number("CLINIC_WORKERS", &workers)?;
        }
        if let Some(ms) = get("CLINIC_GEO_TIMEOUT_MS") {
            self.geo.timeout = Duration::from_millis(parse_number("CLINIC_GEO_TIMEOUT_MS", &ms)?);
        }
        if let Some(threshold) = get("CLINIC_GEO_FAILURE_THRESHOLD") {
            self.geo.failure_threshold = parse_number("CLINIC_GEO_FAILURE_THRESHOLD", &threshold)?;
        }
        if let Some(ms) = get("CLINIC_VOCAB_TIMEOUT_MS") {
            self.vocabulary.timeout =
                Duration::from_millis(parse_number("CLINIC_VOCAB_TIMEOUT_MS", &ms)?);
        }
        if let Some(days) = get("CLINIC_DATE_SHIFT_DAYS") {
            self.date_shift_days = Some(parse_number("CLINIC_DATE_SHIFT_DAYS", &days)?);
        }
        if let Some(salt) = get("CLINIC_TOKEN_SALT") {
            self.token_salt = Some(salt);
        }
        if let Some(path) = get("UMLS_DATA_PATH") {
            self.vocabulary.local_data_path = Some(PathBuf::from(path));
        }
        Ok(self)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        TransformError::Configuration(format!("{key} must be a number, got '{value}'"))
    })
}
