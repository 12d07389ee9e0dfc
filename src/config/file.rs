//! TOML configuration file
//!
//! ```toml
//! input_dir = "data/bronze"
//! output_dir = "data/silver"
//! pii_mode = "tokenize"
//! output_format = "versioned"
//!
//! [geo]
//! timeout_ms = 2000
//! failure_threshold = 3
//!
//! [classification]
//! phi = ["guardian"]
//!
//! [classification.overrides]
//! country_code = "country"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::{OutputFormat, PiiMode, TransformConfig};
use crate::error::{Result, TransformError};
use crate::models::{FieldClass, FieldClassifier, LocationKind};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub pii_mode: Option<PiiMode>,
    pub output_format: Option<OutputFormat>,
    pub strict_schema: Option<bool>,
    pub token_salt: Option<String>,
    pub date_shift_days: Option<i64>,
    pub workers: Option<usize>,
    pub show_progress: Option<bool>,
    #[serde(default)]
    pub geo: GeoSection,
    #[serde(default)]
    pub vocabulary: VocabularySection,
    #[serde(default)]
    pub classification: ClassificationSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeoSection {
    pub endpoint: Option<String>,
    pub timeout_ms: Option<u64>,
    pub failure_threshold: Option<usize>,
    pub coordinate_precision: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VocabularySection {
    pub endpoint: Option<String>,
    pub timeout_ms: Option<u64>,
    pub failure_threshold: Option<usize>,
    pub local_data_path: Option<PathBuf>,
}

/// Extra name patterns per class and exact-name overrides
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassificationSection {
    #[serde(default)]
    pub phi: Vec<String>,
    #[serde(default)]
    pub vocabulary: Vec<String>,
    /// Pattern -> location kind (`city`, `state`, `latitude`, ...)
    #[serde(default)]
    pub location: BTreeMap<String, String>,
    /// Field name -> class label, or `none` to leave it unclassified
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
}

impl ConfigFile {
    /// Read and parse a configuration file
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            TransformError::Configuration(format!(
                "Failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| TransformError::Configuration(format!("Invalid config file: {e}")))
    }

    /// Overlay the file's settings on `config`
    pub fn apply(self, mut config: TransformConfig) -> Result<TransformConfig> {
        if let Some(dir) = self.input_dir {
            config.input_dir = dir;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(mode) = self.pii_mode {
            config.pii_mode = mode;
        }
        if let Some(format) = self.output_format {
            config.output_format = format;
        }
        if let Some(strict) = self.strict_schema {
            config.strict_schema = strict;
        }
        if self.token_salt.is_some() {
            config.token_salt = self.token_salt;
        }
        if self.date_shift_days.is_some() {
            config.date_shift_days = self.date_shift_days;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(show) = self.show_progress {
            config.show_progress = show;
        }

        if let Some(endpoint) = self.geo.endpoint {
            config.geo.endpoint = endpoint;
        }
        if let Some(ms) = self.geo.timeout_ms {
            config.geo.timeout = Duration::from_millis(ms);
        }
        if let Some(threshold) = self.geo.failure_threshold {
            config.geo.failure_threshold = threshold;
        }
        if let Some(precision) = self.geo.coordinate_precision {
            config.geo.coordinate_precision = precision;
        }

        if let Some(endpoint) = self.vocabulary.endpoint {
            config.vocabulary.endpoint = endpoint;
        }
        if let Some(ms) = self.vocabulary.timeout_ms {
            config.vocabulary.timeout = Duration::from_millis(ms);
        }
        if let Some(threshold) = self.vocabulary.failure_threshold {
            config.vocabulary.failure_threshold = threshold;
        }
        if self.vocabulary.local_data_path.is_some() {
            config.vocabulary.local_data_path = self.vocabulary.local_data_path;
        }

        config.classifier = self.classification.extend(config.classifier)?;
        Ok(config)
    }
}

impl ClassificationSection {
    fn extend(self, mut classifier: FieldClassifier) -> Result<FieldClassifier> {
        for pattern in &self.phi {
            classifier = classifier.with_rule(pattern, FieldClass::Phi);
        }
        for pattern in &self.vocabulary {
            classifier = classifier.with_rule(pattern, FieldClass::Vocabulary);
        }
        for (pattern, kind) in &self.location {
            let kind = parse_location_kind(kind)?;
            classifier = classifier.with_rule(pattern, FieldClass::Location(kind));
        }
        for (field, label) in &self.overrides {
            classifier = classifier.with_override(field, parse_class_label(label)?);
        }
        Ok(classifier)
    }
}

fn parse_location_kind(label: &str) -> Result<LocationKind> {
    match label.trim().to_lowercase().as_str() {
        "city" => Ok(LocationKind::City),
        "county" => Ok(LocationKind::County),
        "state" => Ok(LocationKind::State),
        "country" => Ok(LocationKind::Country),
        "latitude" | "lat" => Ok(LocationKind::Latitude),
        "longitude" | "lon" | "lng" => Ok(LocationKind::Longitude),
        other => Err(TransformError::Configuration(format!(
            "Unknown location kind '{other}'"
        ))),
    }
}

fn parse_class_label(label: &str) -> Result<Option<FieldClass>> {
    match label.trim().to_lowercase().as_str() {
        "none" => Ok(None),
        "phi" => Ok(Some(FieldClass::Phi)),
        "vocabulary" => Ok(Some(FieldClass::Vocabulary)),
        other => parse_location_kind(other).map(|kind| Some(FieldClass::Location(kind))),
    }
}
