//! Field classification table
//!
//! Every column is classified once per batch from its name. Names are split
//! into lower-case segments (`patientFirstName` -> `patient first name`) and
//! a rule matches when its own segments appear contiguously. The longest
//! matching rule wins; ties go to PHI, then vocabulary, then location.
//! Explicit per-field overrides beat every rule.

use std::collections::HashMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Location sub-kinds understood by the geo enricher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    City,
    County,
    State,
    Country,
    Latitude,
    Longitude,
}

/// Classification of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldClass {
    /// Identifying; the whole value is removed or tokenized
    Phi,
    /// Location-bearing; read by the geo enricher
    Location(LocationKind),
    /// Clinical code or term; resolved by the vocabulary mapper
    Vocabulary,
}

impl FieldClass {
    fn priority(self) -> u8 {
        match self {
            Self::Phi => 0,
            Self::Vocabulary => 1,
            Self::Location(_) => 2,
        }
    }
}

/// A single name-pattern rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    segments: Vec<String>,
    pub class: FieldClass,
}

impl FieldRule {
    #[must_use]
    pub fn new(pattern: &str, class: FieldClass) -> Self {
        Self {
            segments: split_segments(pattern),
            class,
        }
    }

    /// Number of name segments covered when the rule matches
    fn matches(&self, name_segments: &[String]) -> Option<usize> {
        let width = self.segments.len();
        if width == 0 || width > name_segments.len() {
            return None;
        }
        name_segments
            .windows(width)
            .any(|window| window == self.segments.as_slice())
            .then_some(width)
    }
}

const PHI_PATTERNS: &[&str] = &[
    "name",
    "first name",
    "last name",
    "surname",
    "given name",
    "full name",
    "dob",
    "birth",
    "birthdate",
    "ssn",
    "social security",
    "mrn",
    "medical record",
    "patient id",
    "phone",
    "tel",
    "mobile",
    "fax",
    "email",
    "address",
    "street",
    "zip",
    "zipcode",
    "postcode",
    "postal",
    "license",
    "passport",
    "account",
    "ip address",
    "device id",
    "mac address",
    "npi",
    "insurance id",
    "member id",
    // Concatenated spellings that do not split into segments
    "firstname",
    "lastname",
    "middlename",
    "maidenname",
    "familyname",
    "givenname",
    "fullname",
    "patientname",
    "dateofbirth",
    "birthday",
    "patientid",
    "medicalrecordnumber",
    "phonenumber",
    "phoneno",
    "telephone",
    "cellphone",
    "emailaddress",
    "streetaddress",
    "homeaddress",
    "mailingaddress",
    "accountnumber",
    "licensenumber",
    "ipaddress",
    "deviceid",
    "macaddress",
    "insuranceid",
    "memberid",
];

const LOCATION_PATTERNS: &[(&str, LocationKind)] = &[
    ("city", LocationKind::City),
    ("town", LocationKind::City),
    ("municipality", LocationKind::City),
    ("county", LocationKind::County),
    ("state", LocationKind::State),
    ("province", LocationKind::State),
    ("country", LocationKind::Country),
    ("lat", LocationKind::Latitude),
    ("latitude", LocationKind::Latitude),
    ("lon", LocationKind::Longitude),
    ("lng", LocationKind::Longitude),
    ("longitude", LocationKind::Longitude),
];

const VOCABULARY_PATTERNS: &[&str] = &[
    "icd", "icd10", "snomed", "cpt", "hcpcs", "loinc", "rxnorm", "diagnosis", "procedure",
    "condition", "medication", "code",
];

/// Split a field name into lower-case segments on separators and camelCase boundaries
#[must_use]
pub fn split_segments(name: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for ch in name.chars() {
        if ch == '_' || ch == '-' || ch == '.' || ch.is_whitespace() {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            segments.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        current.extend(ch.to_lowercase());
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Configuration-driven classification table
#[derive(Debug, Clone)]
pub struct FieldClassifier {
    rules: Vec<FieldRule>,
    overrides: HashMap<String, Option<FieldClass>>,
}

impl Default for FieldClassifier {
    fn default() -> Self {
        let rules = PHI_PATTERNS
            .iter()
            .map(|p| FieldRule::new(p, FieldClass::Phi))
            .chain(
                LOCATION_PATTERNS
                    .iter()
                    .map(|(p, kind)| FieldRule::new(p, FieldClass::Location(*kind))),
            )
            .chain(
                VOCABULARY_PATTERNS
                    .iter()
                    .map(|p| FieldRule::new(p, FieldClass::Vocabulary)),
            )
            .collect_vec();

        Self {
            rules,
            overrides: HashMap::new(),
        }
    }
}

impl FieldClassifier {
    /// A classifier with no rules at all
    #[must_use]
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            overrides: HashMap::new(),
        }
    }

    /// Add a name-pattern rule
    #[must_use]
    pub fn with_rule(mut self, pattern: &str, class: FieldClass) -> Self {
        self.rules.push(FieldRule::new(pattern, class));
        self
    }

    /// Pin a field (by exact name, case-insensitive) to a class, or to
    /// no class with `None`
    #[must_use]
    pub fn with_override(mut self, field: &str, class: Option<FieldClass>) -> Self {
        self.overrides.insert(field.to_lowercase(), class);
        self
    }

    /// Classify a field name
    #[must_use]
    pub fn classify(&self, field: &str) -> Option<FieldClass> {
        if let Some(class) = self.overrides.get(&field.to_lowercase()) {
            return *class;
        }

        let segments = split_segments(field);
        self.rules
            .iter()
            .filter_map(|rule| rule.matches(&segments).map(|width| (width, rule.class)))
            .max_by(|(wa, ca), (wb, cb)| {
                wa.cmp(wb)
                    .then_with(|| cb.priority().cmp(&ca.priority()))
            })
            .map(|(_, class)| class)
    }

    /// Classify every name and keep the ones with a class
    #[must_use]
    pub fn classify_all<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Vec<(&'a str, FieldClass)> {
        names
            .into_iter()
            .filter_map(|name| self.classify(name).map(|class| (name, class)))
            .collect()
    }
}
