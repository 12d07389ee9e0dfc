//! Content detectors for PHI embedded in free text

use regex::Regex;

use crate::error::{Result, TransformError};

/// Replacement written over a matched span in remove mode
pub const REDACTED_MARKER: &str = "[REDACTED]";

const PATTERNS: &[(&str, &str)] = &[
    ("mrn", r"(?i)\bMRN[:#]?\s*\d+\b"),
    ("email", r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"),
    ("ssn", r"\b\d{3}-\d{2}-\d{4}\b"),
    ("date", r"\b(?:\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{2,4})\b"),
    ("phone", r"(?:\+1[-.\s]?)?(?:\(\d{3}\)\s?|\b\d{3}[-.\s])\d{3}[-.\s]\d{4}\b"),
    ("ip", r"\b(?:\d{1,3}\.){3}\d{1,3}\b"),
    ("mac", r"\b(?:[0-9A-Fa-f]{2}[:-]){5}[0-9A-Fa-f]{2}\b"),
];

/// A named regular-expression detector
#[derive(Debug, Clone)]
pub struct Detector {
    pub name: &'static str,
    regex: Regex,
}

/// The ordered set of detectors applied to unclassified text
#[derive(Debug, Clone)]
pub struct ContentDetectors {
    detectors: Vec<Detector>,
}

impl ContentDetectors {
    /// Compile the built-in detectors
    pub fn compile() -> Result<Self> {
        let detectors = PATTERNS
            .iter()
            .map(|&(name, pattern)| {
                Regex::new(pattern)
                    .map(|regex| Detector { name, regex })
                    .map_err(|e| {
                        TransformError::Configuration(format!("Invalid {name} detector: {e}"))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { detectors })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name).collect()
    }

    /// Replace every detected span in `text`
    ///
    /// `replace` maps a matched span to its replacement. Match counts are
    /// added to `hits`, indexed like the detectors. Returns `None` when
    /// nothing matched.
    pub fn scrub<F>(&self, text: &str, hits: &mut [usize], replace: F) -> Option<String>
    where
        F: Fn(&str) -> String,
    {
        let mut current: Option<String> = None;

        for (index, detector) in self.detectors.iter().enumerate() {
            let source = current.as_deref().unwrap_or(text);
            let count = detector.regex.find_iter(source).count();
            if count == 0 {
                continue;
            }
            hits[index] += count;
            let replaced = detector
                .regex
                .replace_all(source, |caps: &regex::Captures<'_>| replace(&caps[0]))
                .into_owned();
            current = Some(replaced);
        }

        current
    }
}
