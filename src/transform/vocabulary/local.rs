//! Offline resolver over a local UMLS `MRCONSO.RRF` extract

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use super::{Concept, TermQuery, TerminologyService, CPT, ICD10CM, SNOMEDCT_US};
use crate::error::{LookupError, Result, TransformError};

/// Concept names file of a UMLS release
pub const MRCONSO_FILE: &str = "MRCONSO.RRF";

const SOURCES: [&str; 3] = [SNOMEDCT_US, ICD10CM, CPT];

// Column positions in MRCONSO.RRF
const CUI: usize = 0;
const LAT: usize = 1;
const SAB: usize = 11;
const CODE: usize = 13;
const STR: usize = 14;

/// Code and string indexes built from MRCONSO rows
#[derive(Debug, Default)]
pub struct LocalTerminology {
    by_code: FxHashMap<(String, String), Concept>,
    by_string: FxHashMap<String, Concept>,
}

impl LocalTerminology {
    /// Load English rows of the supported source vocabularies
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            TransformError::Configuration(format!("cannot open {}: {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut index = Self::default();
        for line in reader.lines() {
            let line = line?;
            index.insert_row(&line);
        }
        Ok(index)
    }

    fn insert_row(&mut self, line: &str) {
        let fields: Vec<&str> = line.split('|').collect();
        if fields.len() <= STR || fields[LAT] != "ENG" {
            return;
        }
        let sab = fields[SAB];
        if !SOURCES.contains(&sab) {
            return;
        }

        let concept = Concept {
            cui: fields[CUI].to_string(),
            name: fields[STR].to_string(),
            source: sab.to_string(),
        };
        self.by_string
            .entry(fields[STR].to_lowercase())
            .or_insert_with(|| concept.clone());
        self.by_code
            .entry((sab.to_string(), fields[CODE].to_uppercase()))
            .or_insert(concept);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    #[must_use]
    pub fn lookup(&self, query: &TermQuery) -> Option<&Concept> {
        let by_code = query.code_system.and_then(|system| {
            self.by_code
                .get(&(system.to_string(), query.term.to_uppercase()))
        });
        by_code.or_else(|| self.by_string.get(&query.term.to_lowercase()))
    }
}

#[async_trait]
impl TerminologyService for LocalTerminology {
    fn name(&self) -> &str {
        "local"
    }

    async fn resolve(&self, query: &TermQuery) -> std::result::Result<Option<Concept>, LookupError> {
        Ok(self.lookup(query).cloned())
    }
}
