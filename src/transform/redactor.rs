//! PHI redaction
//!
//! Columns classified as PHI lose their values entirely: they become null in
//! remove mode or a salted token in tokenize mode. Unclassified text columns
//! are scanned with the content detectors and only the matched spans are
//! replaced. Optional date shifting then moves every remaining date.

use std::collections::BTreeMap;

use rayon::prelude::*;

use super::detectors::{ContentDetectors, REDACTED_MARKER};
use super::tokenize::TokenSalt;
use crate::config::PiiMode;
use crate::error::{Result, TransformError};
use crate::models::{
    ClinicalBatch, FieldClass, FieldClassifier, Record, RedactionReport, Value, ValueKind,
};

/// Which columns a batch is redacted on
#[derive(Debug, Default)]
struct RedactionPlan {
    phi: Vec<String>,
    scanned: Vec<String>,
    shifted: Vec<String>,
}

/// Counts gathered per record and summed across the batch
#[derive(Debug, Clone)]
struct Counts {
    phi: Vec<usize>,
    scanned: Vec<usize>,
    detectors: Vec<usize>,
    dates_shifted: usize,
}

impl Counts {
    fn new(plan: &RedactionPlan, detectors: usize) -> Self {
        Self {
            phi: vec![0; plan.phi.len()],
            scanned: vec![0; plan.scanned.len()],
            detectors: vec![0; detectors],
            dates_shifted: 0,
        }
    }

    fn merge(mut self, other: Self) -> Self {
        for (a, b) in self.phi.iter_mut().zip(other.phi) {
            *a += b;
        }
        for (a, b) in self.scanned.iter_mut().zip(other.scanned) {
            *a += b;
        }
        for (a, b) in self.detectors.iter_mut().zip(other.detectors) {
            *a += b;
        }
        self.dates_shifted += other.dates_shifted;
        self
    }
}

/// Removes or tokenizes PHI in a clinical batch
#[derive(Debug, Clone)]
pub struct Redactor {
    mode: PiiMode,
    salt: TokenSalt,
    classifier: FieldClassifier,
    detectors: ContentDetectors,
    strict: bool,
    date_shift_days: Option<i64>,
}

impl Redactor {
    pub fn new(mode: PiiMode, salt: TokenSalt) -> Result<Self> {
        Ok(Self {
            mode,
            salt,
            classifier: FieldClassifier::default(),
            detectors: ContentDetectors::compile()?,
            strict: false,
            date_shift_days: None,
        })
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: FieldClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Fail batches where no column can be classified
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    #[must_use]
    pub fn with_date_shift(mut self, days: Option<i64>) -> Self {
        self.date_shift_days = days.filter(|d| *d != 0);
        self
    }

    #[must_use]
    pub fn mode(&self) -> PiiMode {
        self.mode
    }

    fn plan(&self, batch: &ClinicalBatch) -> Result<RedactionPlan> {
        let names = batch.columns().iter().map(|c| c.name.as_str());
        let classified = self.classifier.classify_all(names);

        if self.strict && classified.is_empty() {
            return Err(TransformError::Schema(format!(
                "none of the {} columns matches a classification rule",
                batch.num_columns()
            )));
        }

        let mut plan = RedactionPlan::default();
        for column in batch.columns() {
            let class = classified
                .iter()
                .find(|(name, _)| *name == column.name)
                .map(|(_, class)| *class);

            match class {
                Some(FieldClass::Phi) => plan.phi.push(column.name.clone()),
                None if column.kind == ValueKind::Text => plan.scanned.push(column.name.clone()),
                _ => {}
            }

            if self.date_shift_days.is_some()
                && class != Some(FieldClass::Phi)
                && column.kind.is_temporal()
            {
                plan.shifted.push(column.name.clone());
            }
        }
        Ok(plan)
    }

    /// Redact a batch, returning the redacted batch and its report
    pub fn redact(&self, mut batch: ClinicalBatch) -> Result<(ClinicalBatch, RedactionReport)> {
        let plan = self.plan(&batch)?;

        let counts = batch
            .records
            .par_iter_mut()
            .map(|record| self.redact_record(record, &plan))
            .reduce(|| Counts::new(&plan, self.detectors.len()), Counts::merge);

        if self.mode == PiiMode::Tokenize {
            for name in &plan.phi {
                batch.set_column_kind(name, ValueKind::Text);
            }
        }

        let mut redactions = BTreeMap::new();
        for (name, count) in plan.phi.iter().zip(&counts.phi) {
            if *count > 0 {
                redactions.insert(name.clone(), *count);
            }
        }
        for (name, count) in plan.scanned.iter().zip(&counts.scanned) {
            if *count > 0 {
                redactions.insert(name.clone(), *count);
            }
        }

        let detector_hits = self
            .detectors
            .names()
            .into_iter()
            .zip(&counts.detectors)
            .filter(|(_, hits)| **hits > 0)
            .map(|(name, hits)| (name.to_string(), *hits))
            .collect::<BTreeMap<_, _>>();

        let report = RedactionReport {
            redactions,
            detector_hits,
            dates_shifted: counts.dates_shifted,
            phi_fields: plan.phi,
            scanned_fields: plan.scanned,
        };

        log::debug!(
            "Redacted {} values across {} PHI fields ({} scanned, {} dates shifted)",
            report.total_redactions(),
            report.phi_fields.len(),
            report.scanned_fields.len(),
            report.dates_shifted
        );

        Ok((batch, report))
    }

    fn redact_record(&self, record: &mut Record, plan: &RedactionPlan) -> Counts {
        let mut counts = Counts::new(plan, self.detectors.len());

        for (index, name) in plan.phi.iter().enumerate() {
            let Some(value) = record.get_mut(name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            *value = match self.mode {
                PiiMode::Remove => Value::Null,
                PiiMode::Tokenize => value
                    .to_text()
                    .map_or(Value::Null, |text| Value::Text(self.salt.token(&text))),
            };
            counts.phi[index] += 1;
        }

        for (index, name) in plan.scanned.iter().enumerate() {
            let Some(Value::Text(text)) = record.get_mut(name) else {
                continue;
            };
            let scrubbed = self.detectors.scrub(text, &mut counts.detectors, |span| {
                match self.mode {
                    PiiMode::Remove => REDACTED_MARKER.to_string(),
                    PiiMode::Tokenize => self.salt.token(span),
                }
            });
            if let Some(scrubbed) = scrubbed {
                *text = scrubbed;
                counts.scanned[index] += 1;
            }
        }

        if let Some(days) = self.date_shift_days {
            for name in &plan.shifted {
                if let Some(value) = record.get_mut(name) {
                    if value.kind().is_some_and(ValueKind::is_temporal) {
                        *value = value.shift_days(days);
                        counts.dates_shifted += 1;
                    }
                }
            }
        }

        counts
    }
}
