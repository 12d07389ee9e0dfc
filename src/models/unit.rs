//! Input units and their processing state

use std::fmt;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// One discovered bronze file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputUnit {
    /// Absolute or caller-relative path to the file
    pub path: PathBuf,
    /// Path relative to the bronze root, used for deterministic output names
    pub relative: PathBuf,
    pub discovered_at: DateTime<Utc>,
}

impl InputUnit {
    #[must_use]
    pub fn new(root: &Path, path: PathBuf) -> Self {
        let relative = path
            .strip_prefix(root)
            .map_or_else(|_| PathBuf::from(path.file_name().unwrap_or_default()), Path::to_path_buf);
        Self {
            path,
            relative,
            discovered_at: Utc::now(),
        }
    }

    /// File name of the unit, used for the `source_file` provenance column
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Deterministic output name derived from the unit's identity:
    /// `silver_<stem>` or `silver_<dir>__<dir>__<stem>` for nested files
    #[must_use]
    pub fn output_name(&self) -> String {
        let stem = self
            .relative
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let dirs = self
            .relative
            .parent()
            .into_iter()
            .flat_map(Path::components)
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect_vec();

        if dirs.is_empty() {
            format!("silver_{stem}")
        } else {
            format!("silver_{}__{stem}", dirs.join("__"))
        }
    }
}

/// Output names claimed by more than one unit, with the claiming units in discovery order
#[must_use]
pub fn output_collisions(units: &[InputUnit]) -> FxHashMap<String, Vec<String>> {
    let mut claims: FxHashMap<String, Vec<String>> = FxHashMap::default();
    for unit in units {
        claims
            .entry(unit.output_name())
            .or_default()
            .push(unit.relative.display().to_string());
    }
    claims.retain(|_, claimants| claimants.len() > 1);
    claims
}

impl fmt::Display for InputUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relative.display())
    }
}

/// Per-unit state machine:
/// `Discovered -> Redacting -> Enriching -> Mapping -> Writing -> {Completed | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Discovered,
    Redacting,
    Enriching,
    Mapping,
    Writing,
    Completed,
    Failed,
    /// Never started because the run was cancelled
    Skipped,
}

impl UnitState {
    /// The next state on success. Terminal states stay put.
    #[must_use]
    pub fn advance(self) -> Self {
        match self {
            Self::Discovered => Self::Redacting,
            Self::Redacting => Self::Enriching,
            Self::Enriching => Self::Mapping,
            Self::Mapping => Self::Writing,
            Self::Writing => Self::Completed,
            terminal => terminal,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Discovered => "discovered",
            Self::Redacting => "redacting",
            Self::Enriching => "enriching",
            Self::Mapping => "mapping",
            Self::Writing => "writing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(label)
    }
}
