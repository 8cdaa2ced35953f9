//! Diff report -- findings grouped into labeled sections.
//!
//! A [`DiffReport`] is what the oracle attaches to a determinism mismatch.
//! Its [`Display`](std::fmt::Display) form is the human-readable text carried
//! by the failure; [`DiffReport::to_json`] gives the same content in a
//! machine-readable shape.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Finding
// ---------------------------------------------------------------------------

/// What kind of discrepancy a finding describes.
///
/// `Ordering` findings mean the content matched but the sequence did not.
/// They still indicate latent nondeterminism but are the weakest signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// Same content, different order.
    Ordering,
    /// A value differs between runs.
    Content,
    /// An entity (player, region, entrance, location, item) exists in only
    /// one run.
    Missing,
}

/// A single reported discrepancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub message: String,
}

impl Finding {
    pub fn new(kind: FindingKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn missing(message: impl Into<String>) -> Self {
        Self::new(FindingKind::Missing, message)
    }

    pub fn content(message: impl Into<String>) -> Self {
        Self::new(FindingKind::Content, message)
    }

    pub fn ordering(message: impl Into<String>) -> Self {
        Self::new(FindingKind::Ordering, message)
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

// ---------------------------------------------------------------------------
// DiffSection / DiffReport
// ---------------------------------------------------------------------------

/// Findings of one comparator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSection {
    pub label: String,
    pub findings: Vec<Finding>,
}

/// Ordered sequence of labeled sections. Empty iff the runs are equivalent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    sections: Vec<DiffSection>,
}

impl DiffReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a section. Sections without findings are dropped.
    pub fn push_section(&mut self, label: impl Into<String>, findings: Vec<Finding>) {
        if findings.is_empty() {
            return;
        }
        self.sections.push(DiffSection {
            label: label.into(),
            findings,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn sections(&self) -> &[DiffSection] {
        &self.sections
    }

    /// Look up a section by label.
    pub fn section(&self, label: &str) -> Option<&DiffSection> {
        self.sections.iter().find(|s| s.label == label)
    }

    /// All findings in report order.
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.sections.iter().flat_map(|s| s.findings.iter())
    }

    pub fn finding_count(&self) -> usize {
        self.sections.iter().map(|s| s.findings.len()).sum()
    }

    /// True if every finding is an ordering finding.
    pub fn only_ordering(&self) -> bool {
        !self.is_empty() && self.findings().all(|f| f.kind == FindingKind::Ordering)
    }

    /// The most severe finding kind in the report.
    pub fn worst_kind(&self) -> Option<FindingKind> {
        self.findings().map(|f| f.kind).max()
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for section in &self.sections {
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(f, "=== {} ===", section.label)?;
            for finding in &section.findings {
                write!(f, "\n{finding}")?;
            }
        }
        Ok(())
    }
}
