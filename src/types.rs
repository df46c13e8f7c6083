//! Shared types passed between stages.
//!
//! The rename map is written as JSON by `doctidy rename --json`; the reports
//! derive serde traits so they can be dumped the same way.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Original image file name → content-addressed file name.
///
/// Only valid for the renamer run that produced it.
pub type RenameMap = BTreeMap<String, String>;

/// What happened to one document during a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentOutcome {
    pub path: PathBuf,
    /// Image references rewritten to content-addressed names.
    pub references_rewritten: usize,
    /// Whether normalization changed the text.
    pub normalized: bool,
    /// Error message if processing this document failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentOutcome {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Result of a batch run over the whole source tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub renamed: RenameMap,
    pub documents: Vec<DocumentOutcome>,
}

impl BatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &DocumentOutcome> {
        self.documents.iter().filter(|d| d.is_failure())
    }

    pub fn rewritten_count(&self) -> usize {
        self.documents
            .iter()
            .filter(|d| d.references_rewritten > 0)
            .count()
    }

    pub fn normalized_count(&self) -> usize {
        self.documents.iter().filter(|d| d.normalized).count()
    }
}
