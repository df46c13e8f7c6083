//! Batch processing of a whole documentation tree.
//!
//! One run does four things, in this order:
//!
//! ```text
//! 1. List     *.rst under root                           (before anything moves)
//! 2. Rename   image_dir/*        →  <sha1><ext>          (sequential, must finish first)
//! 3. Rewrite  *.rst references   →  new base names       (per document, parallel)
//! 4. Format   *.rst              →  normalized text      (per document, parallel)
//! ```
//!
//! The document walk comes first so an unreadable tree fails the run while
//! the images still carry the names the documents use. Renaming then has to
//! complete before any document is touched: the rename map is what the
//! rewrite step works from. Documents are independent of each other and fan
//! out over the rayon pool.
//!
//! ## Index documents
//!
//! Documents whose file name is in the index set (`index.rst` by default)
//! are normalized but their references are left alone. Index pages hold the
//! toctree and site-level images that are managed by hand.
//!
//! ## Failure isolation
//!
//! A document that cannot be read, parsed, or written is logged and recorded
//! in its [`DocumentOutcome`]; the rest of the batch carries on. Only a
//! rename failure aborts the run.

use crate::config::{ProjectConfig, ProjectPaths};
use crate::document::Document;
use crate::naming;
use crate::registry;
use crate::rename::{self, RenameError};
use crate::types::{BatchReport, DocumentOutcome, RenameMap};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("directory does not exist: {0}")]
    MissingDirectory(PathBuf),
    #[error("image rename failed: {0}")]
    Rename(#[from] RenameError),
    #[error("failed to walk document tree: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Progress events emitted while a batch runs.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    /// One image got its content-addressed name.
    Renamed { from: String, to: String },
    /// Renaming is done; `count` documents are about to be processed.
    DocumentsStarted { count: usize },
    /// A document finished, successfully or not. Arrives in completion order.
    DocumentProcessed { outcome: DocumentOutcome },
}

/// Rename images, then rewrite and normalize every document under a root.
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    root: PathBuf,
    image_dir: PathBuf,
    index_documents: Vec<String>,
    exclude: Vec<String>,
}

impl BatchProcessor {
    /// Create a processor for `root` (documents) and `image_dir` (images).
    ///
    /// Both directories must exist. Index and exclude sets start at the
    /// stock configuration values.
    pub fn new(root: impl Into<PathBuf>, image_dir: impl Into<PathBuf>) -> Result<Self, BatchError> {
        let root = root.into();
        let image_dir = image_dir.into();
        for dir in [&root, &image_dir] {
            if !dir.is_dir() {
                return Err(BatchError::MissingDirectory(dir.clone()));
            }
        }
        let defaults = ProjectConfig::default();
        Ok(Self {
            root,
            image_dir,
            index_documents: defaults.index_documents,
            exclude: defaults.exclude,
        })
    }

    /// Processor for a configured project.
    pub fn from_config(paths: &ProjectPaths, config: &ProjectConfig) -> Result<Self, BatchError> {
        Ok(Self::new(&paths.source, &paths.images)?
            .with_index_documents(config.index_documents.clone())
            .with_exclude(config.exclude.clone()))
    }

    pub fn with_index_documents(mut self, names: Vec<String>) -> Self {
        self.index_documents = names;
        self
    }

    pub fn with_exclude(mut self, names: Vec<String>) -> Self {
        self.exclude = names;
        self
    }

    /// Every document the batch would process, sorted.
    pub fn documents(&self) -> Result<Vec<PathBuf>, BatchError> {
        Ok(registry::find_documents(&self.root, &self.exclude)?)
    }

    fn is_index(&self, path: &Path) -> bool {
        path.file_name()
            .map(|n| n.to_string_lossy())
            .is_some_and(|n| self.index_documents.iter().any(|i| *i == n))
    }

    /// Run the batch. See the module docs for the sequence.
    pub fn process(&self, events: Option<Sender<BatchEvent>>) -> Result<BatchReport, BatchError> {
        let documents = self.documents()?;
        let renamed = rename::rename_by_hash(&self.image_dir)?;
        tracing::info!(
            "renamed {} image(s) in {}",
            renamed.len(),
            self.image_dir.display()
        );
        if let Some(tx) = &events {
            for (from, to) in &renamed {
                tx.send(BatchEvent::Renamed {
                    from: from.clone(),
                    to: to.clone(),
                })
                .ok();
            }
        }

        if let Some(tx) = &events {
            tx.send(BatchEvent::DocumentsStarted {
                count: documents.len(),
            })
            .ok();
        }

        let outcomes: Vec<DocumentOutcome> = documents
            .par_iter()
            .map(|path| {
                let outcome = self.process_document(path, &renamed);
                if let Some(tx) = &events {
                    tx.send(BatchEvent::DocumentProcessed {
                        outcome: outcome.clone(),
                    })
                    .ok();
                }
                outcome
            })
            .collect();

        Ok(BatchReport {
            renamed,
            documents: outcomes,
        })
    }

    fn process_document(&self, path: &Path, renamed: &RenameMap) -> DocumentOutcome {
        let mut outcome = DocumentOutcome {
            path: path.to_path_buf(),
            references_rewritten: 0,
            normalized: false,
            error: None,
        };
        let result = Document::open(path).and_then(|doc| {
            if !self.is_index(path) {
                let replacements = replacements_for(&doc.image_uris()?, renamed);
                outcome.references_rewritten = doc.rewrite_references(&replacements)?;
            }
            doc.normalize()
        });
        match result {
            Ok(changed) => outcome.normalized = changed,
            Err(e) => {
                tracing::warn!("{}", e);
                outcome.error = Some(e.to_string());
            }
        }
        outcome
    }
}

/// Old URI → new URI for every URI whose base name was renamed.
///
/// Only the final path component changes; the directory part is kept as
/// written in the document.
pub fn replacements_for(uris: &[String], renamed: &RenameMap) -> BTreeMap<String, String> {
    uris.iter()
        .filter_map(|uri| {
            renamed
                .get(naming::base_name(uri))
                .map(|new_base| (uri.clone(), naming::replace_base_name(uri, new_base)))
        })
        .collect()
}
