//! A single reStructuredText document on disk.
//!
//! [`Document`] is a validated handle: opening it checks the file exists and
//! has an `.rst` extension. Every operation re-reads the file, so a handle
//! stays valid across the rewrite → normalize sequence the batch processor
//! applies.
//!
//! Writes are atomic. Content is written to a temporary file next to the
//! document and persisted over it with a rename, so a failure mid-write
//! leaves the original untouched.

use crate::normalize;
use crate::parallel;
use crate::rst::{self, ImageRef, ParseError};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("document not found: {0}")]
    NotFound(PathBuf),
    #[error("not an .rst document: {0}")]
    NotRst(PathBuf),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} is not valid UTF-8")]
    Decode(PathBuf),
    #[error("{0} is empty")]
    Empty(PathBuf),
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}

impl DocumentError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Read a text document as UTF-8.
///
/// Empty files are rejected: an empty read is indistinguishable from a
/// failed decode in the sources this tool is used on, and writing the
/// normalized form (`"\n"`) back would destroy whatever was intended.
pub fn read_text(path: &Path) -> Result<String, DocumentError> {
    let bytes = std::fs::read(path).map_err(|e| DocumentError::io(path, e))?;
    if bytes.is_empty() {
        return Err(DocumentError::Empty(path.to_path_buf()));
    }
    String::from_utf8(bytes).map_err(|_| DocumentError::Decode(path.to_path_buf()))
}

/// Replace a file's content atomically.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), DocumentError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| DocumentError::io(path, e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| DocumentError::io(path, e))?;
    tmp.persist(path)
        .map_err(|e| DocumentError::io(path, e.error))?;
    Ok(())
}

/// Whether a URI points somewhere other than the local filesystem.
pub fn is_remote_uri(uri: &str) -> bool {
    uri.starts_with("data:") || uri.contains("://")
}

/// Resolve an image URI the way Sphinx does.
///
/// A leading `/` is relative to the source root; anything else is relative
/// to the directory of the referencing document.
pub fn resolve_uri(uri: &str, document: &Path, source_root: &Path) -> PathBuf {
    match uri.strip_prefix('/') {
        Some(rooted) => source_root.join(rooted),
        None => document
            .parent()
            .map(|dir| dir.join(uri))
            .unwrap_or_else(|| PathBuf::from(uri)),
    }
}

/// Existence of one referenced image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageStatus {
    pub uri: String,
    /// Resolved location, `None` for remote URIs.
    pub resolved: Option<PathBuf>,
    pub exists: bool,
}

/// A validated `.rst` document.
#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
}

impl Document {
    /// Open a document, checking that it exists and is an `.rst` file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DocumentError> {
        let path = path.into();
        if !path.is_file() {
            return Err(DocumentError::NotFound(path));
        }
        if path.extension().and_then(|e| e.to_str()) != Some("rst") {
            return Err(DocumentError::NotRst(path));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current text content.
    pub fn read(&self) -> Result<String, DocumentError> {
        read_text(&self.path)
    }

    /// Every image reference, in document order, duplicates kept.
    pub fn image_refs(&self) -> Result<Vec<ImageRef>, DocumentError> {
        let content = self.read()?;
        rst::parse_images(&content).map_err(|source| DocumentError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Every image URI, in document order, duplicates kept.
    pub fn image_uris(&self) -> Result<Vec<String>, DocumentError> {
        Ok(self.image_refs()?.into_iter().map(|r| r.uri).collect())
    }

    /// Check that each referenced image exists.
    ///
    /// Missing files are logged as warnings and reported with
    /// `exists: false`; they never make this call fail. Remote URIs are
    /// reported as present without a check.
    pub fn check_images(&self, source_root: &Path) -> Result<Vec<ImageStatus>, DocumentError> {
        let uris = self.image_uris()?;
        let local: Vec<(usize, PathBuf)> = uris
            .iter()
            .enumerate()
            .filter(|(_, uri)| !is_remote_uri(uri))
            .map(|(i, uri)| (i, resolve_uri(uri, &self.path, source_root)))
            .collect();
        let paths: Vec<PathBuf> = local.iter().map(|(_, p)| p.clone()).collect();
        let exists = parallel::files_exist(&paths);

        let mut statuses: Vec<ImageStatus> = uris
            .into_iter()
            .map(|uri| ImageStatus {
                uri,
                resolved: None,
                exists: true,
            })
            .collect();
        for ((i, path), present) in local.into_iter().zip(exists) {
            if !present {
                tracing::warn!(
                    "{}: image {} not found at {}",
                    self.path.display(),
                    statuses[i].uri,
                    path.display()
                );
            }
            statuses[i].resolved = Some(path);
            statuses[i].exists = present;
        }
        Ok(statuses)
    }

    /// Replace literal substrings and write the result back.
    ///
    /// Nothing is read or written when `replacements` is empty. Keys are
    /// applied longest first so a key that prefixes another cannot pre-empt
    /// it. The written content is trimmed and ends with one newline, the
    /// same convention [`normalize`] uses. Returns the number of occurrences
    /// replaced.
    pub fn rewrite_references(
        &self,
        replacements: &BTreeMap<String, String>,
    ) -> Result<usize, DocumentError> {
        if replacements.is_empty() {
            return Ok(0);
        }
        let mut content = self.read()?;
        let mut pairs: Vec<(&String, &String)> = replacements.iter().collect();
        pairs.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

        let mut replaced = 0;
        for (old, new) in pairs {
            if old.is_empty() {
                continue;
            }
            let count = content.matches(old.as_str()).count();
            if count > 0 {
                content = content.replace(old.as_str(), new);
                replaced += count;
            }
        }
        write_atomic(&self.path, &normalize::finish(&content))?;
        Ok(replaced)
    }

    /// Normalize this document in place. Returns `true` if it changed.
    pub fn normalize(&self) -> Result<bool, DocumentError> {
        normalize::normalize_file(&self.path)
    }
}
