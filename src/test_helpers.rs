//! Shared test utilities for the doctidy test suite.
//!
//! Builds throwaway project trees and provides lookups that panic with a
//! clear message on miss.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_project();
//! let source = tmp.path().join("source");
//! write_file(&source, "extra.rst", ".. image:: /_static/cat.png\n");
//!
//! assert_eq!(file_names(&source.join("_static")), vec!["cat.png", "dog.png", "stray.png"]);
//! ```

use crate::types::{BatchReport, DocumentOutcome};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// =========================================================================
// Fixture setup
// =========================================================================

/// Write `content` to `dir/rel`, creating parent directories.
pub fn write_file(dir: &Path, rel: &str, content: &str) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// A small project in a temp directory.
///
/// ```text
/// source/
/// ├── index.rst            # references _static/cat.png
/// ├── guide/
/// │   └── pets.rst         # cat.png (rooted) + dog.png (relative)
/// └── _static/
///     ├── cat.png
///     ├── dog.png
///     └── stray.png        # referenced by nothing
/// ```
pub fn setup_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("source");
    write_file(
        &source,
        "index.rst",
        "Home\n====\n\n.. image:: _static/cat.png\n\n.. toctree::\n\n   guide/pets\n",
    );
    write_file(
        &source,
        "guide/pets.rst",
        "Pets\n====\n\n猫cat图片，很可爱。\n\n.. image:: /_static/cat.png\n\n.. figure:: ../_static/dog.png\n\n   A dog.\n",
    );
    write_file(&source, "_static/cat.png", "cat bytes");
    write_file(&source, "_static/dog.png", "dog bytes");
    write_file(&source, "_static/stray.png", "stray bytes");
    tmp
}

/// Non-hidden file names directly in `dir`, sorted.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();
    names
}

// =========================================================================
// Report lookups
// =========================================================================

/// Find a document outcome by file name. Panics if not found.
pub fn find_outcome<'a>(report: &'a BatchReport, file_name: &str) -> &'a DocumentOutcome {
    report
        .documents
        .iter()
        .find(|d| d.path.file_name().is_some_and(|n| n == file_name))
        .unwrap_or_else(|| {
            let names: Vec<String> = report
                .documents
                .iter()
                .map(|d| d.path.display().to_string())
                .collect();
            panic!("document '{file_name}' not found. Available: {names:?}")
        })
}
