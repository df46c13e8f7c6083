//! CLI output formatting for every command.
//!
//! # Paths
//!
//! Paths are shown relative to the project root whenever they live below it,
//! so output stays readable regardless of where the project is checked out.
//!
//! # Output Format
//!
//! ## Rename
//!
//! ```text
//! cat.png → 6b0d31c0d563223024da45691584643ac78c96e8.png
//! dog.png → 7bc1a4bfa6e2cf0ad1fdca88ab8fd6e9c1eeb4fb.png
//! Renamed 2 images
//! ```
//!
//! ## Format
//!
//! ```text
//!     cat.png → 6b0d31c0….png
//! Documents (3)
//!     source/guide/pets.rst: 2 references, normalized
//!     source/broken.rst: FAILED missing image URI on line 3
//! Rewrote 1 document, normalized 1, 1 failed
//! ```
//!
//! ## Check
//!
//! ```text
//! source/guide/pets.rst
//!     missing: /_static/gone.png
//! 1 of 12 documents have missing images
//! ```
//!
//! ## Scan
//!
//! ```text
//! guide/pets (2 images)
//!     /_static/6b0d31c0….png
//!     ../_static/7bc1a4bf….png
//! index
//! 2 documents, 2 references
//! changed: guide/pets
//! Since last scan: 0 added, 0 removed, 1 changed
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::batch::BatchEvent;
use crate::driver::{DriverEvent, DriverReport};
use crate::registry::{DocumentCheck, DocumentRegistry, RegistryChanges};
use crate::types::{BatchReport, DocumentOutcome, RenameMap};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `path` relative to `root` when below it, otherwise unchanged.
fn relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

/// `1 image`, `2 images`.
fn plural(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun}")
    } else {
        format!("{n} {noun}s")
    }
}

fn rename_line(from: &str, to: &str) -> String {
    format!("{} \u{2192} {}", from, to)
}

/// One-line summary of a document outcome.
fn outcome_line(outcome: &DocumentOutcome, root: &Path) -> String {
    let path = relative(&outcome.path, root);
    if let Some(error) = &outcome.error {
        return format!("{}: FAILED {}", path, error);
    }
    let mut parts = Vec::new();
    if outcome.references_rewritten > 0 {
        parts.push(plural(outcome.references_rewritten, "reference"));
    }
    if outcome.normalized {
        parts.push("normalized".to_string());
    }
    if parts.is_empty() {
        parts.push("unchanged".to_string());
    }
    format!("{}: {}", path, parts.join(", "))
}

// ============================================================================
// rename
// ============================================================================

/// Format the rename mapping followed by a count.
pub fn format_rename_map(renamed: &RenameMap) -> Vec<String> {
    let mut lines: Vec<String> = renamed
        .iter()
        .map(|(from, to)| rename_line(from, to))
        .collect();
    if renamed.is_empty() {
        lines.push("All images already content-addressed".to_string());
    } else {
        lines.push(format!("Renamed {}", plural(renamed.len(), "image")));
    }
    lines
}

pub fn print_rename_map(renamed: &RenameMap) {
    for line in format_rename_map(renamed) {
        println!("{}", line);
    }
}

// ============================================================================
// format
// ============================================================================

/// Format a single batch progress event as display lines.
pub fn format_batch_event(event: &BatchEvent, root: &Path) -> Vec<String> {
    match event {
        BatchEvent::Renamed { from, to } => {
            vec![format!("{}{}", indent(1), rename_line(from, to))]
        }
        BatchEvent::DocumentsStarted { count } => vec![format!("Documents ({})", count)],
        BatchEvent::DocumentProcessed { outcome } => {
            vec![format!("{}{}", indent(1), outcome_line(outcome, root))]
        }
    }
}

/// Closing summary of a batch run.
pub fn format_batch_summary(report: &BatchReport) -> Vec<String> {
    let failed = report.failures().count();
    let mut summary = format!(
        "Rewrote {}, normalized {}",
        plural(report.rewritten_count(), "document"),
        report.normalized_count()
    );
    if failed > 0 {
        summary.push_str(&format!(", {} failed", failed));
    }
    vec![summary]
}

pub fn print_batch_summary(report: &BatchReport) {
    for line in format_batch_summary(report) {
        println!("{}", line);
    }
}

// ============================================================================
// build
// ============================================================================

/// Format a driver progress event as display lines.
pub fn format_driver_event(event: &DriverEvent, root: &Path) -> Vec<String> {
    match event {
        DriverEvent::StageStarted { stage } => vec![format!("==> {}", stage.label())],
        DriverEvent::Batch(batch) => format_batch_event(batch, root),
        DriverEvent::Quarantined(file) => vec![format!(
            "{}{}",
            indent(1),
            rename_line(&relative(&file.from, root), &relative(&file.to, root))
        )],
        DriverEvent::QuarantineSkipped { reason } => {
            vec![format!("{}skipped: {}", indent(1), reason)]
        }
    }
}

/// Closing summary of a build run.
pub fn format_driver_report(report: &DriverReport) -> Vec<String> {
    let mut lines = format_batch_summary(&report.batch);
    lines.push(format!(
        "Renamed {}, quarantined {}",
        plural(report.batch.renamed.len(), "image"),
        report.quarantined.len()
    ));
    if let Some(reason) = &report.quarantine_skipped {
        lines.push(format!("Quarantine skipped: {}", reason));
    }
    let verb = if report.status().success() {
        "Build complete"
    } else {
        "Build FAILED"
    };
    lines.push(format!(
        "==> {} ({}) in {:.2}s",
        verb,
        report.status(),
        report.elapsed.as_secs_f64()
    ));
    lines
}

pub fn print_driver_report(report: &DriverReport) {
    for line in format_driver_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// check
// ============================================================================

/// List documents with missing images or read errors, then a count.
pub fn format_check_results(checks: &[DocumentCheck], root: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    let mut bad = 0;
    for check in checks.iter().filter(|c| !c.is_ok()) {
        bad += 1;
        lines.push(relative(&check.path, root));
        match &check.result {
            Ok(_) => {
                for status in check.missing() {
                    lines.push(format!("{}missing: {}", indent(1), status.uri));
                }
            }
            Err(e) => lines.push(format!("{}error: {}", indent(1), e)),
        }
    }
    if bad == 0 {
        lines.push(format!(
            "All images present in {}",
            plural(checks.len(), "document")
        ));
    } else {
        lines.push(format!(
            "{} of {} have missing images",
            bad,
            plural(checks.len(), "document")
        ));
    }
    lines
}

pub fn print_check_results(checks: &[DocumentCheck], root: &Path) {
    for line in format_check_results(checks, root) {
        println!("{}", line);
    }
}

// ============================================================================
// scan
// ============================================================================

/// Documents with their image URIs, then totals.
pub fn format_registry(registry: &DocumentRegistry) -> Vec<String> {
    let mut lines = Vec::new();
    for (name, uris) in &registry.documents {
        if uris.is_empty() {
            lines.push(name.clone());
        } else {
            lines.push(format!("{} ({})", name, plural(uris.len(), "image")));
        }
        for uri in uris {
            lines.push(format!("{}{}", indent(1), uri));
        }
    }
    for (name, reason) in &registry.unreadable {
        lines.push(format!("{}: UNREADABLE {}", name, reason));
    }
    lines.push(format!(
        "{}, {} references",
        plural(registry.document_count(), "document"),
        registry.image_count()
    ));
    lines
}

pub fn print_registry(registry: &DocumentRegistry) {
    for line in format_registry(registry) {
        println!("{}", line);
    }
}

/// Image → documents that use it, from [`DocumentRegistry::images`].
pub fn format_image_index(images: &BTreeMap<String, BTreeSet<String>>) -> Vec<String> {
    let mut lines = Vec::new();
    for (image, docs) in images {
        lines.push(image.clone());
        for doc in docs {
            lines.push(format!("{}{}", indent(1), doc));
        }
    }
    lines.push(plural(images.len(), "distinct image"));
    lines
}

/// What changed since the registry previously saved in the build directory.
pub fn format_registry_changes(changes: &RegistryChanges) -> Vec<String> {
    if changes.is_empty() {
        return vec!["No changes since last scan".to_string()];
    }
    let mut lines = Vec::new();
    for (label, names) in [
        ("added", &changes.added),
        ("removed", &changes.removed),
        ("changed", &changes.changed),
    ] {
        for name in names {
            lines.push(format!("{}: {}", label, name));
        }
    }
    lines.push(format!(
        "Since last scan: {} added, {} removed, {} changed",
        changes.added.len(),
        changes.removed.len(),
        changes.changed.len()
    ));
    lines
}

// ============================================================================
// normalize
// ============================================================================

/// One line per file: whether normalization changed it.
pub fn format_normalize_result(path: &Path, result: &Result<bool, String>) -> String {
    match result {
        Ok(true) => format!("{}: normalized", path.display()),
        Ok(false) => format!("{}: unchanged", path.display()),
        Err(e) => format!("{}: FAILED {}", path.display(), e),
    }
}
