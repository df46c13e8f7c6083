//! File naming helpers for the content-address convention.
//!
//! Every image in the image directory is eventually named after the SHA1 hex
//! digest of its bytes, keeping whatever extension it was added with:
//!
//! - `cat.png` with digest `da39…` → `da39….png`
//! - `photo.final.JPG` → `<digest>.JPG` (only the last extension is kept)
//! - `README` → `<digest>` (no extension)
//!
//! These helpers are pure string functions so the renamer, the batch
//! orchestrator, and the tests all agree on what "already named" means.

/// A file name split at its last dot.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitName<'a> {
    /// Everything before the last dot (the whole name when there is no dot).
    pub stem: &'a str,
    /// The extension including its leading dot, or `""`.
    pub extension: &'a str,
}

/// Split a file name into stem and extension.
///
/// A leading dot does not start an extension: `.gitkeep` has stem
/// `.gitkeep` and no extension, matching `Path::file_stem`.
pub fn split_name(file_name: &str) -> SplitName<'_> {
    match file_name.rfind('.') {
        Some(pos) if pos > 0 => SplitName {
            stem: &file_name[..pos],
            extension: &file_name[pos..],
        },
        _ => SplitName {
            stem: file_name,
            extension: "",
        },
    }
}

/// Build the content-addressed name for a file: `<digest><extension>`.
pub fn content_addressed_name(file_name: &str, digest: &str) -> String {
    format!("{}{}", digest, split_name(file_name).extension)
}

/// Whether `file_name` is already named after `digest`.
pub fn is_named_by(file_name: &str, digest: &str) -> bool {
    split_name(file_name).stem == digest
}

/// Replace the final `/`-separated component of a URI with `new_base`.
///
/// The directory prefix is preserved exactly as written:
/// `/_static/img/cat.png` → `/_static/img/<new_base>`.
pub fn replace_base_name(uri: &str, new_base: &str) -> String {
    match uri.rfind('/') {
        Some(pos) => format!("{}{}", &uri[..=pos], new_base),
        None => new_base.to_string(),
    }
}

/// The final `/`-separated component of a URI.
pub fn base_name(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}
