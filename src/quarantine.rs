//! Move unreferenced images out of the image directory.
//!
//! Nothing is deleted. Files go to a holding directory where they can be
//! inspected and restored by hand; a name already taken there gets a numeric
//! suffix (`cat.1.png`, `cat.2.png`, ...).

use crate::registry::lexical_normalize;
use crate::rename;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuarantineError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot list image directory: {0}")]
    List(#[from] rename::RenameError),
}

/// One file moved into quarantine.
#[derive(Debug, Clone, PartialEq)]
pub struct QuarantinedFile {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Pick a free name in `dir` for `file_name`.
fn free_target(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let split = crate::naming::split_name(file_name);
    (1..)
        .map(|n| dir.join(format!("{}.{}{}", split.stem, n, split.extension)))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Move every file of `image_dir` that is not in `referenced` into
/// `quarantine_dir`.
///
/// `referenced` holds lexically normalized absolute paths, as produced by
/// [`DocumentRegistry::referenced_paths`](crate::registry::DocumentRegistry::referenced_paths).
pub fn quarantine_unreferenced(
    image_dir: &Path,
    quarantine_dir: &Path,
    referenced: &BTreeSet<PathBuf>,
) -> Result<Vec<QuarantinedFile>, QuarantineError> {
    let files = rename::list_files(image_dir)?;
    let mut moved = Vec::new();

    for path in files {
        if referenced.contains(&lexical_normalize(&path)) {
            continue;
        }
        if moved.is_empty() {
            fs::create_dir_all(quarantine_dir).map_err(|source| QuarantineError::Io {
                path: quarantine_dir.to_path_buf(),
                source,
            })?;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let target = free_target(quarantine_dir, &file_name);
        move_file(&path, &target)?;
        tracing::info!("quarantined {} -> {}", path.display(), target.display());
        moved.push(QuarantinedFile {
            from: path,
            to: target,
        });
    }

    Ok(moved)
}

/// Rename, falling back to copy + remove across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<(), QuarantineError> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).map_err(|source| QuarantineError::Io {
        path: from.to_path_buf(),
        source,
    })?;
    fs::remove_file(from).map_err(|source| QuarantineError::Io {
        path: from.to_path_buf(),
        source,
    })
}
