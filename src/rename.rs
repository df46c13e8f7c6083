//! Content-addressed renaming of an image directory.
//!
//! After [`rename_by_hash`] succeeds, every (non-hidden) regular file in the
//! directory is named `<sha1 of its bytes><original extension>`. Two files
//! with identical bytes end up as a single file, so renaming doubles as
//! deduplication.
//!
//! # Sequencing
//!
//! 1. List files (sorted by name, hidden files skipped).
//! 2. Hash them all in parallel ([`parallel::sha1_digests`]).
//! 3. If *any* hash failed, stop with [`RenameError::HashFailed`] before
//!    touching the filesystem: a partial rename set would leave documents
//!    pointing at a mix of old and new names.
//! 4. Plan every rename. A target occupied by something that is not a
//!    listed file (a directory, a hidden file) is a [`RenameError::Conflict`]
//!    and nothing moves. A target occupied by a listed file is fine: that
//!    file either holds the same bytes or is misnamed and moves too.
//! 5. Park files whose current name is another file's target under a
//!    staging name, then rename sequentially on the calling thread.
//!
//! All paths are joined onto the directory explicitly; the process working
//! directory is never changed.

use crate::naming;
use crate::parallel;
use crate::types::RenameMap;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenameError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} is in the way and is not a file doctidy can rename")]
    Conflict(PathBuf),
    #[error("could not hash {} file(s), nothing renamed: {}", .0.len(), display_paths(.0))]
    HashFailed(Vec<PathBuf>),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Non-hidden regular files directly inside `dir`, sorted by name.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>, RenameError> {
    if !dir.is_dir() {
        return Err(RenameError::NotADirectory(dir.to_path_buf()));
    }
    let entries = fs::read_dir(dir).map_err(|source| RenameError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| RenameError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let file_type = entry.file_type().map_err(|source| RenameError::Io {
            path: entry.path(),
            source,
        })?;
        if file_type.is_file() && !entry.file_name().to_string_lossy().starts_with('.') {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Rename every file in `dir` to its content address.
///
/// Returns `old file name → new file name` for the files that were actually
/// renamed (or folded into an existing identical file). Files already named
/// after their digest are not in the map.
pub fn rename_by_hash(dir: &Path) -> Result<RenameMap, RenameError> {
    let files = list_files(dir)?;
    let digests = parallel::sha1_digests(&files);

    let failed: Vec<PathBuf> = files
        .iter()
        .zip(&digests)
        .filter(|(_, d)| d.is_none())
        .map(|(p, _)| p.clone())
        .collect();
    if !failed.is_empty() {
        return Err(RenameError::HashFailed(failed));
    }

    // Plan every rename before touching the filesystem, so a conflict
    // aborts with nothing moved.
    let mut plan = Vec::new();
    for (path, digest) in files.iter().zip(digests.iter().flatten()) {
        let old_name = file_name_of(path);
        if naming::is_named_by(&old_name, digest) {
            continue;
        }
        let new_name = naming::content_addressed_name(&old_name, digest);
        let target = dir.join(&new_name);
        // A listed occupant either holds the same bytes or is misnamed and
        // moves away itself. Anything else (a directory, a hidden file) is
        // in the way for good.
        let listed = files.iter().any(|f| *f == target);
        if !listed && target.symlink_metadata().is_ok() {
            return Err(RenameError::Conflict(target));
        }
        plan.push(PlannedRename {
            source: path.clone(),
            old_name,
            new_name,
            target,
        });
    }

    // Files whose current name is another file's target move out of the
    // way first, so chains and swaps resolve.
    let targets: HashSet<&str> = plan.iter().map(|p| p.new_name.as_str()).collect();
    let mut staged = Vec::with_capacity(plan.len());
    for step in &plan {
        if targets.contains(step.old_name.as_str()) {
            let staging = staging_path(dir, &step.old_name);
            tracing::debug!("stage {} -> {}", step.old_name, staging.display());
            move_within(&step.source, &staging)?;
            staged.push(staging);
        } else {
            staged.push(step.source.clone());
        }
    }

    let mut renamed = RenameMap::new();
    for (step, source) in plan.into_iter().zip(staged) {
        if step.target.exists() {
            // Same digest, same extension: identical bytes already in place.
            tracing::info!("{} duplicates {}, removing", step.old_name, step.new_name);
            fs::remove_file(&source).map_err(|e| RenameError::Io {
                path: source.clone(),
                source: e,
            })?;
        } else {
            tracing::debug!("rename {} -> {}", step.old_name, step.new_name);
            move_within(&source, &step.target)?;
        }
        renamed.insert(step.old_name, step.new_name);
    }

    Ok(renamed)
}

struct PlannedRename {
    source: PathBuf,
    old_name: String,
    new_name: String,
    target: PathBuf,
}

/// A free, non-hidden name for parking `old_name` during a rename chain.
///
/// Not hidden on purpose: if the run dies mid-chain the parked file is
/// still listed, hashed, and named correctly by the next run.
fn staging_path(dir: &Path, old_name: &str) -> PathBuf {
    (0..)
        .map(|n| dir.join(format!("doctidy-staging-{n}-{old_name}")))
        .find(|p| p.symlink_metadata().is_err())
        .unwrap_or_else(|| dir.join(format!("doctidy-staging-{old_name}")))
}

fn move_within(from: &Path, to: &Path) -> Result<(), RenameError> {
    fs::rename(from, to).map_err(|source| RenameError::Io {
        path: from.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::sha1_file;
    use std::fs;
    use tempfile::TempDir;

    const HELLO_SHA1: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";

    fn sha1_of(bytes: &str) -> String {
        use sha1::{Digest, Sha1};
        format!("{:x}", Sha1::digest(bytes.as_bytes()))
    }

    fn names_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn renames_to_digest_with_extension() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("cat.png"), b"hello world").unwrap();

        let map = rename_by_hash(tmp.path()).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["cat.png"], format!("{HELLO_SHA1}.png"));
        assert_eq!(names_in(tmp.path()), vec![format!("{HELLO_SHA1}.png")]);
    }

    #[test]
    fn every_file_named_by_content_after_run() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.png"), b"alpha").unwrap();
        fs::write(tmp.path().join("b.jpg"), b"beta").unwrap();
        fs::write(tmp.path().join("c"), b"gamma").unwrap();

        rename_by_hash(tmp.path()).unwrap();

        for path in list_files(tmp.path()).unwrap() {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            let digest = sha1_file(&path).unwrap();
            assert!(naming::is_named_by(&name, &digest), "{name} != {digest}");
        }
    }

    #[test]
    fn already_named_files_are_excluded_from_map() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(format!("{HELLO_SHA1}.png")), b"hello world").unwrap();
        fs::write(tmp.path().join("other.png"), b"other").unwrap();

        let map = rename_by_hash(tmp.path()).unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("other.png"));
        assert!(!map.contains_key(&format!("{HELLO_SHA1}.png")));
    }

    #[test]
    fn second_run_is_a_no_op() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("x.gif"), b"x").unwrap();
        assert_eq!(rename_by_hash(tmp.path()).unwrap().len(), 1);
        assert!(rename_by_hash(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn duplicates_fold_into_one_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("one.png"), b"hello world").unwrap();
        fs::write(tmp.path().join("two.png"), b"hello world").unwrap();

        let map = rename_by_hash(tmp.path()).unwrap();
        assert_eq!(map["one.png"], format!("{HELLO_SHA1}.png"));
        assert_eq!(map["two.png"], format!("{HELLO_SHA1}.png"));
        assert_eq!(names_in(tmp.path()), vec![format!("{HELLO_SHA1}.png")]);
    }

    #[test]
    fn same_bytes_different_extensions_stay_separate() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("one.png"), b"hello world").unwrap();
        fs::write(tmp.path().join("one.jpg"), b"hello world").unwrap();

        rename_by_hash(tmp.path()).unwrap();
        assert_eq!(
            names_in(tmp.path()),
            vec![format!("{HELLO_SHA1}.jpg"), format!("{HELLO_SHA1}.png")]
        );
    }

    #[test]
    fn hidden_files_and_subdirectories_ignored() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".DS_Store"), b"junk").unwrap();
        fs::create_dir(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested/inner.png"), b"inner").unwrap();

        assert!(rename_by_hash(tmp.path()).unwrap().is_empty());
        assert!(tmp.path().join(".DS_Store").exists());
        assert!(tmp.path().join("nested/inner.png").exists());
    }

    #[test]
    fn occupied_target_that_moves_away_is_a_chain() {
        let tmp = TempDir::new().unwrap();
        let beta = sha1_of("beta");
        let alpha = sha1_of("alpha");
        fs::write(tmp.path().join("b.png"), b"beta").unwrap();
        // Named after "beta" but holding "alpha": must move before b.png lands.
        fs::write(tmp.path().join(format!("{beta}.png")), b"alpha").unwrap();

        let map = rename_by_hash(tmp.path()).unwrap();

        assert_eq!(map["b.png"], format!("{beta}.png"));
        assert_eq!(map[&format!("{beta}.png")], format!("{alpha}.png"));
        let mut expected = vec![format!("{alpha}.png"), format!("{beta}.png")];
        expected.sort();
        assert_eq!(names_in(tmp.path()), expected);
        assert_eq!(fs::read(tmp.path().join(format!("{beta}.png"))).unwrap(), b"beta");
        assert_eq!(fs::read(tmp.path().join(format!("{alpha}.png"))).unwrap(), b"alpha");
    }

    #[test]
    fn swapped_names_resolve() {
        let tmp = TempDir::new().unwrap();
        let x = sha1_of("x");
        let y = sha1_of("y");
        fs::write(tmp.path().join(format!("{x}.png")), b"y").unwrap();
        fs::write(tmp.path().join(format!("{y}.png")), b"x").unwrap();

        rename_by_hash(tmp.path()).unwrap();

        assert_eq!(fs::read(tmp.path().join(format!("{x}.png"))).unwrap(), b"x");
        assert_eq!(fs::read(tmp.path().join(format!("{y}.png"))).unwrap(), b"y");
        assert_eq!(names_in(tmp.path()).len(), 2);
    }

    #[test]
    fn directory_in_the_way_is_a_conflict() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.png"), b"hello world").unwrap();
        fs::write(tmp.path().join("b.png"), b"untouched").unwrap();
        fs::create_dir(tmp.path().join(format!("{HELLO_SHA1}.png"))).unwrap();

        let result = rename_by_hash(tmp.path());
        assert!(matches!(result, Err(RenameError::Conflict(_))));
        assert!(tmp.path().join("a.png").exists());
        assert!(tmp.path().join("b.png").exists());
    }

    #[test]
    fn empty_directory_gives_empty_map() {
        let tmp = TempDir::new().unwrap();
        assert!(rename_by_hash(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn missing_directory_is_error() {
        let tmp = TempDir::new().unwrap();
        let result = rename_by_hash(&tmp.path().join("nope"));
        assert!(matches!(result, Err(RenameError::NotADirectory(_))));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_aborts_without_renaming() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("ok.png"), b"fine").unwrap();
        let locked = tmp.path().join("locked.png");
        fs::write(&locked, b"secret").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Root can read anything; nothing to assert in that case.
        if fs::read(&locked).is_ok() {
            return;
        }

        let result = rename_by_hash(tmp.path());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

        match result {
            Err(RenameError::HashFailed(paths)) => assert_eq!(paths, vec![locked]),
            other => panic!("expected HashFailed, got {other:?}"),
        }
        assert!(tmp.path().join("ok.png").exists());
    }
}
