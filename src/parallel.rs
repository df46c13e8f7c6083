//! Parallel per-file operations on a bounded worker pool.
//!
//! Every function here maps a single-argument operation over an ordered list
//! of paths using [rayon](https://docs.rs/rayon). Rayon's indexed
//! `par_iter().map().collect()` writes each result into the slot of its
//! input, so `result[i]` always belongs to `input[i]` no matter which worker
//! finishes first.
//!
//! Failures never abort a batch. Each item that cannot be processed yields a
//! sentinel (`false` for existence, `None` for digests) and the caller
//! decides whether one sentinel should sink the whole operation. The
//! renamer, for example, refuses to rename anything if a single hash failed.

use crate::config::{self, ProcessingConfig};
use rayon::prelude::*;
use sha1::{Digest, Sha1};
use std::io;
use std::path::{Path, PathBuf};

/// Ordered parallel map.
pub fn par_map<T, R, F>(items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    items.par_iter().map(f).collect()
}

/// Check whether each path exists. I/O errors count as absent.
pub fn files_exist(paths: &[PathBuf]) -> Vec<bool> {
    par_map(paths, |p| p.try_exists().unwrap_or(false))
}

/// SHA1 of a file's contents, returned as a lowercase hex string.
pub fn sha1_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha1::digest(&bytes);
    Ok(format!("{:x}", digest))
}

/// SHA1 every path in parallel. Unreadable files yield `None`.
pub fn sha1_digests(paths: &[PathBuf]) -> Vec<Option<String>> {
    par_map(paths, |p| match sha1_file(p) {
        Ok(digest) => Some(digest),
        Err(e) => {
            tracing::debug!("sha1 failed for {}: {}", p.display(), e);
            None
        }
    })
}

/// Initialize the global rayon pool from the processing config.
///
/// Caps at the number of available CPU cores. Calling this twice is
/// harmless; the second build attempt is ignored.
pub fn init_thread_pool(processing: &ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
