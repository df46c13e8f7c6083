//! # doctidy
//!
//! Housekeeping for a Sphinx/reStructuredText documentation site. The
//! source tree is the data source: documents are `.rst` files, images live in
//! one static directory, and `sphinx-build` does the rendering.
//!
//! # Architecture: Gate, Tidy, Rebuild
//!
//! A full `doctidy build` runs in five steps:
//!
//! ```text
//! 1. Clean       build/                 removed
//! 2. Build       sphinx-build -W        must pass, nothing touched yet
//! 3. Format      _static/*  →  <sha1>.png, references rewritten, text normalized
//! 4. Quarantine  unreferenced images  →  unused_images/
//! 5. Rebuild     sphinx-build -W
//! ```
//!
//! Each step is also reachable on its own (`rename`, `format`, `check`,
//! `scan`, `normalize`) so a single concern can be inspected without running
//! the whole sequence.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`driver`] | The five-step build sequence with timing |
//! | [`batch`] | Rename images, then rewrite and normalize every document in parallel |
//! | [`rename`] | Content-addressed renaming of the image directory |
//! | [`document`] | A validated `.rst` handle: read, check images, rewrite, normalize |
//! | [`rst`] | Line-oriented scanner for `image`/`figure` directives |
//! | [`normalize`] | CJK punctuation and spacing normalization |
//! | [`registry`] | Re-derived document → image record, tree-wide image checks |
//! | [`quarantine`] | Moves unreferenced images to a holding directory |
//! | [`builder`] | `DocBuilder` trait and the `sphinx-build` implementation |
//! | [`parallel`] | Ordered parallel map, hashing, existence checks on the rayon pool |
//! | [`naming`] | `<sha1><ext>` naming helpers |
//! | [`config`] | `doctidy.toml` loading, merging over stock defaults, validation |
//! | [`types`] | Shared types printed and serialized by the CLI |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Content Addressing
//!
//! Every image is named after the SHA1 of its bytes. Identical images
//! collapse into one file, a renamed file can never silently change content,
//! and a second run is a no-op.
//!
//! ## Build Before Touching Anything
//!
//! The strict first build is a gate. If the sources do not build, the tree
//! is left exactly as it was. Once renaming starts, every change is durable:
//! documents, images, and the quarantine directory are consistent with each
//! other after step 4 even if the final rebuild fails.
//!
//! ## No Working-Directory Changes
//!
//! Every path is joined onto the project root given on the command line.
//! Nothing calls `set_current_dir`, so stages can run on worker threads and
//! in tests side by side.
//!
//! ## Nothing Is Deleted
//!
//! Unreferenced images are moved, not removed. The only files doctidy ever
//! deletes are byte-identical duplicates folded together during renaming and
//! the build output directory.

pub mod batch;
pub mod builder;
pub mod config;
pub mod document;
pub mod driver;
pub mod naming;
pub mod normalize;
pub mod output;
pub mod parallel;
pub mod quarantine;
pub mod registry;
pub mod rename;
pub mod rst;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
