//! Document registry: which documents exist and which images each uses.
//!
//! Sphinx keeps this record in its build environment (`env.all_docs` and
//! `env.images`), but that snapshot goes stale the moment images are renamed
//! or documents rewritten. The registry here is re-derived from the sources
//! whenever it is needed, so the quarantine step always works from the
//! post-rewrite state.
//!
//! Document names follow Sphinx: the path relative to the source root,
//! `/`-separated, without the `.rst` extension (`sphinx/基础教程`).
//!
//! ## Storage
//!
//! `doctidy scan` writes the registry to `<build_dir>/registry.json`. Loading
//! is forgiving: a missing, corrupt, or version-mismatched file loads as an
//! empty registry.

use crate::document::{self, Document, ImageStatus};
use crate::parallel;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Name of the registry file within the build directory.
const REGISTRY_FILENAME: &str = "registry.json";

/// Bump to invalidate previously written registries.
const REGISTRY_VERSION: u32 = 1;

/// Document name → image URIs in document order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRegistry {
    pub version: u32,
    pub documents: BTreeMap<String, Vec<String>>,
    /// Documents that could not be read or parsed, with the reason.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub unreadable: BTreeMap<String, String>,
}

impl Default for DocumentRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

/// Every `.rst` file under `root`, sorted, skipping hidden entries and any
/// directory whose name is in `exclude`.
pub fn find_documents(root: &Path, exclude: &[String]) -> Result<Vec<PathBuf>, walkdir::Error> {
    let mut docs = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && !(e.file_type().is_dir() && exclude.iter().any(|x| *x == name))
        });
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|e| e.to_str()) == Some("rst")
        {
            docs.push(entry.into_path());
        }
    }
    Ok(docs)
}

/// Sphinx-style document name for a path under `source_root`.
pub fn document_name(path: &Path, source_root: &Path) -> String {
    let rel = path.strip_prefix(source_root).unwrap_or(path);
    let rel = rel.with_extension("");
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

impl DocumentRegistry {
    pub fn empty() -> Self {
        Self {
            version: REGISTRY_VERSION,
            documents: BTreeMap::new(),
            unreadable: BTreeMap::new(),
        }
    }

    /// Walk the source tree and record every document's image URIs.
    ///
    /// A document that fails to read or parse is logged and listed in
    /// `unreadable`; it does not stop the scan.
    pub fn scan(source_root: &Path, exclude: &[String]) -> Result<Self, walkdir::Error> {
        let mut registry = Self::empty();
        for path in find_documents(source_root, exclude)? {
            let name = document_name(&path, source_root);
            match Document::open(&path).and_then(|doc| doc.image_uris()) {
                Ok(uris) => {
                    registry.documents.insert(name, uris);
                }
                Err(e) => {
                    tracing::warn!("skipping {}: {}", path.display(), e);
                    registry.unreadable.insert(name, e.to_string());
                }
            }
        }
        Ok(registry)
    }

    /// Inverse view: image path relative to the source root → documents
    /// that reference it. Remote URIs are left out.
    pub fn images(&self, source_root: &Path) -> BTreeMap<String, BTreeSet<String>> {
        let mut images: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (doc, uris) in &self.documents {
            let doc_path = source_root.join(format!("{doc}.rst"));
            for uri in uris.iter().filter(|u| !document::is_remote_uri(u)) {
                let resolved = document::resolve_uri(uri, &doc_path, source_root);
                let key = lexical_normalize(&resolved)
                    .strip_prefix(lexical_normalize(source_root))
                    .map(|p| {
                        p.components()
                            .map(|c| c.as_os_str().to_string_lossy().to_string())
                            .collect::<Vec<_>>()
                            .join("/")
                    })
                    .unwrap_or_else(|_| resolved.to_string_lossy().to_string());
                images.entry(key).or_default().insert(doc.clone());
            }
        }
        images
    }

    /// Absolute, lexically normalized paths of every local image referenced
    /// by any document.
    pub fn referenced_paths(&self, source_root: &Path) -> BTreeSet<PathBuf> {
        self.documents
            .iter()
            .flat_map(|(doc, uris)| {
                let doc_path = source_root.join(format!("{doc}.rst"));
                uris.iter()
                    .filter(|u| !document::is_remote_uri(u))
                    .map(move |uri| {
                        lexical_normalize(&document::resolve_uri(uri, &doc_path, source_root))
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn image_count(&self) -> usize {
        self.documents.values().map(Vec::len).sum()
    }

    /// Load from a directory. Returns an empty registry if the file doesn't
    /// exist or can't be parsed.
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(REGISTRY_FILENAME);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        let registry: Self = match serde_json::from_str(&content) {
            Ok(r) => r,
            Err(_) => return Self::empty(),
        };
        if registry.version != REGISTRY_VERSION {
            return Self::empty();
        }
        registry
    }

    /// Documents added, removed, or with a different image list compared to
    /// `previous`.
    pub fn changes_since(&self, previous: &Self) -> RegistryChanges {
        let mut changes = RegistryChanges::default();
        for (name, uris) in &self.documents {
            match previous.documents.get(name) {
                None => changes.added.push(name.clone()),
                Some(old) if old != uris => changes.changed.push(name.clone()),
                Some(_) => {}
            }
        }
        changes.removed = previous
            .documents
            .keys()
            .filter(|name| !self.documents.contains_key(*name))
            .cloned()
            .collect();
        changes
    }

    /// Save to a directory, creating it if needed.
    pub fn save(&self, dir: &Path) -> io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(REGISTRY_FILENAME);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

/// Document names that differ between two registries, each list sorted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

impl RegistryChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Image existence for one document, or why it could not be checked.
#[derive(Debug, Clone)]
pub struct DocumentCheck {
    pub path: PathBuf,
    pub result: Result<Vec<ImageStatus>, String>,
}

impl DocumentCheck {
    pub fn missing(&self) -> impl Iterator<Item = &ImageStatus> {
        self.result.iter().flatten().filter(|s| !s.exists)
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok() && self.missing().next().is_none()
    }
}

/// Check every document's images under `source_root`, in parallel.
pub fn check_documents(
    source_root: &Path,
    exclude: &[String],
) -> Result<Vec<DocumentCheck>, walkdir::Error> {
    let docs = find_documents(source_root, exclude)?;
    Ok(parallel::par_map(&docs, |path| DocumentCheck {
        path: path.clone(),
        result: Document::open(path)
            .and_then(|doc| doc.check_images(source_root))
            .map_err(|e| e.to_string()),
    }))
}

/// Resolve `.` and `..` components without touching the filesystem.
///
/// Renamed images no longer exist under their old names, so
/// `canonicalize` cannot be used on referenced paths.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn scan_records_documents_and_images() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path();
        write_file(source, "index.rst", "Home\n====\n\n.. toctree::\n\n   guide/setup\n");
        write_file(
            source,
            "guide/setup.rst",
            ".. image:: /_static/a.png\n\n.. image:: ../_static/b.png\n",
        );

        let registry = DocumentRegistry::scan(source, &[]).unwrap();
        assert_eq!(registry.document_count(), 2);
        assert_eq!(registry.documents["index"], Vec::<String>::new());
        assert_eq!(
            registry.documents["guide/setup"],
            vec!["/_static/a.png", "../_static/b.png"]
        );
    }

    #[test]
    fn images_view_matches_sphinx_shape() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path();
        write_file(source, "a.rst", ".. image:: /_static/shared.png\n");
        write_file(
            source,
            "sub/b.rst",
            ".. image:: ../_static/shared.png\n\n.. image:: https://example.com/x.png\n",
        );

        let registry = DocumentRegistry::scan(source, &[]).unwrap();
        let images = registry.images(source);
        assert_eq!(images.len(), 1);
        let docs: Vec<&String> = images["_static/shared.png"].iter().collect();
        assert_eq!(docs, vec!["a", "sub/b"]);
    }

    #[test]
    fn unreadable_documents_are_recorded_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path();
        write_file(source, "good.rst", ".. image:: /_static/a.png\n");
        write_file(source, "empty.rst", "");

        let registry = DocumentRegistry::scan(source, &[]).unwrap();
        assert_eq!(registry.document_count(), 1);
        assert!(registry.unreadable.contains_key("empty"));
    }

    #[test]
    fn excluded_and_hidden_directories_skipped() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path();
        write_file(source, "keep.rst", "text");
        write_file(source, "_build/skip.rst", "text");
        write_file(source, ".hidden/skip.rst", "text");

        let docs = find_documents(source, &["_build".to_string()]).unwrap();
        assert_eq!(docs, vec![source.join("keep.rst")]);
    }

    #[test]
    fn referenced_paths_resolve_relative_uris() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path();
        write_file(source, "sub/page.rst", ".. image:: ../_static/a.png\n");

        let registry = DocumentRegistry::scan(source, &[]).unwrap();
        let refs = registry.referenced_paths(source);
        assert!(refs.contains(&lexical_normalize(&source.join("_static/a.png"))));
    }

    #[test]
    fn check_documents_reports_missing_and_unreadable() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path();
        write_file(source, "_static/a.png", "png");
        write_file(source, "ok.rst", ".. image:: /_static/a.png\n");
        write_file(source, "gap.rst", ".. image:: /_static/gone.png\n");
        write_file(source, "bad.rst", ".. image::\n");

        let checks = check_documents(source, &[]).unwrap();
        let by_name = |name: &str| {
            checks
                .iter()
                .find(|c| c.path.ends_with(name))
                .unwrap_or_else(|| panic!("{name} not checked"))
        };
        assert!(by_name("ok.rst").is_ok());
        assert_eq!(by_name("gap.rst").missing().count(), 1);
        assert!(by_name("bad.rst").result.is_err());
        assert!(!by_name("bad.rst").is_ok());
    }

    #[test]
    fn document_name_is_slash_separated_without_extension() {
        let root = Path::new("/docs/source");
        assert_eq!(
            document_name(Path::new("/docs/source/sphinx/基础教程.rst"), root),
            "sphinx/基础教程"
        );
    }

    #[test]
    fn lexical_normalize_resolves_parent_dirs() {
        assert_eq!(
            lexical_normalize(Path::new("/a/b/../c/./d.png")),
            PathBuf::from("/a/c/d.png")
        );
    }

    // =========================================================================
    // Save / Load
    // =========================================================================

    #[test]
    fn save_and_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let mut registry = DocumentRegistry::empty();
        registry
            .documents
            .insert("index".into(), vec!["/_static/a.png".into()]);
        registry.save(tmp.path()).unwrap();
        assert_eq!(DocumentRegistry::load(tmp.path()), registry);
    }

    #[test]
    fn load_missing_or_corrupt_is_empty() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(DocumentRegistry::load(tmp.path()).document_count(), 0);
        fs::write(tmp.path().join(REGISTRY_FILENAME), "not json").unwrap();
        assert_eq!(DocumentRegistry::load(tmp.path()).document_count(), 0);
    }

    #[test]
    fn load_wrong_version_is_empty() {
        let tmp = TempDir::new().unwrap();
        let json = format!(
            r#"{{"version": {}, "documents": {{"index": ["a.png"]}}}}"#,
            REGISTRY_VERSION + 1
        );
        fs::write(tmp.path().join(REGISTRY_FILENAME), json).unwrap();
        assert_eq!(DocumentRegistry::load(tmp.path()).document_count(), 0);
    }

    #[test]
    fn changes_since_previous_scan() {
        let mut previous = DocumentRegistry::empty();
        previous.documents.insert("index".into(), vec!["a.png".into()]);
        previous.documents.insert("gone".into(), vec![]);
        previous.documents.insert("same".into(), vec!["b.png".into()]);
        let mut current = DocumentRegistry::empty();
        current.documents.insert("index".into(), vec!["c.png".into()]);
        current.documents.insert("new".into(), vec![]);
        current.documents.insert("same".into(), vec!["b.png".into()]);

        let changes = current.changes_since(&previous);
        assert_eq!(changes.added, vec!["new"]);
        assert_eq!(changes.removed, vec!["gone"]);
        assert_eq!(changes.changed, vec!["index"]);
        assert!(current.changes_since(&current).is_empty());
    }
}
