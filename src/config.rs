//! Project configuration module.
//!
//! Handles loading, validating, and merging `doctidy.toml`. The file lives in
//! the project root (the directory holding `source/` and `build/`) and is
//! optional: stock defaults describe the usual `sphinx-quickstart` layout
//! with separated source and build directories.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! source_dir = "source"              # Sphinx source (and conf.py) directory
//! build_dir = "build"                # Cleared before every build
//! image_dir = "source/_static"       # Images that get content-addressed
//! quarantine_dir = "unused_images"   # Unreferenced images are moved here
//! index_documents = ["index.rst"]    # Never get references rewritten
//! exclude = ["_build", "_templates"] # Directory names skipped when walking
//!
//! [builder]
//! command = "sphinx-build"
//! name = "html"                      # Sphinx builder name (-b)
//! strict = true                      # Warnings are errors (-W)
//! extra_args = []
//!
//! [processing]
//! max_processes = 4                  # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! All relative paths are resolved against the project root. Unknown keys are
//! rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the config file looked up in the project root.
pub const CONFIG_FILENAME: &str = "doctidy.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Project configuration loaded from `doctidy.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    /// Sphinx source directory; also where `conf.py` lives.
    pub source_dir: String,
    /// Build output root. `html/` and `doctrees/` are created below it.
    pub build_dir: String,
    /// Directory whose files are renamed to their content address.
    pub image_dir: String,
    /// Holding directory for images no document references.
    pub quarantine_dir: String,
    /// Document file names whose image references are never rewritten.
    pub index_documents: Vec<String>,
    /// Directory names skipped when walking the source tree.
    pub exclude: Vec<String>,
    /// External documentation builder settings.
    pub builder: BuilderConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            source_dir: "source".to_string(),
            build_dir: "build".to_string(),
            image_dir: "source/_static".to_string(),
            quarantine_dir: "unused_images".to_string(),
            index_documents: vec!["index.rst".to_string()],
            exclude: vec!["_build".to_string(), "_templates".to_string()],
            builder: BuilderConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl ProjectConfig {
    /// Validate config values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("source_dir", &self.source_dir),
            ("build_dir", &self.build_dir),
            ("image_dir", &self.image_dir),
            ("quarantine_dir", &self.quarantine_dir),
            ("builder.command", &self.builder.command),
            ("builder.name", &self.builder.name),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        if Path::new(&self.quarantine_dir) == Path::new(&self.image_dir) {
            return Err(ConfigError::Validation(
                "quarantine_dir must differ from image_dir".into(),
            ));
        }
        if Path::new(&self.build_dir) == Path::new(&self.source_dir) {
            return Err(ConfigError::Validation(
                "build_dir must differ from source_dir".into(),
            ));
        }
        Ok(())
    }

    /// Resolve every configured directory against the project root.
    pub fn paths(&self, root: &Path) -> ProjectPaths {
        let build = root.join(&self.build_dir);
        ProjectPaths {
            root: root.to_path_buf(),
            source: root.join(&self.source_dir),
            html: build.join(&self.builder.name),
            doctrees: build.join("doctrees"),
            build,
            images: root.join(&self.image_dir),
            quarantine: root.join(&self.quarantine_dir),
        }
    }
}

/// Absolute (root-joined) locations derived from a [`ProjectConfig`].
///
/// Passed explicitly to every stage; nothing relies on the process working
/// directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub source: PathBuf,
    pub build: PathBuf,
    pub html: PathBuf,
    pub doctrees: PathBuf,
    pub images: PathBuf,
    pub quarantine: PathBuf,
}

/// External builder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuilderConfig {
    /// Executable to run.
    pub command: String,
    /// Sphinx builder name passed as `-b`.
    pub name: String,
    /// Escalate warnings to errors (`-W`).
    pub strict: bool,
    /// Extra arguments appended verbatim.
    pub extra_args: Vec<String>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            command: "sphinx-build".to_string(),
            name: "html".to_string(),
            strict: true,
            extra_args: Vec::new(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ProjectConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `doctidy.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(root: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = root.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ProjectConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ProjectConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `doctidy.toml` in the project root.
pub fn load_config(root: &Path) -> Result<ProjectConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `doctidy.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# doctidy Configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Relative paths are resolved
# against the directory holding this file.
# Unknown keys will cause an error.

# Sphinx source directory (holds conf.py and the .rst tree).
source_dir = "source"

# Build output root. Removed and recreated on every `doctidy build`.
build_dir = "build"

# Images in this directory are renamed to the SHA1 of their content.
image_dir = "source/_static"

# Images that no document references are moved here, never deleted.
quarantine_dir = "unused_images"

# Documents whose image references are left alone (still normalized).
index_documents = ["index.rst"]

# Directory names skipped when looking for .rst documents.
exclude = ["_build", "_templates"]

# ---------------------------------------------------------------------------
# External documentation builder
# ---------------------------------------------------------------------------
[builder]
command = "sphinx-build"

# Sphinx builder name (-b).
name = "html"

# Treat every build warning as an error (-W).
strict = true

# Extra arguments appended to the builder command line.
extra_args = []

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers for hashing and document processing.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
