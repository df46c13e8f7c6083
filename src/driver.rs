//! The full `doctidy build` sequence.
//!
//! ```text
//! 1. Clean       rm -r build/
//! 2. Build       sphinx-build -W ...          (must pass before anything is renamed)
//! 3. Format      rename + rewrite + normalize (see [`batch`](crate::batch))
//! 4. Quarantine  re-scan sources, move unreferenced images aside
//! 5. Rebuild     sphinx-build -W ...
//! ```
//!
//! The first build is a gate: broken sources stop the run before any file
//! is touched. From step 3 on, changes are durable. Renames, rewrites and
//! quarantine moves agree with each other once step 4 finishes, so a failed
//! rebuild leaves them in place and is reported in [`DriverReport::status`]
//! rather than as an error.
//!
//! Step 4 scans the sources again instead of reusing anything gathered
//! before renaming; the registry it builds reflects the rewritten documents.
//! If that picture is incomplete (a document failed to format or could not
//! be scanned) an image may look unreferenced when it is not, so step 4 is
//! skipped and the reason lands in [`DriverReport::quarantine_skipped`].

use crate::batch::{BatchError, BatchEvent, BatchProcessor};
use crate::builder::{BuildOutcome, BuildRequest, BuildStatus, BuilderError, DocBuilder};
use crate::config::{self, ConfigError, ProjectConfig, ProjectPaths};
use crate::quarantine::{self, QuarantineError, QuarantinedFile};
use crate::registry::DocumentRegistry;
use crate::types::BatchReport;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("failed to remove build directory {path}: {source}")]
    Clean {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("initial build {0}; nothing was changed")]
    BuildFailed(BuildStatus),
    #[error(transparent)]
    Builder(#[from] BuilderError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error(transparent)]
    Quarantine(#[from] QuarantineError),
}

/// A loaded project: its configuration and the directories derived from it.
#[derive(Debug, Clone)]
pub struct Project {
    pub config: ProjectConfig,
    pub paths: ProjectPaths,
}

impl Project {
    pub fn new(root: &Path, config: ProjectConfig) -> Self {
        let paths = config.paths(root);
        Self { config, paths }
    }

    /// Load `doctidy.toml` from `root` (stock defaults if absent).
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        Ok(Self::new(root, config::load_config(root)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Clean,
    Build,
    Format,
    Quarantine,
    Rebuild,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Clean => "Cleaning build directory",
            Stage::Build => "Building (strict)",
            Stage::Format => "Renaming images and formatting documents",
            Stage::Quarantine => "Quarantining unreferenced images",
            Stage::Rebuild => "Rebuilding",
        }
    }
}

/// Progress events emitted while the driver runs.
#[derive(Debug, Clone)]
pub enum DriverEvent {
    StageStarted { stage: Stage },
    Batch(BatchEvent),
    Quarantined(QuarantinedFile),
    QuarantineSkipped { reason: String },
}

#[derive(Debug, Clone)]
pub struct DriverReport {
    pub batch: BatchReport,
    pub quarantined: Vec<QuarantinedFile>,
    /// Set when step 4 did not run, with the reason.
    pub quarantine_skipped: Option<String>,
    /// Outcome of the final rebuild.
    pub rebuild: BuildOutcome,
    /// Wall-clock time of the whole run.
    pub elapsed: Duration,
}

impl DriverReport {
    pub fn status(&self) -> BuildStatus {
        self.rebuild.status
    }
}

/// Remove `dir` and everything below it. A missing directory is fine.
pub fn clean_build_dir(dir: &Path) -> Result<(), DriverError> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(DriverError::Clean {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

/// Run the full sequence. See the module docs.
pub fn run(
    project: &Project,
    builder: &impl DocBuilder,
    events: Option<Sender<DriverEvent>>,
) -> Result<DriverReport, DriverError> {
    let start = Instant::now();
    let paths = &project.paths;
    let config = &project.config;
    let emit = |event: DriverEvent| {
        if let Some(tx) = &events {
            tx.send(event).ok();
        }
    };

    emit(DriverEvent::StageStarted {
        stage: Stage::Clean,
    });
    clean_build_dir(&paths.build)?;

    emit(DriverEvent::StageStarted {
        stage: Stage::Build,
    });
    let request = BuildRequest::from_paths(paths, &config.builder);
    let first = builder.build(&request)?;
    if !first.status.success() {
        return Err(DriverError::BuildFailed(first.status));
    }

    emit(DriverEvent::StageStarted {
        stage: Stage::Format,
    });
    let processor = BatchProcessor::from_config(paths, config)?;
    let batch = std::thread::scope(|s| {
        let (batch_tx, batch_rx) = mpsc::channel();
        if let Some(tx) = events.clone() {
            s.spawn(move || {
                for event in batch_rx {
                    tx.send(DriverEvent::Batch(event)).ok();
                }
            });
        }
        processor.process(Some(batch_tx))
    })?;

    emit(DriverEvent::StageStarted {
        stage: Stage::Quarantine,
    });
    let registry =
        DocumentRegistry::scan(&paths.source, &config.exclude).map_err(BatchError::from)?;
    let quarantine_skipped = quarantine_blocker(&batch, &registry);
    let quarantined = match &quarantine_skipped {
        Some(reason) => {
            tracing::warn!("quarantine skipped: {}", reason);
            emit(DriverEvent::QuarantineSkipped {
                reason: reason.clone(),
            });
            Vec::new()
        }
        None => {
            let referenced = registry.referenced_paths(&paths.source);
            quarantine::quarantine_unreferenced(&paths.images, &paths.quarantine, &referenced)?
        }
    };
    for file in &quarantined {
        emit(DriverEvent::Quarantined(file.clone()));
    }

    emit(DriverEvent::StageStarted {
        stage: Stage::Rebuild,
    });
    let rebuild = builder.build(&request)?;
    if !rebuild.status.success() {
        tracing::error!("rebuild {}", rebuild.status);
    }

    Ok(DriverReport {
        batch,
        quarantined,
        quarantine_skipped,
        rebuild,
        elapsed: start.elapsed(),
    })
}

/// Why the reference picture is too incomplete to quarantine from, if it is.
fn quarantine_blocker(batch: &BatchReport, registry: &DocumentRegistry) -> Option<String> {
    let failed = batch.failures().count();
    if failed > 0 {
        return Some(format!("{failed} document(s) failed to format"));
    }
    if !registry.unreadable.is_empty() {
        let names: Vec<&str> = registry.unreadable.keys().map(String::as_str).collect();
        return Some(format!("could not scan {}", names.join(", ")));
    }
    None
}
