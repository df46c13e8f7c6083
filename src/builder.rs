//! External documentation builder.
//!
//! The [`DocBuilder`] trait is the seam between the driver and whatever
//! renders the site. The production implementation, [`SphinxBuilder`], runs
//! `sphinx-build` as a subprocess with inherited stdio, so the builder's own
//! progress and warnings go straight to the terminal.
//!
//! ```text
//! sphinx-build -b html -W -c source -d build/doctrees source build/html
//! ```

use crate::config::{BuilderConfig, ProjectPaths};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuilderError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Everything one builder invocation needs.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildRequest {
    pub source_dir: PathBuf,
    /// Directory holding `conf.py`.
    pub config_dir: PathBuf,
    pub output_dir: PathBuf,
    pub doctree_dir: PathBuf,
    /// Builder format, e.g. `html`.
    pub builder_name: String,
    /// Treat warnings as errors.
    pub strict: bool,
}

impl BuildRequest {
    pub fn from_paths(paths: &ProjectPaths, builder: &BuilderConfig) -> Self {
        Self {
            source_dir: paths.source.clone(),
            config_dir: paths.source.clone(),
            output_dir: paths.html.clone(),
            doctree_dir: paths.doctrees.clone(),
            builder_name: builder.name.clone(),
            strict: builder.strict,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Succeeded,
    /// Exit code, or `None` if the process was killed by a signal.
    Failed(Option<i32>),
}

impl BuildStatus {
    pub fn success(&self) -> bool {
        matches!(self, BuildStatus::Succeeded)
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStatus::Succeeded => write!(f, "succeeded"),
            BuildStatus::Failed(Some(code)) => write!(f, "failed (exit code {code})"),
            BuildStatus::Failed(None) => write!(f, "failed (terminated by signal)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutcome {
    pub status: BuildStatus,
    pub elapsed: Duration,
}

/// Something that can render the documentation tree.
pub trait DocBuilder: Sync {
    fn build(&self, request: &BuildRequest) -> Result<BuildOutcome, BuilderError>;
}

/// Runs `sphinx-build` (or a compatible command).
#[derive(Debug, Clone)]
pub struct SphinxBuilder {
    program: String,
    extra_args: Vec<String>,
}

impl SphinxBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn from_config(config: &BuilderConfig) -> Self {
        Self {
            program: config.command.clone(),
            extra_args: config.extra_args.clone(),
        }
    }

    /// Arguments passed to the program for `request`.
    pub fn args(&self, request: &BuildRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-b".into(), request.builder_name.clone().into()];
        if request.strict {
            args.push("-W".into());
        }
        args.push("-c".into());
        args.push(request.config_dir.clone().into());
        args.push("-d".into());
        args.push(request.doctree_dir.clone().into());
        args.push(request.source_dir.clone().into());
        args.push(request.output_dir.clone().into());
        args.extend(self.extra_args.iter().map(OsString::from));
        args
    }
}

impl DocBuilder for SphinxBuilder {
    fn build(&self, request: &BuildRequest) -> Result<BuildOutcome, BuilderError> {
        let args = self.args(request);
        tracing::info!(
            "running {} {}",
            self.program,
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );
        let start = Instant::now();
        let status = Command::new(&self.program)
            .args(&args)
            .status()
            .map_err(|source| BuilderError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        let status = if status.success() {
            BuildStatus::Succeeded
        } else {
            BuildStatus::Failed(status.code())
        };
        Ok(BuildOutcome {
            status,
            elapsed: start.elapsed(),
        })
    }
}
