//! Typed errors for provisioning and profiling.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the stage. Provisioning and directory-setup errors are
/// fatal to the whole stage; subprocess errors are collected per stage and
/// only fail the run in strict mode.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("unsupported platform: no tf-profile release for {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("download failed for {url}: {detail}")]
    Download { url: String, detail: String },

    #[error("bad release archive: {detail}")]
    Archive { detail: String },

    #[error("could not create reports output directory {}", .path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no log directories under {}", .root.display())]
    LogNotFound { root: PathBuf },

    #[error("{command} failed: {detail}")]
    Subprocess { command: String, detail: String },

    #[error("profiling failed for stages: {}", .stages.join(", "))]
    Profile { stages: Vec<String> },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl StageError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
