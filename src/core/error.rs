// This module defines the error taxonomy for bc2obj using the thiserror crate. Error is the
// single enum every layer reports through: usage errors and the upfront input check abort
// the whole run, filesystem errors are fatal to the unit or archive they occurred in, load
// and backend errors fail a single translation unit, and worker-fatal errors record a worker
// process that was killed by a signal. Archive-specific variants cover a corrupt container
// and the external archiver (not found on PATH, or a non-zero exit). Every variant carries
// the offending path or label so the operator-visible message always names the input that
// failed. Result<T> is the crate-wide alias.

//! Error types for bc2obj.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Main error type for translation and orchestration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Usage(String),

    #[error("{}: is not a file", path.display())]
    NotAFile { path: PathBuf },

    #[error("cannot {action} {}: {source}", path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}: {message}")]
    Load { path: String, message: String },

    #[error("{path}: {message}")]
    Backend { path: String, message: String },

    #[error("{label}: worker killed by signal {signal}")]
    WorkerFatal { label: String, signal: i32 },

    #[error("{}: invalid archive: {message}", path.display())]
    InvalidArchive { path: PathBuf, message: String },

    #[error("unable to find '{program}' in PATH")]
    ArchiverNotFound { program: String },

    #[error("{} failed: {status}", program.display())]
    Archiver { program: PathBuf, status: ExitStatus },

    /// Placing a unit's output failed; `unit` is the input it was produced from.
    #[error("{unit}: {source}")]
    Output {
        unit: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{name}: unit name has no file name component")]
    InvalidUnitName { name: String },
}

impl Error {
    /// Wrap an I/O error with the action that failed and the path involved.
    pub fn fs(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            action,
            path: path.into(),
            source,
        }
    }

    /// Attribute an output placement failure to `unit`.
    pub fn output(unit: impl Into<String>, source: Error) -> Self {
        Self::Output {
            unit: unit.into(),
            source: Box::new(source),
        }
    }
}

/// Result type alias for bc2obj operations.
pub type Result<T> = std::result::Result<T, Error>;
