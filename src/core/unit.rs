//! Translation units and the artifacts produced from them.

use std::borrow::Cow;
use std::fs;
use std::path::PathBuf;

use super::error::{Error, Result};

/// One input handed to a translation job.
///
/// Standalone inputs stay on disk; archive members are held in memory after
/// extraction and shipped to the worker as bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputUnit {
    File { path: PathBuf },
    Member { name: String, bytes: Vec<u8> },
}

impl InputUnit {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }

    pub fn member(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::Member {
            name: name.into(),
            bytes,
        }
    }

    /// Name used for output path resolution and in messages.
    pub fn name(&self) -> Cow<'_, str> {
        match self {
            Self::File { path } => path.to_string_lossy(),
            Self::Member { name, .. } => Cow::Borrowed(name),
        }
    }

    /// Contents of the unit, reading file-backed units from disk.
    pub fn contents(&self) -> Result<Cow<'_, [u8]>> {
        match self {
            Self::File { path } => fs::read(path)
                .map(Cow::Owned)
                .map_err(|e| Error::fs("read", path, e)),
            Self::Member { bytes, .. } => Ok(Cow::Borrowed(bytes)),
        }
    }

    /// The preferred way of emitting native code for this unit.
    ///
    /// Standalone files go through a backend temp file that is renamed into
    /// place; archive members are generated in memory and written directly.
    pub fn emit_mode(&self) -> EmitMode {
        match self {
            Self::File { .. } => EmitMode::File,
            Self::Member { .. } => EmitMode::Memory,
        }
    }
}

/// How the backend should hand back generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitMode {
    File,
    Memory,
}

/// Native code produced by the backend for one unit.
#[derive(Debug, PartialEq, Eq)]
pub enum OutputArtifact {
    /// Generated code held in memory.
    Buffer(Vec<u8>),
    /// A temp file the backend wrote on its own.
    TempFile(PathBuf),
}
