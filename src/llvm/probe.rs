//! Container probing for translation units.
//!
//! Decides structurally whether a unit carries bitcode: a raw bitcode
//! stream, a bitcode wrapper, or a native object with an embedded bitcode
//! section. A native object without such a section is reported as
//! [`LoadError::NotBitcode`] so the job can copy it through unchanged.

use object::{Object, ObjectSection};
use thiserror::Error;

const BITCODE_MAGIC: [u8; 4] = [b'B', b'C', 0xC0, 0xDE];
const WRAPPER_MAGIC: [u8; 4] = [0xDE, 0xC0, 0x17, 0x0B];

/// Section names used to embed bitcode in ELF/COFF and Mach-O objects.
const EMBEDDED_SECTIONS: &[&str] = &[".llvmbc", "__bitcode"];

/// Why a unit could not be loaded as a module.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("bitcode section not found in object file")]
    NotBitcode,

    #[error("{0}")]
    Invalid(String),
}

/// Locate the bitcode stream inside `bytes`.
pub fn bitcode_slice(bytes: &[u8]) -> Result<&[u8], LoadError> {
    if bytes.starts_with(&BITCODE_MAGIC) || bytes.starts_with(&WRAPPER_MAGIC) {
        return Ok(bytes);
    }

    let file = object::File::parse(bytes).map_err(|err| {
        LoadError::Invalid(format!("not a bitcode or object file: {err}"))
    })?;

    for name in EMBEDDED_SECTIONS {
        if let Some(section) = file.section_by_name(name) {
            return section
                .data()
                .map_err(|err| LoadError::Invalid(format!("unreadable {name} section: {err}")));
        }
    }

    Err(LoadError::NotBitcode)
}
