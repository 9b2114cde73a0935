// This module places finished artifacts at their final location. resolve_output_path maps a
// unit name onto `<out-dir>/<basename>`, stripping any directory components (archive member
// names and standalone paths alike). place moves an OutputArtifact into position: temp
// files produced by the backend are renamed, falling back to copy-then-delete when the
// rename crosses a filesystem boundary, and in-memory buffers are written out in full.
// relocate_with takes the rename primitive as a parameter so the cross-device fallback can
// be exercised without two real filesystems.

//! Output path resolution and artifact placement.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::error::{Error, Result};
use super::unit::OutputArtifact;

/// `out_dir / basename(name)`.
pub fn resolve_output_path(name: &str, out_dir: &Path) -> Result<PathBuf> {
    let base = Path::new(name)
        .file_name()
        .ok_or_else(|| Error::InvalidUnitName {
            name: name.to_string(),
        })?;
    Ok(out_dir.join(base))
}

/// Move `artifact` to `dest`.
pub fn place(artifact: OutputArtifact, dest: &Path) -> Result<()> {
    match artifact {
        OutputArtifact::TempFile(src) => relocate(&src, dest),
        OutputArtifact::Buffer(bytes) => write_buffer(&bytes, dest),
    }
}

/// Rename `src` to `dest`, copying across filesystems when needed.
pub fn relocate(src: &Path, dest: &Path) -> Result<()> {
    relocate_with(src, dest, |from, to| fs::rename(from, to))
}

pub fn relocate_with<F>(src: &Path, dest: &Path, rename: F) -> Result<()>
where
    F: FnOnce(&Path, &Path) -> io::Result<()>,
{
    match rename(src, dest) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
            log::debug!(
                "{} and {} are on different filesystems, copying",
                src.display(),
                dest.display()
            );
            fs::copy(src, dest).map_err(|e| Error::fs("copy", src, e))?;
            fs::remove_file(src).map_err(|e| Error::fs("remove", src, e))
        }
        Err(err) => Err(Error::fs("rename", src, err)),
    }
}

/// Create or truncate `dest` and write all of `bytes` to it.
pub fn write_buffer(bytes: &[u8], dest: &Path) -> Result<()> {
    let mut file = File::create(dest).map_err(|e| Error::fs("open for writing", dest, e))?;
    file.write_all(bytes)
        .and_then(|()| file.flush())
        .map_err(|e| Error::fs("write", dest, e))?;

    // Length on disk must match what was handed in.
    let written = file
        .metadata()
        .map_err(|e| Error::fs("stat", dest, e))?
        .len();
    if written != bytes.len() as u64 {
        return Err(Error::fs(
            "write",
            dest,
            io::Error::new(
                io::ErrorKind::WriteZero,
                format!("wrote {written} of {} bytes", bytes.len()),
            ),
        ));
    }
    Ok(())
}

/// Copy a file unchanged.
pub fn copy_file(src: &Path, dest: &Path) -> Result<()> {
    fs::copy(src, dest)
        .map(|_| ())
        .map_err(|e| Error::fs("copy", src, e))
}
