//! Destination paths and file writes for emitted documents.
//!
//! ```text
//! base:   docs/            record: docs/guide/a.md     out: dist/
//! result: dist/guide/a.html
//! ```
//!
//! Every emitted document gets an `.html` extension: an existing extension is
//! replaced, a missing one is added. Writes create parent directories and are
//! not rolled back when a later write fails.

use crate::error::BuildError;
use std::fs;
use std::path::{Path, PathBuf};

pub const OUTPUT_EXTENSION: &str = "html";

/// Map a record path under `base_dir` to its destination under `output_dir`.
///
/// A record outside `base_dir` keeps its file name only.
pub fn destination_path(base_dir: &Path, record_path: &Path, output_dir: &Path) -> PathBuf {
    let relative = record_path
        .strip_prefix(base_dir)
        .ok()
        .filter(|rel| !rel.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .or_else(|| record_path.file_name().map(PathBuf::from))
        .unwrap_or_default();
    output_dir.join(relative).with_extension(OUTPUT_EXTENSION)
}

fn ensure_parent(path: &Path) -> Result<(), BuildError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }
    Ok(())
}

/// Write `content` to `path`, creating parent directories.
pub fn write_file(path: &Path, content: &str) -> Result<(), BuildError> {
    ensure_parent(path)?;
    fs::write(path, content).map_err(|e| BuildError::io(path, e))
}

/// Copy `source` into `output_dir` byte for byte, returning the new path.
pub fn copy_file(source: &Path, output_dir: &Path) -> Result<PathBuf, BuildError> {
    let file_name = source
        .file_name()
        .ok_or_else(|| BuildError::State(format!("cannot copy '{}'", source.display())))?;
    let destination = output_dir.join(file_name);
    fs::create_dir_all(output_dir).map_err(|e| BuildError::io(output_dir, e))?;
    fs::copy(source, &destination).map_err(|e| BuildError::io(source, e))?;
    Ok(destination)
}
