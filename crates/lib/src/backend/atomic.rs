//! Crash-safe file replacement shared by the on-disk backends.

use std::{fs, io::Write, path::Path};

use serde::Serialize;
use tempfile::NamedTempFile;

use super::errors::BackendError;
use crate::{Error, Result};

fn io(e: std::io::Error) -> Error {
    BackendError::FileIo { source: e }.into()
}

/// Serializes `value` as pretty JSON and atomically replaces `path` with it.
///
/// The data is written to a uniquely named temporary file in the target's
/// directory and renamed into place. An existing file's permissions carry
/// over to the replacement.
pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value)
        .map_err(|e| -> Error { BackendError::SerializationFailed { source: e }.into() })?;
    json.push('\n');

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(io)?;
    tmp.write_all(json.as_bytes()).map_err(io)?;
    tmp.as_file().sync_all().map_err(io)?;
    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(tmp.path(), meta.permissions()).map_err(io)?;
    }
    tmp.persist(path).map_err(|e| io(e.error))?;
    Ok(())
}

/// Nearest existing path at or above `path`.
pub(crate) fn nearest_existing(path: &Path) -> &Path {
    let mut current = path;
    loop {
        if current.exists() {
            return current;
        }
        match current.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => current = parent,
            _ => return Path::new("."),
        }
    }
}

/// Whether `path`, or the directory it would be created in, accepts writes.
pub(crate) fn is_path_writable(path: &Path) -> bool {
    fs::metadata(nearest_existing(path)).is_ok_and(|meta| !meta.permissions().readonly())
}
