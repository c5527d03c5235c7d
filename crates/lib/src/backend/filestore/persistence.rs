//! JSON document I/O for the filestore backend
//!
//! The document is a pretty-printed [`Root`] with a format version. Writes
//! go through a temporary file renamed over the store, so a reader never
//! observes a half-written document.

use std::{fs, io::ErrorKind, path::Path};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    Error, Result,
    backend::{atomic, errors::BackendError, table::Table},
    entry::{Entry, Root},
};

/// The current document format version.
/// v0 indicates this is an unstable format subject to breaking changes.
const PERSISTENCE_VERSION: u8 = 0;

/// Helper to check if version is default (0) for serde skip_serializing_if
fn is_v0(v: &u8) -> bool {
    *v == 0
}

/// Validates the document version during deserialization.
fn validate_persistence_version<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let version = u8::deserialize(deserializer)?;
    if version != PERSISTENCE_VERSION {
        return Err(serde::de::Error::custom(format!(
            "unsupported filestore version {version}; only version {PERSISTENCE_VERSION} is supported"
        )));
    }
    Ok(version)
}

/// On-disk form of the root document.
#[derive(Serialize, Deserialize)]
struct SerializableRoot {
    #[serde(
        rename = "_v",
        default,
        skip_serializing_if = "is_v0",
        deserialize_with = "validate_persistence_version"
    )]
    version: u8,
    #[serde(default)]
    entries: Vec<Entry>,
}

/// Reads the document at `path` into a table.
///
/// Returns `None` if the file does not exist or is empty.
pub(crate) fn load(path: &Path) -> Result<Option<Table>> {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(BackendError::FileIo { source: e }.into()),
    };
    if json.trim().is_empty() {
        return Ok(None);
    }
    let doc: SerializableRoot = serde_json::from_str(&json)
        .map_err(|e| -> Error { BackendError::DeserializationFailed { source: e }.into() })?;
    Ok(Some(Table::from_root(Root::new(doc.entries))))
}

/// Atomically replaces the document at `path` with `table`'s contents.
pub(crate) fn store(path: &Path, table: &Table) -> Result<()> {
    let doc = SerializableRoot {
        version: PERSISTENCE_VERSION,
        entries: table.to_root()?.entries,
    };
    atomic::write_json(path, &doc)
}
