//! Storage backends for superscore entries
//!
//! This module provides the [`Backend`] trait and its implementations:
//!
//! * [`FilestoreBackend`]: a single JSON document holding the whole [`Root`].
//! * [`DirectoryBackend`]: one JSON file per entry under a hashed directory tree.
//! * [`TestBackend`]: an in-memory table for tests and scratch sessions.
//!
//! All three share the operations in [`table`], so they agree on ownership,
//! revision checks and the [`BackendError`] taxonomy.

use std::{fmt, path::PathBuf, str::FromStr};

use crate::Result;
use crate::entry::{Entry, ID, Root};

mod atomic;
pub mod directory;
pub mod errors;
pub mod filestore;
pub mod memory;
pub mod search;
pub mod table;

pub use directory::DirectoryBackend;
pub use errors::BackendError;
pub use filestore::FilestoreBackend;
pub use memory::TestBackend;
pub use search::{SearchOperator, SearchTerm};
pub use table::{EntryTable, SearchResults, Table};

/// Storage abstraction for superscore entries.
///
/// Operations are synchronous and may block on I/O. Implementations must be
/// `Send` and `Sync` so a client can be shared across tasks.
///
/// ## Ownership
///
/// An entry owns an embedded descendant when the descendant's `parent` is
/// the entry's id. [`Backend::get_entry`] re-embeds owned descendants and
/// leaves every other child reference as an id, so an entry read back after
/// [`Backend::save_entry`] compares equal to the saved value.
pub trait Backend: Send + Sync + fmt::Debug {
    /// Retrieves an entry with its owned descendants embedded.
    ///
    /// Fails with [`BackendError::EntryNotFound`] for unknown ids.
    fn get_entry(&self, id: &ID) -> Result<Entry>;

    /// Persists a new entry.
    ///
    /// The entry is normalized in place first: placeholder ids are replaced
    /// and embedded children without a parent are pointed at their
    /// container. If the entry names a parent, it is appended to that
    /// parent's children; otherwise it becomes a root-level entry.
    fn save_entry(&self, entry: &mut Entry) -> Result<()>;

    /// Replaces a stored entry. The caller's revision must match storage;
    /// on success the caller's copy carries the new revision.
    fn update_entry(&self, entry: &mut Entry) -> Result<()>;

    /// Removes an entry and all references to it.
    fn delete_entry(&self, entry: &Entry, cascade: bool) -> Result<()>;

    /// Whether this backend would accept a write of `entry`.
    fn is_writable(&self, entry: &Entry) -> bool;

    /// Lazily yields every entry matching all `terms`.
    fn search(&self, terms: &[SearchTerm]) -> Result<SearchResults>;

    /// The full root document.
    fn root(&self) -> Result<Root>;

    /// Resolves every id reference in `entry`, leaving unknown ids in place.
    fn fill_uuids(&self, entry: Entry) -> Result<Entry>;

    /// Which registered kind this backend is.
    fn kind(&self) -> BackendKind;

    /// Whether an entry with this id is stored.
    fn contains(&self, id: &ID) -> Result<bool> {
        match self.get_entry(id) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Registered backend types, selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Filestore,
    Directory,
    Test,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Filestore => "filestore",
            BackendKind::Directory => "directory",
            BackendKind::Test => "test",
        }
    }

    /// Opens a backend of this kind. `path` is required by the on-disk kinds.
    pub fn open(&self, path: Option<PathBuf>) -> Result<Box<dyn Backend>> {
        let need_path = || BackendError::InvalidConfiguration {
            reason: format!("the {} backend needs a path", self.as_str()),
        };
        let backend: Box<dyn Backend> = match self {
            BackendKind::Filestore => Box::new(FilestoreBackend::new(path.ok_or_else(need_path)?)),
            BackendKind::Directory => Box::new(DirectoryBackend::new(path.ok_or_else(need_path)?)?),
            BackendKind::Test => Box::new(TestBackend::new()),
        };
        Ok(backend)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = BackendError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "filestore" => Ok(BackendKind::Filestore),
            "directory" => Ok(BackendKind::Directory),
            "test" => Ok(BackendKind::Test),
            _ => Err(BackendError::UnknownBackend {
                name: s.to_string(),
            }),
        }
    }
}
