//! Filestore backend: the whole data set in one JSON document.
//!
//! Every operation reloads the document before acting, so edits made by other
//! processes are seen immediately and stale copies are caught by revision
//! checks. Writes replace the document atomically.

mod persistence;

use std::{
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use tracing::{debug, info};

use super::{Backend, BackendKind, SearchResults, SearchTerm, Table, atomic, table};
use crate::{
    Result,
    entry::{Entry, ID, Root},
};

/// Backend storing a single [`Root`] document at `path`.
///
/// The document is created on first access if it does not exist yet.
#[derive(Debug)]
pub struct FilestoreBackend {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FilestoreBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the document, creating an empty one if none exists.
    fn load(&self) -> Result<Table> {
        match persistence::load(&self.path)? {
            Some(table) => Ok(table),
            None => {
                info!(path = %self.path.display(), "Initializing new filestore");
                let table = Table::new();
                persistence::store(&self.path, &table)?;
                Ok(table)
            }
        }
    }

    fn read<R>(&self, op: impl FnOnce(&Table) -> Result<R>) -> Result<R> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        op(&self.load()?)
    }

    fn modify<R>(&self, op: impl FnOnce(&mut Table) -> Result<R>) -> Result<R> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut table = self.load()?;
        let out = op(&mut table)?;
        persistence::store(&self.path, &table)?;
        debug!(path = %self.path.display(), entries = table.len(), "Stored filestore");
        Ok(out)
    }
}

impl Backend for FilestoreBackend {
    fn get_entry(&self, id: &ID) -> Result<Entry> {
        self.read(|t| table::get_entry(t, id))
    }

    fn save_entry(&self, entry: &mut Entry) -> Result<()> {
        self.modify(|t| table::save_entry(t, entry))
    }

    fn update_entry(&self, entry: &mut Entry) -> Result<()> {
        self.modify(|t| table::update_entry(t, entry))
    }

    fn delete_entry(&self, entry: &Entry, cascade: bool) -> Result<()> {
        self.modify(|t| table::delete_entry(t, entry, cascade))
    }

    /// True if the store file can be written, or if it does not exist yet
    /// and its directory can. The entry itself is not consulted.
    fn is_writable(&self, _entry: &Entry) -> bool {
        atomic::is_path_writable(&self.path)
    }

    fn search(&self, terms: &[SearchTerm]) -> Result<SearchResults> {
        let snapshot = self.read(|t| Ok(t.clone()))?;
        table::search(snapshot, terms)
    }

    fn root(&self) -> Result<Root> {
        self.read(|t| t.to_root())
    }

    fn fill_uuids(&self, entry: Entry) -> Result<Entry> {
        self.read(|t| table::fill_uuids(t, entry))
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Filestore
    }
}
