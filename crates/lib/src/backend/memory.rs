//! In-memory backend for tests and scratch sessions.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use super::{Backend, BackendKind, EntryTable, SearchResults, SearchTerm, Table, table};
use crate::Result;
use crate::entry::{Entry, ID, Root};

/// A backend that keeps every entry in a `HashMap` behind an `RwLock`.
///
/// Nothing is persisted. Ids can be marked read-only with
/// [`TestBackend::set_read_only`] to exercise writability handling in
/// callers.
#[derive(Debug, Default)]
pub struct TestBackend {
    table: RwLock<Table>,
    read_only: RwLock<HashSet<ID>>,
}

impl TestBackend {
    /// Creates a new, empty `TestBackend`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend preloaded with `root`'s entries.
    pub fn from_root(root: Root) -> Self {
        let table = Table::from_root(root);
        debug!(entries = table.len(), "Loaded test backend");
        Self {
            table: RwLock::new(table),
            read_only: RwLock::default(),
        }
    }

    /// Creates a backend holding `entries` as root-level entries.
    pub fn with_entries(entries: Vec<Entry>) -> Self {
        Self::from_root(Root::new(entries))
    }

    pub fn set_read_only(&self, id: ID, read_only: bool) {
        let mut ids = self.read_only.write().unwrap_or_else(PoisonError::into_inner);
        if read_only {
            ids.insert(id);
        } else {
            ids.remove(&id);
        }
    }

    /// Number of stored entries, nested ones included.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Ids of root-level entries.
    pub fn root_ids(&self) -> Vec<ID> {
        self.read().root_ids().unwrap_or_default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Table> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Table> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Backend for TestBackend {
    fn get_entry(&self, id: &ID) -> Result<Entry> {
        table::get_entry(&*self.read(), id)
    }

    fn save_entry(&self, entry: &mut Entry) -> Result<()> {
        table::save_entry(&mut *self.write(), entry)
    }

    fn update_entry(&self, entry: &mut Entry) -> Result<()> {
        table::update_entry(&mut *self.write(), entry)
    }

    fn delete_entry(&self, entry: &Entry, cascade: bool) -> Result<()> {
        table::delete_entry(&mut *self.write(), entry, cascade)
    }

    fn is_writable(&self, entry: &Entry) -> bool {
        !self
            .read_only
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&entry.uuid())
    }

    fn search(&self, terms: &[SearchTerm]) -> Result<SearchResults> {
        let snapshot = self.read().clone();
        table::search(snapshot, terms)
    }

    fn root(&self) -> Result<Root> {
        table::root(&*self.read())
    }

    fn fill_uuids(&self, entry: Entry) -> Result<Entry> {
        table::fill_uuids(&*self.read(), entry)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Test
    }
}
