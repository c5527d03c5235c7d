//! Entries created or modified by the current client session.

use std::{
    collections::HashSet,
    sync::{PoisonError, RwLock},
};

use crate::entry::{Entry, ID};

/// Ids written through one [`Client`](super::Client).
///
/// Recording an entry also records every embedded descendant, since a
/// save or update writes them too.
#[derive(Debug, Default)]
pub struct SessionCache {
    recent: RwLock<HashSet<ID>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: &Entry) {
        let mut recent = self.recent.write().unwrap_or_else(PoisonError::into_inner);
        recent.insert(entry.uuid());
        recent.extend(entry.walk_children().map(Entry::uuid));
    }

    pub fn forget(&self, entry: &Entry) {
        let mut recent = self.recent.write().unwrap_or_else(PoisonError::into_inner);
        recent.remove(&entry.uuid());
        for child in entry.walk_children() {
            recent.remove(&child.uuid());
        }
    }

    pub fn contains(&self, id: &ID) -> bool {
        self.recent
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    pub fn len(&self) -> usize {
        self.recent.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.recent
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
