use superscore::{
    Entry, ID,
    backend::{Backend, BackendKind, SearchTerm},
    entry::{Collection, Parameter},
    testing::{Seed, seed_backend},
};
use tempfile::TempDir;

/// Every backend kind, for tests that must hold across implementations.
pub const ALL_KINDS: [BackendKind; 3] =
    [BackendKind::Test, BackendKind::Filestore, BackendKind::Directory];

/// A backend of `kind` holding `seed`. The returned directory must outlive
/// the backend.
pub fn seeded(kind: BackendKind, seed: Seed) -> (TempDir, Box<dyn Backend>) {
    let dir = tempfile::tempdir().unwrap();
    let backend = seed_backend(kind, seed, dir.path()).unwrap();
    (dir, backend)
}

pub fn empty(kind: BackendKind) -> (TempDir, Box<dyn Backend>) {
    seeded(kind, Seed::Entries(Vec::new()))
}

/// Saves `entry` and returns the normalized copy.
pub fn save(backend: &dyn Backend, entry: impl Into<Entry>) -> Entry {
    let mut entry = entry.into();
    backend.save_entry(&mut entry).unwrap();
    entry
}

/// A collection holding two parameters.
pub fn small_collection(title: &str) -> Collection {
    Collection::new(title)
        .with_child(Parameter::new(format!("{title}:PV1")))
        .with_child(Parameter::new(format!("{title}:PV2")))
}

/// Ids matched by `terms`, sorted.
pub fn search_ids(backend: &dyn Backend, terms: &[SearchTerm]) -> Vec<ID> {
    let mut ids: Vec<ID> = backend
        .search(terms)
        .unwrap()
        .map(|e| e.unwrap().uuid())
        .collect();
    ids.sort();
    ids
}
