//! Directory backend: one JSON file per entry.
//!
//! Entries live at `<root>/<h0>/<h1>/<h2>/<uuid>.json`, where `h0..h2` are the
//! first three hex digits of the id. Each file holds the entry with its
//! children reduced to ids. `<root>/root.json` lists the root-level ids in
//! order.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    Backend, BackendKind, EntryTable, SearchResults, SearchTerm, atomic, errors::BackendError,
    table,
};
use crate::{
    Error, Result,
    entry::{Entry, ID, Root},
};

const ROOT_FILE: &str = "root.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct RootIndex {
    #[serde(default)]
    entries: Vec<ID>,
}

fn io(e: std::io::Error) -> Error {
    BackendError::FileIo { source: e }.into()
}

/// Record-level view of a directory store.
#[derive(Debug, Clone)]
struct DirectoryTable {
    path: PathBuf,
}

impl DirectoryTable {
    fn entry_path(&self, id: &ID) -> PathBuf {
        let name = id.to_hyphenated();
        let mut path = self.path.clone();
        for c in name.chars().take(3) {
            path.push(c.to_string());
        }
        path.push(format!("{name}.json"));
        path
    }

    fn root_path(&self) -> PathBuf {
        self.path.join(ROOT_FILE)
    }

    fn collect_ids(&self, dir: &Path, depth: usize, out: &mut Vec<ID>) -> Result<()> {
        let listing = match fs::read_dir(dir) {
            Ok(listing) => listing,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io(e)),
        };
        for item in listing {
            let item = item.map_err(io)?;
            let path = item.path();
            if depth < 3 {
                if item.file_type().map_err(io)?.is_dir() {
                    self.collect_ids(&path, depth + 1, out)?;
                }
                continue;
            }
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(id) = path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .and_then(|stem| ID::parse(stem).ok())
            {
                out.push(id);
            }
        }
        Ok(())
    }
}

impl EntryTable for DirectoryTable {
    fn read(&self, id: &ID) -> Result<Option<Entry>> {
        let json = match fs::read_to_string(self.entry_path(id)) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io(e)),
        };
        let entry = serde_json::from_str(&json)
            .map_err(|e| -> Error { BackendError::DeserializationFailed { source: e }.into() })?;
        Ok(Some(entry))
    }

    fn ids(&self) -> Result<Vec<ID>> {
        let mut out = Vec::new();
        self.collect_ids(&self.path, 0, &mut out)?;
        Ok(out)
    }

    fn root_ids(&self) -> Result<Vec<ID>> {
        let json = match fs::read_to_string(self.root_path()) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io(e)),
        };
        let index: RootIndex = serde_json::from_str(&json)
            .map_err(|e| -> Error { BackendError::DeserializationFailed { source: e }.into() })?;
        Ok(index.entries)
    }

    fn write(&mut self, entry: Entry) -> Result<()> {
        let path = self.entry_path(&entry.uuid());
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io)?;
        }
        atomic::write_json(&path, &entry)
    }

    fn remove(&mut self, id: &ID) -> Result<()> {
        let path = self.entry_path(id);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io(e)),
        }
        // Prune the hash directories once they are empty
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == self.path || fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
        Ok(())
    }

    fn set_root_ids(&mut self, ids: Vec<ID>) -> Result<()> {
        atomic::write_json(&self.root_path(), &RootIndex { entries: ids })
    }

    /// Every entry file and the root index are checked against their
    /// permission bits.
    fn check_writable(&self, ids: &[ID], root_of: Option<&ID>) -> Result<()> {
        if let Some(id) = ids
            .iter()
            .find(|id| !atomic::is_path_writable(&self.entry_path(id)))
        {
            debug!(id = %id, "Entry file is read-only");
            return Err(BackendError::NotWritable { id: *id }.into());
        }
        if let Some(id) = root_of
            && !atomic::is_path_writable(&self.root_path())
        {
            debug!(id = %id, "Root index is read-only");
            return Err(BackendError::NotWritable { id: *id }.into());
        }
        Ok(())
    }
}

/// Backend storing each entry in its own file under a directory.
#[derive(Debug)]
pub struct DirectoryBackend {
    table: DirectoryTable,
    lock: Mutex<()>,
}

impl DirectoryBackend {
    /// Opens the store at `path`, creating it if needed.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let table = DirectoryTable { path: path.into() };
        fs::create_dir_all(&table.path).map_err(io)?;
        if !table.root_path().exists() {
            info!(path = %table.path.display(), "Initializing new directory store");
            atomic::write_json(&table.root_path(), &RootIndex::default())?;
        }
        Ok(Self {
            table,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.table.path
    }

    /// Location of the file that holds `id`.
    pub fn entry_path(&self, id: &ID) -> PathBuf {
        self.table.entry_path(id)
    }

    fn modify<R>(&self, op: impl FnOnce(&mut DirectoryTable) -> Result<R>) -> Result<R> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut table = self.table.clone();
        op(&mut table)
    }
}

impl Backend for DirectoryBackend {
    fn get_entry(&self, id: &ID) -> Result<Entry> {
        table::get_entry(&self.table, id)
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

    /// Reflects the permissions of the entry's own file, or of the
    /// directory it would be created in.
    fn is_writable(&self, entry: &Entry) -> bool {
        let writable = atomic::is_path_writable(&self.table.entry_path(&entry.uuid()));
        debug!(id = %entry.uuid(), writable, "Checked entry file permissions");
        writable
    }

    fn search(&self, terms: &[SearchTerm]) -> Result<SearchResults> {
        table::search(self.table.clone(), terms)
    }

    fn root(&self) -> Result<Root> {
        table::root(&self.table)
    }

    fn fill_uuids(&self, entry: Entry) -> Result<Entry> {
        table::fill_uuids(&self.table, entry)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Directory
    }
}
