//! Programmatic entry point to superscore.
//!
//! A [`Client`] pairs a storage [`Backend`] with a [`ControlLayer`]. It
//! guards writes with the session's writability policy, rewrites
//! client-only search operators, resolves id references, and builds and
//! applies snapshots (see the `snapshot` submodule).
//!
//! ## Writability
//!
//! An entry is writable when the backend accepts it and, if the session
//! disallows writes to pre-existing entries, it was either created or
//! modified through this client or is not stored yet. Entries touched by
//! this session stay writable regardless of the policy. A write is refused
//! if any record it would rewrite is protected, including embedded
//! descendants and, for saves, the container named as parent.

pub mod config;
pub mod session;
mod snapshot;

use std::{path::Path, sync::Arc};

use serde_json::Value;
use tracing::{debug, info, warn};

pub use config::{ClientConfig, ConfigError, find_config};
pub use session::SessionCache;

use crate::{
    Result,
    backend::{Backend, BackendError, SearchOperator, SearchResults, SearchTerm},
    clock::{Clock, SystemClock},
    compare::EntryDiff,
    control::ControlLayer,
    entry::{Entry, EntryRef, ID},
};

/// Mediates every read and write against a backend and the control layer.
#[derive(Debug)]
pub struct Client {
    backend: Box<dyn Backend>,
    cl: ControlLayer,
    config: ClientConfig,
    clock: Arc<dyn Clock>,
    session: SessionCache,
}

impl Client {
    /// A client with default session settings and the system clock.
    pub fn new(backend: Box<dyn Backend>, cl: ControlLayer) -> Self {
        Self {
            backend,
            cl,
            config: ClientConfig::default(),
            clock: Arc::new(SystemClock),
            session: SessionCache::new(),
        }
    }

    /// Replaces the configuration. Only the `[session]` settings take
    /// effect; the backend and control layer are already fixed.
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the backend and control layer described by `config`.
    pub fn from_client_config(config: ClientConfig) -> Result<Self> {
        if config.backend.path.is_none() {
            info!(backend = %config.backend.kind, "No backend path configured");
        }
        let backend = config.backend.kind.open(config.backend.path.clone())?;
        let cl = ControlLayer::from_names(config.control_layer.shims.as_deref());
        Ok(Self::new(backend, cl).with_config(config))
    }

    /// Loads the config file at `path`, or the one found by [`find_config`].
    pub fn from_config(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => find_config()?,
        };
        Self::from_client_config(ClientConfig::load(&path)?)
    }

    /// Shorthand for `from_config(None)`.
    pub fn from_env() -> Result<Self> {
        Self::from_config(None)
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn control_layer(&self) -> &ControlLayer {
        &self.cl
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionCache {
        &self.session
    }

    pub fn get_entry(&self, id: &ID) -> Result<Entry> {
        self.backend.get_entry(id)
    }

    /// Whether the backend and the session policy both allow writing `entry`.
    pub fn is_writable(&self, entry: &Entry) -> Result<bool> {
        if !self.backend.is_writable(entry) {
            return Ok(false);
        }
        if self.config.session.allow_existing_writes || self.session.contains(&entry.uuid()) {
            return Ok(true);
        }
        Ok(!self.backend.contains(&entry.uuid())?)
    }

    /// Fails with `NotWritable` unless every record the backend would touch
    /// is writable: the entry, each embedded descendant, and for saves the
    /// container named as its parent.
    fn ensure_writable(&self, entry: &Entry, include_parent: bool) -> Result<()> {
        for record in entry.flatten() {
            self.ensure_record_writable(&record)?;
        }
        if include_parent
            && let Some(parent_id) = entry.parent()
            && self.backend.contains(&parent_id)?
        {
            self.ensure_record_writable(&self.backend.get_entry(&parent_id)?)?;
        }
        Ok(())
    }

    fn ensure_record_writable(&self, record: &Entry) -> Result<()> {
        if self.is_writable(record)? {
            Ok(())
        } else {
            debug!(id = %record.uuid(), "Refusing write to protected entry");
            Err(BackendError::NotWritable { id: record.uuid() }.into())
        }
    }

    /// Persists a new entry and records it in the session.
    pub fn save(&self, entry: &mut Entry) -> Result<()> {
        self.ensure_writable(entry, true)?;
        self.backend.save_entry(entry)?;
        self.session.record(entry);
        debug!(id = %entry.uuid(), "Saved entry");
        Ok(())
    }

    /// Replaces a stored entry and records it in the session.
    pub fn update(&self, entry: &mut Entry) -> Result<()> {
        self.ensure_writable(entry, false)?;
        self.backend.update_entry(entry)?;
        self.session.record(entry);
        debug!(id = %entry.uuid(), revision = entry.revision(), "Updated entry");
        Ok(())
    }

    pub fn delete(&self, entry: &Entry, cascade: bool) -> Result<()> {
        self.ensure_writable(entry, false)?;
        self.backend.delete_entry(entry, cascade)?;
        self.session.forget(entry);
        debug!(id = %entry.uuid(), cascade, "Deleted entry");
        Ok(())
    }

    /// Searches the backend for entries matching every term.
    ///
    /// `isclose` terms are expanded into an inclusive `gt`/`lt` window
    /// around the target.
    pub fn search(&self, terms: &[SearchTerm]) -> Result<SearchResults> {
        let mut expanded = Vec::with_capacity(terms.len());
        for term in terms {
            if term.operator == SearchOperator::IsClose {
                let (lower, upper) = isclose_bounds(&term.value)?;
                expanded.push(SearchTerm::new(&term.attr, SearchOperator::Gt, lower));
                expanded.push(SearchTerm::new(&term.attr, SearchOperator::Lt, upper));
            } else {
                expanded.push(term.clone());
            }
        }
        self.backend.search(&expanded)
    }

    /// Replaces id references in `entry` with entries from the backend.
    ///
    /// `depth` limits how many levels are filled; `Some(1)` fills only the
    /// entry's direct children and `None` fills everything reachable.
    /// References back to an entry currently being filled are left as ids.
    pub fn fill(&self, entry: &mut Entry, depth: Option<usize>) -> Result<()> {
        let mut path = vec![entry.uuid()];
        self.fill_inner(entry, depth, &mut path)
    }

    fn fill_inner(&self, entry: &mut Entry, depth: Option<usize>, path: &mut Vec<ID>) -> Result<()> {
        if depth == Some(0) {
            return Ok(());
        }
        let next = depth.map(|d| d - 1);
        for slot in entry.child_slots_mut() {
            if let EntryRef::Id(id) = *slot {
                if path.contains(&id) {
                    warn!(id = %id, "Not filling cyclic reference");
                    continue;
                }
                *slot = EntryRef::from(self.backend.get_entry(&id)?);
            }
            if let EntryRef::Entry(child) = slot {
                path.push(child.uuid());
                let filled = self.fill_inner(child, next, path);
                path.pop();
                filled?;
            }
        }
        Ok(())
    }

    /// Fills both entries and lists their differences.
    pub fn compare(&self, left: &Entry, right: &Entry) -> Result<EntryDiff> {
        if left.entry_type() != right.entry_type() {
            return EntryDiff::between(left, right);
        }
        let mut left = left.clone();
        let mut right = right.clone();
        self.fill(&mut left, None)?;
        self.fill(&mut right, None)?;
        EntryDiff::between(&left, &right)
    }

    /// `entry` and its embedded descendants that were written in this
    /// session, in walk order.
    pub fn edited_within<'a>(&self, entry: &'a Entry) -> Vec<&'a Entry> {
        std::iter::once(entry)
            .chain(entry.walk_children())
            .filter(|e| self.session.contains(&e.uuid()))
            .collect()
    }
}

fn isclose_bounds(value: &Value) -> Result<(f64, f64)> {
    let invalid = || BackendError::InvalidSearch {
        reason: format!("isclose expects [target, rel_tol, abs_tol], got {value}"),
    };
    let parts: Vec<f64> = value
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(Value::as_f64)
        .collect::<Option<_>>()
        .ok_or_else(invalid)?;
    let [target, rel_tol, abs_tol] = parts[..] else {
        return Err(invalid().into());
    };
    let margin = target.abs() * rel_tol + abs_tol;
    Ok((target - margin, target + margin))
}
