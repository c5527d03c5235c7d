//! Storage-agnostic backend operations.
//!
//! Every backend persists the same shape of data: one shallow record per
//! entry (child slots reduced to ids) plus the ordered list of root-level
//! ids. [`EntryTable`] is the minimal access a backend provides to that data;
//! the functions in this module implement the full `Backend` contract on top
//! of it, so all variants share one set of rules and one error taxonomy.
//!
//! Write operations validate everything before the first write, so a
//! refused request leaves the table untouched.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, warn};

use super::{
    errors::BackendError,
    search::{Attr, CompiledTerm, SearchTerm},
};
use crate::{
    Result,
    entry::{Entry, EntryRef, ID, Root},
};

/// Boxed lazy result stream returned by `Backend::search`.
pub type SearchResults = Box<dyn Iterator<Item = Result<Entry>> + Send>;

/// Minimal record-level access to a backend's storage.
pub trait EntryTable {
    /// The shallow record stored under `id`, if any.
    fn read(&self, id: &ID) -> Result<Option<Entry>>;

    /// Every stored id, in no particular order.
    fn ids(&self) -> Result<Vec<ID>>;

    /// Ids of root-level entries, in insertion order.
    fn root_ids(&self) -> Result<Vec<ID>>;

    /// Inserts or replaces a shallow record.
    fn write(&mut self, entry: Entry) -> Result<()>;

    fn remove(&mut self, id: &ID) -> Result<()>;

    fn set_root_ids(&mut self, ids: Vec<ID>) -> Result<()>;

    /// Checked before the first write of an operation: fails with
    /// `NotWritable` if a record in `ids` cannot be written or removed, or
    /// if `root_of` is set and the root list cannot be rewritten.
    ///
    /// Tables that commit all changes at once accept everything.
    fn check_writable(&self, _ids: &[ID], _root_of: Option<&ID>) -> Result<()> {
        Ok(())
    }
}

/// In-memory table: the working form of the test and filestore backends.
#[derive(Debug, Clone, Default)]
pub struct Table {
    entries: HashMap<ID, Entry>,
    root: Vec<ID>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decomposes a nested root document into shallow records.
    ///
    /// Embedded entries without a parent are claimed by their container.
    /// Later duplicates of an id already seen are ignored.
    pub fn from_root(root: Root) -> Self {
        let mut table = Table::new();
        for mut entry in root.entries {
            entry.assign_ids();
            table.root.push(entry.uuid());
            for record in entry.flatten() {
                table.entries.entry(record.uuid()).or_insert(record);
            }
        }
        table
    }

    /// Rebuilds the nested root document, embedding owned descendants.
    pub fn to_root(&self) -> Result<Root> {
        root(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &ID) -> bool {
        self.entries.contains_key(id)
    }
}

impl EntryTable for Table {
    fn read(&self, id: &ID) -> Result<Option<Entry>> {
        Ok(self.entries.get(id).cloned())
    }

    fn ids(&self) -> Result<Vec<ID>> {
        Ok(self.entries.keys().copied().collect())
    }

    fn root_ids(&self) -> Result<Vec<ID>> {
        Ok(self.root.clone())
    }

    fn write(&mut self, entry: Entry) -> Result<()> {
        self.entries.insert(entry.uuid(), entry);
        Ok(())
    }

    fn remove(&mut self, id: &ID) -> Result<()> {
        self.entries.remove(id);
        Ok(())
    }

    fn set_root_ids(&mut self, ids: Vec<ID>) -> Result<()> {
        self.root = ids;
        Ok(())
    }
}

fn require<T: EntryTable + ?Sized>(table: &T, id: &ID) -> Result<Entry> {
    table
        .read(id)?
        .ok_or_else(|| BackendError::EntryNotFound { id: *id }.into())
}

/// True if the two records differ in anything but their revision.
fn differs(stored: &Entry, incoming: &Entry) -> bool {
    let mut stored = stored.clone();
    stored.header_mut().revision = incoming.revision();
    stored != *incoming
}

/// Fetches `id` with every owned descendant embedded.
pub fn get_entry<T: EntryTable + ?Sized>(table: &T, id: &ID) -> Result<Entry> {
    let mut visiting = HashSet::new();
    embed_owned(table, require(table, id)?, &mut visiting)
}

fn embed_owned<T: EntryTable + ?Sized>(
    table: &T,
    mut entry: Entry,
    visiting: &mut HashSet<ID>,
) -> Result<Entry> {
    let id = entry.uuid();
    visiting.insert(id);
    for slot in entry.child_slots_mut() {
        let EntryRef::Id(child_id) = *slot else {
            continue;
        };
        if visiting.contains(&child_id) {
            continue;
        }
        if let Some(child) = table.read(&child_id)?
            && child.parent() == Some(id)
        {
            *slot = EntryRef::from(embed_owned(table, child, visiting)?);
        }
    }
    visiting.remove(&id);
    Ok(entry)
}

/// Maps each embedded descendant's id to the id of the entry embedding it.
fn containers(entry: &Entry) -> HashMap<ID, ID> {
    let mut map = HashMap::new();
    for e in std::iter::once(entry).chain(entry.walk_children()) {
        for child in e.child_slots().into_iter().filter_map(EntryRef::as_entry) {
            map.insert(child.uuid(), e.uuid());
        }
    }
    map
}

/// Flattens a submitted graph, rejecting duplicate ids.
fn flatten_unique(entry: &Entry) -> Result<Vec<Entry>> {
    let records = entry.flatten();
    let mut seen = HashSet::new();
    for record in &records {
        if !seen.insert(record.uuid()) {
            return Err(BackendError::InvalidEntry {
                reason: format!("id {} appears more than once", record.uuid()),
            }
            .into());
        }
    }
    Ok(records)
}

/// A write derived from a submitted graph.
struct Plan {
    writes: Vec<Entry>,
    bumped: HashMap<ID, u64>,
}

/// Validates the descendants of a submitted graph and computes their writes.
///
/// Existing descendants must be in sync and are rewritten with a bumped
/// revision when changed. New descendants must be owned by their container.
fn plan_descendants<T: EntryTable + ?Sized>(
    table: &T,
    records: &[Entry],
    containers: &HashMap<ID, ID>,
) -> Result<Plan> {
    let mut plan = Plan {
        writes: Vec::new(),
        bumped: HashMap::new(),
    };
    for record in records {
        let id = record.uuid();
        match table.read(&id)? {
            Some(stored) => {
                if stored.revision() != record.revision() {
                    return Err(BackendError::OutOfSync { id }.into());
                }
                if differs(&stored, record) {
                    let mut record = record.clone();
                    let revision = stored.revision() + 1;
                    record.header_mut().revision = revision;
                    plan.bumped.insert(id, revision);
                    plan.writes.push(record);
                }
            }
            None => {
                let container = containers.get(&id).copied();
                if record.parent() != container {
                    return Err(BackendError::InvalidReference {
                        id,
                        reason: "new embedded entry must belong to its container".to_string(),
                    }
                    .into());
                }
                plan.writes.push(record.clone());
            }
        }
    }
    Ok(plan)
}

/// Copies bumped revisions back into the caller's graph.
fn apply_revisions(entry: &mut Entry, bumped: &HashMap<ID, u64>) {
    if let Some(revision) = bumped.get(&entry.uuid()) {
        entry.header_mut().revision = *revision;
    }
    for slot in entry.child_slots_mut() {
        if let Some(child) = slot.as_entry_mut() {
            apply_revisions(child, bumped);
        }
    }
}

/// Persists a new entry and its embedded descendants.
pub fn save_entry<T: EntryTable + ?Sized>(table: &mut T, entry: &mut Entry) -> Result<()> {
    entry.assign_ids();
    let id = entry.uuid();
    let records = flatten_unique(entry)?;
    if table.read(&id)?.is_some() {
        return Err(BackendError::EntryExists { id }.into());
    }

    let parent = match entry.parent() {
        Some(parent_id) => {
            let parent = require(table, &parent_id)?;
            if parent.as_nestable().is_none() {
                return Err(BackendError::InvalidReference {
                    id: parent_id,
                    reason: format!("a {} cannot hold children", parent.entry_type()),
                }
                .into());
            }
            Some(parent)
        }
        None => None,
    };

    let mut plan = plan_descendants(table, &records[1..], &containers(entry))?;
    plan.writes.insert(0, records[0].clone());

    let mut touched: Vec<ID> = plan.writes.iter().map(Entry::uuid).collect();
    touched.extend(parent.as_ref().map(Entry::uuid));
    let root_of = parent.is_none().then_some(&id);
    table.check_writable(&touched, root_of)?;

    for record in plan.writes {
        table.write(record)?;
    }
    match parent {
        Some(mut parent) => {
            if !parent.child_ids().contains(&id)
                && let Some(nestable) = parent.as_nestable_mut()
            {
                nestable.children_mut().push(EntryRef::Id(id));
                parent.header_mut().revision += 1;
                table.write(parent)?;
            }
        }
        None => {
            let mut root = table.root_ids()?;
            root.push(id);
            table.set_root_ids(root)?;
        }
    }
    apply_revisions(entry, &plan.bumped);
    debug!(id = %id, "Saved entry");
    Ok(())
}

/// Replaces a stored entry and reconciles its embedded descendants.
///
/// Owned children that disappear from the entry's slots are removed from
/// storage together with their own owned descendants.
pub fn update_entry<T: EntryTable + ?Sized>(table: &mut T, entry: &mut Entry) -> Result<()> {
    entry.assign_ids();
    let id = entry.uuid();
    let records = flatten_unique(entry)?;
    let stored = require(table, &id)?;
    if stored.revision() != entry.revision() {
        return Err(BackendError::OutOfSync { id }.into());
    }

    let plan = plan_descendants(table, &records, &containers(entry))?;

    // Owned children dropped from any rewritten record
    let submitted: HashSet<ID> = records.iter().map(Entry::uuid).collect();
    let mut dropped = Vec::new();
    for record in &plan.writes {
        if let Some(old) = table.read(&record.uuid())? {
            let kept = record.child_ids();
            for child_id in old.child_ids() {
                if kept.contains(&child_id) || submitted.contains(&child_id) {
                    continue;
                }
                if let Some(child) = table.read(&child_id)?
                    && child.parent() == Some(old.uuid())
                {
                    dropped.extend(owned_subtree(table, &child_id)?);
                }
            }
        }
    }

    let touched: Vec<ID> = plan
        .writes
        .iter()
        .map(Entry::uuid)
        .chain(dropped.iter().copied())
        .collect();
    table.check_writable(&touched, None)?;

    for record in plan.writes {
        table.write(record)?;
    }
    for child_id in &dropped {
        table.remove(child_id)?;
    }
    apply_revisions(entry, &plan.bumped);
    debug!(id = %id, dropped = dropped.len(), "Updated entry");
    Ok(())
}

/// `id` followed by every entry it transitively owns.
fn owned_subtree<T: EntryTable + ?Sized>(table: &T, id: &ID) -> Result<Vec<ID>> {
    let mut out = Vec::new();
    let mut stack = vec![*id];
    let mut seen = HashSet::new();
    while let Some(current) = stack.pop() {
        if !seen.insert(current) {
            continue;
        }
        out.push(current);
        if let Some(record) = table.read(&current)? {
            for child_id in record.child_ids() {
                if let Some(child) = table.read(&child_id)?
                    && child.parent() == Some(current)
                {
                    stack.push(child_id);
                }
            }
        }
    }
    Ok(out)
}

/// Removes an entry and every reference to it.
///
/// The caller's copy must match storage. Containers with children are only
/// removed when `cascade` is set, which also removes everything they own.
/// Owned readbacks always go with their owner.
pub fn delete_entry<T: EntryTable + ?Sized>(
    table: &mut T,
    entry: &Entry,
    cascade: bool,
) -> Result<()> {
    let id = entry.uuid();
    let stored = require(table, &id)?;
    for record in entry.flatten() {
        match table.read(&record.uuid())? {
            Some(current) if current == record => {}
            _ => return Err(BackendError::OutOfSync { id: record.uuid() }.into()),
        }
    }

    let has_children = stored
        .as_nestable()
        .is_some_and(|nestable| !nestable.children().is_empty());
    if has_children && !cascade {
        return Err(BackendError::HasChildren { id }.into());
    }

    let removed: HashSet<ID> = owned_subtree(table, &id)?.into_iter().collect();

    let mut detached = Vec::new();
    for other in table.ids()? {
        if removed.contains(&other) {
            continue;
        }
        let Some(mut record) = table.read(&other)? else {
            continue;
        };
        if !record.child_ids().iter().any(|c| removed.contains(c)) {
            continue;
        }
        detach(&mut record, &removed);
        record.header_mut().revision += 1;
        detached.push(record);
    }

    let root_ids = table.root_ids()?;
    let root: Vec<ID> = root_ids
        .iter()
        .filter(|r| !removed.contains(r))
        .copied()
        .collect();
    let touched: Vec<ID> = detached
        .iter()
        .map(Entry::uuid)
        .chain(removed.iter().copied())
        .collect();
    let root_of = (root.len() != root_ids.len()).then_some(&id);
    table.check_writable(&touched, root_of)?;

    for record in detached {
        table.write(record)?;
    }
    if root_of.is_some() {
        table.set_root_ids(root)?;
    }
    for gone in &removed {
        table.remove(gone)?;
    }
    debug!(id = %id, cascade, removed = removed.len(), "Deleted entry");
    Ok(())
}

fn detach(record: &mut Entry, removed: &HashSet<ID>) {
    let keep = |slot: &EntryRef| !removed.contains(&slot.id());
    match record {
        Entry::Collection(c) => c.children.retain(keep),
        Entry::Snapshot(s) => s.children.retain(keep),
        Entry::Parameter(p) => p.readback = p.readback.take().filter(keep),
        Entry::Setpoint(s) => s.readback = s.readback.take().filter(keep),
        Entry::Readback(_) => {}
    }
}

/// The root document with owned descendants embedded.
pub fn root<T: EntryTable + ?Sized>(table: &T) -> Result<Root> {
    let mut entries = Vec::new();
    for id in table.root_ids()? {
        match table.read(&id)? {
            Some(_) => entries.push(get_entry(table, &id)?),
            None => warn!(id = %id, "Root lists an entry that is not stored"),
        }
    }
    Ok(Root::new(entries))
}

/// Resolves every id slot in `entry`, recursively.
///
/// References that cannot be resolved are left as ids.
pub fn fill_uuids<T: EntryTable + ?Sized>(table: &T, mut entry: Entry) -> Result<Entry> {
    let mut path = HashSet::new();
    fill_inner(table, &mut entry, &mut path)?;
    Ok(entry)
}

fn fill_inner<T: EntryTable + ?Sized>(
    table: &T,
    entry: &mut Entry,
    path: &mut HashSet<ID>,
) -> Result<()> {
    let id = entry.uuid();
    path.insert(id);
    for slot in entry.child_slots_mut() {
        if let EntryRef::Id(child_id) = *slot {
            if path.contains(&child_id) {
                continue;
            }
            if let Some(child) = table.read(&child_id)? {
                *slot = EntryRef::from(child);
            }
        }
        if let Some(child) = slot.as_entry_mut() {
            fill_inner(table, child, path)?;
        }
    }
    path.remove(&id);
    Ok(())
}

/// Every id reachable from `start` through child references, `start`
/// included.
fn reachable<T: EntryTable + ?Sized>(table: &T, start: &ID) -> Result<HashSet<ID>> {
    let mut seen = HashSet::new();
    let mut stack = vec![*start];
    while let Some(current) = stack.pop() {
        if !seen.insert(current) {
            continue;
        }
        if let Some(record) = table.read(&current)? {
            stack.extend(record.child_ids());
        }
    }
    Ok(seen)
}

/// Lazily filters a table's entries against compiled terms.
struct SearchIter<T> {
    table: T,
    pending: std::vec::IntoIter<ID>,
    terms: Vec<CompiledTerm>,
    reachable: HashMap<ID, HashSet<ID>>,
}

impl<T: EntryTable> SearchIter<T> {
    fn check(&mut self, id: &ID) -> Result<Option<Entry>> {
        let Some(record) = self.table.read(id)? else {
            return Ok(None);
        };
        let serialized: Value = serde_json::to_value(&record)
            .map_err(|source| BackendError::SerializationFailed { source })?;
        for term in &self.terms {
            let hit = match &term.attr {
                Attr::Ancestor(target) => {
                    if !self.reachable.contains_key(target) {
                        let set = reachable(&self.table, target)?;
                        self.reachable.insert(*target, set);
                    }
                    self.reachable
                        .get(target)
                        .is_some_and(|set| set.contains(id))
                }
                _ => term.matches(&record, &serialized),
            };
            if !hit {
                return Ok(None);
            }
        }
        get_entry(&self.table, id).map(Some)
    }
}

impl<T: EntryTable> Iterator for SearchIter<T> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Result<Entry>> {
        loop {
            let id = self.pending.next()?;
            match self.check(&id) {
                Ok(Some(entry)) => return Some(Ok(entry)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Starts a lazy search over `table`, which the returned iterator owns.
///
/// Terms are validated up front; an invalid term fails the call itself.
pub fn search<T>(table: T, terms: &[SearchTerm]) -> Result<SearchResults>
where
    T: EntryTable + Send + 'static,
{
    let terms = terms
        .iter()
        .map(CompiledTerm::compile)
        .collect::<Result<Vec<_>>>()?;
    let mut ids = table.ids()?;
    ids.sort();
    Ok(Box::new(SearchIter {
        table,
        pending: ids.into_iter(),
        terms,
        reachable: HashMap::new(),
    }))
}
