//!
//! Defines the fundamental data unit (`Entry`) and related types.
//!
//! An `Entry` is the smallest persisted unit: a parameter definition, a
//! captured setpoint or readback, a collection of parameters, or a snapshot
//! of a collection. Every entry carries an `EntryHeader` with its `ID`, an
//! optional parent reference and free-form metadata.
//!
//! Container entries (`Collection`, `Snapshot`) implement [`Nestable`]. Their
//! child slots hold either an embedded `Entry` or a bare `ID` reference; see
//! [`EntryRef`].

pub mod epics;
pub mod id;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use epics::{EpicsValue, Severity, Status};
pub use id::{ID, IdError};

/// Metadata shared by every kind of entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryHeader {
    /// Identity of the entry. Nil means "assign on save".
    #[serde(default)]
    pub uuid: ID,
    #[serde(default)]
    pub description: String,
    #[serde(default = "Utc::now")]
    pub creation_time: DateTime<Utc>,
    /// The container this entry belongs to. `None` for root-level entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ID>,
    /// Free-form key/value annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    /// Optimistic concurrency token, advanced by backends on every update.
    #[serde(default)]
    pub revision: u64,
}

impl Default for EntryHeader {
    fn default() -> Self {
        Self {
            uuid: ID::generate(),
            description: String::new(),
            creation_time: Utc::now(),
            parent: None,
            metadata: BTreeMap::new(),
            revision: 0,
        }
    }
}

/// A child slot: either a reference by id or an embedded entry.
///
/// Serialized untagged, so a slot is either a UUID string or an entry object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryRef {
    Id(ID),
    Entry(Box<Entry>),
}

impl EntryRef {
    /// The id of the referenced entry, embedded or not.
    pub fn id(&self) -> ID {
        match self {
            EntryRef::Id(id) => *id,
            EntryRef::Entry(entry) => entry.uuid(),
        }
    }

    pub fn as_entry(&self) -> Option<&Entry> {
        match self {
            EntryRef::Entry(entry) => Some(entry),
            EntryRef::Id(_) => None,
        }
    }

    pub fn as_entry_mut(&mut self) -> Option<&mut Entry> {
        match self {
            EntryRef::Entry(entry) => Some(entry),
            EntryRef::Id(_) => None,
        }
    }

    /// True if the slot holds an embedded entry.
    pub fn is_filled(&self) -> bool {
        matches!(self, EntryRef::Entry(_))
    }
}

impl From<ID> for EntryRef {
    fn from(id: ID) -> Self {
        EntryRef::Id(id)
    }
}

impl From<Entry> for EntryRef {
    fn from(entry: Entry) -> Self {
        EntryRef::Entry(Box::new(entry))
    }
}

/// A process variable to be captured by snapshots of its collection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(flatten)]
    pub header: EntryHeader,
    pub pv_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abs_tolerance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel_tolerance: Option<f64>,
    /// Readback paired with this parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readback: Option<EntryRef>,
    /// Read-only parameters are captured as readbacks and never restored.
    #[serde(default)]
    pub read_only: bool,
}

/// A captured, restorable value of a process variable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Setpoint {
    #[serde(flatten)]
    pub header: EntryHeader,
    pub pv_name: String,
    #[serde(default)]
    pub data: Option<EpicsValue>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readback: Option<EntryRef>,
}

/// A captured value that is compared against but never written back.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Readback {
    #[serde(flatten)]
    pub header: EntryHeader,
    pub pv_name: String,
    #[serde(default)]
    pub data: Option<EpicsValue>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abs_tolerance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel_tolerance: Option<f64>,
}

/// An ordered group of parameters and nested collections.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Collection {
    #[serde(flatten)]
    pub header: EntryHeader,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tags: BTreeSet<u32>,
    #[serde(default)]
    pub children: Vec<EntryRef>,
}

/// A point-in-time capture of every value reachable from a collection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(flatten)]
    pub header: EntryHeader,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tags: BTreeSet<u32>,
    #[serde(default)]
    pub children: Vec<EntryRef>,
    /// Facility-wide readings captured alongside the collection's values.
    #[serde(default)]
    pub meta_pvs: Vec<Readback>,
    /// The collection this snapshot was taken from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_collection: Option<ID>,
}

impl Parameter {
    pub fn new(pv_name: impl Into<String>) -> Self {
        Self {
            pv_name: pv_name.into(),
            ..Default::default()
        }
    }
}

impl Setpoint {
    pub fn new(pv_name: impl Into<String>, data: Option<EpicsValue>) -> Self {
        Self {
            pv_name: pv_name.into(),
            data,
            ..Default::default()
        }
    }
}

impl Readback {
    pub fn new(pv_name: impl Into<String>, data: Option<EpicsValue>) -> Self {
        Self {
            pv_name: pv_name.into(),
            data,
            ..Default::default()
        }
    }
}

impl Collection {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Appends a child and returns `self`, for building fixtures inline.
    pub fn with_child(mut self, child: impl Into<Entry>) -> Self {
        self.children.push(EntryRef::from(child.into()));
        self
    }
}

impl Snapshot {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_child(mut self, child: impl Into<Entry>) -> Self {
        self.children.push(EntryRef::from(child.into()));
        self
    }
}

/// Capability of entries that own an ordered sequence of children.
pub trait Nestable {
    fn children(&self) -> &[EntryRef];

    fn children_mut(&mut self) -> &mut Vec<EntryRef>;

    /// Depth-first (pre-order) walk over every embedded descendant.
    ///
    /// The traversal is recomputed on each call from the current child
    /// slots. Slots holding only an id are skipped since there is no entry
    /// to yield; resolve them first with a backend or the client.
    fn walk_children(&self) -> WalkChildren<'_> {
        WalkChildren::over(self.children())
    }
}

impl Nestable for Collection {
    fn children(&self) -> &[EntryRef] {
        &self.children
    }

    fn children_mut(&mut self) -> &mut Vec<EntryRef> {
        &mut self.children
    }
}

impl Nestable for Snapshot {
    fn children(&self) -> &[EntryRef] {
        &self.children
    }

    fn children_mut(&mut self) -> &mut Vec<EntryRef> {
        &mut self.children
    }
}

/// Iterator returned by [`Nestable::walk_children`].
pub struct WalkChildren<'a> {
    stack: Vec<&'a Entry>,
}

impl<'a> WalkChildren<'a> {
    fn over(slots: &'a [EntryRef]) -> Self {
        Self::over_entries(slots.iter().filter_map(EntryRef::as_entry))
    }

    fn over_entries(entries: impl Iterator<Item = &'a Entry>) -> Self {
        let mut stack: Vec<&'a Entry> = entries.collect();
        stack.reverse();
        Self { stack }
    }
}

impl<'a> Iterator for WalkChildren<'a> {
    type Item = &'a Entry;

    fn next(&mut self) -> Option<&'a Entry> {
        let entry = self.stack.pop()?;
        let start = self.stack.len();
        self.stack
            .extend(entry.child_slots().into_iter().filter_map(EntryRef::as_entry));
        self.stack[start..].reverse();
        Some(entry)
    }
}

/// Discriminator for the kinds of entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    Parameter,
    Setpoint,
    Readback,
    Collection,
    Snapshot,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Parameter => "Parameter",
            EntryType::Setpoint => "Setpoint",
            EntryType::Readback => "Readback",
            EntryType::Collection => "Collection",
            EntryType::Snapshot => "Snapshot",
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any persisted entry, tagged by its kind.
///
/// # Example
///
/// ```
/// use superscore::entry::{Collection, Entry, Nestable, Parameter};
///
/// let coll = Collection::new("GUNB")
///     .with_child(Parameter::new("VAC:GUNB:TEST1"))
///     .with_child(Parameter::new("VAC:GUNB:TEST2"));
/// assert_eq!(coll.walk_children().count(), 2);
///
/// let entry = Entry::from(coll);
/// assert!(entry.as_nestable().is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry_type")]
pub enum Entry {
    Parameter(Parameter),
    Setpoint(Setpoint),
    Readback(Readback),
    Collection(Collection),
    Snapshot(Snapshot),
}

macro_rules! entry_variant {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Entry {
                fn from(value: $variant) -> Self {
                    Entry::$variant(value)
                }
            }
        )*

        impl Entry {
            pub fn header(&self) -> &EntryHeader {
                match self {
                    $(Entry::$variant(e) => &e.header,)*
                }
            }

            pub fn header_mut(&mut self) -> &mut EntryHeader {
                match self {
                    $(Entry::$variant(e) => &mut e.header,)*
                }
            }

            pub fn entry_type(&self) -> EntryType {
                match self {
                    $(Entry::$variant(_) => EntryType::$variant,)*
                }
            }
        }
    };
}

entry_variant!(Parameter, Setpoint, Readback, Collection, Snapshot);

impl Entry {
    pub fn uuid(&self) -> ID {
        self.header().uuid
    }

    pub fn parent(&self) -> Option<ID> {
        self.header().parent
    }

    pub fn revision(&self) -> u64 {
        self.header().revision
    }

    /// The process variable address, for entries bound to one.
    pub fn pv_name(&self) -> Option<&str> {
        match self {
            Entry::Parameter(p) => Some(&p.pv_name),
            Entry::Setpoint(s) => Some(&s.pv_name),
            Entry::Readback(r) => Some(&r.pv_name),
            Entry::Collection(_) | Entry::Snapshot(_) => None,
        }
    }

    /// Captured data, for entries that hold a value.
    pub fn data(&self) -> Option<&EpicsValue> {
        match self {
            Entry::Setpoint(s) => s.data.as_ref(),
            Entry::Readback(r) => r.data.as_ref(),
            _ => None,
        }
    }

    pub fn as_nestable(&self) -> Option<&dyn Nestable> {
        match self {
            Entry::Collection(c) => Some(c),
            Entry::Snapshot(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_nestable_mut(&mut self) -> Option<&mut dyn Nestable> {
        match self {
            Entry::Collection(c) => Some(c),
            Entry::Snapshot(s) => Some(s),
            _ => None,
        }
    }

    /// Every slot that may reference another entry: container children and
    /// paired readbacks, in declaration order.
    pub fn child_slots(&self) -> Vec<&EntryRef> {
        match self {
            Entry::Collection(c) => c.children.iter().collect(),
            Entry::Snapshot(s) => s.children.iter().collect(),
            Entry::Parameter(p) => p.readback.iter().collect(),
            Entry::Setpoint(s) => s.readback.iter().collect(),
            Entry::Readback(_) => Vec::new(),
        }
    }

    pub fn child_slots_mut(&mut self) -> Vec<&mut EntryRef> {
        match self {
            Entry::Collection(c) => c.children.iter_mut().collect(),
            Entry::Snapshot(s) => s.children.iter_mut().collect(),
            Entry::Parameter(p) => p.readback.iter_mut().collect(),
            Entry::Setpoint(s) => s.readback.iter_mut().collect(),
            Entry::Readback(_) => Vec::new(),
        }
    }

    /// Ids of every referenced entry, embedded or not.
    pub fn child_ids(&self) -> Vec<ID> {
        self.child_slots().into_iter().map(EntryRef::id).collect()
    }

    /// Depth-first walk over all embedded descendants, including readbacks.
    pub fn walk_children(&self) -> WalkChildren<'_> {
        WalkChildren::over_entries(self.child_slots().into_iter().filter_map(EntryRef::as_entry))
    }

    /// Assigns fresh ids in place of nil placeholders and points every
    /// embedded child without a parent at its container.
    ///
    /// Fields that are already set are left untouched.
    pub fn assign_ids(&mut self) {
        if self.header().uuid.is_nil() {
            self.header_mut().uuid = ID::generate();
        }
        let id = self.uuid();
        for slot in self.child_slots_mut() {
            if let EntryRef::Entry(child) = slot {
                if child.header().parent.is_none() {
                    child.header_mut().parent = Some(id);
                }
                child.assign_ids();
            }
        }
    }

    /// Replaces every embedded child with its id, returning the detached
    /// children in slot order.
    pub fn swap_to_uuids(&mut self) -> Vec<Entry> {
        let mut detached = Vec::new();
        for slot in self.child_slots_mut() {
            if let EntryRef::Entry(_) = slot {
                let id = slot.id();
                if let EntryRef::Entry(child) = std::mem::replace(slot, EntryRef::Id(id)) {
                    detached.push(*child);
                }
            }
        }
        detached
    }

    /// Copy of this entry with every slot reduced to an id.
    pub fn shallow(&self) -> Entry {
        let mut entry = self.clone();
        entry.swap_to_uuids();
        entry
    }

    /// Decomposes the embedded graph into one id-only record per entry,
    /// starting with `self` and continuing in depth-first order.
    pub fn flatten(&self) -> Vec<Entry> {
        let mut out = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(mut entry) = stack.pop() {
            let detached = entry.swap_to_uuids();
            out.push(entry);
            stack.extend(detached.into_iter().rev());
        }
        out
    }
}

/// Top-level container for a backend's entire data set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Root {
    #[serde(default)]
    pub entries: Vec<Entry>,
}

impl Root {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    /// Depth-first walk over every entry in the root, top level included.
    pub fn walk(&self) -> WalkChildren<'_> {
        WalkChildren::over_entries(self.entries.iter())
    }
}
