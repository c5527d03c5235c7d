//! Capturing and restoring live values.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use super::Client;
use crate::{
    Result,
    backend::BackendError,
    control::{EpicsData, TaskStatus},
    entry::{
        Collection, Entry, EntryHeader, EntryRef, EpicsValue, ID, Readback, Setpoint, Snapshot,
    },
};

impl Client {
    /// Reads every PV reachable from `coll`, plus the configured meta PVs,
    /// and assembles a new snapshot from the readings.
    ///
    /// PVs that cannot be read are captured without data.
    pub async fn snap(&self, coll: &Collection) -> Result<Snapshot> {
        let values = self.read_values(coll).await?;
        self.build_snapshot(coll, &values, None)
    }

    /// Like [`Client::snap`], but refills `snapshot` in place. The
    /// snapshot keeps its id, description, parent and revision.
    pub async fn snap_into(&self, coll: &Collection, snapshot: &mut Snapshot) -> Result<()> {
        let values = self.read_values(coll).await?;
        *snapshot = self.build_snapshot(coll, &values, Some(snapshot.clone()))?;
        Ok(())
    }

    async fn read_values(&self, coll: &Collection) -> Result<HashMap<String, EpicsData>> {
        debug!(id = %coll.header.uuid, "Reading values for snapshot");
        let mut pvs: Vec<String> = self
            .gather_leaves(coll.children.iter().cloned())?
            .iter()
            .filter_map(|e| e.pv_name().map(str::to_string))
            .collect();
        pvs.extend(self.config.session.meta_pvs.iter().cloned());

        let readings = self.cl.get_many(&pvs).await;
        let mut values = HashMap::with_capacity(pvs.len());
        for (pv, reading) in pvs.into_iter().zip(readings) {
            match reading {
                Ok(data) => {
                    values.insert(pv, data);
                }
                Err(e) => debug!(pv = %pv, error = %e, "Couldn't read value, storing no data"),
            }
        }
        Ok(values)
    }

    /// Assembles a snapshot of `coll` from pre-fetched `values`.
    ///
    /// With `existing`, that snapshot's header is kept and its contents are
    /// replaced. Children given as ids are resolved through the backend.
    /// Read-only parameters become readbacks; the others become setpoints
    /// carrying their paired readback. Nested collections become nested
    /// snapshots; a collection that refers back to one of its own ancestors
    /// is skipped.
    pub fn build_snapshot(
        &self,
        coll: &Collection,
        values: &HashMap<String, EpicsData>,
        existing: Option<Snapshot>,
    ) -> Result<Snapshot> {
        let mut snapshot = existing.unwrap_or_else(|| Snapshot {
            header: self.fresh_header(String::new()),
            ..Default::default()
        });
        snapshot.title = coll.title.clone();
        snapshot.tags = coll.tags.clone();
        snapshot.origin_collection = Some(coll.header.uuid);
        let mut path = vec![coll.header.uuid];
        snapshot.children = self.snapshot_children(coll, values, &mut path)?;
        snapshot.meta_pvs = self
            .config
            .session
            .meta_pvs
            .iter()
            .map(|pv| self.capture_readback(pv, String::new(), values, None, None))
            .collect();
        Ok(snapshot)
    }

    fn snapshot_children(
        &self,
        coll: &Collection,
        values: &HashMap<String, EpicsData>,
        path: &mut Vec<ID>,
    ) -> Result<Vec<EntryRef>> {
        let mut children = Vec::with_capacity(coll.children.len());
        for slot in &coll.children {
            if path.contains(&slot.id()) {
                warn!(id = %slot.id(), "Not capturing cyclic collection reference");
                continue;
            }
            let child = self.resolve(slot)?;
            let captured = match child {
                Entry::Parameter(param) => {
                    let description = param.header.description.clone();
                    if param.read_only {
                        Entry::from(self.capture_readback(
                            &param.pv_name,
                            description,
                            values,
                            param.abs_tolerance,
                            param.rel_tolerance,
                        ))
                    } else {
                        let readback = match &param.readback {
                            Some(slot) => Some(self.capture_paired_readback(slot, values)?),
                            None => None,
                        };
                        let mut setpoint = Setpoint {
                            header: self.fresh_header(description),
                            pv_name: param.pv_name.clone(),
                            readback: readback.map(|r| EntryRef::from(Entry::from(r))),
                            ..Default::default()
                        };
                        if let Some(data) = values.get(&param.pv_name) {
                            setpoint.data = data.data.clone();
                            setpoint.status = data.status;
                            setpoint.severity = data.severity;
                        }
                        Entry::from(setpoint)
                    }
                }
                Entry::Collection(nested) => {
                    let mut nested_snap = Snapshot {
                        header: self.fresh_header(nested.header.description.clone()),
                        ..Default::default()
                    };
                    nested_snap.title = nested.title.clone();
                    nested_snap.tags = nested.tags.clone();
                    nested_snap.origin_collection = Some(nested.header.uuid);
                    path.push(nested.header.uuid);
                    let nested_children = self.snapshot_children(&nested, values, path);
                    path.pop();
                    nested_snap.children = nested_children?;
                    Entry::from(nested_snap)
                }
                other => {
                    warn!(
                        id = %other.uuid(),
                        kind = %other.entry_type(),
                        "Skipping collection member that cannot be captured"
                    );
                    continue;
                }
            };
            children.push(EntryRef::from(captured));
        }
        Ok(children)
    }

    fn capture_paired_readback(
        &self,
        slot: &EntryRef,
        values: &HashMap<String, EpicsData>,
    ) -> Result<Readback> {
        let paired = self.resolve(slot)?;
        let (abs, rel) = match &paired {
            Entry::Readback(r) => (r.abs_tolerance, r.rel_tolerance),
            Entry::Parameter(p) => (p.abs_tolerance, p.rel_tolerance),
            _ => (None, None),
        };
        let pv = paired.pv_name().ok_or_else(|| BackendError::InvalidEntry {
            reason: format!("readback {} has no PV", paired.uuid()),
        })?;
        Ok(self.capture_readback(pv, paired.header().description.clone(), values, abs, rel))
    }

    fn capture_readback(
        &self,
        pv: &str,
        description: String,
        values: &HashMap<String, EpicsData>,
        abs_tolerance: Option<f64>,
        rel_tolerance: Option<f64>,
    ) -> Readback {
        let mut readback = Readback {
            header: self.fresh_header(description),
            pv_name: pv.to_string(),
            abs_tolerance,
            rel_tolerance,
            ..Default::default()
        };
        if let Some(data) = values.get(pv) {
            readback.data = data.data.clone();
            readback.status = data.status;
            readback.severity = data.severity;
        }
        readback
    }

    fn fresh_header(&self, description: String) -> EntryHeader {
        EntryHeader {
            description,
            creation_time: self.clock.now(),
            ..Default::default()
        }
    }

    fn resolve(&self, slot: &EntryRef) -> Result<Entry> {
        match slot {
            EntryRef::Entry(entry) => Ok((**entry).clone()),
            EntryRef::Id(id) => self.get_entry(id),
        }
    }

    /// Every PV-bearing entry reachable from `roots`, in walk order.
    ///
    /// Id references are resolved through the backend and each entry is
    /// visited once.
    fn gather_leaves(&self, roots: impl Iterator<Item = EntryRef>) -> Result<Vec<Entry>> {
        let mut queue: Vec<EntryRef> = roots.collect();
        queue.reverse();
        let mut seen = HashSet::new();
        let mut leaves = Vec::new();
        while let Some(slot) = queue.pop() {
            if !seen.insert(slot.id()) {
                continue;
            }
            let entry = self.resolve(&slot)?;
            match entry.as_nestable() {
                Some(nestable) => queue.extend(nestable.children().iter().rev().cloned()),
                None => {
                    queue.extend(entry.child_slots().into_iter().rev().cloned());
                    leaves.push(entry);
                }
            }
        }
        Ok(leaves)
    }

    /// Writes the values held by a setpoint or a snapshot.
    ///
    /// Readbacks and entries without data are skipped. In sequential mode
    /// each put is awaited before the next starts, and the sequence stops
    /// after the first failed put; its status is the last one returned.
    pub async fn apply(&self, entry: &Entry, sequential: bool) -> Result<Vec<TaskStatus>> {
        let targets: Vec<(String, EpicsValue)> = match entry {
            Entry::Setpoint(_) => setpoint_target(entry).into_iter().collect(),
            Entry::Snapshot(snapshot) => self
                .gather_leaves(snapshot.children.iter().cloned())?
                .iter()
                .filter_map(setpoint_target)
                .collect(),
            other => {
                return Err(BackendError::InvalidEntry {
                    reason: format!("cannot apply a {}", other.entry_type()),
                }
                .into());
            }
        };
        info!(id = %entry.uuid(), count = targets.len(), sequential, "Applying values");

        if !sequential {
            let (pvs, data): (Vec<String>, Vec<EpicsValue>) = targets.into_iter().unzip();
            return Ok(self.cl.put_many(&pvs, data, None)?);
        }

        let mut statuses = Vec::with_capacity(targets.len());
        for (pv, data) in targets {
            debug!(pv = %pv, "Putting value");
            let status = self.cl.put(&pv, data, None);
            let outcome = status.wait(None).await;
            statuses.push(status);
            if let Err(e) = outcome {
                warn!(pv = %pv, error = %e, "Put failed, terminating put sequence");
                break;
            }
        }
        Ok(statuses)
    }
}

fn setpoint_target(entry: &Entry) -> Option<(String, EpicsValue)> {
    match entry {
        Entry::Setpoint(s) => s.data.clone().map(|d| (s.pv_name.clone(), d)),
        _ => None,
    }
}
