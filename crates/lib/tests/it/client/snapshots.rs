use std::sync::Arc;

use superscore::{
    Client, Entry,
    backend::BackendKind,
    client::ClientConfig,
    control::LocalShim,
    entry::{Collection, EntryType, EpicsValue, Snapshot},
    testing::{Seed, fixtures, local_client},
};
use tempfile::TempDir;

use crate::helpers::seeded;

const LINAC_PVS: [&str; 6] = [
    "VAC:GUNB:TEST1",
    "VAC:GUNB:TEST2",
    "MGNT:GUNB:TEST0",
    "LASR:GUNB:TEST1",
    "LASR:GUNB:TEST2",
    "VAC:L0B:TEST0",
];

/// A client over the linac fixture with every PV reading `value`.
fn linac_client(value: f64) -> (TempDir, Client, Arc<LocalShim>) {
    let (dir, backend) = seeded(BackendKind::Test, Seed::Named("linac_data"));
    let (client, shim) = local_client(backend);
    for pv in LINAC_PVS {
        shim.set(pv, value);
    }
    (dir, client, shim)
}

fn linac_collection(client: &Client) -> Collection {
    match client.get_entry(&fixtures::LCLS_SC).unwrap() {
        Entry::Collection(c) => c,
        other => panic!("expected a collection, got {}", other.entry_type()),
    }
}

fn setpoint_values(snapshot: &Snapshot) -> Vec<(String, Option<EpicsValue>)> {
    Entry::from(snapshot.clone())
        .walk_children()
        .filter_map(|e| match e {
            Entry::Setpoint(s) => Some((s.pv_name.clone(), s.data.clone())),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_snap_mirrors_collection() {
    let (_dir, client, shim) = linac_client(2.5);
    shim.set("MGNT:GUNB:TEST0", 7);
    let coll = linac_collection(&client);

    let snap = client.snap(&coll).await.unwrap();
    assert_eq!(snap.title, "LCLS-SC");
    assert_eq!(snap.origin_collection, Some(fixtures::LCLS_SC));
    assert_eq!(snap.children.len(), 2);

    let entry = Entry::from(snap.clone());
    let kinds: Vec<EntryType> = entry.walk_children().map(Entry::entry_type).collect();
    assert_eq!(kinds.iter().filter(|k| **k == EntryType::Snapshot).count(), 6);
    assert_eq!(kinds.iter().filter(|k| **k == EntryType::Setpoint).count(), 6);

    let values = setpoint_values(&snap);
    assert_eq!(values.len(), 6);
    for (pv, data) in values {
        let expected = if pv == "MGNT:GUNB:TEST0" {
            EpicsValue::Int(7)
        } else {
            EpicsValue::Float(2.5)
        };
        assert_eq!(data, Some(expected), "{pv}");
    }
}

#[tokio::test]
async fn test_unreadable_pvs_are_captured_empty() {
    let (_dir, backend) = seeded(BackendKind::Test, Seed::Named("linac_data"));
    let (client, shim) = local_client(backend);
    shim.set("VAC:GUNB:TEST1", 1.0);
    let coll = linac_collection(&client);

    let snap = client.snap(&coll).await.unwrap();
    let captured: Vec<_> = setpoint_values(&snap)
        .into_iter()
        .filter(|(_, data)| data.is_some())
        .map(|(pv, _)| pv)
        .collect();
    assert_eq!(captured, vec!["VAC:GUNB:TEST1"]);
}

#[tokio::test]
async fn test_snapshots_store_and_resnap_in_place() {
    let (_dir, client, shim) = linac_client(1.0);
    let coll = linac_collection(&client);

    let mut entry = Entry::from(client.snap(&coll).await.unwrap());
    client.save(&mut entry).unwrap();
    let stored = client.get_entry(&entry.uuid()).unwrap();
    assert_eq!(stored, entry);

    shim.set("LASR:GUNB:TEST2", 9.0);
    let Entry::Snapshot(mut snapshot) = stored else {
        panic!("expected a snapshot");
    };
    let id = snapshot.header.uuid;
    client.snap_into(&coll, &mut snapshot).await.unwrap();
    assert_eq!(snapshot.header.uuid, id);
    assert_eq!(snapshot.header.revision, 0);
    assert!(
        setpoint_values(&snapshot)
            .contains(&("LASR:GUNB:TEST2".to_string(), Some(EpicsValue::Float(9.0))))
    );

    let mut entry = Entry::from(snapshot);
    client.update(&mut entry).unwrap();
    assert_eq!(entry.revision(), 1);
    assert_eq!(client.get_entry(&id).unwrap(), entry);
}

#[tokio::test]
async fn test_meta_pvs_are_captured() {
    let (_dir, client, shim) = linac_client(0.0);
    let mut config = ClientConfig::default();
    config.session.meta_pvs = vec!["ACCL:META".to_string(), "MISSING:META".to_string()];
    let client = client.with_config(config);
    shim.set("ACCL:META", "running");

    let snap = client.snap(&linac_collection(&client)).await.unwrap();
    let metas: Vec<_> = snap
        .meta_pvs
        .iter()
        .map(|r| (r.pv_name.as_str(), r.data.clone()))
        .collect();
    assert_eq!(
        metas,
        vec![
            ("ACCL:META", Some(EpicsValue::from("running"))),
            ("MISSING:META", None),
        ]
    );
}

#[tokio::test]
async fn test_apply_writes_every_setpoint() {
    let (_dir, client, shim) = linac_client(0.0);
    let snapshot = client.get_entry(&fixtures::LINAC_SNAPSHOT).unwrap();

    let statuses = client.apply(&snapshot, false).await.unwrap();
    assert_eq!(statuses.len(), 6);
    for status in &statuses {
        status.wait(None).await.unwrap();
    }
    assert_eq!(shim.value("LASR:GUNB:TEST1"), Some(EpicsValue::Float(5.0)));
    assert_eq!(shim.value("VAC:GUNB:TEST2"), Some(EpicsValue::Bool(false)));
    assert_eq!(shim.value("MGNT:GUNB:TEST0"), Some(EpicsValue::Int(1)));
}

#[tokio::test]
async fn test_sequential_apply_stops_at_first_failure() {
    let (_dir, client, shim) = linac_client(0.0);
    shim.set_read_only("VAC:GUNB:TEST2", true);
    let snapshot = client.get_entry(&fixtures::LINAC_SNAPSHOT).unwrap();

    let statuses = client.apply(&snapshot, true).await.unwrap();
    assert_eq!(statuses.len(), 2);
    assert!(statuses[0].success());
    assert!(statuses[1].done());
    assert!(!statuses[1].success());

    assert_eq!(shim.value("VAC:GUNB:TEST1"), Some(EpicsValue::Float(0.5)));
    assert_eq!(shim.value("MGNT:GUNB:TEST0"), Some(EpicsValue::Float(0.0)));
}

#[tokio::test]
async fn test_apply_single_setpoint() {
    let (_dir, client, shim) = linac_client(0.0);
    let snapshot = client.get_entry(&fixtures::LINAC_SNAPSHOT).unwrap();
    let setpoint = snapshot
        .walk_children()
        .find(|e| e.pv_name() == Some("VAC:L0B:TEST0"))
        .unwrap()
        .clone();

    let statuses = client.apply(&setpoint, true).await.unwrap();
    assert_eq!(statuses.len(), 1);
    assert!(statuses[0].success());
    assert_eq!(shim.value("VAC:L0B:TEST0"), Some(EpicsValue::Float(0.5)));

    let coll = client.get_entry(&fixtures::LCLS_SC).unwrap();
    assert!(client.apply(&coll, false).await.is_err());
}
