use std::fs;

use serde_json::Value;
use superscore::{
    Entry,
    backend::{Backend, FilestoreBackend},
    entry::{Parameter, Root},
    testing::fixtures,
};

use crate::helpers::{save, small_collection};

fn set_readonly(path: &std::path::Path, readonly: bool) {
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_readonly(readonly);
    fs::set_permissions(path, perms).unwrap();
}

#[test]
fn test_reopened_store_sees_saved_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.json");

    let first = FilestoreBackend::new(&path);
    let coll = save(&first, small_collection("C"));
    let param = save(&first, Parameter::new("PV:LONE"));

    let second = FilestoreBackend::new(&path);
    assert_eq!(second.root().unwrap(), Root::new(vec![coll.clone(), param]));
    assert_eq!(second.get_entry(&coll.uuid()).unwrap(), coll);
}

#[test]
fn test_document_nests_owned_children() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.json");
    let backend = FilestoreBackend::new(&path);
    let coll = save(&backend, small_collection("C"));

    let doc: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let entries = doc["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["entry_type"], "Collection");
    assert_eq!(entries[0]["uuid"], coll.uuid().to_string());
    let children = entries[0]["children"].as_array().unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0]["pv_name"], "C:PV1");
}

#[test]
fn test_writability_follows_file_permissions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.json");
    let backend = FilestoreBackend::new(&path);
    let stored = save(&backend, Parameter::new("PV:A"));
    let unsaved = Entry::from(Parameter::new("PV:B"));

    assert!(backend.is_writable(&stored));
    assert!(backend.is_writable(&unsaved));

    set_readonly(&path, true);
    assert!(!backend.is_writable(&stored));
    assert!(!backend.is_writable(&unsaved));

    set_readonly(&path, false);
    assert!(backend.is_writable(&stored));
}

#[test]
fn test_external_writes_are_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.json");
    let ours = FilestoreBackend::new(&path);
    let theirs = FilestoreBackend::new(&path);

    let param = save(&ours, Parameter::new("PV:A"));
    let mut their_copy = theirs.get_entry(&param.uuid()).unwrap();
    if let Entry::Parameter(p) = &mut their_copy {
        p.abs_tolerance = Some(0.1);
    }
    theirs.update_entry(&mut their_copy).unwrap();

    let mut our_copy = param.clone();
    if let Entry::Parameter(p) = &mut our_copy {
        p.rel_tolerance = Some(0.2);
    }
    assert!(ours.update_entry(&mut our_copy).unwrap_err().is_out_of_sync());
    assert_eq!(ours.get_entry(&param.uuid()).unwrap(), their_copy);
}

#[test]
fn test_seeded_document_is_loadable_as_root() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.json");
    let backend = FilestoreBackend::new(&path);
    for mut entry in fixtures::linac_data().entries {
        backend.save_entry(&mut entry).unwrap();
    }
    let root: Root = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(root, backend.root().unwrap());
}
