//! Behaviour every backend must share.

use superscore::{
    Entry, Error, ID,
    backend::{BackendError, BackendKind},
    entry::{Collection, EntryRef, Nestable, Parameter, Snapshot},
    testing::{Seed, fixtures},
};

use crate::helpers::{ALL_KINDS, empty, save, seeded, small_collection};

#[test]
fn test_saved_entries_read_back_equal() {
    for kind in ALL_KINDS {
        let (_dir, backend) = empty(kind);
        let mut param = fixtures::parameter_with_readback();
        param.abs_tolerance = Some(0.5);
        let coll = save(
            backend.as_ref(),
            Collection::new("outer")
                .with_child(small_collection("inner"))
                .with_child(param),
        );

        assert_eq!(backend.get_entry(&coll.uuid()).unwrap(), coll, "{kind}");
        for child in coll.walk_children() {
            assert!(child.parent().is_some(), "{kind}");
            assert_eq!(&backend.get_entry(&child.uuid()).unwrap(), child, "{kind}");
        }
    }
}

#[test]
fn test_fixture_databases_survive_storage() {
    for kind in ALL_KINDS {
        for name in fixtures::FIXTURE_NAMES {
            let (_dir, backend) = seeded(kind, Seed::Named(name));
            let mut expected = fixtures::named(name).unwrap();
            expected.entries.iter_mut().for_each(Entry::assign_ids);
            assert_eq!(backend.root().unwrap(), expected, "{kind} {name}");
        }
    }
}

#[test]
fn test_missing_entry_is_not_found() {
    for kind in ALL_KINDS {
        let (_dir, backend) = seeded(kind, Seed::Root(fixtures::linac_data));
        let err = backend.get_entry(&ID::generate()).unwrap_err();
        assert!(err.is_not_found(), "{kind}: {err}");
        assert!(!backend.contains(&ID::generate()).unwrap());
        assert!(backend.contains(&fixtures::GUNB).unwrap());
    }
}

#[test]
fn test_saving_twice_is_rejected() {
    for kind in ALL_KINDS {
        let (_dir, backend) = empty(kind);
        let mut entry = save(backend.as_ref(), Parameter::new("PV:A"));
        let err = backend.save_entry(&mut entry).unwrap_err();
        assert!(err.is_already_exists(), "{kind}: {err}");
    }
}

#[test]
fn test_save_with_parent_appends_to_container() {
    for kind in ALL_KINDS {
        let (_dir, backend) = empty(kind);
        let coll = save(backend.as_ref(), small_collection("C"));

        let mut param = Parameter::new("C:PV3");
        param.header.parent = Some(coll.uuid());
        let param = save(backend.as_ref(), param);

        let stored = backend.get_entry(&coll.uuid()).unwrap();
        assert_eq!(stored.revision(), 1, "{kind}");
        assert_eq!(stored.child_ids().last(), Some(&param.uuid()), "{kind}");
        assert_eq!(stored.child_slots()[2].as_entry(), Some(&param), "{kind}");
        assert_eq!(backend.root().unwrap().entries.len(), 1, "{kind}");
    }
}

#[test]
fn test_save_under_leaf_parent_is_rejected() {
    for kind in ALL_KINDS {
        let (_dir, backend) = empty(kind);
        let leaf = save(backend.as_ref(), Parameter::new("PV:A"));
        let mut child = Parameter::new("PV:B");
        child.header.parent = Some(leaf.uuid());
        let err = backend.save_entry(&mut Entry::from(child)).unwrap_err();
        assert!(
            matches!(err, Error::Backend(BackendError::InvalidReference { .. })),
            "{kind}: {err}"
        );
    }
}

#[test]
fn test_update_advances_revision() {
    for kind in ALL_KINDS {
        let (_dir, backend) = empty(kind);
        let coll = save(backend.as_ref(), small_collection("C"));

        let mut edited = backend.get_entry(&coll.uuid()).unwrap();
        if let Entry::Collection(c) = &mut edited {
            c.title = "renamed".to_string();
        }
        backend.update_entry(&mut edited).unwrap();
        assert_eq!(edited.revision(), 1, "{kind}");
        assert_eq!(backend.get_entry(&coll.uuid()).unwrap(), edited, "{kind}");

        // Children were untouched and keep their revision
        for child in edited.walk_children() {
            assert_eq!(child.revision(), 0, "{kind}");
        }
    }
}

#[test]
fn test_stale_copies_are_out_of_sync() {
    for kind in ALL_KINDS {
        let (_dir, backend) = empty(kind);
        let coll = save(backend.as_ref(), small_collection("C"));
        let mut first = backend.get_entry(&coll.uuid()).unwrap();
        let mut second = first.clone();

        if let Entry::Collection(c) = &mut first {
            c.title = "first".to_string();
        }
        backend.update_entry(&mut first).unwrap();

        if let Entry::Collection(c) = &mut second {
            c.title = "second".to_string();
        }
        let err = backend.update_entry(&mut second).unwrap_err();
        assert!(err.is_out_of_sync(), "{kind}: {err}");
        let err = backend.delete_entry(&second, true).unwrap_err();
        assert!(err.is_out_of_sync(), "{kind}: {err}");

        assert_eq!(backend.get_entry(&coll.uuid()).unwrap(), first, "{kind}");
    }
}

#[test]
fn test_stale_descendant_is_out_of_sync() {
    for kind in ALL_KINDS {
        let (_dir, backend) = empty(kind);
        let coll = save(backend.as_ref(), small_collection("C"));
        let child_id = coll.child_ids()[0];

        let mut child = backend.get_entry(&child_id).unwrap();
        if let Entry::Parameter(p) = &mut child {
            p.abs_tolerance = Some(1.0);
        }
        backend.update_entry(&mut child).unwrap();

        // `coll` still embeds the revision-0 child
        let err = backend.delete_entry(&coll, true).unwrap_err();
        assert!(err.is_out_of_sync(), "{kind}: {err}");
    }
}

#[test]
fn test_update_drops_removed_children() {
    for kind in ALL_KINDS {
        let (_dir, backend) = empty(kind);
        let coll = save(backend.as_ref(), small_collection("C"));
        let dropped = coll.child_ids()[1];

        let mut edited = coll.clone();
        if let Entry::Collection(c) = &mut edited {
            c.children.pop();
        }
        backend.update_entry(&mut edited).unwrap();

        assert!(backend.get_entry(&dropped).unwrap_err().is_not_found(), "{kind}");
        assert_eq!(backend.get_entry(&coll.uuid()).unwrap().child_ids().len(), 1);
    }
}

#[test]
fn test_delete_requires_cascade_for_children() {
    for kind in ALL_KINDS {
        let (_dir, backend) = empty(kind);
        let coll = save(backend.as_ref(), small_collection("C"));

        let err = backend.delete_entry(&coll, false).unwrap_err();
        assert!(
            matches!(err, Error::Backend(BackendError::HasChildren { .. })),
            "{kind}: {err}"
        );

        backend.delete_entry(&coll, true).unwrap();
        for id in std::iter::once(coll.uuid()).chain(coll.child_ids()) {
            assert!(!backend.contains(&id).unwrap(), "{kind}");
        }
        assert!(backend.root().unwrap().entries.is_empty(), "{kind}");
    }
}

#[test]
fn test_empty_container_deletes_without_cascade() {
    for kind in ALL_KINDS {
        let (_dir, backend) = empty(kind);
        let snap = save(backend.as_ref(), Snapshot::new("empty"));
        backend.delete_entry(&snap, false).unwrap();
        assert!(!backend.contains(&snap.uuid()).unwrap(), "{kind}");
    }
}

#[test]
fn test_delete_detaches_references() {
    for kind in ALL_KINDS {
        let (_dir, backend) = empty(kind);
        let owner = save(backend.as_ref(), small_collection("OWNER"));
        let shared = owner.child_ids()[0];

        let mut viewer = Collection::new("VIEWER");
        viewer.children.push(EntryRef::Id(shared));
        let viewer = save(backend.as_ref(), viewer);

        let param = backend.get_entry(&shared).unwrap();
        backend.delete_entry(&param, false).unwrap();

        let owner_after = backend.get_entry(&owner.uuid()).unwrap();
        assert_eq!(owner_after.child_ids(), vec![owner.child_ids()[1]], "{kind}");
        assert_eq!(owner_after.revision(), owner.revision() + 1, "{kind}");

        let viewer_after = backend.get_entry(&viewer.uuid()).unwrap();
        assert!(viewer_after.child_ids().is_empty(), "{kind}");
        assert_eq!(viewer_after.revision(), 1, "{kind}");
    }
}

#[test]
fn test_owned_readback_goes_with_its_parameter() {
    for kind in ALL_KINDS {
        let (_dir, backend) = empty(kind);
        let param = save(backend.as_ref(), fixtures::parameter_with_readback());
        let readback = param.child_ids()[0];
        assert!(backend.contains(&readback).unwrap());

        backend.delete_entry(&param, false).unwrap();
        assert!(!backend.contains(&readback).unwrap(), "{kind}");
    }
}

#[test]
fn test_fill_uuids_embeds_known_references() {
    for kind in ALL_KINDS {
        let (_dir, backend) = empty(kind);
        let param = save(backend.as_ref(), Parameter::new("PV:A"));
        let missing = ID::generate();

        let mut coll = Collection::new("refs");
        coll.children = vec![EntryRef::Id(param.uuid()), EntryRef::Id(missing)];
        let filled = backend.fill_uuids(coll.into()).unwrap();

        let slots = filled.child_slots();
        assert_eq!(slots[0].as_entry(), Some(&param), "{kind}");
        assert_eq!(slots[1], &EntryRef::Id(missing), "{kind}");
    }
}

#[test]
fn test_root_order_is_insertion_order() {
    for kind in ALL_KINDS {
        let (_dir, backend) = empty(kind);
        let ids: Vec<_> = ["C", "A", "B"]
            .into_iter()
            .map(|pv| save(backend.as_ref(), Parameter::new(pv)).uuid())
            .collect();
        let root_ids: Vec<_> = backend
            .root()
            .unwrap()
            .entries
            .iter()
            .map(Entry::uuid)
            .collect();
        assert_eq!(root_ids, ids, "{kind}");
    }
}

#[test]
fn test_nestable_children_match_walk() {
    let (_dir, backend) = seeded(BackendKind::Test, Seed::Named("linac_data"));
    let Entry::Collection(linac) = backend.get_entry(&fixtures::LCLS_SC).unwrap() else {
        panic!("LCLS-SC should be a collection");
    };
    assert_eq!(linac.children().len(), 2);
    assert_eq!(linac.walk_children().count(), 12);
}
