use std::sync::Arc;

use superscore::{
    Client, Entry,
    backend::{BackendKind, TestBackend},
    client::ClientConfig,
    control::LocalShim,
    entry::{Collection, EntryRef, Parameter},
    testing::{Seed, fixtures, local_client},
};

use crate::helpers::seeded;

fn strict(client: (Client, Arc<LocalShim>)) -> Client {
    let mut config = ClientConfig::default();
    config.session.allow_existing_writes = false;
    client.0.with_config(config)
}

#[test]
fn test_existing_entries_are_protected() {
    let (_dir, backend) = seeded(BackendKind::Test, Seed::Named("linac_data"));
    let client = strict(local_client(backend));

    let mut gunb = client.get_entry(&fixtures::GUNB).unwrap();
    assert!(!client.is_writable(&gunb).unwrap());
    if let Entry::Collection(c) = &mut gunb {
        c.title = "edited".to_string();
    }
    assert!(client.update(&mut gunb).unwrap_err().is_not_writable());
    assert!(client.delete(&gunb, true).unwrap_err().is_not_writable());
    assert_eq!(
        client.get_entry(&fixtures::GUNB).unwrap().revision(),
        0,
        "refused writes must not reach the backend"
    );
}

#[test]
fn test_session_entries_stay_writable() {
    let (_dir, backend) = seeded(BackendKind::Test, Seed::Named("linac_data"));
    let client = strict(local_client(backend));

    let mut coll = Entry::from(Collection::new("new").with_child(Parameter::new("NEW:PV")));
    assert!(client.is_writable(&coll).unwrap());
    client.save(&mut coll).unwrap();

    assert!(client.is_writable(&coll).unwrap());
    for child in coll.walk_children() {
        assert!(client.session().contains(&child.uuid()));
    }
    if let Entry::Collection(c) = &mut coll {
        c.title = "renamed".to_string();
    }
    client.update(&mut coll).unwrap();
    assert_eq!(client.edited_within(&coll).len(), 2);

    client.delete(&coll, true).unwrap();
    assert!(!client.session().contains(&coll.uuid()));
}

#[test]
fn test_default_policy_allows_existing_writes() {
    let (_dir, backend) = seeded(BackendKind::Filestore, Seed::Named("linac_data"));
    let (client, _shim) = local_client(backend);

    let mut param = client.get_entry(&fixtures::MGNT_GUNB_PV).unwrap();
    assert!(client.is_writable(&param).unwrap());
    if let Entry::Parameter(p) = &mut param {
        p.abs_tolerance = Some(0.01);
    }
    client.update(&mut param).unwrap();
    assert_eq!(param.revision(), 1);
}

#[test]
fn test_backend_refusal_overrides_session() {
    let backend = TestBackend::new();
    let mut param = Entry::from(Parameter::new("LOCKED:PV"));
    backend.set_read_only(param.uuid(), true);
    let (client, _shim) = local_client(Box::new(backend));

    assert!(!client.is_writable(&param).unwrap());
    assert!(client.save(&mut param).unwrap_err().is_not_writable());
    assert!(!client.backend().contains(&param.uuid()).unwrap());
}

#[test]
fn test_protected_entries_cannot_ride_along_in_new_containers() {
    let (_dir, backend) = seeded(BackendKind::Test, Seed::Named("linac_data"));
    let client = strict(local_client(backend));

    let mut param = client.get_entry(&fixtures::MGNT_GUNB_PV).unwrap();
    if let Entry::Parameter(p) = &mut param {
        p.abs_tolerance = Some(99.0);
    }
    let mut wrapper = Collection::new("wrapper");
    wrapper.children.push(EntryRef::from(param));
    let mut wrapper = Entry::from(wrapper);

    let err = client.save(&mut wrapper).unwrap_err();
    assert!(err.is_not_writable());
    assert!(!client.backend().contains(&wrapper.uuid()).unwrap());
    assert!(!client.session().contains(&fixtures::MGNT_GUNB_PV));

    let stored = client.get_entry(&fixtures::MGNT_GUNB_PV).unwrap();
    assert_eq!(stored.revision(), 0);
    let Entry::Parameter(stored) = stored else {
        panic!("expected a parameter");
    };
    assert_eq!(stored.abs_tolerance, None);
}

#[test]
fn test_protected_parent_refuses_new_children() {
    let (_dir, backend) = seeded(BackendKind::Test, Seed::Named("linac_data"));
    let client = strict(local_client(backend));

    let mut param = Parameter::new("NEW:UNDER:GUNB");
    param.header.parent = Some(fixtures::GUNB);
    let mut param = Entry::from(param);
    assert!(client.save(&mut param).unwrap_err().is_not_writable());
    assert!(!client.backend().contains(&param.uuid()).unwrap());
    assert_eq!(client.get_entry(&fixtures::GUNB).unwrap().revision(), 0);

    // A container made in this session accepts children
    let mut coll = Entry::from(Collection::new("mine"));
    client.save(&mut coll).unwrap();
    let mut child = Parameter::new("NEW:UNDER:MINE");
    child.header.parent = Some(coll.uuid());
    client.save(&mut Entry::from(child)).unwrap();
}
