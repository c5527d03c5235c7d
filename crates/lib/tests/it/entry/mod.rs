use serde_json::Value;
use superscore::{
    Entry,
    entry::{EntryRef, EntryType, Root},
    testing::fixtures,
};

#[test]
fn test_fixture_walk_order() {
    let root = fixtures::linac_data();
    let titles: Vec<String> = root.entries[0]
        .walk_children()
        .filter(|e| e.entry_type() == EntryType::Collection)
        .map(|e| match e {
            Entry::Collection(c) => c.title.clone(),
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(titles, vec!["GUNB", "VAC", "MGNT", "LASR", "L0B", "VAC"]);

    // Whole-root walk starts with the top-level entries themselves
    let first: Vec<_> = root.walk().take(2).map(Entry::uuid).collect();
    assert_eq!(first, vec![fixtures::LCLS_SC, fixtures::GUNB]);
    assert_eq!(root.walk().count(), 26);
}

#[test]
fn test_fixture_document_round_trips() {
    let root = fixtures::linac_with_comparison_snapshot();
    let json = serde_json::to_string_pretty(&root).unwrap();
    let parsed: Root = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, root);

    let value: Value = serde_json::from_str(&json).unwrap();
    let snapshot = &value["entries"][2];
    assert_eq!(snapshot["entry_type"], "Snapshot");
    assert_eq!(snapshot["title"], "AD Comparison");
    assert_eq!(snapshot["origin_collection"], fixtures::LCLS_SC.to_string());
}

#[test]
fn test_id_references_parse_from_strings() {
    let json = format!(
        r#"{{"entry_type": "Collection", "title": "refs", "children": ["{}"]}}"#,
        fixtures::GUNB
    );
    let entry: Entry = serde_json::from_str(&json).unwrap();
    assert_eq!(entry.child_slots(), vec![&EntryRef::Id(fixtures::GUNB)]);
    assert_eq!(entry.revision(), 0);
    assert!(entry.parent().is_none());
}
