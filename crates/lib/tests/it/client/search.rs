use superscore::{
    Entry,
    backend::{BackendKind, SearchOperator, SearchTerm},
    compare::PathSegment,
    entry::{EntryType, EpicsValue},
    testing::{Seed, fixtures, local_client},
};

use crate::helpers::{ALL_KINDS, seeded};

fn pv_names(results: superscore::backend::SearchResults) -> Vec<String> {
    let mut names: Vec<String> = results
        .map(|e| e.unwrap().pv_name().unwrap().to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn test_isclose_is_expanded_by_the_client() {
    for kind in ALL_KINDS {
        let (_dir, backend) = seeded(kind, Seed::Named("linac_data"));
        let (client, _shim) = local_client(backend);

        let close = client
            .search(&[
                SearchTerm::new("data", SearchOperator::IsClose, vec![5.2, 0.0, 0.25]),
                SearchTerm::entry_type(EntryType::Setpoint),
            ])
            .unwrap();
        assert_eq!(pv_names(close), vec!["LASR:GUNB:TEST1", "LASR:GUNB:TEST2"], "{kind}");

        let too_tight = client
            .search(&[SearchTerm::new("data", SearchOperator::IsClose, vec![5.2, 0.0, 0.1])])
            .unwrap();
        assert_eq!(too_tight.count(), 0, "{kind}");

        assert!(
            client
                .search(&[SearchTerm::new("data", SearchOperator::IsClose, 5.0)])
                .is_err()
        );
    }
}

#[test]
fn test_compare_finds_changed_values() {
    let (_dir, backend) = seeded(BackendKind::Test, Seed::Named("linac_with_comparison_snapshot"));
    let (client, _shim) = local_client(backend);

    let standard = client.get_entry(&fixtures::LINAC_SNAPSHOT).unwrap();
    let changed = client.get_entry(&fixtures::COMPARISON_SNAPSHOT).unwrap();

    let same = client.compare(&standard, &standard.clone()).unwrap();
    assert!(same.is_empty());

    let diff = client.compare(&standard, &changed).unwrap();
    assert!(!diff.is_empty());
    let data_changes: Vec<_> = diff
        .diffs
        .iter()
        .filter(|d| d.path.last() == Some(&PathSegment::Field("data".to_string())))
        .collect();
    assert_eq!(data_changes.len(), 3);
    assert!(diff.diffs.iter().any(|d| d.path_string().ends_with(".severity")));
    assert!(diff.diffs.iter().any(|d| d.path_string() == ".title"));

    let as_float = serde_json::to_value(EpicsValue::Float(-1.0)).unwrap();
    assert!(data_changes.iter().any(|d| d.new.as_ref() == Some(&as_float)));
}

#[test]
fn test_compare_of_different_kinds_is_one_difference() {
    let (_dir, backend) = seeded(BackendKind::Test, Seed::Named("linac_data"));
    let (client, _shim) = local_client(backend);
    let coll = client.get_entry(&fixtures::LCLS_SC).unwrap();
    let snap = client.get_entry(&fixtures::LINAC_SNAPSHOT).unwrap();

    let diff = client.compare(&coll, &snap).unwrap();
    assert_eq!(diff.diffs.len(), 1);
    assert!(diff.diffs[0].path.is_empty());
    assert!(matches!(diff.original_entry, Entry::Collection(_)));
}
