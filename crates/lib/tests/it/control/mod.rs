use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use superscore::{
    control::{Callback, ControlError, ControlLayer, LocalShim, TaskStatus},
    entry::EpicsValue,
};

fn local_layer() -> (ControlLayer, Arc<LocalShim>) {
    let shim = Arc::new(LocalShim::new());
    (ControlLayer::new().with_shim(shim.clone()), shim)
}

#[tokio::test]
async fn test_get_with_and_without_protocol() {
    let (layer, shim) = local_layer();
    shim.set("MY:PV", 3.5);

    let plain = layer.get("MY:PV").await.unwrap();
    let prefixed = layer.get("loc://MY:PV").await.unwrap();
    assert_eq!(plain.data, Some(EpicsValue::Float(3.5)));
    assert_eq!(plain, prefixed);

    let err = layer.get("pva://MY:PV").await.unwrap_err();
    assert!(err.is_control_error());
}

#[tokio::test]
async fn test_put_many_runs_every_callback() {
    let (layer, shim) = local_layer();
    let pvs: Vec<String> = (0..4).map(|i| format!("PV:{i}")).collect();
    for pv in &pvs {
        shim.set(pv.as_str(), 0);
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let callbacks: Vec<Callback> = pvs
        .iter()
        .map(|_| {
            let calls = calls.clone();
            Box::new(move |status: &TaskStatus| {
                assert!(status.success());
                calls.fetch_add(1, Ordering::SeqCst);
            }) as Callback
        })
        .collect();

    let values = (0..4).map(|i| EpicsValue::Int(i * 10)).collect();
    let statuses = layer.put_many(&pvs, values, Some(callbacks)).unwrap();
    for status in &statuses {
        status.wait(Some(Duration::from_secs(5))).await.unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(shim.value("PV:3"), Some(EpicsValue::Int(30)));
}

#[tokio::test]
async fn test_failed_puts_report_their_error() {
    let (layer, shim) = local_layer();
    shim.set("LOCKED", 1);
    shim.set_read_only("LOCKED", true);

    let denied = layer.put("LOCKED", EpicsValue::Int(2), None);
    assert!(denied.wait(None).await.is_err());
    assert!(denied.done());
    assert!(matches!(
        denied.exception(),
        Some(ControlError::Communication { .. })
    ));
    assert_eq!(shim.value("LOCKED"), Some(EpicsValue::Int(1)));

    let unknown = layer.put("ca://LOCKED", EpicsValue::Int(2), None);
    assert!(unknown.done());
    assert!(matches!(
        unknown.exception(),
        Some(ControlError::UnsupportedProtocol { .. })
    ));
}

#[tokio::test]
async fn test_get_many_keeps_request_order() {
    let (layer, shim) = local_layer();
    shim.set("A", "first");
    shim.set("C", "third");

    let addresses = vec!["A".to_string(), "B".to_string(), "C".to_string()];
    let results = layer.get_many(&addresses).await;
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().data, Some(EpicsValue::from("first")));
    assert!(results[1].is_err());
    assert_eq!(results[2].as_ref().unwrap().data, Some(EpicsValue::from("third")));
}

#[test]
fn test_put_many_requires_matching_lengths() {
    let (layer, _shim) = local_layer();
    let err = layer
        .put_many(&["A".to_string(), "B".to_string()], vec![EpicsValue::Int(1)], None)
        .unwrap_err();
    assert!(err.is_invalid_request());
}
