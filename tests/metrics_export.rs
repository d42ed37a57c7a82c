// ==============================================
// METRICS EXPORT (integration, feature = "metrics")
// ==============================================

#![cfg(feature = "metrics")]

use compositekit::composer::CompositeWeakKeyCache;
use compositekit::key::{Key, ObjectRef};
use compositekit::metrics::{MetricsExporter, MetricsSnapshotProvider, PrometheusTextExporter};
use compositekit::shape::KeyShape;

#[test]
fn cache_snapshot_round_trips_through_exporter() {
    let mut cache = CompositeWeakKeyCache::new(KeyShape::weak(&["w"]).unwrap()).unwrap();
    let a = ObjectRef::new(());
    let b = ObjectRef::new(());
    let _ka = cache.compose_key(&[Key::from(&a)], &[]).unwrap();
    let _kb = cache.compose_key(&[Key::from(&b)], &[]).unwrap();
    assert!(cache.peek_key(&[Key::from(&a)], &[]).is_some());
    assert!(cache.delete_key(&[Key::from(&b)], &[]));
    drop(a);
    cache.purge();

    let snapshot = cache.snapshot();
    assert_eq!(snapshot.compose_new, 2);
    assert_eq!(snapshot.peek_calls, 1);
    assert_eq!(snapshot.peek_found, 1);
    assert_eq!(snapshot.delete_found, 1);
    assert_eq!(snapshot.evicted_records, 1);
    assert_eq!(snapshot.records, 0);
    assert_eq!(snapshot.pending_evictions, 0);

    let exporter = PrometheusTextExporter::new("ck", Vec::new());
    exporter.export(&snapshot);
    let text = String::from_utf8(exporter.into_inner()).unwrap();
    assert!(text.contains("ck_compose_new_total 2"));
    assert!(text.contains("ck_evicted_records_total 1"));
    assert!(text.contains("ck_records 0"));
}

#[test]
fn stale_notifications_are_counted() {
    let mut cache = CompositeWeakKeyCache::new(KeyShape::weak(&["l", "r"]).unwrap()).unwrap();
    let a = ObjectRef::new(());
    let b = ObjectRef::new(());
    let _k = cache.compose_key(&[Key::from(&a), Key::from(&b)], &[]).unwrap();
    drop(a);
    drop(b);
    cache.purge();

    let snapshot = cache.snapshot();
    assert_eq!(snapshot.evicted_records, 1);
    assert_eq!(snapshot.stale_notifications, 1);
}
