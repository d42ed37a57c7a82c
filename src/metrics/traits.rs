//! # Metrics Trait Hierarchy
//!
//! ```text
//!   ┌──────────────────────────────┐   ┌──────────────────────────────┐
//!   │   ComposerMetricsRecorder    │   │ ComposerMetricsReadRecorder  │
//!   │  compose/delete/purge/evict  │   │  peek (through &self)        │
//!   └──────────────┬───────────────┘   └──────────────┬───────────────┘
//!                  └───────────────┬──────────────────┘
//!                                  ▼
//!                        CompositeWeakKeyCache
//!
//!   Consumption (decoupled from recording):
//!   ┌──────────────────────────────┐    ┌──────────────────────────────┐
//!   │ MetricsSnapshotProvider<S>   │    │ MetricsExporter<S>           │
//!   │ (bench/test)                 │    │ (production monitoring)      │
//!   └──────────────────────────────┘    └──────────────────────────────┘
//! ```

/// Counters written by the cache's mutating operations.
pub trait ComposerMetricsRecorder {
    fn record_compose_call(&mut self);
    fn record_compose_hit(&mut self);
    fn record_compose_new(&mut self);
    fn record_compose_reminted(&mut self);
    fn record_compose_rejected(&mut self);
    fn record_delete_call(&mut self);
    fn record_delete_found(&mut self);
    fn record_purge_call(&mut self);
    fn record_evicted_record(&mut self);
    fn record_stale_notification(&mut self);
    fn record_clear(&mut self);
}

/// Counters written by read-only lookups (uses interior mutability).
pub trait ComposerMetricsReadRecorder {
    fn record_peek_call(&self);
    fn record_peek_found(&self);
}

/// Snapshot provider for bench/testing.
pub trait MetricsSnapshotProvider<S> {
    fn snapshot(&self) -> S;
}

/// Export/publish metrics to production monitoring backends.
pub trait MetricsExporter<S> {
    fn export(&self, snapshot: &S);
}
