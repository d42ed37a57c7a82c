//! Optional counters for the composite key cache (feature `metrics`).
//!
//! Recording, snapshotting and exporting are split into separate traits so
//! the cache only ever writes counters; readers take a snapshot.

pub mod cell;
pub mod exporter;
pub mod metrics_impl;
pub mod snapshot;
pub mod traits;

pub use exporter::PrometheusTextExporter;
pub use metrics_impl::ComposerMetrics;
pub use snapshot::ComposerMetricsSnapshot;
pub use traits::{
    ComposerMetricsReadRecorder, ComposerMetricsRecorder, MetricsExporter,
    MetricsSnapshotProvider,
};
