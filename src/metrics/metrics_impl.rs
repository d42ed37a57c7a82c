use crate::metrics::cell::MetricsCell;
use crate::metrics::traits::{ComposerMetricsReadRecorder, ComposerMetricsRecorder};

#[derive(Debug, Default)]
pub struct ComposerMetrics {
    pub compose_calls: u64,
    pub compose_hits: u64,
    pub compose_new: u64,
    pub compose_reminted: u64,
    pub compose_rejected: u64,
    pub peek_calls: MetricsCell,
    pub peek_found: MetricsCell,
    pub delete_calls: u64,
    pub delete_found: u64,
    pub purge_calls: u64,
    pub evicted_records: u64,
    pub stale_notifications: u64,
    pub clears: u64,
}

impl ComposerMetricsRecorder for ComposerMetrics {
    fn record_compose_call(&mut self) {
        self.compose_calls += 1;
    }

    fn record_compose_hit(&mut self) {
        self.compose_hits += 1;
    }

    fn record_compose_new(&mut self) {
        self.compose_new += 1;
    }

    fn record_compose_reminted(&mut self) {
        self.compose_reminted += 1;
    }

    fn record_compose_rejected(&mut self) {
        self.compose_rejected += 1;
    }

    fn record_delete_call(&mut self) {
        self.delete_calls += 1;
    }

    fn record_delete_found(&mut self) {
        self.delete_found += 1;
    }

    fn record_purge_call(&mut self) {
        self.purge_calls += 1;
    }

    fn record_evicted_record(&mut self) {
        self.evicted_records += 1;
    }

    fn record_stale_notification(&mut self) {
        self.stale_notifications += 1;
    }

    fn record_clear(&mut self) {
        self.clears += 1;
    }
}

impl ComposerMetricsReadRecorder for ComposerMetrics {
    fn record_peek_call(&self) {
        self.peek_calls.incr();
    }

    fn record_peek_found(&self) {
        self.peek_found.incr();
    }
}
