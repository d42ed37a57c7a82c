/// Point-in-time copy of a cache's counters plus gauges.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ComposerMetricsSnapshot {
    pub compose_calls: u64,
    pub compose_hits: u64,
    pub compose_new: u64,
    pub compose_reminted: u64, // live record whose token had been dropped by every holder
    pub compose_rejected: u64,

    pub peek_calls: u64,
    pub peek_found: u64,

    pub delete_calls: u64,
    pub delete_found: u64,

    pub purge_calls: u64,
    pub evicted_records: u64,
    pub stale_notifications: u64, // anchors already removed by an explicit delete

    pub clears: u64,

    // gauges captured at snapshot time
    pub records: usize,
    pub object_tokens: usize,
    pub primitive_tokens: usize,
    pub pending_evictions: usize,
}
