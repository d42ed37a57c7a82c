use std::io::Write;
use std::sync::Mutex;

use crate::metrics::snapshot::ComposerMetricsSnapshot;
use crate::metrics::traits::MetricsExporter;

/// Prometheus text exporter for composite key cache snapshots.
///
/// Writes in the Prometheus text exposition format so it can be scraped by
/// Prometheus or forwarded to an OpenTelemetry collector.
#[derive(Debug)]
pub struct PrometheusTextExporter<W: Write> {
    prefix: String,
    writer: Mutex<W>,
}

impl<W: Write> PrometheusTextExporter<W> {
    pub fn new(prefix: impl Into<String>, writer: W) -> Self {
        Self {
            prefix: prefix.into(),
            writer: Mutex::new(writer),
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_metric(&self, kind: &str, name: &str, value: u64) {
        let Ok(mut writer) = self.writer.lock() else {
            return;
        };
        let _ = writeln!(writer, "# TYPE {} {}", name, kind);
        let _ = writeln!(writer, "{} {}", name, value);
    }

    fn write_counter(&self, suffix: &str, value: u64) {
        self.write_metric("counter", &self.metric_name(suffix), value);
    }

    fn write_gauge(&self, suffix: &str, value: usize) {
        self.write_metric("gauge", &self.metric_name(suffix), value as u64);
    }

    fn metric_name(&self, suffix: &str) -> String {
        if self.prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}_{}", self.prefix, suffix)
        }
    }
}

impl<W: Write> MetricsExporter<ComposerMetricsSnapshot> for PrometheusTextExporter<W> {
    fn export(&self, snapshot: &ComposerMetricsSnapshot) {
        self.write_counter("compose_calls_total", snapshot.compose_calls);
        self.write_counter("compose_hits_total", snapshot.compose_hits);
        self.write_counter("compose_new_total", snapshot.compose_new);
        self.write_counter("compose_reminted_total", snapshot.compose_reminted);
        self.write_counter("compose_rejected_total", snapshot.compose_rejected);
        self.write_counter("peek_calls_total", snapshot.peek_calls);
        self.write_counter("peek_found_total", snapshot.peek_found);
        self.write_counter("delete_calls_total", snapshot.delete_calls);
        self.write_counter("delete_found_total", snapshot.delete_found);
        self.write_counter("purge_calls_total", snapshot.purge_calls);
        self.write_counter("evicted_records_total", snapshot.evicted_records);
        self.write_counter("stale_notifications_total", snapshot.stale_notifications);
        self.write_counter("clears_total", snapshot.clears);

        self.write_gauge("records", snapshot.records);
        self.write_gauge("object_tokens", snapshot.object_tokens);
        self.write_gauge("primitive_tokens", snapshot.primitive_tokens);
        self.write_gauge("pending_evictions", snapshot.pending_evictions);
    }
}
