use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use crate::catalog::OperationKind;
use crate::logger::{AUDIT_TARGET, METRICS_TARGET};

pub const DEFAULT_SLOW_QUERY_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub slow_query_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        let slow = std::env::var("BOOKSTORE_SLOW_QUERY_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_SLOW_QUERY_MS);
        Self { slow_query_ms: slow }
    }
}

#[derive(Default)]
pub struct Metrics {
    pub operations_total: AtomicU64,
    pub operations_failed_total: AtomicU64,
    pub operations_slow_total: AtomicU64,
    pub writes_total: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub operations_total: u64,
    pub operations_failed_total: u64,
    pub operations_slow_total: u64,
    pub writes_total: u64,
}

#[derive(Default)]
pub struct Telemetry {
    pub cfg: RwLock<TelemetryConfig>,
    pub metrics: Metrics,
    // Tests can capture audit lines in memory
    audit_sink: RwLock<Option<Arc<RwLock<Vec<String>>>>>,
}

pub(crate) static TELEMETRY: LazyLock<Telemetry> = LazyLock::new(Telemetry::default);

pub fn set_slow_query_ms(ms: u64) {
    TELEMETRY.cfg.write().slow_query_ms = ms;
}

#[must_use]
pub fn slow_query_ms() -> u64 {
    TELEMETRY.cfg.read().slow_query_ms
}

pub fn set_audit_sink_for_tests(sink: Arc<RwLock<Vec<String>>>) {
    *TELEMETRY.audit_sink.write() = Some(sink);
}

/// What one `run` call did, as reported on the metrics target.
#[derive(Debug, Clone, Copy)]
pub struct OpRecord<'a> {
    pub name: &'a str,
    pub kind: OperationKind,
    pub namespace: &'a str,
    pub elapsed: Duration,
    /// Documents returned or touched; `None` on failure.
    pub affected: Option<u64>,
}

/// Counts the operation and writes one JSON line on the metrics target. Slow operations are also
/// logged at warn level; successful writes get an audit line.
pub fn record_operation(rec: &OpRecord<'_>) {
    let m = &TELEMETRY.metrics;
    m.operations_total.fetch_add(1, Ordering::Relaxed);
    let ok = rec.affected.is_some();
    if !ok {
        m.operations_failed_total.fetch_add(1, Ordering::Relaxed);
    }
    let duration_ms = u64::try_from(rec.elapsed.as_millis()).unwrap_or(u64::MAX);
    let slow = duration_ms >= slow_query_ms();
    if slow {
        m.operations_slow_total.fetch_add(1, Ordering::Relaxed);
        log::warn!("slow operation {} ({}) on {}: {duration_ms}ms", rec.name, rec.kind, rec.namespace);
    }
    let line = serde_json::json!({
        "op": rec.name,
        "kind": rec.kind.as_str(),
        "namespace": rec.namespace,
        "duration_ms": duration_ms,
        "ok": ok,
        "affected": rec.affected,
        "slow": slow,
    })
    .to_string();
    log::info!(target: METRICS_TARGET, "{line}");

    if ok && rec.kind.is_write() {
        log_audit(rec);
    }
}

fn log_audit(rec: &OpRecord<'_>) {
    TELEMETRY.metrics.writes_total.fetch_add(1, Ordering::Relaxed);
    let line = serde_json::json!({
        "op": rec.name, "kind": rec.kind.as_str(), "namespace": rec.namespace, "affected": rec.affected
    })
    .to_string();
    let sink = TELEMETRY.audit_sink.read().clone();
    if let Some(sink) = sink {
        sink.write().push(line.clone());
    }
    log::info!(target: AUDIT_TARGET, "{line}");
}

#[must_use]
pub fn snapshot() -> MetricsSnapshot {
    let m = &TELEMETRY.metrics;
    MetricsSnapshot {
        operations_total: m.operations_total.load(Ordering::Relaxed),
        operations_failed_total: m.operations_failed_total.load(Ordering::Relaxed),
        operations_slow_total: m.operations_slow_total.load(Ordering::Relaxed),
        writes_total: m.writes_total.load(Ordering::Relaxed),
    }
}

/// OpenMetrics-style text of the counters.
#[must_use]
pub fn metrics_text() -> String {
    let s = snapshot();
    format!(
        "bookstore_operations_total {}\n\
         bookstore_operations_failed_total {}\n\
         bookstore_operations_slow_total {}\n\
         bookstore_writes_total {}\n",
        s.operations_total, s.operations_failed_total, s.operations_slow_total, s.writes_total,
    )
}
