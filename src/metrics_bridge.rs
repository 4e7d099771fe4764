//! Bridges `sydradb_core::MetricsSnapshot` onto a Prometheus text
//! exposition endpoint.
//!
//! The library crate only ever hands out plain-data counter snapshots; it
//! never depends on `metrics`/`metrics-exporter-prometheus` itself, so a
//! process embedding `sydradb_core` without this binary is free to bridge
//! those counters into a different backend (or none) entirely.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use sydradb_core::MetricsSnapshot;

pub fn init(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    Ok(())
}

/// `EngineMetrics` counters are already cumulative, so every one is
/// exposed as a gauge set to the snapshot's absolute value rather than a
/// `counter!` increment (which would double-count on every tick).
pub fn report(snapshot: &MetricsSnapshot) {
    gauge!("sydradb.points_ingested_total").set(snapshot.points_ingested as f64);
    gauge!("sydradb.queue_full_rejections_total").set(snapshot.queue_full_rejections as f64);
    gauge!("sydradb.flushes_total").set(snapshot.flushes as f64);
    gauge!("sydradb.segments_written_total").set(snapshot.segments_written as f64);
    gauge!("sydradb.compactions_total").set(snapshot.compactions as f64);
    gauge!("sydradb.segments_compacted_away_total").set(snapshot.segments_compacted_away as f64);
    gauge!("sydradb.retention_sweeps_total").set(snapshot.retention_sweeps as f64);
    gauge!("sydradb.segments_expired_total").set(snapshot.segments_expired as f64);
    gauge!("sydradb.wal_bytes_written_total").set(snapshot.wal_bytes_written as f64);
    gauge!("sydradb.memtable_bytes_in_use").set(snapshot.memtable_bytes_in_use as f64);
    gauge!("sydradb.ingest_queue_depth").set(snapshot.ingest_queue_depth as f64);
    counter!("sydradb.reporting_ticks_total").increment(1);
}
