//! In-process engine metrics.
//!
//! The core only tracks plain atomics and hands out point-in-time
//! snapshots; it never depends on `metrics`/`metrics-exporter-prometheus`
//! directly. Bridging a `MetricsSnapshot` into Prometheus's text exposition
//! format is the binary's job (see `main.rs`), keeping the library usable
//! in a process that wants a different metrics backend or none at all.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct EngineMetrics {
    points_ingested: AtomicU64,
    queue_full_rejections: AtomicU64,
    flushes: AtomicU64,
    segments_written: AtomicU64,
    compactions: AtomicU64,
    segments_compacted_away: AtomicU64,
    retention_sweeps: AtomicU64,
    segments_expired: AtomicU64,
    wal_bytes_written: AtomicU64,
    memtable_bytes_in_use: AtomicU64,
    ingest_queue_depth: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_ingest(&self) {
        self.points_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queue_full(&self) {
        self.queue_full_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self, segments_written: u64) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.segments_written.fetch_add(segments_written, Ordering::Relaxed);
    }

    pub fn record_compaction(&self, segments_compacted_away: u64) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
        self.segments_compacted_away
            .fetch_add(segments_compacted_away, Ordering::Relaxed);
    }

    pub fn record_retention_sweep(&self, segments_expired: u64) {
        self.retention_sweeps.fetch_add(1, Ordering::Relaxed);
        self.segments_expired.fetch_add(segments_expired, Ordering::Relaxed);
    }

    pub fn record_wal_bytes(&self, bytes: u64) {
        self.wal_bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn set_memtable_bytes_in_use(&self, bytes: u64) {
        self.memtable_bytes_in_use.store(bytes, Ordering::Relaxed);
    }

    pub fn set_ingest_queue_depth(&self, depth: u64) {
        self.ingest_queue_depth.store(depth, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            points_ingested: self.points_ingested.load(Ordering::Relaxed),
            queue_full_rejections: self.queue_full_rejections.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            segments_written: self.segments_written.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
            segments_compacted_away: self.segments_compacted_away.load(Ordering::Relaxed),
            retention_sweeps: self.retention_sweeps.load(Ordering::Relaxed),
            segments_expired: self.segments_expired.load(Ordering::Relaxed),
            wal_bytes_written: self.wal_bytes_written.load(Ordering::Relaxed),
            memtable_bytes_in_use: self.memtable_bytes_in_use.load(Ordering::Relaxed),
            ingest_queue_depth: self.ingest_queue_depth.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time, plain-data copy of `EngineMetrics`. Cheap to clone and
/// safe to hand across an await point or a Prometheus bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub points_ingested: u64,
    pub queue_full_rejections: u64,
    pub flushes: u64,
    pub segments_written: u64,
    pub compactions: u64,
    pub segments_compacted_away: u64,
    pub retention_sweeps: u64,
    pub segments_expired: u64,
    pub wal_bytes_written: u64,
    pub memtable_bytes_in_use: u64,
    pub ingest_queue_depth: u64,
}
