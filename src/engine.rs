//! The embeddable engine: wires WAL, memtable, manifest, the ingest
//! queue, and the single writer/flusher task into the API surface
//! consumed by front-ends (HTTP/CLI/sydraQL).
//!
//! Readers (`query_range`) never hold the manifest lock across segment
//! file I/O: the matching descriptor subset is cloned under a brief read
//! lock, the lock is released, then files are opened. The memtable has
//! its own internal locking (see `storage::lsm::memtable`), so it needs
//! no additional wrapper here.
//!
//! `query_range` scans the memtable *before* snapshotting the manifest.
//! Flush drains the memtable and only afterwards appends the segment
//! descriptor that covers the drained points, so a flush racing a query
//! can only move a point from "seen via memtable" to "seen via manifest"
//! between the two reads, never the other way around — a point already
//! durable never falls through the gap. The opposite order can miss a
//! point: take the manifest snapshot, let a flush drain and append
//! around it, then scan the now-empty memtable. The race this ordering
//! accepts instead is a harmless double-count (the same point returned
//! once from the segment and once from the memtable), which §4.10/§8
//! already leave to the caller to dedup.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::{Mutex as AsyncMutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::ingest::queue::{IngestItem, IngestQueue, IngestReceiver, IngestSender};
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::storage::data::{Point, SeriesId};
use crate::storage::lsm::{compact, enforce_per_series, flush};
use crate::storage::lsm::memtable::Memtable;
use crate::storage::manifest::Manifest;
use crate::storage::wal::WriteAheadLog;
use crate::storage::{segment, snapshot as snapshot_mod};

fn now_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// The embedded time-series engine. Cheap to clone (everything shared is
/// behind an `Arc`); typical usage wraps one `Engine` in an `Arc` itself
/// and calls `ingest`/`query_range` from many tasks concurrently.
pub struct Engine {
    config: EngineConfig,
    memtable: Arc<Memtable>,
    manifest: Arc<RwLock<Manifest>>,
    sender: IngestSender,
    shutdown: Arc<Notify>,
    accepting: Arc<AtomicBool>,
    metrics: Arc<EngineMetrics>,
    writer_handle: AsyncMutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Loads the manifest, opens the WAL, replays it (skipping any record
    /// already covered by a persisted segment per the per-series
    /// high-water mark), and spawns the writer task.
    pub async fn open(config: EngineConfig) -> Result<Self, EngineError> {
        std::fs::create_dir_all(&config.data_dir)?;

        let manifest = Manifest::load_or_init(&config.data_dir)?;
        let wal = WriteAheadLog::open(&config.data_dir, config.fsync)?;
        let memtable = Memtable::new(config.memtable_max_bytes);

        let mut recovered = Vec::new();
        wal.replay(|record| {
            let high_water = manifest.max_end_ts(record.series_id).unwrap_or(i64::MIN);
            if record.ts > high_water {
                recovered.push(record);
            }
        })?;
        let recovered_count = recovered.len();
        for record in recovered {
            memtable.put(record.series_id, Point::new(record.ts, record.value)).await;
        }
        info!(recovered_points = recovered_count, "engine recovery replay complete");

        let memtable = Arc::new(memtable);
        let manifest = Arc::new(RwLock::new(manifest));
        let shutdown = Arc::new(Notify::new());
        let accepting = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(EngineMetrics::new());

        let (sender, receiver) = IngestQueue::bounded(config.ingest_queue_capacity, shutdown.clone());

        let writer_handle = tokio::spawn(run_writer(
            receiver,
            memtable.clone(),
            manifest.clone(),
            wal,
            config.clone(),
            metrics.clone(),
            accepting.clone(),
        ));

        Ok(Self {
            config,
            memtable,
            manifest,
            sender,
            shutdown,
            accepting,
            metrics,
            writer_handle: AsyncMutex::new(Some(writer_handle)),
        })
    }

    /// Enqueues one point for the writer task. Non-blocking: returns
    /// `QueueFull` if the bounded queue is at capacity, or `Shutdown` if
    /// `shutdown()` has already been called.
    pub fn ingest(&self, item: IngestItem) -> Result<(), EngineError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(EngineError::Shutdown);
        }
        self.sender.push(item).map_err(|e| {
            if matches!(e, crate::ingest::queue::QueueError::Full) {
                self.metrics.record_queue_full();
            }
            e
        })?;
        Ok(())
    }

    /// Appends matching points from segments and the memtable to `out`, in
    /// manifest-iteration order followed by memtable order. No cross-
    /// segment sort or dedup is performed here; callers that need global
    /// ordering must sort `out` themselves.
    pub async fn query_range(
        &self,
        series_id: SeriesId,
        start: i64,
        end: i64,
        out: &mut Vec<Point>,
    ) -> Result<(), EngineError> {
        // Memtable first, manifest second — see the module doc comment.
        let mem_points = self.memtable.scan(series_id, start, end).await;

        let candidates = {
            let manifest = self.manifest.read().await;
            manifest
                .iter()
                .filter(|d| d.series_id == series_id)
                .cloned()
                .collect::<Vec<_>>()
        };
        segment::query_range(&self.config.data_dir, &candidates, series_id, start, end, out)?;
        out.extend(mem_points);
        Ok(())
    }

    /// External tag-index hook. The core never persists or interprets
    /// `tags`; this is a no-op by default so that consuming layers can
    /// override/wrap `Engine` to observe tags without the core needing to
    /// know anything about a tag index.
    pub fn note_tags(&self, series_id: SeriesId, tags: &BTreeMap<String, String>) {
        let _ = (series_id, tags);
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Stops accepting new ingests, signals the writer task to drain and
    /// exit, and waits for it to finish (which includes a final WAL
    /// fsync). Idempotent: calling it more than once is a no-op after the
    /// first call's writer handle has been taken.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.accepting.store(false, Ordering::Release);
        self.shutdown.notify_one();

        let mut guard = self.writer_handle.lock().await;
        if let Some(handle) = guard.take() {
            handle.await.map_err(|e| {
                EngineError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("writer task panicked: {e}"),
                ))
            })?;
        }
        Ok(())
    }
}

/// The single writer task: pop -> WAL append -> memtable insert -> maybe
/// flush -> maybe retain/compact -> periodic WAL rotation check. Runs
/// until the ingest queue is drained and closed (or a fatal WAL error
/// stops it from accepting more work).
async fn run_writer(
    mut receiver: IngestReceiver,
    memtable: Arc<Memtable>,
    manifest: Arc<RwLock<Manifest>>,
    mut wal: WriteAheadLog,
    config: EngineConfig,
    metrics: Arc<EngineMetrics>,
    accepting: Arc<AtomicBool>,
) {
    let mut last_flush = Instant::now();

    while let Some(item) = receiver.recv().await {
        if let Err(e) = wal.append(item.series_id, item.ts, item.value) {
            // Fatal: without a durable WAL record, advancing the memtable
            // would let a later crash lose data the caller believes was
            // ingested. Stop accepting new work; the writer exits and the
            // process is expected to be restarted once the underlying
            // disk issue is resolved.
            error!(error = %e, "WAL append failed, engine will stop accepting ingest");
            accepting.store(false, Ordering::Release);
            break;
        }
        metrics.record_wal_bytes(crate::storage::wal::RECORD_ON_DISK_LEN);

        memtable.put(item.series_id, Point::new(item.ts, item.value)).await;
        metrics.record_ingest();
        metrics.set_memtable_bytes_in_use(memtable.bytes_in_use().await as u64);
        metrics.set_ingest_queue_depth(receiver.len().max(0) as u64);

        let bytes_in_use = memtable.bytes_in_use().await;
        let size_triggered = bytes_in_use >= config.memtable_max_bytes;
        let time_triggered = last_flush.elapsed().as_millis() as u64 >= config.flush_interval_ms
            && !memtable.is_empty().await;

        if size_triggered || time_triggered {
            let mut manifest_guard = manifest.write().await;
            match flush(&memtable, &mut manifest_guard, &mut wal).await {
                Ok(stats) => {
                    metrics.record_flush(stats.segments_written as u64);
                    last_flush = Instant::now();

                    let retention_config = config.clone();
                    let now = now_seconds();
                    let expired = enforce_per_series(&mut manifest_guard, now, |sid| {
                        retention_config.retention_seconds_for(sid)
                    });
                    if expired > 0 {
                        metrics.record_retention_sweep(expired as u64);
                    }

                    match compact(&mut manifest_guard) {
                        Ok(stats) if stats.groups_compacted > 0 => {
                            metrics.record_compaction(stats.segments_removed as u64);
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "compaction pass failed"),
                    }
                }
                Err(e) => {
                    // Flush failing leaves the WAL as the durable source of
                    // truth; the points remain covered by still-present
                    // WAL records and will be retried on the next trigger.
                    warn!(error = %e, "flush failed, points remain WAL-covered");
                }
            }
        }

        if let Err(e) = wal.rotate_if_needed() {
            warn!(error = %e, "WAL rotation check failed");
        }
    }

    if let Err(e) = wal.sync() {
        warn!(error = %e, "final WAL fsync on shutdown failed");
    }
    info!("writer task exiting");
}

/// Directory-level snapshot of `data_dir`. See `storage::snapshot`; the
/// caller must quiesce ingest (e.g. via `Engine::shutdown`) first.
pub fn snapshot(data_dir: &Path, dst: &Path) -> Result<(), EngineError> {
    snapshot_mod::snapshot(data_dir, dst)?;
    Ok(())
}

/// Inverse of [`snapshot`].
pub fn restore(data_dir: &Path, src: &Path) -> Result<(), EngineError> {
    snapshot_mod::restore(data_dir, src)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::storage::wal::FsyncPolicy;
    use tempfile::tempdir;
    use tokio::test;
    use tokio::time::{sleep, Duration};

    async fn open_fast_flush(dir: &Path) -> Engine {
        let config = EngineConfig::new(dir)
            .with_fsync(FsyncPolicy::Always)
            .with_flush_interval_ms(30)
            .with_memtable_max_bytes(1 << 20);
        Engine::open(config).await.unwrap()
    }

    #[test]
    async fn ingest_flush_query_returns_ingested_points() {
        let dir = tempdir().unwrap();
        let engine = open_fast_flush(dir.path()).await;

        engine.ingest(IngestItem::new(7, 100, 1.0)).unwrap();
        engine.ingest(IngestItem::new(7, 101, 2.0)).unwrap();
        engine.ingest(IngestItem::new(7, 102, 3.0)).unwrap();

        sleep(Duration::from_millis(200)).await;

        let mut out = Vec::new();
        engine.query_range(7, 90, 110, &mut out).await.unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].value, 1.0);
        engine.shutdown().await.unwrap();
    }

    #[test]
    async fn query_range_sees_unflushed_memtable_points_immediately() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::new(dir.path())
            .with_flush_interval_ms(60_000)
            .with_memtable_max_bytes(1 << 30);
        let engine = Engine::open(config).await.unwrap();

        engine.ingest(IngestItem::new(1, 10, 5.0)).unwrap();
        sleep(Duration::from_millis(20)).await;

        let mut out = Vec::new();
        engine.query_range(1, 0, 20, &mut out).await.unwrap();
        assert_eq!(out, vec![Point::new(10, 5.0)]);
        engine.shutdown().await.unwrap();
    }

    #[test]
    async fn ingest_after_shutdown_is_rejected() {
        let dir = tempdir().unwrap();
        let engine = open_fast_flush(dir.path()).await;
        engine.shutdown().await.unwrap();

        let err = engine.ingest(IngestItem::new(1, 1, 1.0)).unwrap_err();
        assert!(matches!(err, EngineError::Shutdown));
    }

    #[test]
    async fn recovery_replays_wal_and_skips_flushed_ranges() {
        let dir = tempdir().unwrap();

        {
            let engine = open_fast_flush(dir.path()).await;
            for ts in 0..10 {
                engine.ingest(IngestItem::new(1, ts, ts as f64)).unwrap();
            }
            sleep(Duration::from_millis(200)).await; // let the first batch flush
            for ts in 10..20 {
                engine.ingest(IngestItem::new(1, ts, ts as f64)).unwrap();
            }
            // no shutdown: simulates a crash before the second flush
        }

        let engine = open_fast_flush(dir.path()).await;
        let mut out = Vec::new();
        engine.query_range(1, 0, 100, &mut out).await.unwrap();
        assert_eq!(out.len(), 20);
        engine.shutdown().await.unwrap();
    }
}
