//! Bounded MPSC ingest queue: many producer threads push `IngestItem`s, one
//! writer task pops them in FIFO order.
//!
//! Built directly on `tokio::sync::mpsc::{Sender, Receiver}` rather than a
//! hand-rolled ring buffer, matching the rest of the crate's reach for
//! `tokio::sync` primitives over bespoke locking. `push` uses `try_send` so
//! producers on non-async threads never need a runtime handle to call it;
//! back-pressure is surfaced as `QueueFull` rather than blocking, which also
//! keeps crash/back-pressure tests deterministic (no sleep-based races).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::{mpsc, Notify};

use crate::storage::data::SeriesId;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("ingest queue is full")]
    Full,
    #[error("ingest queue is closed")]
    Closed,
}

/// One point plus an optional tag view, as handed to `Engine::ingest`.
///
/// `tags_view` is never persisted or interpreted by the core; it exists so
/// an external tag-index hook (`Engine::note_tags`) can observe tags
/// alongside the point without the core parsing them. `BTreeMap` is used
/// (instead of `HashMap`) purely so hook implementations get deterministic
/// iteration order for free.
#[derive(Debug, Clone)]
pub struct IngestItem {
    pub series_id: SeriesId,
    pub ts: i64,
    pub value: f64,
    pub tags_view: Option<Arc<BTreeMap<String, String>>>,
}

impl IngestItem {
    pub fn new(series_id: SeriesId, ts: i64, value: f64) -> Self {
        Self {
            series_id,
            ts,
            value,
            tags_view: None,
        }
    }
}

/// Point-in-time counters describing queue activity. Multi-counter reads
/// are not guaranteed to form a consistent snapshot (the spec's metrics
/// policy applies here same as everywhere else).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub pushes_total: u64,
    pub pops_total: u64,
    pub rejected_total: u64,
    pub max_depth: u64,
    pub push_wait_nanos_total: u64,
    pub pop_wait_nanos_total: u64,
}

#[derive(Debug, Default)]
struct QueueCounters {
    depth: AtomicI64,
    pushes_total: AtomicU64,
    pops_total: AtomicU64,
    rejected_total: AtomicU64,
    max_depth: AtomicU64,
    push_wait_nanos_total: AtomicU64,
    pop_wait_nanos_total: AtomicU64,
}

impl QueueCounters {
    fn record_push(&self, wait: std::time::Duration) {
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        self.pushes_total.fetch_add(1, Ordering::Relaxed);
        self.push_wait_nanos_total
            .fetch_add(wait.as_nanos() as u64, Ordering::Relaxed);
        self.max_depth.fetch_max(depth.max(0) as u64, Ordering::Relaxed);
    }

    fn record_pop(&self, wait: std::time::Duration) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
        self.pops_total.fetch_add(1, Ordering::Relaxed);
        self.pop_wait_nanos_total
            .fetch_add(wait.as_nanos() as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> QueueStats {
        QueueStats {
            pushes_total: self.pushes_total.load(Ordering::Relaxed),
            pops_total: self.pops_total.load(Ordering::Relaxed),
            rejected_total: self.rejected_total.load(Ordering::Relaxed),
            max_depth: self.max_depth.load(Ordering::Relaxed),
            push_wait_nanos_total: self.push_wait_nanos_total.load(Ordering::Relaxed),
            pop_wait_nanos_total: self.pop_wait_nanos_total.load(Ordering::Relaxed),
        }
    }
}

/// Producer-side handle. Cheaply cloneable; every producer thread holds its
/// own clone.
#[derive(Clone)]
pub struct IngestSender {
    inner: mpsc::Sender<IngestItem>,
    counters: Arc<QueueCounters>,
}

impl IngestSender {
    /// Non-blocking push. Returns `QueueFull` immediately rather than
    /// waiting for room, so callers decide whether to retry, drop, or
    /// propagate back-pressure to their own caller. Never silently drops.
    pub fn push(&self, item: IngestItem) -> Result<(), QueueError> {
        let start = Instant::now();
        match self.inner.try_send(item) {
            Ok(()) => {
                self.counters.record_push(start.elapsed());
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.rejected_total.fetch_add(1, Ordering::Relaxed);
                Err(QueueError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }

    pub fn len(&self) -> i64 {
        self.counters.depth.load(Ordering::Relaxed).max(0)
    }

    pub fn stats(&self) -> QueueStats {
        self.counters.snapshot()
    }
}

/// Writer-side handle. There is exactly one of these, held by the writer
/// task.
pub struct IngestReceiver {
    inner: mpsc::Receiver<IngestItem>,
    counters: Arc<QueueCounters>,
    shutdown: Arc<Notify>,
}

impl IngestReceiver {
    /// Waits for the next item, or for the shutdown signal — whichever
    /// comes first. Returns `None` once the queue is drained and closed
    /// (all senders dropped) or shutdown was signaled and nothing remains
    /// to pop.
    pub async fn recv(&mut self) -> Option<IngestItem> {
        // Fast path: drain whatever is already buffered before waiting on
        // anything, so a shutdown signaled mid-drain never skips queued
        // items that arrived just before it.
        if let Ok(item) = self.inner.try_recv() {
            self.counters.record_pop(std::time::Duration::ZERO);
            return Some(item);
        }

        let start = Instant::now();
        tokio::select! {
            biased;
            item = self.inner.recv() => {
                if item.is_some() {
                    self.counters.record_pop(start.elapsed());
                }
                item
            }
            _ = self.shutdown.notified() => {
                // Shutdown signaled while idle. One more drain attempt
                // covers the race against a push that landed just before
                // the signal; anything after that is caller's problem to
                // re-push post-shutdown (it won't get the chance — the
                // caller is expected to have stopped pushing already).
                match self.inner.try_recv() {
                    Ok(item) => {
                        self.counters.record_pop(start.elapsed());
                        Some(item)
                    }
                    Err(_) => None,
                }
            }
        }
    }

    /// Current live queue length, as opposed to `stats().max_depth` (the
    /// high-water mark since the queue was created).
    pub fn len(&self) -> i64 {
        self.counters.depth.load(Ordering::Relaxed).max(0)
    }

    pub fn stats(&self) -> QueueStats {
        self.counters.snapshot()
    }
}

/// Bounded ingest queue: call `split()` once to obtain a clonable
/// [`IngestSender`] and the single [`IngestReceiver`].
pub struct IngestQueue;

impl IngestQueue {
    pub fn bounded(capacity: usize, shutdown: Arc<Notify>) -> (IngestSender, IngestReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(QueueCounters::default());
        (
            IngestSender {
                inner: tx,
                counters: counters.clone(),
            },
            IngestReceiver {
                inner: rx,
                counters,
                shutdown,
            },
        )
    }
}
