//! The in-memory table that buffers recent writes before they are flushed
//! to segment files.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::storage::data::{Point, SeriesId};

/// Estimated per-point footprint used for `bytes_in_use`: 8 bytes ts + 8
/// bytes value, plus a fixed overhead for the enclosing `Vec`/`HashMap`
/// bookkeeping. Deliberately approximate — the flush trigger only needs
/// an order-of-magnitude signal, not an exact accounting.
const BYTES_PER_POINT_ESTIMATE: usize = 32;

/// The mutable, unsorted-by-insert-order (but append-per-series ordered)
/// buffer of points awaiting a flush.
pub struct Memtable {
    data: Arc<RwLock<HashMap<SeriesId, Vec<Point>>>>,
    max_bytes: usize,
    bytes_in_use: Arc<RwLock<usize>>,
}

impl Memtable {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            max_bytes,
            bytes_in_use: Arc::new(RwLock::new(0)),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Appends one point for `series_id`. Returns `true` if the caller
    /// should flush before (or instead of) accepting further writes.
    pub async fn put(&self, series_id: SeriesId, point: Point) -> bool {
        let mut data = self.data.write().await;
        let mut bytes = self.bytes_in_use.write().await;

        data.entry(series_id).or_insert_with(Vec::new).push(point);
        *bytes += BYTES_PER_POINT_ESTIMATE;

        debug!(series_id, ts = point.ts, bytes_in_use = *bytes, max_bytes = self.max_bytes, "memtable put");

        *bytes >= self.max_bytes
    }

    /// Current estimated memory footprint.
    pub async fn bytes_in_use(&self) -> usize {
        *self.bytes_in_use.read().await
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    /// Removes and returns every buffered series, resetting the byte
    /// counter. Called by the flush path, which owns the writer task's
    /// single mutation lock, so no other writer can race this drain.
    pub async fn drain(&self) -> HashMap<SeriesId, Vec<Point>> {
        let mut data = self.data.write().await;
        let mut bytes = self.bytes_in_use.write().await;
        let drained = std::mem::take(&mut *data);
        *bytes = 0;
        drained
    }

    /// Returns every buffered point for `series_id` within `[start, end]`,
    /// inclusive on both ends, in insertion order.
    pub async fn scan(&self, series_id: SeriesId, start: i64, end: i64) -> Vec<Point> {
        let data = self.data.read().await;
        data.get(&series_id)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.ts >= start && p.ts <= end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }
}
