//! Flushes a memtable to segment files.
//!
//! Unlike a flush manager that spawns a detached background task per
//! flush and swaps the memtable in afterward, the writer task here owns
//! the memtable exclusively and calls `flush` inline: there is only ever
//! one flush in flight because there is only one writer.

use std::collections::BTreeMap;

use tracing::info;

use crate::storage::data::{hour_bucket, Point, SeriesId};
use crate::storage::lsm::memtable::Memtable;
use crate::storage::manifest::Manifest;
use crate::storage::segment::{self, SegmentError};
use crate::storage::wal::{FsyncPolicy, WalError, WriteAheadLog};

#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    #[error("segment error: {0}")]
    Segment(#[from] SegmentError),
    #[error("manifest error: {0}")]
    Manifest(#[from] crate::storage::manifest::ManifestError),
    #[error("wal error: {0}")]
    Wal(#[from] WalError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushStats {
    pub segments_written: usize,
    pub points_written: usize,
}

/// Drains `memtable`, splits each series' points by hour bucket, and
/// writes one segment file plus one manifest entry per `(series_id,
/// hour_bucket)` group. Under `FsyncPolicy::Interval`, fsyncs the WAL and
/// manifest once after all segments are written; `Always` has already
/// synced on every WAL append and segment writes always `sync_all`
/// themselves.
pub async fn flush(
    memtable: &Memtable,
    manifest: &mut Manifest,
    wal: &mut WriteAheadLog,
) -> Result<FlushStats, FlushError> {
    let drained = memtable.drain().await;
    if drained.is_empty() {
        return Ok(FlushStats::default());
    }

    let data_dir = manifest.data_dir().to_path_buf();
    let mut stats = FlushStats::default();

    for (series_id, mut points) in drained {
        points.sort_by_key(|p| p.ts);
        for (bucket, group) in split_by_hour_bucket(series_id, points) {
            let start_ts = group.first().unwrap().ts;
            let end_ts = group.last().unwrap().ts;
            let count = group.len() as u32;

            let path = segment::write_segment(&data_dir, series_id, bucket, &group)?;
            manifest.append(series_id, bucket, start_ts, end_ts, count, path)?;

            stats.segments_written += 1;
            stats.points_written += group.len();
        }
    }

    if wal.policy() == FsyncPolicy::Interval {
        wal.sync()?;
        manifest.sync()?;
    }

    info!(
        segments = stats.segments_written,
        points = stats.points_written,
        "flushed memtable"
    );
    Ok(stats)
}

fn split_by_hour_bucket(_series_id: SeriesId, points: Vec<Point>) -> BTreeMap<i64, Vec<Point>> {
    let mut groups: BTreeMap<i64, Vec<Point>> = BTreeMap::new();
    for point in points {
        groups.entry(hour_bucket(point.ts)).or_default().push(point);
    }
    groups
}
