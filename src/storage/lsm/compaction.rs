//! Merges sibling segments that share a `(series_id, hour_bucket)` into
//! a single segment, deduplicating same-timestamp points last-write-wins.

use std::collections::BTreeMap;

use tracing::info;

use crate::storage::data::Point;
use crate::storage::manifest::Manifest;
use crate::storage::segment::{self, SegmentError};

#[derive(Debug, thiserror::Error)]
pub enum CompactionError {
    #[error("segment error: {0}")]
    Segment(#[from] SegmentError),
    #[error("manifest error: {0}")]
    Manifest(#[from] crate::storage::manifest::ManifestError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    pub groups_compacted: usize,
    pub segments_removed: usize,
    pub points_deduplicated: usize,
}

/// Finds every `(series_id, hour_bucket)` group backed by more than one
/// segment, merges each group's points (sorted by timestamp, later
/// descriptors in manifest order winning ties), writes one replacement
/// segment, deletes the superseded files, and swaps the manifest entries.
/// A group with exactly one segment is left untouched.
pub fn compact(manifest: &mut Manifest) -> Result<CompactionStats, CompactionError> {
    let data_dir = manifest.data_dir().to_path_buf();

    let mut groups: BTreeMap<(u64, i64), Vec<usize>> = BTreeMap::new();
    for (idx, desc) in manifest.entries().iter().enumerate() {
        groups
            .entry((desc.series_id, desc.hour_bucket))
            .or_default()
            .push(idx);
    }

    let mut stats = CompactionStats::default();
    let mut all_stale_indices: Vec<usize> = Vec::new();
    let mut pending_appends: Vec<(u64, i64, i64, i64, u32, std::path::PathBuf)> = Vec::new();

    for ((series_id, hour_bucket), indices) in groups {
        if indices.len() < 2 {
            continue;
        }

        let mut merged: BTreeMap<i64, f64> = BTreeMap::new();
        let mut total_raw = 0usize;
        for &idx in &indices {
            let desc = &manifest.entries()[idx];
            let points = segment::read_all(&data_dir, &desc.path)?;
            total_raw += points.len();
            for p in points {
                merged.insert(p.ts, p.value); // later descriptor in manifest order wins ties
            }
        }

        let merged_points: Vec<Point> = merged.into_iter().map(|(ts, value)| Point::new(ts, value)).collect();
        let start_ts = merged_points.first().unwrap().ts;
        let end_ts = merged_points.last().unwrap().ts;
        let count = merged_points.len() as u32;

        let new_path = segment::write_segment(&data_dir, series_id, hour_bucket, &merged_points)?;

        stats.groups_compacted += 1;
        stats.segments_removed += indices.len();
        stats.points_deduplicated += total_raw - merged_points.len();

        all_stale_indices.extend(indices);
        pending_appends.push((series_id, hour_bucket, start_ts, end_ts, count, new_path));
    }

    all_stale_indices.sort_unstable();
    let removed = manifest.remove_indices(&all_stale_indices);
    for desc in &removed {
        let full_path = data_dir.join(&desc.path);
        if let Err(e) = std::fs::remove_file(&full_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %full_path.display(), error = %e, "failed to delete superseded segment file");
            }
        }
    }

    for (series_id, hour_bucket, start_ts, end_ts, count, path) in pending_appends {
        manifest.append(series_id, hour_bucket, start_ts, end_ts, count, path)?;
    }

    info!(
        groups = stats.groups_compacted,
        removed = stats.segments_removed,
        deduplicated = stats.points_deduplicated,
        "compacted segments"
    );
    Ok(stats)
}
