//! Time-to-live enforcement: prunes manifest entries (and their backing
//! segment files) whose `end_ts` has aged past the retention cutoff.
//!
//! Retention only ever prunes the in-memory manifest and deletes segment
//! files; like every other manifest mutation it never rewrites the
//! on-disk `MANIFEST` log.

use std::fs;
use std::path::Path;

use tracing::warn;

use crate::storage::manifest::Manifest;

/// Scans `manifest` for segments whose `end_ts` is older than `now -
/// retention_seconds` and removes them. `retention_seconds == 0` disables
/// retention entirely (the scan is skipped). Best-effort: a failure to
/// delete an individual segment file is logged and does not stop the
/// scan or fail the call, since the manifest has already dropped the
/// reference and a leftover file is merely wasted disk space.
pub fn enforce(manifest: &mut Manifest, now: i64, retention_seconds: i64) -> usize {
    enforce_per_series(manifest, now, |_series_id| retention_seconds)
}

/// Same as [`enforce`], but `retention_seconds_for` is consulted per
/// segment's `series_id` instead of applying one global window — this is
/// how `retention_ns.<namespace>` overrides (resolved externally into a
/// per-series TTL, see `EngineConfig::retention_seconds_for`) reach the
/// manifest scan without the retention pass itself knowing about
/// namespaces.
pub fn enforce_per_series(
    manifest: &mut Manifest,
    now: i64,
    retention_seconds_for: impl Fn(u64) -> i64,
) -> usize {
    let data_dir = manifest.data_dir().to_path_buf();
    let expired_indices: Vec<usize> = manifest
        .entries()
        .iter()
        .enumerate()
        .filter(|(_, d)| {
            let retention_seconds = retention_seconds_for(d.series_id);
            retention_seconds > 0 && d.end_ts < now - retention_seconds
        })
        .map(|(i, _)| i)
        .collect();

    let removed = manifest.remove_indices(&expired_indices);
    for desc in &removed {
        delete_segment_file(&data_dir, &desc.path);
    }
    removed.len()
}

fn delete_segment_file(data_dir: &Path, relative_path: &Path) {
    let full_path = data_dir.join(relative_path);
    if let Err(e) = fs::remove_file(&full_path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %full_path.display(), error = %e, "failed to delete expired segment file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn ttl_zero_disables_retention() {
        let dir = tempdir().unwrap();
        let mut m = Manifest::load_or_init(dir.path()).unwrap();
        m.append(1, 0, 0, 100, 1, PathBuf::from("segments/0/a.seg")).unwrap();
        let removed = enforce(&mut m, 10_000, 0);
        assert_eq!(removed, 0);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn expired_segments_are_pruned_and_files_deleted() {
        let dir = tempdir().unwrap();
        let mut m = Manifest::load_or_init(dir.path()).unwrap();

        let seg_path = dir.path().join("segments/0/old.seg");
        fs::create_dir_all(seg_path.parent().unwrap()).unwrap();
        fs::write(&seg_path, b"fake").unwrap();
        m.append(1, 0, 0, 100, 1, PathBuf::from("segments/0/old.seg")).unwrap();
        m.append(1, 1, 5000, 5100, 1, PathBuf::from("segments/1/new.seg")).unwrap();

        let removed = enforce(&mut m, 10_000, 1000);
        assert_eq!(removed, 1);
        assert_eq!(m.len(), 1);
        assert_eq!(m.entries()[0].start_ts, 5000);
        assert!(!seg_path.exists());
    }

    #[test]
    fn missing_segment_file_does_not_fail_the_scan() {
        let dir = tempdir().unwrap();
        let mut m = Manifest::load_or_init(dir.path()).unwrap();
        m.append(1, 0, 0, 100, 1, PathBuf::from("segments/0/missing.seg")).unwrap();
        let removed = enforce(&mut m, 10_000, 1000);
        assert_eq!(removed, 1);
    }
}
