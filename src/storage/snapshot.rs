//! Directory-level snapshot/restore of a data directory.
//!
//! Both operations are plain recursive file copies; neither reconciles
//! with a running writer. Callers are expected to quiesce ingest (e.g. via
//! `Engine::shutdown`) before calling either.

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

const COPIED_ENTRIES: &[&str] = &["MANIFEST", "wal", "segments", "tags.json"];

/// Copies `MANIFEST`, `wal/`, `segments/`, and `tags.json` (whichever of
/// those exist) from `data_dir` into a freshly created `dst`. Missing
/// source entries are skipped silently — a fresh engine that has not yet
/// written a WAL, for instance, has no `wal/` directory yet.
pub fn snapshot(data_dir: &Path, dst: &Path) -> Result<(), SnapshotError> {
    fs::create_dir_all(dst)?;
    for name in COPIED_ENTRIES {
        let src = data_dir.join(name);
        if !src.exists() {
            continue;
        }
        copy_entry(&src, &dst.join(name))?;
    }
    info!(src = %data_dir.display(), dst = %dst.display(), "snapshot complete");
    Ok(())
}

/// Inverse of [`snapshot`]: copies the same set of entries from `src` back
/// into `data_dir`, overwriting whatever is already there. Missing source
/// entries are skipped silently.
pub fn restore(data_dir: &Path, src: &Path) -> Result<(), SnapshotError> {
    fs::create_dir_all(data_dir)?;
    for name in COPIED_ENTRIES {
        let entry_src = src.join(name);
        if !entry_src.exists() {
            continue;
        }
        copy_entry(&entry_src, &data_dir.join(name))?;
    }
    info!(src = %src.display(), dst = %data_dir.display(), "restore complete");
    Ok(())
}

fn copy_entry(src: &Path, dst: &Path) -> Result<(), SnapshotError> {
    let meta = fs::metadata(src)?;
    if meta.is_dir() {
        copy_dir_recursive(src, dst)
    } else {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dst)?;
        Ok(())
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<(), SnapshotError> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    use crate::storage::data::Point;
    use crate::storage::manifest::Manifest;
    use crate::storage::segment;
    use crate::storage::wal::{FsyncPolicy, WriteAheadLog};

    #[test]
    fn snapshot_then_restore_round_trips_manifest_wal_and_segments() {
        let data_dir = tempdir().unwrap();
        let mut manifest = Manifest::load_or_init(data_dir.path()).unwrap();
        let points = vec![Point::new(0, 1.0), Point::new(10, 2.0)];
        let path = segment::write_segment(data_dir.path(), 1, 0, &points).unwrap();
        manifest.append(1, 0, 0, 10, 2, path).unwrap();

        let mut wal = WriteAheadLog::open(data_dir.path(), FsyncPolicy::Always).unwrap();
        wal.append(1, 0, 1.0).unwrap();

        fs::write(data_dir.path().join("tags.json"), b"{}").unwrap();

        let snap_dir = tempdir().unwrap();
        snapshot(data_dir.path(), snap_dir.path()).unwrap();

        assert!(snap_dir.path().join("MANIFEST").is_file());
        assert!(snap_dir.path().join("wal/current.wal").is_file());
        assert!(snap_dir.path().join("tags.json").is_file());
        let restored_manifest = Manifest::load_or_init(snap_dir.path()).unwrap();
        assert_eq!(restored_manifest.len(), 1);

        let restore_target = tempdir().unwrap();
        restore(restore_target.path(), snap_dir.path()).unwrap();
        assert!(restore_target.path().join("MANIFEST").is_file());
        let reloaded = Manifest::load_or_init(restore_target.path()).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.entries()[0].start_ts, 0);
    }

    #[test]
    fn missing_optional_entries_are_skipped_silently() {
        let data_dir = tempdir().unwrap();
        Manifest::load_or_init(data_dir.path()).unwrap();
        // no wal/ directory has been created yet, and no tags.json

        let dst = tempdir().unwrap();
        snapshot(data_dir.path(), dst.path()).unwrap();
        assert!(dst.path().join("MANIFEST").is_file());
        assert!(!dst.path().join("wal").exists());
        assert!(!dst.path().join("tags.json").exists());

        let _unused: Option<PathBuf> = None;
    }
}
