//! Durable, append-only index of segment files.
//!
//! On disk: one JSON object per line in `MANIFEST`. In memory: an ordered
//! `Vec<SegmentDescriptor>` that retention/compaction may prune — the
//! on-disk file is never rewritten to match (see `SPEC_FULL.md` §9, Open
//! Questions); a cold restart re-loads everything `append` ever wrote.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Bound on how much of `MANIFEST` `load_or_init` will read into memory in
/// one pass; guards against an unbounded read on a runaway file.
const MAX_MANIFEST_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid manifest line: {0}")]
    InvalidLine(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    pub series_id: u64,
    pub hour_bucket: i64,
    pub start_ts: i64,
    pub end_ts: i64,
    pub count: u32,
    pub path: PathBuf,
}

/// The in-memory, mutable view of every segment descriptor known to the
/// engine, backed by an append-only on-disk log.
pub struct Manifest {
    data_dir: PathBuf,
    file: File,
    entries: Vec<SegmentDescriptor>,
}

/// Parses up to `cap` bytes of `reader` as newline-separated
/// `SegmentDescriptor` JSON lines. Bounding the byte-limited `Take`
/// wrapper (rather than the number of lines read) is what actually caps
/// memory use on a runaway file; a line that straddles the cutoff is read
/// as a truncated fragment and fails to parse, surfacing as
/// `InvalidLine` rather than being silently dropped.
fn read_entries_capped<R: Read>(
    reader: &mut R,
    cap: u64,
) -> Result<Vec<SegmentDescriptor>, ManifestError> {
    let bounded = BufReader::new(reader.take(cap));
    let mut entries = Vec::new();
    for line in bounded.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let desc: SegmentDescriptor =
            serde_json::from_str(&line).map_err(|e| ManifestError::InvalidLine(e.to_string()))?;
        entries.push(desc);
    }
    Ok(entries)
}

impl Manifest {
    /// Ensures `segments/` exists, ensures `MANIFEST` exists (created empty
    /// if absent), and loads every descriptor line into memory.
    pub fn load_or_init(data_dir: &Path) -> Result<Self, ManifestError> {
        fs::create_dir_all(data_dir.join("segments"))?;

        let manifest_path = data_dir.join("MANIFEST");
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&manifest_path)?;

        let len = file.metadata()?.len();
        if len > MAX_MANIFEST_BYTES {
            warn!(
                path = %manifest_path.display(),
                len,
                cap = MAX_MANIFEST_BYTES,
                "MANIFEST exceeds read cap, truncating read"
            );
        }
        let entries = read_entries_capped(&mut file, MAX_MANIFEST_BYTES)?;

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            file,
            entries,
        })
    }

    /// Appends one descriptor to the on-disk log and the in-memory list.
    pub fn append(
        &mut self,
        series_id: u64,
        hour_bucket: i64,
        start_ts: i64,
        end_ts: i64,
        count: u32,
        path: PathBuf,
    ) -> Result<(), ManifestError> {
        let desc = SegmentDescriptor {
            series_id,
            hour_bucket,
            start_ts,
            end_ts,
            count,
            path,
        };
        let line = serde_json::to_string(&desc).map_err(|e| ManifestError::InvalidLine(e.to_string()))?;
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.file.flush()?;
        self.entries.push(desc);
        Ok(())
    }

    /// Fsyncs the on-disk manifest file. Called explicitly at flush
    /// boundaries under the `Interval` fsync policy.
    pub fn sync(&self) -> Result<(), ManifestError> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Highest `end_ts` across descriptors for `series_id`, or `None` if
    /// the series has no known segments.
    pub fn max_end_ts(&self, series_id: u64) -> Option<i64> {
        self.entries
            .iter()
            .filter(|d| d.series_id == series_id)
            .map(|d| d.end_ts)
            .max()
    }

    /// Read-only view of every in-memory descriptor.
    pub fn iter(&self) -> impl Iterator<Item = &SegmentDescriptor> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[SegmentDescriptor] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Removes in-memory entries whose index is in `indices` (sorted
    /// ascending, as produced by retention/compaction scans). Does not
    /// touch the on-disk file.
    pub fn remove_indices(&mut self, indices: &[usize]) -> Vec<SegmentDescriptor> {
        let mut removed = Vec::with_capacity(indices.len());
        for (offset, &idx) in indices.iter().enumerate() {
            removed.push(self.entries.remove(idx - offset));
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_manifest_loads_successfully() {
        let dir = tempdir().unwrap();
        let m = Manifest::load_or_init(dir.path()).unwrap();
        assert_eq!(m.len(), 0);
        assert!(dir.path().join("segments").is_dir());
        assert!(dir.path().join("MANIFEST").is_file());
    }

    fn sample_line() -> String {
        serde_json::to_string(&SegmentDescriptor {
            series_id: 1,
            hour_bucket: 0,
            start_ts: 0,
            end_ts: 1,
            count: 1,
            path: PathBuf::from("a.seg"),
        })
        .unwrap()
            + "\n"
    }

    #[test]
    fn read_entries_capped_bounds_by_bytes_not_by_line_count() {
        let line = sample_line();
        let line_len = line.len() as u64;
        let data: String = std::iter::repeat(line).take(5).collect();

        // a cap of exactly two full lines must yield exactly two entries,
        // regardless of how many more lines follow in the reader.
        let mut cursor = std::io::Cursor::new(data.into_bytes());
        let entries = read_entries_capped(&mut cursor, line_len * 2).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn read_entries_capped_mid_line_cutoff_is_invalid_line() {
        let line = sample_line();
        let line_len = line.len() as u64;
        let data = format!("{line}{line}");

        let mut cursor = std::io::Cursor::new(data.into_bytes());
        let result = read_entries_capped(&mut cursor, line_len + line_len / 2);
        assert!(matches!(result, Err(ManifestError::InvalidLine(_))));
    }

    #[test]
    fn append_then_reload_round_trips() {
        let dir = tempdir().unwrap();
        {
            let mut m = Manifest::load_or_init(dir.path()).unwrap();
            m.append(1, 0, 100, 200, 5, PathBuf::from("segments/0/a.seg"))
                .unwrap();
            m.append(1, 1, 3700, 3800, 2, PathBuf::from("segments/1/b.seg"))
                .unwrap();
        }
        let m2 = Manifest::load_or_init(dir.path()).unwrap();
        assert_eq!(m2.len(), 2);
        assert_eq!(m2.max_end_ts(1), Some(3800));
        assert_eq!(m2.max_end_ts(99), None);
    }

    #[test]
    fn in_memory_prune_is_not_persisted() {
        let dir = tempdir().unwrap();
        {
            let mut m = Manifest::load_or_init(dir.path()).unwrap();
            m.append(1, 0, 100, 200, 5, PathBuf::from("segments/0/a.seg"))
                .unwrap();
        }
        {
            let mut m = Manifest::load_or_init(dir.path()).unwrap();
            assert_eq!(m.len(), 1);
            m.remove_indices(&[0]);
            assert_eq!(m.len(), 0);
        }
        // a cold reload sees the pruned entry again: the on-disk file is
        // append-only and was never rewritten.
        let m3 = Manifest::load_or_init(dir.path()).unwrap();
        assert_eq!(m3.len(), 1);
    }

    #[test]
    fn remove_indices_handles_multiple_ascending_indices() {
        let dir = tempdir().unwrap();
        let mut m = Manifest::load_or_init(dir.path()).unwrap();
        for i in 0..5u64 {
            m.append(i, 0, 0, 1, 1, PathBuf::from(format!("segments/0/{i}.seg")))
                .unwrap();
        }
        let removed = m.remove_indices(&[1, 3]);
        assert_eq!(removed.iter().map(|d| d.series_id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(
            m.entries().iter().map(|d| d.series_id).collect::<Vec<_>>(),
            vec![0, 2, 4]
        );
    }
}
