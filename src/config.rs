//! Engine configuration.
//!
//! A plain builder-style struct (`with_*` methods plus a `Default` impl),
//! matching `WriteAheadLog::with_max_segment_size` /
//! `with_max_segment_age` in the teacher's WAL rather than introducing a
//! new configuration idiom. No file-format parsing lives here: a config
//! file loader is an external collaborator that builds an `EngineConfig`
//! and hands it to `Engine::open`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::storage::data::SeriesId;
use crate::storage::wal::FsyncPolicy;

/// 64 MiB, matching the WAL rotation threshold and the manifest read cap
/// named in the spec.
pub const DEFAULT_MEMTABLE_MAX_BYTES: usize = 64 * 1024 * 1024;
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_INGEST_QUEUE_CAPACITY: usize = 4_096;

/// Resolves a per-series retention override in days. Returning `None`
/// falls back to `EngineConfig::retention_days`. The core never parses
/// `retention_ns.<namespace>` strings itself — an external collaborator
/// resolves the namespace-to-TTL mapping and hands the core this closure.
pub type RetentionResolver = Arc<dyn Fn(SeriesId) -> Option<u32> + Send + Sync>;

#[derive(Clone)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub fsync: FsyncPolicy,
    pub flush_interval_ms: u64,
    pub memtable_max_bytes: usize,
    pub retention_days: u32,
    pub retention_days_for: Option<RetentionResolver>,
    /// Soft upper bound for total memory usage. Observed (exposed via
    /// metrics) but never enforced by the core itself.
    pub mem_limit_bytes: u64,
    pub ingest_queue_capacity: usize,
}

impl EngineConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default_without_dir()
        }
    }

    fn default_without_dir() -> Self {
        Self {
            data_dir: PathBuf::new(),
            fsync: FsyncPolicy::Interval,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            memtable_max_bytes: DEFAULT_MEMTABLE_MAX_BYTES,
            retention_days: 0,
            retention_days_for: None,
            mem_limit_bytes: 0,
            ingest_queue_capacity: DEFAULT_INGEST_QUEUE_CAPACITY,
        }
    }

    pub fn with_fsync(mut self, policy: FsyncPolicy) -> Self {
        self.fsync = policy;
        self
    }

    pub fn with_flush_interval_ms(mut self, ms: u64) -> Self {
        self.flush_interval_ms = ms;
        self
    }

    pub fn with_memtable_max_bytes(mut self, bytes: usize) -> Self {
        self.memtable_max_bytes = bytes;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    pub fn with_retention_resolver(mut self, resolver: RetentionResolver) -> Self {
        self.retention_days_for = Some(resolver);
        self
    }

    pub fn with_mem_limit_bytes(mut self, bytes: u64) -> Self {
        self.mem_limit_bytes = bytes;
        self
    }

    pub fn with_ingest_queue_capacity(mut self, capacity: usize) -> Self {
        self.ingest_queue_capacity = capacity;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The retention window, in seconds, to apply to `series_id`:
    /// `retention_days_for(series_id)` if the resolver is set and returns
    /// `Some`, else the global `retention_days`. `0` disables retention
    /// for that series.
    pub fn retention_seconds_for(&self, series_id: SeriesId) -> i64 {
        let days = self
            .retention_days_for
            .as_ref()
            .and_then(|f| f(series_id))
            .unwrap_or(self.retention_days);
        days as i64 * 86_400
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::default_without_dir()
    }
}
