//! Storage layer: on-disk data model, segment codec, manifest, WAL, and
//! the in-memory LSM-style buffering/compaction pipeline built on top of
//! them.

pub mod data;
pub mod lsm;
pub mod manifest;
pub mod segment;
pub mod snapshot;
pub mod wal;

pub use data::{hour_bucket, Point, SeriesId, HOUR_BUCKET_SECONDS};
pub use manifest::{Manifest, ManifestError, SegmentDescriptor};
pub use segment::SegmentError;
pub use snapshot::{restore, snapshot, SnapshotError};
pub use wal::{FsyncPolicy, WalError, WalRecord, WriteAheadLog};
