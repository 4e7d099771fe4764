//! Crate-wide error type.
//!
//! Every component keeps its own `thiserror`-derived error enum local to the
//! module that can fail (`WalError`, `SegmentError`, `ManifestError`, ...).
//! `EngineError` is the funnel every one of those converts into at the
//! `Engine` API boundary.

use std::io;
use thiserror::Error;

use crate::ingest::queue::QueueError;
use crate::storage::lsm::compaction::CompactionError;
use crate::storage::lsm::flush::FlushError;
use crate::storage::manifest::ManifestError;
use crate::storage::segment::SegmentError;
use crate::storage::snapshot::SnapshotError;
use crate::storage::wal::WalError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("corruption detected: {0}")]
    Corruption(String),

    #[error("invalid on-disk format: {0}")]
    InvalidFormat(String),

    #[error("ingest queue is full")]
    QueueFull,

    #[error("engine has been shut down")]
    Shutdown,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("out of memory")]
    OutOfMemory,
}

impl From<WalError> for EngineError {
    fn from(e: WalError) -> Self {
        match e {
            WalError::Io(e) => EngineError::Io(e),
            WalError::Corruption(msg) => EngineError::Corruption(msg),
        }
    }
}

impl From<SegmentError> for EngineError {
    fn from(e: SegmentError) -> Self {
        match e {
            SegmentError::Io(e) => EngineError::Io(e),
            SegmentError::InvalidFormat(msg) => EngineError::InvalidFormat(msg),
            SegmentError::Corruption(msg) => EngineError::Corruption(msg),
            SegmentError::EmptyBatch => {
                EngineError::InvalidArgument("segment batch must be non-empty".to_string())
            }
            SegmentError::Unsorted => {
                EngineError::InvalidArgument("segment batch must be sorted by ts".to_string())
            }
        }
    }
}

impl From<ManifestError> for EngineError {
    fn from(e: ManifestError) -> Self {
        match e {
            ManifestError::Io(e) => EngineError::Io(e),
            ManifestError::InvalidLine(msg) => EngineError::Corruption(msg),
        }
    }
}

impl From<FlushError> for EngineError {
    fn from(e: FlushError) -> Self {
        match e {
            FlushError::Segment(e) => e.into(),
            FlushError::Manifest(e) => e.into(),
            FlushError::Wal(e) => e.into(),
        }
    }
}

impl From<CompactionError> for EngineError {
    fn from(e: CompactionError) -> Self {
        match e {
            CompactionError::Segment(e) => e.into(),
            CompactionError::Manifest(e) => e.into(),
        }
    }
}

impl From<SnapshotError> for EngineError {
    fn from(e: SnapshotError) -> Self {
        match e {
            SnapshotError::Io(e) => EngineError::Io(e),
        }
    }
}

impl From<QueueError> for EngineError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Full => EngineError::QueueFull,
            QueueError::Closed => EngineError::Shutdown,
        }
    }
}
