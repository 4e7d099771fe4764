//! SydraDB storage and ingest core: an embeddable time-series engine.
//!
//! Ingests `(series_id, timestamp, value)` points, persists them
//! crash-safely via a write-ahead log, buffers them in memory until a
//! background writer flushes them into immutable columnar segment files,
//! and answers time-range queries over the combination of memtable and
//! segments. HTTP/CLI front-ends, the sydraQL parser/planner/executor,
//! and the PostgreSQL wire bridge are external collaborators that consume
//! only [`Engine::ingest`] and [`Engine::query_range`].

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod storage;

pub use config::EngineConfig;
pub use engine::{restore, snapshot, Engine};
pub use error::EngineError;
pub use ingest::{IngestItem, IngestQueue, IngestReceiver, IngestSender};
pub use metrics::MetricsSnapshot;
pub use storage::{hour_bucket, FsyncPolicy, Point, SeriesId};
