//! Bounded ingest queue sitting between API callers and the single
//! writer task.

pub mod queue;

pub use queue::{IngestItem, IngestQueue, IngestReceiver, IngestSender};
