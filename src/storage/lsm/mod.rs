//! Memtable buffering, flush-to-segment, retention, and compaction.

pub mod compaction;
pub mod flush;
pub mod memtable;
pub mod retention;

pub use compaction::{compact, CompactionError, CompactionStats};
pub use flush::{flush, FlushError, FlushStats};
pub use memtable::Memtable;
pub use retention::enforce_per_series;
