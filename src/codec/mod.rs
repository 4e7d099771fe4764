//! Timestamp and value codecs used by segment writers.

pub mod timestamp;
pub mod value;

pub use timestamp::{CodecError, TimestampDecoder, TimestampEncoder};
pub use value::{ValueDecoder, ValueEncoder};
