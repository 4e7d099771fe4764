//! Core data model: `SeriesId`, `Point`, and hour-bucket partitioning.

/// Opaque per-series identifier. Derived externally from `(name,
/// tags_json_bytes)` via a fixed non-cryptographic hash; the core never
/// computes or interprets it.
pub type SeriesId = u64;

/// A single `(timestamp, value)` sample belonging to one series.
///
/// `ts` is in a caller-defined epoch unit (seconds or milliseconds); the
/// core does not interpret it beyond ordering and hour-bucket division.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub ts: i64,
    pub value: f64,
}

impl Point {
    pub fn new(ts: i64, value: f64) -> Self {
        Self { ts, value }
    }
}

/// Seconds per hour, the divisor used to compute `HourBucket` when `ts` is
/// in seconds. Callers using a different unit (e.g. milliseconds) must
/// supply a correspondingly scaled bucket width consistently across an
/// entire deployment; the core does not detect or correct a mismatched
/// unit.
pub const HOUR_BUCKET_SECONDS: i64 = 3600;

/// Computes the hour bucket for a timestamp, using Euclidean (floor)
/// division so that negative timestamps bucket sensibly instead of
/// truncating toward zero.
pub fn hour_bucket(ts: i64) -> i64 {
    ts.div_euclid(HOUR_BUCKET_SECONDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_bucket_divides_cleanly() {
        assert_eq!(hour_bucket(0), 0);
        assert_eq!(hour_bucket(3599), 0);
        assert_eq!(hour_bucket(3600), 1);
        assert_eq!(hour_bucket(7199), 1);
    }

    #[test]
    fn hour_bucket_floors_negative_timestamps() {
        assert_eq!(hour_bucket(-1), -1);
        assert_eq!(hour_bucket(-3600), -1);
        assert_eq!(hour_bucket(-3601), -2);
    }
}
