//! Immutable segment files: one sorted point batch per `(series_id,
//! hour_bucket)`.
//!
//! Two on-disk layouts are supported. `SYSEG2` (current) stores timestamps
//! delta-of-delta/zigzag-varint encoded and values Gorilla-XOR encoded.
//! `SYSEG1` (legacy) stores timestamps as plain zigzag varint deltas and
//! values as raw little-endian `f64`s; readers must keep accepting it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::debug;

use crate::codec::timestamp::{CodecError, TimestampDecoder, TimestampEncoder};
use crate::codec::value::{ValueDecoder, ValueEncoder};
use crate::storage::data::Point;
use crate::storage::manifest::SegmentDescriptor;

const MAGIC_V2: &[u8; 6] = b"SYSEG2";
const MAGIC_V1: &[u8; 6] = b"SYSEG1";
const HEADER_LEN_V2: usize = 44;

const TS_CODEC_DOD: u8 = 1;
const VAL_CODEC_GORILLA: u8 = 1;

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid segment format: {0}")]
    InvalidFormat(String),
    #[error("segment corruption: {0}")]
    Corruption(String),
    #[error("cannot write an empty point batch")]
    EmptyBatch,
    #[error("point batch must be sorted ascending by ts")]
    Unsorted,
}

impl From<CodecError> for SegmentError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Io(e) => SegmentError::Io(e),
            CodecError::InvalidEncoding(msg) => SegmentError::Corruption(msg),
        }
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Writes `points` (non-empty, sorted ascending by `ts`) as a new `SYSEG2`
/// segment under `data_dir/segments/<hour>/`. Returns the path relative to
/// `data_dir`.
pub fn write_segment(
    data_dir: &Path,
    series_id: u64,
    hour_bucket: i64,
    points: &[Point],
) -> Result<PathBuf, SegmentError> {
    if points.is_empty() {
        return Err(SegmentError::EmptyBatch);
    }
    if !points.windows(2).all(|w| w[0].ts <= w[1].ts) {
        return Err(SegmentError::Unsorted);
    }

    let start_ts = points.first().unwrap().ts;
    let end_ts = points.last().unwrap().ts;
    let count = points.len() as u32;

    let dir = data_dir.join("segments").join(hour_bucket.to_string());
    fs::create_dir_all(&dir)?;

    let filename = format!(
        "{:016x}-{}-{}-{}.seg",
        series_id,
        start_ts,
        end_ts,
        now_ms()
    );
    let abs_path = dir.join(&filename);

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&abs_path)?;
    let mut w = BufWriter::new(file);

    w.write_all(MAGIC_V2)?;
    w.write_all(&series_id.to_le_bytes())?;
    w.write_all(&hour_bucket.to_le_bytes())?;
    w.write_all(&count.to_le_bytes())?;
    w.write_all(&start_ts.to_le_bytes())?;
    w.write_all(&end_ts.to_le_bytes())?;
    w.write_all(&[TS_CODEC_DOD, VAL_CODEC_GORILLA])?;

    let mut ts_enc = TimestampEncoder::new(start_ts);
    for p in points {
        ts_enc.encode(&mut w, p.ts)?;
    }
    let mut val_enc = ValueEncoder::new();
    for p in points {
        val_enc.encode(&mut w, p.value)?;
    }

    w.flush()?;
    w.get_ref().sync_all()?;

    debug!(
        series_id,
        hour_bucket,
        count,
        path = %abs_path.display(),
        "wrote segment"
    );

    let relative = abs_path
        .strip_prefix(data_dir)
        .unwrap_or(&abs_path)
        .to_path_buf();
    Ok(relative)
}

/// Reads every point out of the segment at `data_dir.join(path)`, in file
/// order.
pub fn read_all(data_dir: &Path, path: &Path) -> Result<Vec<Point>, SegmentError> {
    let abs_path = data_dir.join(path);
    let file = File::open(&abs_path)?;
    let mut r = BufReader::new(file);

    let mut magic = [0u8; 6];
    r.read_exact(&mut magic).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            SegmentError::Corruption(format!("truncated segment header: {}", abs_path.display()))
        } else {
            SegmentError::Io(e)
        }
    })?;

    if &magic == MAGIC_V2 {
        read_all_v2(&mut r)
    } else if &magic == MAGIC_V1 {
        read_all_v1(&mut r)
    } else {
        Err(SegmentError::InvalidFormat(format!(
            "unrecognized segment magic in {}",
            abs_path.display()
        )))
    }
}

fn read_u64<R: Read>(r: &mut R) -> Result<u64, SegmentError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_i64<R: Read>(r: &mut R) -> Result<i64, SegmentError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn read_all_v2<R: Read>(r: &mut R) -> Result<Vec<Point>, SegmentError> {
    let _series_id = read_u64(r)?;
    let _hour_bucket = read_i64(r)?;
    let mut count_buf = [0u8; 4];
    r.read_exact(&mut count_buf)?;
    let count = u32::from_le_bytes(count_buf) as usize;
    let start_ts = read_i64(r)?;
    let _end_ts = read_i64(r)?;

    let mut codec_buf = [0u8; 2];
    r.read_exact(&mut codec_buf)?;
    let (ts_codec, val_codec) = (codec_buf[0], codec_buf[1]);
    if ts_codec != TS_CODEC_DOD || val_codec != VAL_CODEC_GORILLA {
        return Err(SegmentError::InvalidFormat(format!(
            "unsupported codec selectors ts={ts_codec} val={val_codec}"
        )));
    }

    let mut ts_dec = TimestampDecoder::new(start_ts);
    let mut timestamps = Vec::with_capacity(count);
    for _ in 0..count {
        timestamps.push(ts_dec.decode(r)?);
    }

    let mut val_dec = ValueDecoder::new();
    let mut points = Vec::with_capacity(count);
    for ts in timestamps {
        let value = val_dec.decode(r)?;
        points.push(Point::new(ts, value));
    }

    Ok(points)
}

fn read_all_v1<R: Read>(r: &mut R) -> Result<Vec<Point>, SegmentError> {
    // legacy layout: series_id, hour_bucket, count, start_ts, end_ts (same
    // fixed header as v2, no codec selector bytes), then zigzag-varint
    // deltas for timestamps and raw little-endian f64 values.
    let _series_id = read_u64(r)?;
    let _hour_bucket = read_i64(r)?;
    let mut count_buf = [0u8; 4];
    r.read_exact(&mut count_buf)?;
    let count = u32::from_le_bytes(count_buf) as usize;
    let start_ts = read_i64(r)?;
    let _end_ts = read_i64(r)?;

    let mut timestamps = Vec::with_capacity(count);
    let mut prev = start_ts;
    for i in 0..count {
        let delta = read_zigzag_varint(r)?;
        let ts = if i == 0 { start_ts } else { prev + delta };
        timestamps.push(ts);
        prev = ts;
    }

    let mut points = Vec::with_capacity(count);
    for ts in timestamps {
        let mut buf = [0u8; 8];
        r.read_exact(&mut buf)?;
        points.push(Point::new(ts, f64::from_le_bytes(buf)));
    }

    Ok(points)
}

fn read_zigzag_varint<R: Read>(r: &mut R) -> Result<i64, SegmentError> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    loop {
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)?;
        let byte = byte[0];
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 64 {
            return Err(SegmentError::Corruption("varint too long".to_string()));
        }
    }
    Ok(((result >> 1) as i64) ^ -((result & 1) as i64))
}

/// For each manifest entry matching `series_id` whose `[start_ts, end_ts]`
/// overlaps `[start, end]`, opens the segment, decodes it, and appends
/// every point with `start <= ts <= end` to `out`. Manifest iteration order
/// is preserved; no cross-segment sort or dedup happens here.
pub fn query_range(
    data_dir: &Path,
    descriptors: &[SegmentDescriptor],
    series_id: u64,
    start: i64,
    end: i64,
    out: &mut Vec<Point>,
) -> Result<(), SegmentError> {
    for desc in descriptors {
        if desc.series_id != series_id {
            continue;
        }
        if desc.start_ts > end || desc.end_ts < start {
            continue;
        }
        let points = read_all(data_dir, &desc.path)?;
        out.extend(points.into_iter().filter(|p| p.ts >= start && p.ts <= end));
    }
    Ok(())
}
