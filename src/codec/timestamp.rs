//! Delta-of-delta, zigzag-varint timestamp codec.
//!
//! Encoder state is `(prev_ts, prev_delta)`. Each point after the first
//! writes `zigzag(delta - prev_delta)` as an MSB-continuation varint.

use std::io::{self, Read, Write};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),
}

fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

fn zigzag_decode(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// Writes `v` as an MSB-continuation (LEB128-style) unsigned varint.
fn write_varint<W: Write>(w: &mut W, mut v: u64) -> io::Result<()> {
    loop {
        let mut byte = (v & 0x7f) as u8;
        v >>= 7;
        if v != 0 {
            byte |= 0x80;
        }
        w.write_all(&[byte])?;
        if v == 0 {
            break;
        }
    }
    Ok(())
}

fn read_varint<R: Read>(r: &mut R) -> Result<u64, CodecError> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    loop {
        if shift >= 64 {
            return Err(CodecError::InvalidEncoding(
                "varint too long".to_string(),
            ));
        }
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)?;
        let byte = byte[0];
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok(result)
}

/// Encodes a sorted stream of timestamps as delta-of-delta zigzag varints.
///
/// State is `(prev_ts, prev_delta)`, initialized to `(anchor, 0)`. When
/// `anchor == points[0].ts` (the conventional case) the first emitted value
/// is `dod = 0`; any other anchor is legal too, the decoder just needs the
/// same one.
pub struct TimestampEncoder {
    prev_ts: i64,
    prev_delta: i64,
}

impl TimestampEncoder {
    /// `anchor` is the caller-provided starting point; conventionally
    /// `points[0].ts`.
    pub fn new(anchor: i64) -> Self {
        Self {
            prev_ts: anchor,
            prev_delta: 0,
        }
    }

    /// Writes one timestamp to `w`.
    pub fn encode<W: Write>(&mut self, w: &mut W, ts: i64) -> Result<(), CodecError> {
        let delta = ts - self.prev_ts;
        let dod = delta - self.prev_delta;
        write_varint(w, zigzag_encode(dod))?;
        self.prev_ts = ts;
        self.prev_delta = delta;
        Ok(())
    }
}

/// Decodes a delta-of-delta zigzag varint timestamp stream.
pub struct TimestampDecoder {
    prev_ts: i64,
    prev_delta: i64,
}

impl TimestampDecoder {
    pub fn new(anchor: i64) -> Self {
        Self {
            prev_ts: anchor,
            prev_delta: 0,
        }
    }

    pub fn decode<R: Read>(&mut self, r: &mut R) -> Result<i64, CodecError> {
        let dod = zigzag_decode(read_varint(r)?);
        let delta = self.prev_delta + dod;
        let ts = self.prev_ts + delta;
        self.prev_ts = ts;
        self.prev_delta = delta;
        Ok(ts)
    }
}
