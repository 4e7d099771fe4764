//! Gorilla-style XOR float codec, byte-aligned (not bit-packed).
//!
//! First value: marker `2` + 8 raw little-endian bytes. Subsequent values:
//! marker `0` if bit-identical to the previous value, else marker `1`
//! followed by `[leading_zeros: u8][trailing_zeros: u8][nbytes:
//! u8][payload: nbytes LE bytes]` where `payload = (bits ^ prev_bits) >>
//! trailing_zeros`.

use std::io::{Read, Write};

use super::timestamp::CodecError;

const MARKER_REPEAT: u8 = 0;
const MARKER_XOR: u8 = 1;
const MARKER_FIRST: u8 = 2;

pub struct ValueEncoder {
    prev_bits: Option<u64>,
}

impl ValueEncoder {
    pub fn new() -> Self {
        Self { prev_bits: None }
    }

    pub fn encode<W: Write>(&mut self, w: &mut W, value: f64) -> Result<(), CodecError> {
        let bits = value.to_bits();
        match self.prev_bits {
            None => {
                w.write_all(&[MARKER_FIRST])?;
                w.write_all(&bits.to_le_bytes())?;
            }
            Some(prev_bits) => {
                let x = bits ^ prev_bits;
                if x == 0 {
                    w.write_all(&[MARKER_REPEAT])?;
                } else {
                    let lz = x.leading_zeros().min(255) as u8;
                    let tz = x.trailing_zeros().min(255) as u8;
                    let nbits = 64 - lz as u32 - tz as u32;
                    let nbytes = ((nbits + 7) / 8) as u8;
                    let payload = x >> tz;
                    w.write_all(&[MARKER_XOR, lz, tz, nbytes])?;
                    w.write_all(&payload.to_le_bytes()[..nbytes as usize])?;
                }
            }
        }
        self.prev_bits = Some(bits);
        Ok(())
    }
}

impl Default for ValueEncoder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ValueDecoder {
    prev_bits: Option<u64>,
}

impl ValueDecoder {
    pub fn new() -> Self {
        Self { prev_bits: None }
    }

    pub fn decode<R: Read>(&mut self, r: &mut R) -> Result<f64, CodecError> {
        let mut marker = [0u8; 1];
        r.read_exact(&mut marker)?;
        let bits = match marker[0] {
            MARKER_FIRST => {
                let mut raw = [0u8; 8];
                r.read_exact(&mut raw)?;
                u64::from_le_bytes(raw)
            }
            MARKER_REPEAT => {
                self.prev_bits.ok_or_else(|| {
                    CodecError::InvalidEncoding(
                        "repeat marker before any value was seen".to_string(),
                    )
                })?
            }
            MARKER_XOR => {
                let prev_bits = self.prev_bits.ok_or_else(|| {
                    CodecError::InvalidEncoding(
                        "xor marker before any value was seen".to_string(),
                    )
                })?;
                let mut hdr = [0u8; 3];
                r.read_exact(&mut hdr)?;
                let (lz, tz, nbytes) = (hdr[0], hdr[1], hdr[2]);
                if nbytes as u32 > 8 || lz as u32 + tz as u32 > 64 {
                    return Err(CodecError::InvalidEncoding(
                        "invalid xor value header".to_string(),
                    ));
                }
                let mut raw = [0u8; 8];
                r.read_exact(&mut raw[..nbytes as usize])?;
                let payload = u64::from_le_bytes(raw);
                let x = payload << tz;
                prev_bits ^ x
            }
            other => {
                return Err(CodecError::InvalidEncoding(format!(
                    "unknown value marker byte {other}"
                )))
            }
        };
        self.prev_bits = Some(bits);
        Ok(f64::from_bits(bits))
    }
}

impl Default for ValueDecoder {
    fn default() -> Self {
        Self::new()
    }
}
