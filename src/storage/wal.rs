//! Write-ahead log: binary record framing, size-triggered rotation,
//! deterministic replay ordering.
//!
//! Record framing (little-endian): `[len: u32][type: u8][series_id:
//! u64][ts: i64][value_bits: u64][crc32: u32]`. `len` covers `type..value`
//! (currently always 25) and `crc32` is computed over that same payload
//! slice. Unlike a header-then-entry-then-separate-CRC-write layout, the
//! whole record is assembled in memory and handed to a single `write_all`
//! call, so a crash mid-write always leaves a short tail rather than a
//! structurally valid record with a stale CRC.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crc::{Crc, CRC_32_ISCSI};
use thiserror::Error;
use tracing::{info, warn};

const WAL_DIR: &str = "wal";
const CURRENT_WAL: &str = "current.wal";
const ROTATE_AT_BYTES: u64 = 64 * 1024 * 1024;
const MAX_RECORD_LEN: u32 = 1024 * 1024;
const PAYLOAD_LEN: u32 = 25; // type(1) + series_id(8) + ts(8) + value_bits(8)
const RECORD_KIND_PUT: u8 = 1;

/// Total on-disk size of one record, `[len: u32][payload][crc: u32]`.
/// Exposed so callers (the writer's metrics bookkeeping) don't need to
/// re-derive framing overhead themselves.
pub const RECORD_ON_DISK_LEN: u64 = 4 + PAYLOAD_LEN as u64 + 4;

const CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

#[derive(Error, Debug)]
pub enum WalError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("WAL corruption: {0}")]
    Corruption(String),
}

/// Fsync discipline for WAL appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsyncPolicy {
    /// fsync after every append.
    Always,
    /// fsync only at flush boundaries, driven by the writer loop rather
    /// than the WAL itself.
    Interval,
    /// never fsync explicitly; rely on the OS to flush eventually.
    Never,
}

/// A decoded WAL record, handed to the replay visitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalRecord {
    pub series_id: u64,
    pub ts: i64,
    pub value: f64,
}

pub struct WriteAheadLog {
    dir: PathBuf,
    current: File,
    current_len: u64,
    policy: FsyncPolicy,
}

impl WriteAheadLog {
    /// Creates `wal/` if needed, opens (or creates) `wal/current.wal`, and
    /// initializes the rotation byte counter from the existing file size.
    pub fn open(data_dir: &Path, policy: FsyncPolicy) -> Result<Self, WalError> {
        let dir = data_dir.join(WAL_DIR);
        fs::create_dir_all(&dir)?;

        let current_path = dir.join(CURRENT_WAL);
        let current = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&current_path)?;
        let current_len = current.metadata()?.len();

        Ok(Self {
            dir,
            current,
            current_len,
            policy,
        })
    }

    pub fn policy(&self) -> FsyncPolicy {
        self.policy
    }

    /// Appends one record. Under `FsyncPolicy::Always`, fsyncs before
    /// returning.
    pub fn append(&mut self, series_id: u64, ts: i64, value: f64) -> Result<(), WalError> {
        let mut buf = Vec::with_capacity(4 + PAYLOAD_LEN as usize + 4);
        buf.extend_from_slice(&PAYLOAD_LEN.to_le_bytes());

        let payload_start = buf.len();
        buf.push(RECORD_KIND_PUT);
        buf.extend_from_slice(&series_id.to_le_bytes());
        buf.extend_from_slice(&ts.to_le_bytes());
        buf.extend_from_slice(&value.to_bits().to_le_bytes());
        let payload = &buf[payload_start..];

        let mut digest = CRC.digest();
        digest.update(payload);
        let crc = digest.finalize();
        buf.extend_from_slice(&crc.to_le_bytes());

        self.current.write_all(&buf)?;
        if self.policy == FsyncPolicy::Always {
            self.current.sync_all()?;
        }
        self.current_len += buf.len() as u64;
        Ok(())
    }

    /// Fsyncs `current.wal`. Called by the writer at flush boundaries
    /// under `FsyncPolicy::Interval`.
    pub fn sync(&self) -> Result<(), WalError> {
        self.current.sync_all()?;
        Ok(())
    }

    /// Rotates `current.wal` to `<epoch_ms>.wal` and opens a fresh
    /// `current.wal`, if the byte threshold has been reached.
    pub fn rotate_if_needed(&mut self) -> Result<(), WalError> {
        if self.current_len < ROTATE_AT_BYTES {
            return Ok(());
        }

        self.current.sync_all()?;
        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let rotated_path = self.dir.join(format!("{now_ms}.wal"));
        fs::rename(self.dir.join(CURRENT_WAL), &rotated_path)?;

        let fresh = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(self.dir.join(CURRENT_WAL))?;
        self.current = fresh;
        self.current_len = 0;

        info!(path = %rotated_path.display(), "rotated WAL segment");
        Ok(())
    }

    /// Lists every `*.wal` file, sorted by filename, with `current.wal`
    /// forced to the end regardless of sort order, then replays each file
    /// in turn, calling `visitor` for every well-formed record. A
    /// length/CRC/truncation failure in a given file ends *that file's*
    /// replay without aborting the others — a torn tail from a crash is
    /// expected, not exceptional.
    pub fn replay<F: FnMut(WalRecord)>(&self, mut visitor: F) -> Result<(), WalError> {
        let mut names: Vec<String> = fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|n| n.ends_with(".wal"))
            .collect();
        names.sort();
        names.retain(|n| n != CURRENT_WAL);
        names.push(CURRENT_WAL.to_string());

        for name in names {
            let path = self.dir.join(&name);
            let file = match File::open(&path) {
                Ok(f) => f,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(WalError::Io(e)),
            };
            let mut reader = BufReader::new(file);
            replay_file(&mut reader, &path, &mut visitor);
        }
        Ok(())
    }
}

fn replay_file<R: Read>(reader: &mut R, path: &Path, visitor: &mut impl FnMut(WalRecord)) {
    loop {
        match replay_one(reader) {
            Ok(Some(record)) => visitor(record),
            Ok(None) => break,
            Err(reason) => {
                warn!(path = %path.display(), reason, "WAL replay stopped early: benign tail corruption");
                break;
            }
        }
    }
}

/// Reads and validates exactly one record. `Ok(None)` means a clean EOF
/// before any bytes of the next record were read. `Err` means the file's
/// replay should stop here (short read, bad length, or CRC mismatch).
fn replay_one<R: Read>(reader: &mut R) -> Result<Option<WalRecord>, String> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.to_string()),
    }
    let len = u32::from_le_bytes(len_buf);
    if len == 0 || len > MAX_RECORD_LEN {
        return Err(format!("record length {len} out of range"));
    }

    let mut payload = vec![0u8; len as usize];
    reader
        .read_exact(&mut payload)
        .map_err(|e| format!("short read on payload: {e}"))?;

    let mut crc_buf = [0u8; 4];
    reader
        .read_exact(&mut crc_buf)
        .map_err(|e| format!("short read on crc: {e}"))?;
    let expected_crc = u32::from_le_bytes(crc_buf);

    let mut digest = CRC.digest();
    digest.update(&payload);
    let actual_crc = digest.finalize();
    if actual_crc != expected_crc {
        return Err("crc mismatch".to_string());
    }

    if payload.len() != PAYLOAD_LEN as usize {
        return Err(format!("unexpected payload length {}", payload.len()));
    }
    let kind = payload[0];
    if kind != RECORD_KIND_PUT {
        return Err(format!("unknown record kind {kind}"));
    }
    let series_id = u64::from_le_bytes(payload[1..9].try_into().unwrap());
    let ts = i64::from_le_bytes(payload[9..17].try_into().unwrap());
    let value_bits = u64::from_le_bytes(payload[17..25].try_into().unwrap());

    Ok(Some(WalRecord {
        series_id,
        ts,
        value: f64::from_bits(value_bits),
    }))
}
