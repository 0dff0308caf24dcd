//! Journal Writer: append-only record journal with checksums
//!
//! # Binary Format (per entry)
//! ```text
//! [total_len: u32]
//! [sequence:  u64]
//! [timestamp: i64]
//! [kind_len: u16][kind: bytes]
//! [payload_len: u32][payload: bytes]
//! [checksum: u32]  // CRC32C over sequence+timestamp+kind+payload
//! ```
//!
//! The payload is a bincode-encoded [`JournalRecord`].

use crc32c::crc32c;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use types::command::CommandEnvelope;
use types::ids::CommandId;
use types::order::Order;
use types::trade::Trade;

use crate::adapter::CommitBatch;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Sequence error: expected {expected}, got {got}")]
    SequenceError { expected: u64, got: u64 },
}

impl From<bincode::Error> for JournalError {
    fn from(e: bincode::Error) -> Self {
        JournalError::Serialization(e.to_string())
    }
}

// ── Records ─────────────────────────────────────────────────────────

/// What a journal entry stores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalRecord {
    Commit(CommitBatch),
    Order(Order),
    Trade(Trade),
    /// Command accepted onto the journaled stream
    Enqueued(CommandEnvelope),
    /// Command the consumer is done with
    Acked(CommandId),
}

impl JournalRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            JournalRecord::Commit(_) => "COMMIT",
            JournalRecord::Order(_) => "ORDER",
            JournalRecord::Trade(_) => "TRADE",
            JournalRecord::Enqueued(_) => "ENQUEUE",
            JournalRecord::Acked(_) => "ACK",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, JournalError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, JournalError> {
        Ok(bincode::deserialize(payload)?)
    }
}

// ── Journal Entry ───────────────────────────────────────────────────

/// A single framed journal entry
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    /// Journal-wide monotonic sequence number
    pub sequence: u64,
    /// Unix nanos when the entry was written
    pub timestamp: i64,
    /// Record kind label, kept outside the payload for diagnostics
    pub kind: String,
    /// Bincode-serialized [`JournalRecord`]
    pub payload: Vec<u8>,
    /// CRC32C over (sequence ++ timestamp ++ kind ++ payload)
    pub checksum: u32,
}

/// Bytes of a frame besides the kind label and payload
const FRAME_OVERHEAD: usize = 8 + 8 + 2 + 4 + 4;

/// Largest body accepted when decoding
const MAX_BODY_LEN: usize = 64 * 1024 * 1024;

impl JournalEntry {
    /// Create a new entry, computing the CRC32C checksum.
    pub fn new(sequence: u64, timestamp: i64, kind: String, payload: Vec<u8>) -> Self {
        let checksum = Self::compute_checksum(sequence, timestamp, &kind, &payload);
        Self {
            sequence,
            timestamp,
            kind,
            payload,
            checksum,
        }
    }

    /// Frame a record
    pub fn from_record(
        sequence: u64,
        timestamp: i64,
        record: &JournalRecord,
    ) -> Result<Self, JournalError> {
        Ok(Self::new(
            sequence,
            timestamp,
            record.kind().to_string(),
            record.encode()?,
        ))
    }

    pub fn record(&self) -> Result<JournalRecord, JournalError> {
        JournalRecord::decode(&self.payload)
    }

    pub fn compute_checksum(sequence: u64, timestamp: i64, kind: &str, payload: &[u8]) -> u32 {
        let mut buf = Vec::with_capacity(16 + kind.len() + payload.len());
        buf.extend_from_slice(&sequence.to_le_bytes());
        buf.extend_from_slice(&timestamp.to_le_bytes());
        buf.extend_from_slice(kind.as_bytes());
        buf.extend_from_slice(payload);
        crc32c(&buf)
    }

    pub fn verify_checksum(&self) -> bool {
        self.checksum
            == Self::compute_checksum(self.sequence, self.timestamp, &self.kind, &self.payload)
    }

    /// Serialize entry to the binary wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let kind_bytes = self.kind.as_bytes();
        let body_len = (FRAME_OVERHEAD + kind_bytes.len() + self.payload.len()) as u32;

        let mut buf = Vec::with_capacity(4 + body_len as usize);
        buf.extend_from_slice(&body_len.to_le_bytes());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&(kind_bytes.len() as u16).to_le_bytes());
        buf.extend_from_slice(kind_bytes);
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Deserialize entry from the binary wire format.
    ///
    /// Returns `(entry, bytes_consumed)`. Short or malformed input is an
    /// error, never a panic.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize), JournalError> {
        let mut cursor = Cursor::new(data);
        let body_len = cursor.u32()? as usize;
        if !(FRAME_OVERHEAD..=MAX_BODY_LEN).contains(&body_len) {
            return Err(JournalError::Serialization(format!(
                "Implausible body length: {}",
                body_len
            )));
        }
        if data.len() < 4 + body_len {
            return Err(JournalError::Serialization(format!(
                "Incomplete entry: need {} bytes, have {}",
                4 + body_len,
                data.len()
            )));
        }

        let mut cursor = Cursor::new(&data[4..4 + body_len]);
        let sequence = cursor.u64()?;
        let timestamp = cursor.u64()? as i64;
        let kind_len = cursor.u16()? as usize;
        let kind = String::from_utf8(cursor.take(kind_len)?.to_vec())
            .map_err(|e| JournalError::Serialization(e.to_string()))?;
        let payload_len = cursor.u32()? as usize;
        let payload = cursor.take(payload_len)?.to_vec();
        let checksum = cursor.u32()?;

        Ok((
            Self {
                sequence,
                timestamp,
                kind,
                payload,
                checksum,
            },
            4 + body_len,
        ))
    }
}

/// Bounds-checked little-endian reader over a byte slice
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], JournalError> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.data.len()).ok_or_else(|| {
            JournalError::Serialization(format!(
                "field of {} bytes exceeds remaining {} bytes",
                len,
                self.data.len() - self.pos
            ))
        })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], JournalError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16, JournalError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, JournalError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, JournalError> {
        Ok(u64::from_le_bytes(self.array()?))
    }
}

// ── Writer Configuration ────────────────────────────────────────────

/// Controls when `fsync` (durable write) is called.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FsyncPolicy {
    /// Fsync after every write.
    EveryWrite,
    /// Fsync every N writes.
    EveryN(usize),
    /// Leave durability to the OS.
    Never,
}

#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Directory for journal files.
    pub dir: PathBuf,
    /// Maximum file size in bytes before rotation (default 64 MiB).
    pub max_file_size: u64,
    pub fsync_policy: FsyncPolicy,
}

impl JournalConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_file_size: 64 * 1024 * 1024,
            fsync_policy: FsyncPolicy::EveryWrite,
        }
    }
}

// ── Journal Writer ──────────────────────────────────────────────────

/// Append-only journal writer with checksums, rotation, and fsync control.
pub struct JournalWriter {
    config: JournalConfig,
    writer: BufWriter<File>,
    current_file: PathBuf,
    current_file_size: u64,
    next_sequence: u64,
    writes_since_fsync: usize,
    file_index: u64,
}

impl JournalWriter {
    /// Open the latest journal file for appending, creating the directory if needed.
    pub fn open(config: JournalConfig) -> Result<Self, JournalError> {
        fs::create_dir_all(&config.dir)?;

        let file_index = latest_index(&config.dir)?.unwrap_or(0);
        let current_file = journal_path(&config.dir, file_index);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&current_file)?;
        let current_file_size = file.metadata()?.len();

        Ok(Self {
            config,
            writer: BufWriter::new(file),
            current_file,
            current_file_size,
            next_sequence: 1,
            writes_since_fsync: 0,
            file_index,
        })
    }

    /// Set the next expected sequence number (used after replay).
    pub fn set_next_sequence(&mut self, seq: u64) {
        self.next_sequence = seq;
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn current_file_path(&self) -> &Path {
        &self.current_file
    }

    /// Append an entry. Its sequence must be the next expected one.
    pub fn append(&mut self, entry: &JournalEntry) -> Result<(), JournalError> {
        if entry.sequence != self.next_sequence {
            return Err(JournalError::SequenceError {
                expected: self.next_sequence,
                got: entry.sequence,
            });
        }
        if self.current_file_size >= self.config.max_file_size {
            self.rotate()?;
        }

        let bytes = entry.to_bytes();
        // One write + flush per entry keeps a crash to at most one torn frame
        if let Err(e) = self.writer.write_all(&bytes).and_then(|_| self.writer.flush()) {
            self.discard_partial_write()?;
            return Err(e.into());
        }

        self.current_file_size += bytes.len() as u64;
        self.next_sequence = entry.sequence + 1;
        self.writes_since_fsync += 1;
        self.apply_fsync_policy()
    }

    /// Frame and append a record, returning its sequence
    pub fn write_record(&mut self, timestamp: i64, record: &JournalRecord) -> Result<u64, JournalError> {
        let entry = JournalEntry::from_record(self.next_sequence, timestamp, record)?;
        self.append(&entry)?;
        Ok(entry.sequence)
    }

    /// Force flush + fsync.
    pub fn sync(&mut self) -> Result<(), JournalError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.writes_since_fsync = 0;
        Ok(())
    }

    /// Reopen the current file cut back to its last complete frame
    fn discard_partial_write(&mut self) -> Result<(), JournalError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.current_file)?;
        file.set_len(self.current_file_size)?;
        self.writer = BufWriter::new(file);
        Ok(())
    }

    fn apply_fsync_policy(&mut self) -> Result<(), JournalError> {
        let should_fsync = match self.config.fsync_policy {
            FsyncPolicy::EveryWrite => true,
            FsyncPolicy::EveryN(n) => self.writes_since_fsync >= n,
            FsyncPolicy::Never => false,
        };
        if should_fsync {
            self.writer.get_ref().sync_all()?;
            self.writes_since_fsync = 0;
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), JournalError> {
        self.sync()?;
        self.file_index += 1;
        self.current_file = journal_path(&self.config.dir, self.file_index);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.current_file)?;
        self.writer = BufWriter::new(file);
        self.current_file_size = 0;
        Ok(())
    }
}

pub fn journal_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("journal-{:06}.bin", index))
}

pub(crate) fn parse_journal_name(name: &str) -> Option<u64> {
    name.strip_prefix("journal-")?
        .strip_suffix(".bin")?
        .parse::<u64>()
        .ok()
}

/// Journal files in the directory sorted by index
pub(crate) fn journal_files(dir: &Path) -> io::Result<Vec<(u64, PathBuf)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(index) = parse_journal_name(&entry.file_name().to_string_lossy()) {
            files.push((index, entry.path()));
        }
    }
    files.sort_by_key(|(index, _)| *index);
    Ok(files)
}

fn latest_index(dir: &Path) -> io::Result<Option<u64>> {
    Ok(journal_files(dir)?.last().map(|(index, _)| *index))
}

// ── Tests ───────────────────────────────────────────────────────────
