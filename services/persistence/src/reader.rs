//! Journal Reader: sequential replay with corruption detection
//!
//! Reads every journal file in index order, validating frame structure,
//! CRC32C checksums and gapless sequences.
//!
//! A crash can leave at most one partially written frame at the end of the
//! newest file. Replay stops there and reports it as a [`TornTail`]; the
//! caller truncates it before appending again. Damage anywhere else is an
//! error.

use crate::journal::{journal_files, JournalEntry, JournalError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("Corruption in {file} at byte offset {offset}: {detail}")]
    Corruption {
        file: PathBuf,
        offset: u64,
        detail: String,
    },

    #[error("Sequence gap: expected {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },
}

/// Unreadable bytes at the end of the newest journal file
#[derive(Debug, Clone, PartialEq)]
pub struct TornTail {
    pub file: PathBuf,
    /// Length of the valid prefix; the file should be truncated to it
    pub valid_len: u64,
    pub discarded_bytes: u64,
    pub detail: String,
}

impl TornTail {
    /// Cut the file back to its valid prefix
    pub fn truncate(&self) -> io::Result<()> {
        warn!(
            file = %self.file.display(),
            valid_len = self.valid_len,
            discarded = self.discarded_bytes,
            "Truncating torn journal tail"
        );
        let file = fs::OpenOptions::new().write(true).open(&self.file)?;
        file.set_len(self.valid_len)?;
        file.sync_all()
    }
}

/// Result of replaying a journal directory
#[derive(Debug, Default)]
pub struct Replay {
    pub entries: Vec<JournalEntry>,
    pub torn_tail: Option<TornTail>,
}

impl Replay {
    /// Sequence of the last valid entry (0 for an empty journal)
    pub fn last_sequence(&self) -> u64 {
        self.entries.last().map(|entry| entry.sequence).unwrap_or(0)
    }
}

pub struct JournalReader {
    files: Vec<PathBuf>,
}

impl JournalReader {
    /// Open a reader over all journal files in the given directory.
    pub fn open(dir: &Path) -> Result<Self, ReaderError> {
        let files = journal_files(dir)?
            .into_iter()
            .map(|(_, path)| path)
            .collect();
        Ok(Self { files })
    }

    /// Read every valid entry, in order
    pub fn replay(&self) -> Result<Replay, ReaderError> {
        let mut replay = Replay::default();
        let mut expected_seq: Option<u64> = None;
        let last_file = self.files.len().saturating_sub(1);

        for (file_idx, path) in self.files.iter().enumerate() {
            let data = fs::read(path)?;
            let mut pos = 0usize;

            while pos < data.len() {
                let frame = JournalEntry::from_bytes(&data[pos..])
                    .map_err(|e| e.to_string())
                    .and_then(|(entry, consumed)| {
                        if entry.verify_checksum() {
                            Ok((entry, consumed))
                        } else {
                            Err(format!(
                                "CRC32C mismatch for seq={}, stored={:#010x}",
                                entry.sequence, entry.checksum
                            ))
                        }
                    });

                match frame {
                    Ok((entry, consumed)) => {
                        if let Some(expected) = expected_seq {
                            if entry.sequence != expected {
                                return Err(ReaderError::SequenceGap {
                                    expected,
                                    got: entry.sequence,
                                });
                            }
                        }
                        expected_seq = Some(entry.sequence + 1);
                        replay.entries.push(entry);
                        pos += consumed;
                    }
                    Err(detail) if file_idx == last_file => {
                        warn!(
                            file = %path.display(),
                            offset = pos,
                            discarded = data.len() - pos,
                            %detail,
                            "Ignoring torn journal tail"
                        );
                        replay.torn_tail = Some(TornTail {
                            file: path.clone(),
                            valid_len: pos as u64,
                            discarded_bytes: (data.len() - pos) as u64,
                            detail,
                        });
                        break;
                    }
                    Err(detail) => {
                        return Err(ReaderError::Corruption {
                            file: path.clone(),
                            offset: pos as u64,
                            detail,
                        });
                    }
                }
            }
        }

        Ok(replay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{journal_path, JournalConfig, JournalWriter};
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_test_entries(config: JournalConfig, count: u64) {
        let mut writer = JournalWriter::open(config).unwrap();
        for seq in 1..=count {
            let entry = JournalEntry::new(
                seq,
                1_000_000_000 + (seq as i64 * 1_000),
                "COMMIT".to_string(),
                vec![seq as u8; 10],
            );
            writer.append(&entry).unwrap();
        }
        writer.sync().unwrap();
    }

    #[test]
    fn test_sequential_replay() {
        let tmp = TempDir::new().unwrap();
        write_test_entries(JournalConfig::new(tmp.path()), 50);

        let replay = JournalReader::open(tmp.path()).unwrap().replay().unwrap();
        assert_eq!(replay.entries.len(), 50);
        assert_eq!(replay.last_sequence(), 50);
        assert!(replay.torn_tail.is_none());
    }

    #[test]
    fn test_replay_across_rotated_files() {
        let tmp = TempDir::new().unwrap();
        let config = JournalConfig {
            max_file_size: 128,
            ..JournalConfig::new(tmp.path())
        };
        write_test_entries(config, 30);

        let replay = JournalReader::open(tmp.path()).unwrap().replay().unwrap();
        assert_eq!(replay.entries.len(), 30);
    }

    #[test]
    fn test_empty_directory() {
        let tmp = TempDir::new().unwrap();
        let replay = JournalReader::open(&tmp.path().join("missing")).unwrap().replay().unwrap();
        assert!(replay.entries.is_empty());
        assert_eq!(replay.last_sequence(), 0);
    }

    #[test]
    fn test_torn_tail_is_ignored() {
        let tmp = TempDir::new().unwrap();
        write_test_entries(JournalConfig::new(tmp.path()), 5);

        let path = journal_path(tmp.path(), 0);
        let valid_len = fs::metadata(&path).unwrap().len();
        let partial = JournalEntry::new(6, 1, "COMMIT".into(), vec![7; 32]).to_bytes();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&partial[..partial.len() / 2]).unwrap();

        let replay = JournalReader::open(tmp.path()).unwrap().replay().unwrap();
        assert_eq!(replay.entries.len(), 5);
        let torn = replay.torn_tail.unwrap();
        assert_eq!(torn.valid_len, valid_len);
        assert_eq!(torn.discarded_bytes, (partial.len() / 2) as u64);
    }

    #[test]
    fn test_corruption_before_tail_is_error() {
        let tmp = TempDir::new().unwrap();
        let config = JournalConfig {
            max_file_size: 64,
            ..JournalConfig::new(tmp.path())
        };
        write_test_entries(config, 6);

        // Flip a payload byte in the first (non-final) file
        let path = journal_path(tmp.path(), 0);
        let mut data = fs::read(&path).unwrap();
        let last = data.len() - 6;
        data[last] ^= 0xFF;
        fs::write(&path, data).unwrap();

        let result = JournalReader::open(tmp.path()).unwrap().replay();
        assert!(matches!(result, Err(ReaderError::Corruption { .. })));
    }
}
