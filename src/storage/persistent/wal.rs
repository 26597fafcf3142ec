//! Write-ahead log.
//!
//! Every mutation is appended (and by default fsynced) here before it is
//! applied to the in-memory tables. On startup the log is replayed on top of
//! the newest segment.
//!
//! # File Format
//! ```text
//! [MAGIC: 4 bytes][VERSION: 1 byte]
//! [ENTRY 1: codec-encoded WalEntry]
//! [ENTRY 2: codec-encoded WalEntry]
//! ...
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Error as IoError, ErrorKind, Result as IoResult, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::alias::CustomerAlias;
use crate::contact::Contact;

use super::codec;

const HEADER_LEN: u64 = 5;

/// A single entry in the write-ahead log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    /// Monotonically increasing sequence number.
    pub sequence: u64,
    /// When this entry was written.
    pub timestamp: DateTime<Utc>,
    /// The logged mutation.
    pub kind: WalEntryKind,
}

/// Logged mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalEntryKind {
    /// A contact was inserted.
    ContactInsert(Contact),
    /// An alias row was inserted.
    AliasInsert(CustomerAlias),
    /// An alias row was replaced in place.
    AliasUpdate(CustomerAlias),
    /// A contact and its first alias, committed as one record.
    Provision {
        /// The new contact.
        contact: Contact,
        /// Alias pointing at it.
        alias: CustomerAlias,
    },
    /// Everything up to `up_to_sequence` is in a segment.
    Checkpoint {
        /// Last sequence covered by the segment.
        up_to_sequence: u64,
    },
}

struct WalWriter {
    out: BufWriter<File>,
    sequence: u64,
    /// Set when a failed append could not be rolled back; the file tail is
    /// then unknown and no further appends are accepted.
    poisoned: bool,
}

/// Append-only log. Thread-safe via an internal mutex.
pub struct WriteAheadLog {
    path: PathBuf,
    writer: Mutex<WalWriter>,
    sync_on_write: bool,
}

fn poisoned() -> std::io::Error {
    std::io::Error::new(ErrorKind::Other, "poisoned lock: wal.writer")
}

impl WriteAheadLog {
    /// Open or create a log file.
    ///
    /// An existing file is scanned for its last valid sequence number. A torn
    /// tail (from a crash mid-append) is cut off so later appends stay readable.
    pub fn open(path: &Path, sync_on_write: bool) -> IoResult<Self> {
        let fresh = !path.exists() || std::fs::metadata(path)?.len() < HEADER_LEN;

        let sequence = if fresh {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            codec::write_header(&mut file)?;
            file.sync_all()?;
            0
        } else {
            let (last, valid_len) = Self::scan(path)?;
            let file = OpenOptions::new().write(true).open(path)?;
            if file.metadata()?.len() > valid_len {
                warn!(
                    path = %path.display(),
                    valid_len,
                    "discarding unreadable WAL tail"
                );
                file.set_len(valid_len)?;
                file.sync_all()?;
            }
            last
        };

        let file = OpenOptions::new().append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(WalWriter {
                out: BufWriter::new(file),
                sequence,
                poisoned: false,
            }),
            sync_on_write,
        })
    }

    /// Append one entry. Returns its sequence number.
    ///
    /// The entry is durable (when `sync_on_write` is set) once this returns.
    /// A failed append is cut back off the file, so an entry the caller saw
    /// fail never reappears on replay. If that cleanup fails too, the log
    /// refuses all further appends until it is reopened.
    pub fn append(&self, kind: WalEntryKind) -> IoResult<u64> {
        let mut writer = self.writer.lock().map_err(|_| poisoned())?;
        if writer.poisoned {
            return Err(IoError::new(
                ErrorKind::Other,
                "WAL rejected append after an unrecoverable write failure",
            ));
        }

        let sequence = writer.sequence + 1;
        let entry = WalEntry {
            sequence,
            timestamp: Utc::now(),
            kind,
        };
        let encoded = codec::encode(&entry)?;

        let valid_len = std::fs::metadata(&self.path)?.len();
        if let Err(e) = Self::write_entry(&mut writer.out, &encoded, self.sync_on_write) {
            if let Err(rollback) = Self::rollback(&mut writer, valid_len) {
                writer.poisoned = true;
                error!(
                    path = %self.path.display(),
                    sequence,
                    error = %rollback,
                    "failed to roll back WAL append; log is now read-only"
                );
            } else {
                warn!(
                    path = %self.path.display(),
                    sequence,
                    error = %e,
                    "rolled back failed WAL append"
                );
            }
            return Err(e);
        }

        writer.sequence = sequence;
        Ok(sequence)
    }

    fn write_entry(out: &mut BufWriter<File>, encoded: &[u8], sync: bool) -> IoResult<()> {
        out.write_all(encoded)?;
        out.flush()?;
        if sync {
            out.get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Discard buffered bytes and cut the file back to `valid_len`.
    fn rollback(writer: &mut WalWriter, valid_len: u64) -> IoResult<()> {
        let file = writer.out.get_ref().try_clone()?;
        let fresh = BufWriter::new(file.try_clone()?);
        // `into_parts` hands back the unflushed buffer instead of writing it.
        let (_stale, _unflushed) = std::mem::replace(&mut writer.out, fresh).into_parts();

        file.set_len(valid_len)?;
        file.sync_all()
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> IoResult<WalIterator> {
        WalIterator::new(&self.path)
    }

    /// Sequence number of the last appended entry.
    pub fn current_sequence(&self) -> IoResult<u64> {
        Ok(self.writer.lock().map_err(|_| poisoned())?.sequence)
    }

    /// Log file size in bytes.
    pub fn size_bytes(&self) -> IoResult<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Reset the log to an empty file.
    ///
    /// Only call this after the current state has been committed to a segment.
    /// Sequence numbering restarts at zero.
    pub fn truncate(&self) -> IoResult<()> {
        let mut writer = self.writer.lock().map_err(|_| poisoned())?;
        writer.out.flush()?;

        let file = writer.out.get_ref();
        file.set_len(0)?;
        let mut fresh = OpenOptions::new().write(true).open(&self.path)?;
        codec::write_header(&mut fresh)?;
        fresh.sync_all()?;

        writer.out = BufWriter::new(OpenOptions::new().append(true).open(&self.path)?);
        writer.sequence = 0;
        Ok(())
    }

    /// Returns `(last sequence, byte length of the valid prefix)`.
    fn scan(path: &Path) -> IoResult<(u64, u64)> {
        let mut iter = WalIterator::new(path)?;
        let mut last = 0;
        let mut valid_len = iter.position()?;

        while let Some(entry) = iter.next() {
            match entry {
                Ok(entry) => {
                    last = entry.sequence;
                    valid_len = iter.position()?;
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        after_sequence = last,
                        error = %e,
                        "WAL corruption detected; replay stops here"
                    );
                    break;
                }
            }
        }

        Ok((last, valid_len))
    }
}

/// Iterator over log entries.
///
/// Yields `None` at end of file and at a torn final record. A corrupt record
/// in the middle yields one `Err`; callers should stop there.
pub struct WalIterator {
    reader: BufReader<File>,
    file_size: u64,
    done: bool,
}

impl WalIterator {
    fn new(path: &Path) -> IoResult<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        codec::read_header(&mut reader)?;
        Ok(Self {
            reader,
            file_size,
            done: false,
        })
    }

    fn position(&mut self) -> IoResult<u64> {
        self.reader.stream_position()
    }
}

impl Iterator for WalIterator {
    type Item = IoResult<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.position() {
            Ok(pos) if pos >= self.file_size => return None,
            Ok(_) => {}
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        }

        match codec::decode(&mut self.reader) {
            Ok(entry) => Some(Ok(entry)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;
    use tempfile::tempdir;

    fn contact() -> Contact {
        Contact::new(Scope::parse("t1", None).unwrap(), "Acme")
    }

    #[test]
    fn test_append_and_iterate_after_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("directory.wal");

        {
            let wal = WriteAheadLog::open(&path, false).unwrap();
            let c = contact();
            let alias = CustomerAlias::new(c.scope.clone(), "Acme", c.id, 1.0, None).unwrap();
            wal.append(WalEntryKind::Provision { contact: c, alias }).unwrap();
            wal.append(WalEntryKind::ContactInsert(contact())).unwrap();
            assert_eq!(wal.current_sequence().unwrap(), 2);
        }

        let wal = WriteAheadLog::open(&path, false).unwrap();
        assert_eq!(wal.current_sequence().unwrap(), 2);
        let entries: Vec<_> = wal.iter().unwrap().collect::<IoResult<_>>().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0].kind, WalEntryKind::Provision { .. }));
        assert_eq!(entries[1].sequence, 2);
    }

    #[test]
    fn test_torn_tail_is_dropped_on_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("directory.wal");

        {
            let wal = WriteAheadLog::open(&path, true).unwrap();
            wal.append(WalEntryKind::ContactInsert(contact())).unwrap();
            wal.append(WalEntryKind::ContactInsert(contact())).unwrap();
        }
        let len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 6).unwrap();
        drop(file);

        let wal = WriteAheadLog::open(&path, true).unwrap();
        assert_eq!(wal.current_sequence().unwrap(), 1);
        wal.append(WalEntryKind::ContactInsert(contact())).unwrap();

        let sequences: Vec<u64> = wal.iter().unwrap().map(|e| e.unwrap().sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
    }

    #[test]
    fn test_truncate_restarts_sequence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("directory.wal");
        let wal = WriteAheadLog::open(&path, false).unwrap();
        wal.append(WalEntryKind::ContactInsert(contact())).unwrap();

        wal.truncate().unwrap();
        assert_eq!(wal.current_sequence().unwrap(), 0);
        assert_eq!(wal.size_bytes().unwrap(), HEADER_LEN);
        assert_eq!(wal.iter().unwrap().count(), 0);

        assert_eq!(wal.append(WalEntryKind::ContactInsert(contact())).unwrap(), 1);
    }

    #[test]
    fn test_rollback_discards_partial_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("directory.wal");
        let wal = WriteAheadLog::open(&path, true).unwrap();
        wal.append(WalEntryKind::ContactInsert(contact())).unwrap();
        let valid_len = wal.size_bytes().unwrap();

        {
            // A write that reached the disk halfway, with more still buffered.
            let mut writer = wal.writer.lock().unwrap();
            writer.out.write_all(b"half an entry").unwrap();
            writer.out.flush().unwrap();
            writer.out.write_all(b"still buffered").unwrap();
            WriteAheadLog::rollback(&mut writer, valid_len).unwrap();
        }
        assert_eq!(wal.size_bytes().unwrap(), valid_len);

        assert_eq!(wal.append(WalEntryKind::ContactInsert(contact())).unwrap(), 2);
        drop(wal);

        let wal = WriteAheadLog::open(&path, true).unwrap();
        let sequences: Vec<u64> = wal
            .iter()
            .unwrap()
            .collect::<IoResult<Vec<_>>>()
            .unwrap()
            .into_iter()
            .map(|e| e.sequence)
            .collect();
        assert_eq!(sequences, vec![1, 2]);
    }

    #[test]
    fn test_poisoned_log_rejects_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("directory.wal");
        let wal = WriteAheadLog::open(&path, false).unwrap();
        wal.writer.lock().unwrap().poisoned = true;

        assert!(wal.append(WalEntryKind::ContactInsert(contact())).is_err());
        assert_eq!(wal.size_bytes().unwrap(), HEADER_LEN);
        drop(wal);

        // Reopening rescans the file and clears the condition.
        let wal = WriteAheadLog::open(&path, false).unwrap();
        assert_eq!(wal.append(WalEntryKind::ContactInsert(contact())).unwrap(), 1);
    }
}
