//! Durable contact directory.
//!
//! Wraps:
//! - the shared in-memory tables for reads
//! - WAL integration for durable writes
//! - the segment manager for compaction

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use tracing::{debug, info, warn};

use crate::alias::{AliasKey, CustomerAlias};
use crate::contact::{Contact, ContactId};
use crate::scope::Scope;
use crate::storage::memory::{lock_err, DirectoryState};
use crate::storage::traits::{AliasStore, ContactDirectory, ContactStore, StorageError};

use super::file_lock::FileLock;
use super::segment::{SegmentData, SegmentManager};
use super::wal::{WalEntryKind, WriteAheadLog};
use super::PersistentConfig;

const WAL_FILE: &str = "directory.wal";
const SEGMENTS_DIR: &str = "segments";

fn io_err(context: &str, e: &std::io::Error) -> StorageError {
    StorageError::BackendError(format!("{context}: {e}"))
}

/// Re-apply a logged mutation.
///
/// Idempotent, so entries already folded into the loaded segment (a crash
/// between segment commit and WAL truncation) replay harmlessly.
fn apply_wal(state: &mut DirectoryState, kind: WalEntryKind) {
    match kind {
        WalEntryKind::ContactInsert(contact) => {
            if state.contact(contact.id).is_none() {
                state.apply_contact_insert(contact);
            }
        }
        WalEntryKind::AliasInsert(alias) | WalEntryKind::AliasUpdate(alias) => {
            state.apply_alias_upsert(alias);
        }
        WalEntryKind::Provision { contact, alias } => {
            if state.contact(contact.id).is_none() {
                state.apply_contact_insert(contact);
            }
            state.apply_alias_upsert(alias);
        }
        WalEntryKind::Checkpoint { .. } => {}
    }
}

/// Contact directory backed by a write-ahead log and snapshot segments.
///
/// Holds an exclusive lock on its directory for its whole lifetime.
pub struct PersistentDirectory {
    dir: PathBuf,
    _lock: FileLock,
    wal: WriteAheadLog,
    segments: Mutex<SegmentManager>,
    state: RwLock<DirectoryState>,
    config: PersistentConfig,
}

/// Result of a compaction.
#[derive(Debug, Clone)]
pub struct CompactionResult {
    /// Number of WAL entries folded into the segment.
    pub entries_compacted: u64,
    /// Path to the new segment, if one was written.
    pub segment_path: Option<PathBuf>,
    /// WAL size before compaction.
    pub wal_size_before: u64,
    /// WAL size after compaction.
    pub wal_size_after: u64,
}

impl PersistentDirectory {
    /// Open or create a directory at `dir`.
    ///
    /// Loads the newest segment, then replays the WAL on top of it.
    ///
    /// # Errors
    /// `BackendError` if the path cannot be created, another process holds
    /// the lock, or a segment cannot be read.
    pub fn open(dir: &Path, config: PersistentConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(dir).map_err(|e| io_err("failed to create directory", &e))?;
        let lock = FileLock::acquire(dir).map_err(|e| io_err("failed to acquire lock", &e))?;

        let segments = SegmentManager::open(&dir.join(SEGMENTS_DIR))
            .map_err(|e| io_err("failed to open segments", &e))?;
        let (mut state, segment_sequence) = segments
            .load_state()
            .map_err(|e| io_err("failed to load segment", &e))?;

        let wal = WriteAheadLog::open(&dir.join(WAL_FILE), config.sync_on_write)
            .map_err(|e| io_err("failed to open WAL", &e))?;

        let mut replayed = 0u64;
        for entry in wal.iter().map_err(|e| io_err("failed to iterate WAL", &e))? {
            match entry {
                Ok(entry) => {
                    apply_wal(&mut state, entry.kind);
                    replayed += 1;
                }
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "WAL replay stopped at corrupt entry");
                    break;
                }
            }
        }

        info!(
            dir = %dir.display(),
            segment_sequence,
            replayed,
            contacts = state.contact_count(),
            aliases = state.alias_count(),
            "opened contact directory"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            _lock: lock,
            wal,
            segments: Mutex::new(segments),
            state: RwLock::new(state),
            config,
        })
    }

    /// The directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Number of stored contacts.
    ///
    /// # Errors
    /// Returns `BackendError` if the lock is poisoned.
    pub fn contact_count(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("directory.contact_count"))?;
        Ok(state.contact_count())
    }

    /// Number of stored aliases.
    ///
    /// # Errors
    /// Returns `BackendError` if the lock is poisoned.
    pub fn alias_count(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("directory.alias_count"))?;
        Ok(state.alias_count())
    }

    /// Current WAL size in bytes.
    ///
    /// # Errors
    /// Returns `BackendError` if the file cannot be inspected.
    pub fn wal_size(&self) -> Result<u64, StorageError> {
        self.wal.size_bytes().map_err(|e| io_err("failed to stat WAL", &e))
    }

    /// Number of segment files.
    ///
    /// # Errors
    /// Returns `BackendError` if the lock is poisoned.
    pub fn segment_count(&self) -> Result<usize, StorageError> {
        let segments = self.segments.lock().map_err(|_| lock_err("directory.segments"))?;
        Ok(segments.segments().len())
    }

    /// Fold the WAL into a new segment.
    ///
    /// 1. Snapshot the tables (writers are blocked for the duration)
    /// 2. Commit the snapshot as a new segment (temp file + rename)
    /// 3. Append a checkpoint marker, then truncate the WAL
    ///
    /// A failure at any step leaves the WAL intact for the next open.
    ///
    /// # Errors
    /// `BackendError` on I/O failure or a poisoned lock.
    pub fn compact(&self) -> Result<CompactionResult, StorageError> {
        let state = self.state.write().map_err(|_| lock_err("directory.compact"))?;
        let sequence = self
            .wal
            .current_sequence()
            .map_err(|e| io_err("failed to read WAL sequence", &e))?;
        let wal_size_before = self.wal_size()?;
        if sequence == 0 {
            return Ok(CompactionResult {
                entries_compacted: 0,
                segment_path: None,
                wal_size_before,
                wal_size_after: wal_size_before,
            });
        }

        let data = SegmentData::capture(&state);
        let mut segments = self.segments.lock().map_err(|_| lock_err("directory.segments"))?;
        let segment = segments
            .create_writer()
            .commit(&data, sequence)
            .map_err(|e| io_err("failed to write segment", &e))?;
        let segment_path = segment.path().to_path_buf();
        segments
            .install(segment)
            .map_err(|e| io_err("failed to install segment", &e))?;
        drop(segments);

        self.wal
            .append(WalEntryKind::Checkpoint {
                up_to_sequence: sequence,
            })
            .map_err(|e| io_err("failed to write checkpoint", &e))?;
        self.wal
            .truncate()
            .map_err(|e| io_err("failed to truncate WAL", &e))?;
        drop(state);

        let wal_size_after = self.wal_size()?;
        info!(
            entries = sequence,
            wal_size_before,
            wal_size_after,
            segment = %segment_path.display(),
            "compacted contact directory"
        );

        Ok(CompactionResult {
            entries_compacted: sequence,
            segment_path: Some(segment_path),
            wal_size_before,
            wal_size_after,
        })
    }

    /// Log `kind`, then apply it. `check` runs first and vetoes the write.
    fn write(
        &self,
        context: &'static str,
        check: impl FnOnce(&DirectoryState) -> Result<(), StorageError>,
        kind: WalEntryKind,
    ) -> Result<(), StorageError> {
        {
            let mut state = self.state.write().map_err(|_| lock_err(context))?;
            check(&state)?;
            self.wal
                .append(kind.clone())
                .map_err(|e| io_err("failed to append WAL entry", &e))?;
            apply_wal(&mut state, kind);
        }
        self.maybe_compact();
        Ok(())
    }

    fn maybe_compact(&self) {
        let Ok(size) = self.wal.size_bytes() else {
            return;
        };
        if size < self.config.max_wal_size {
            return;
        }
        debug!(size, limit = self.config.max_wal_size, "WAL over size limit");
        // The write already committed; a failed compaction is retried next time.
        if let Err(e) = self.compact() {
            warn!(error = %e, "automatic compaction failed");
        }
    }
}

impl ContactStore for PersistentDirectory {
    fn insert(&self, contact: Contact) -> Result<(), StorageError> {
        self.write(
            "contact.insert",
            |state| state.check_contact_insert(&contact),
            WalEntryKind::ContactInsert(contact.clone()),
        )
    }

    fn get(&self, id: ContactId) -> Result<Option<Contact>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("contact.get"))?;
        Ok(state.contact(id).cloned())
    }

    fn find_in_scope(&self, scope: &Scope) -> Result<Vec<Contact>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("contact.find_in_scope"))?;
        Ok(state.contacts_in(scope))
    }
}

impl AliasStore for PersistentDirectory {
    fn find_in_scope(&self, scope: &Scope) -> Result<Vec<CustomerAlias>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("alias.find_in_scope"))?;
        Ok(state.aliases_in(scope))
    }

    fn find_by_key(&self, key: &AliasKey) -> Result<Option<CustomerAlias>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("alias.find_by_key"))?;
        Ok(state.alias(key).cloned())
    }

    fn insert(&self, alias: CustomerAlias) -> Result<(), StorageError> {
        self.write(
            "alias.insert",
            |state| state.check_alias_insert(&alias),
            WalEntryKind::AliasInsert(alias.clone()),
        )
    }

    fn update(&self, alias: CustomerAlias) -> Result<(), StorageError> {
        self.write(
            "alias.update",
            |state| state.check_alias_update(&alias),
            WalEntryKind::AliasUpdate(alias.clone()),
        )
    }
}

impl ContactDirectory for PersistentDirectory {
    fn contacts(&self) -> &dyn ContactStore {
        self
    }

    fn aliases(&self) -> &dyn AliasStore {
        self
    }

    fn provision(&self, contact: Contact, alias: CustomerAlias) -> Result<(), StorageError> {
        self.write(
            "directory.provision",
            |state| state.check_provision(&contact, &alias),
            WalEntryKind::Provision {
                contact: contact.clone(),
                alias: alias.clone(),
            },
        )
    }
}
