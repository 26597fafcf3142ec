//! Durable storage backend.
//!
//! Crash-safe contact directory with:
//! - Write-ahead logging for crash recovery
//! - File locking for single-process access
//! - CRC32 checksums for corruption detection
//! - Snapshot segments for bounded recovery time
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    PersistentDirectory                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌──────────────┐  │
//! │  │ WriteAheadLog   │  │ SegmentManager  │  │ tables       │  │
//! │  │ (append-only)   │  │ (snapshots)     │  │ (RwLock)     │  │
//! │  └────────┬────────┘  └────────┬────────┘  └──────────────┘  │
//! │           └──────────┬─────────┘                             │
//! │                      ↓                                       │
//! │           ┌─────────────────────┐                            │
//! │           │   FileLock (flock)  │                            │
//! │           └─────────────────────┘                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod codec;
mod file_lock;
mod segment;
mod stores;
mod wal;

pub use file_lock::FileLock;
pub use segment::{Segment, SegmentManager};
pub use stores::{CompactionResult, PersistentDirectory};
pub use wal::{WalEntry, WalEntryKind, WriteAheadLog};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ResolverError, ValidationError};

/// Configuration for durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistentConfig {
    /// WAL size (bytes) at which a write triggers compaction.
    pub max_wal_size: u64,
    /// Whether to fsync after every write.
    pub sync_on_write: bool,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            max_wal_size: 64 * 1024 * 1024,
            sync_on_write: true,
        }
    }
}

impl PersistentConfig {
    const MIN_WAL_SIZE: u64 = 4 * 1024;

    /// Validate sizes.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidConfig` if `max_wal_size` is below 4 KiB,
    /// which would compact on nearly every write.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.max_wal_size < Self::MIN_WAL_SIZE {
            return Err(ValidationError::InvalidConfig {
                reason: format!(
                    "max_wal_size must be at least {} bytes (got {})",
                    Self::MIN_WAL_SIZE,
                    self.max_wal_size
                ),
            });
        }
        Ok(self)
    }
}

/// Open or create a durable contact directory at `path`.
///
/// # Errors
/// - `Validation` if the configuration is invalid
/// - `StoreUnavailable` if the path cannot be used or another process holds the lock
///
/// # Example
/// ```rust,ignore
/// use std::sync::Arc;
/// use contact_resolution::storage::persistent::open_database;
/// use contact_resolution::ResolutionEngine;
///
/// let directory = open_database("./contacts.db", None)?;
/// let engine = ResolutionEngine::new(Arc::new(directory));
/// ```
pub fn open_database(
    path: impl AsRef<Path>,
    config: Option<PersistentConfig>,
) -> Result<PersistentDirectory, ResolverError> {
    let config = config.unwrap_or_default().validate()?;
    Ok(PersistentDirectory::open(path.as_ref(), config)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_rejects_tiny_wal() {
        let config = PersistentConfig {
            max_wal_size: 16,
            ..PersistentConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidConfig { .. })
        ));
        assert!(PersistentConfig::default().validate().is_ok());
    }

    #[test]
    fn test_open_database_validates_first() {
        let tmp = tempfile::tempdir().unwrap();
        let config = PersistentConfig {
            max_wal_size: 1,
            sync_on_write: false,
        };
        let err = open_database(tmp.path(), Some(config)).err().unwrap();
        assert!(err.is_validation());
    }
}
