//! Snapshot segments.
//!
//! A segment is an immutable file holding the full directory image as of a
//! WAL sequence number. Compaction writes a new segment and then truncates the
//! log; startup loads the newest segment and replays the log on top.
//!
//! # File Format
//! ```text
//! [MAGIC: 4 bytes][VERSION: 1 byte]
//! [codec-encoded SegmentHeader]
//! [codec-encoded SegmentData]
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Error as IoError, ErrorKind, Result as IoResult, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::alias::CustomerAlias;
use crate::contact::{Contact, ContactId};
use crate::storage::memory::DirectoryState;

use super::codec;

const SEGMENT_PREFIX: &str = "segment_";
const SEGMENT_EXT: &str = "seg";

/// Segment file header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentHeader {
    /// WAL sequence the image is current up to (inclusive).
    pub sequence: u64,
    /// Number of contacts in the image.
    pub contact_count: u64,
    /// Number of aliases in the image.
    pub alias_count: u64,
    /// When the segment was written.
    pub created_at: DateTime<Utc>,
}

/// Full directory image.
///
/// Aliases are keyed by [`crate::alias::AliasKey::fingerprint`], so the
/// unique index survives the JSON encoding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentData {
    /// Contacts by ID.
    pub contacts: BTreeMap<ContactId, Contact>,
    /// Aliases by key fingerprint.
    pub aliases: BTreeMap<String, CustomerAlias>,
}

impl SegmentData {
    pub(crate) fn capture(state: &DirectoryState) -> Self {
        Self {
            contacts: state.all_contacts().map(|c| (c.id, c.clone())).collect(),
            aliases: state
                .all_aliases()
                .map(|a| (a.key().fingerprint(), a.clone()))
                .collect(),
        }
    }

    pub(crate) fn into_state(self) -> DirectoryState {
        DirectoryState::from_records(self.contacts.into_values(), self.aliases.into_values())
    }
}

/// A finalized segment on disk.
#[derive(Debug)]
pub struct Segment {
    id: u32,
    path: PathBuf,
    /// WAL sequence the image is current up to.
    pub sequence: u64,
}

impl Segment {
    /// Open an existing segment and read its header.
    pub fn open(path: &Path, id: u32) -> IoResult<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        codec::read_header(&mut reader)?;
        let header: SegmentHeader = codec::decode(&mut reader)?;
        Ok(Self {
            id,
            path: path.to_path_buf(),
            sequence: header.sequence,
        })
    }

    /// Path to the segment file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the directory image.
    pub fn read_data(&self) -> IoResult<SegmentData> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        codec::read_header(&mut reader)?;
        let _header: SegmentHeader = codec::decode(&mut reader)?;
        codec::decode(&mut reader)
    }
}

/// Writes one segment to a temp file and renames it into place on commit.
pub struct SegmentWriter {
    id: u32,
    temp_path: Option<PathBuf>,
    final_path: PathBuf,
}

impl SegmentWriter {
    fn new(id: u32, final_path: PathBuf) -> Self {
        let temp_path = final_path.with_extension(format!("{SEGMENT_EXT}.tmp.{}", Uuid::new_v4()));
        Self {
            id,
            temp_path: Some(temp_path),
            final_path,
        }
    }

    /// Write, fsync and atomically publish the image.
    ///
    /// The rename is the commit point; a crash before it leaves only a temp
    /// file, which the next [`SegmentManager::open`] removes.
    pub fn commit(mut self, data: &SegmentData, sequence: u64) -> IoResult<Segment> {
        let temp_path = self
            .temp_path
            .take()
            .ok_or_else(|| IoError::new(ErrorKind::Other, "segment writer already consumed"))?;

        let result = (|| {
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)?;
            let mut writer = BufWriter::new(file);
            codec::write_header(&mut writer)?;
            let header = SegmentHeader {
                sequence,
                contact_count: data.contacts.len() as u64,
                alias_count: data.aliases.len() as u64,
                created_at: Utc::now(),
            };
            writer.write_all(&codec::encode(&header)?)?;
            writer.write_all(&codec::encode(data)?)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            fs::rename(&temp_path, &self.final_path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        Ok(Segment {
            id: self.id,
            path: self.final_path.clone(),
            sequence,
        })
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        if let Some(temp_path) = self.temp_path.take() {
            let _ = fs::remove_file(temp_path);
        }
    }
}

fn segment_id(path: &Path) -> Option<u32> {
    if path.extension().and_then(|e| e.to_str()) != Some(SEGMENT_EXT) {
        return None;
    }
    path.file_stem()?
        .to_str()?
        .strip_prefix(SEGMENT_PREFIX)?
        .parse()
        .ok()
}

/// Tracks the segment files of one directory.
#[derive(Debug)]
pub struct SegmentManager {
    dir: PathBuf,
    segments: Vec<Segment>,
    next_segment_id: u32,
}

impl SegmentManager {
    /// Scan `dir` for segments, discarding leftover temp files.
    ///
    /// An unreadable segment older than a readable one was already superseded
    /// and is skipped. If the newest segment is unreadable this fails: the WAL
    /// was truncated when it was written, so nothing else holds that state.
    pub fn open(dir: &Path) -> IoResult<Self> {
        fs::create_dir_all(dir)?;

        let mut segments = Vec::new();
        let mut unreadable: Vec<(u32, PathBuf, IoError)> = Vec::new();
        let mut next_segment_id = 1u32;

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_temp = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.contains(".tmp."));
            if is_temp {
                let _ = fs::remove_file(&path);
                continue;
            }

            let Some(id) = segment_id(&path) else {
                continue;
            };
            next_segment_id = next_segment_id.max(id + 1);
            match Segment::open(&path, id) {
                Ok(segment) => segments.push(segment),
                Err(e) => unreadable.push((id, path, e)),
            }
        }

        segments.sort_by_key(|s| s.id);
        let newest_readable = segments.last().map_or(0, |s| s.id);
        for (id, path, e) in unreadable {
            if id > newest_readable {
                return Err(IoError::new(
                    e.kind(),
                    format!("newest segment {} is unreadable: {e}", path.display()),
                ));
            }
            warn!(path = %path.display(), error = %e, "skipping unreadable superseded segment");
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            segments,
            next_segment_id,
        })
    }

    /// All readable segments, oldest first.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The newest segment, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// Start writing the next segment.
    pub fn create_writer(&mut self) -> SegmentWriter {
        let id = self.next_segment_id;
        self.next_segment_id += 1;
        let path = self.dir.join(format!("{SEGMENT_PREFIX}{id:05}.{SEGMENT_EXT}"));
        SegmentWriter::new(id, path)
    }

    /// Register a committed segment and delete the ones it supersedes.
    pub fn install(&mut self, segment: Segment) -> IoResult<()> {
        for old in self.segments.drain(..) {
            if let Err(e) = fs::remove_file(&old.path) {
                if e.kind() != ErrorKind::NotFound {
                    return Err(e);
                }
            }
        }
        self.segments.push(segment);
        Ok(())
    }

    /// Load the newest image, or an empty state for a fresh directory.
    pub(crate) fn load_state(&self) -> IoResult<(DirectoryState, u64)> {
        match self.latest() {
            Some(segment) => Ok((segment.read_data()?.into_state(), segment.sequence)),
            None => Ok((DirectoryState::default(), 0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;
    use tempfile::tempdir;

    fn sample_state() -> DirectoryState {
        let scope = Scope::parse("t1", Some("c1")).unwrap();
        let contact = Contact::new(scope.clone(), "Acme Pte Ltd");
        let alias = CustomerAlias::new(scope, "ACME PTE. LTD.", contact.id, 1.0, None).unwrap();
        DirectoryState::from_records([contact], [alias])
    }

    #[test]
    fn test_open_empty_dir() {
        let dir = tempdir().unwrap();
        let manager = SegmentManager::open(dir.path()).unwrap();
        assert!(manager.segments().is_empty());

        let (state, sequence) = manager.load_state().unwrap();
        assert_eq!(sequence, 0);
        assert_eq!(state.contact_count(), 0);
    }

    #[test]
    fn test_commit_and_reload() {
        let dir = tempdir().unwrap();
        let mut manager = SegmentManager::open(dir.path()).unwrap();

        let data = SegmentData::capture(&sample_state());
        let segment = manager.create_writer().commit(&data, 7).unwrap();
        assert!(segment.path().to_string_lossy().contains("segment_00001"));
        manager.install(segment).unwrap();

        let reopened = SegmentManager::open(dir.path()).unwrap();
        let (state, sequence) = reopened.load_state().unwrap();
        assert_eq!(sequence, 7);
        assert_eq!(state.contact_count(), 1);
        assert_eq!(state.alias_count(), 1);
    }

    #[test]
    fn test_install_replaces_older_segments() {
        let dir = tempdir().unwrap();
        let mut manager = SegmentManager::open(dir.path()).unwrap();

        let first = manager.create_writer().commit(&SegmentData::default(), 1).unwrap();
        let first_path = first.path().to_path_buf();
        manager.install(first).unwrap();
        let second = manager.create_writer().commit(&SegmentData::default(), 2).unwrap();
        manager.install(second).unwrap();

        assert!(!first_path.exists());
        assert_eq!(manager.segments().len(), 1);
        assert_eq!(manager.latest().unwrap().sequence, 2);
    }

    fn corrupt_header(path: &Path) {
        let mut bytes = fs::read(path).unwrap();
        bytes[12] ^= 0xFF;
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_unreadable_newest_segment_fails_open() {
        let dir = tempdir().unwrap();
        let mut manager = SegmentManager::open(dir.path()).unwrap();
        let data = SegmentData::capture(&sample_state());
        let segment = manager.create_writer().commit(&data, 3).unwrap();
        let path = segment.path().to_path_buf();
        manager.install(segment).unwrap();

        corrupt_header(&path);
        assert!(SegmentManager::open(dir.path()).is_err());
    }

    #[test]
    fn test_unreadable_superseded_segment_is_skipped() {
        let dir = tempdir().unwrap();
        let mut manager = SegmentManager::open(dir.path()).unwrap();
        let data = SegmentData::capture(&sample_state());
        let stale = manager.create_writer().commit(&data, 1).unwrap();
        let stale_path = stale.path().to_path_buf();
        // Registered without `install`, as if deleting it had failed.
        manager.segments.push(stale);
        let newest = manager.create_writer().commit(&data, 2).unwrap();
        manager.segments.push(newest);

        corrupt_header(&stale_path);
        let reopened = SegmentManager::open(dir.path()).unwrap();
        assert_eq!(reopened.segments().len(), 1);
        assert_eq!(reopened.latest().unwrap().sequence, 2);
    }

    #[test]
    fn test_dropped_writer_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let mut manager = SegmentManager::open(dir.path()).unwrap();
        drop(manager.create_writer());

        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
