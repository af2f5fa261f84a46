// src/consolidation/store.rs
// Golden Record Store: one versioned JSON snapshot, replaced by write-to-temp + atomic rename.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::Builder;

use crate::error::{CoreError, CoreResult};
use crate::models::GoldenRecord;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;
/// Generation reported for a store that has never been written.
pub const EMPTY_GENERATION: &str = "empty";

/// The full persisted state. `generation` is the sha256 of the serialized records, so
/// identical record sets always produce identical files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenSnapshot {
    pub format_version: u32,
    pub generation: String,
    pub record_count: usize,
    pub records: Vec<GoldenRecord>,
}

impl GoldenSnapshot {
    pub fn empty() -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            generation: EMPTY_GENERATION.to_string(),
            record_count: 0,
            records: Vec::new(),
        }
    }

    /// Snapshot for `records` as it would be published: sorted by id with its content
    /// generation computed, without touching disk.
    pub fn from_records(mut records: Vec<GoldenRecord>) -> Result<Self, serde_json::Error> {
        records.sort_by(|a, b| a.id.cmp(&b.id));
        let generation = generation_of(&records)?;
        Ok(Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            generation,
            record_count: records.len(),
            records,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// What a caller needs to know about a published snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotInfo {
    pub path: PathBuf,
    pub generation: String,
    pub record_count: usize,
    pub bytes: usize,
}

fn generation_of(records: &[GoldenRecord]) -> Result<String, serde_json::Error> {
    let payload = serde_json::to_vec(records)?;
    let mut hasher = Sha256::new();
    hasher.update(&payload);
    Ok(hex::encode(hasher.finalize()))
}

/// Owner of the canonical snapshot path. `replace` is the only writer and `read` the only reader.
#[derive(Debug, Clone)]
pub struct GoldenRecordStore {
    path: PathBuf,
}

impl GoldenRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Publishes `records` as the new snapshot. On any failure the previous snapshot is untouched.
    pub fn replace(&self, records: Vec<GoldenRecord>) -> CoreResult<SnapshotInfo> {
        let snapshot = GoldenSnapshot::from_records(records).map_err(|e| CoreError::StoreWriteFailed {
            path: self.path.clone(),
            source: e.into(),
        })?;
        self.replace_snapshot(&snapshot)
    }

    /// Publishes an already assembled snapshot.
    pub fn replace_snapshot(&self, snapshot: &GoldenSnapshot) -> CoreResult<SnapshotInfo> {
        self.replace_snapshot_with_writer(snapshot, |file, payload| {
            file.write_all(payload)?;
            file.sync_all()
        })
    }

    /// Like [`replace`](Self::replace), with the byte-level write to the temporary file supplied
    /// by the caller.
    pub fn replace_with_writer<F>(&self, records: Vec<GoldenRecord>, write: F) -> CoreResult<SnapshotInfo>
    where
        F: FnOnce(&mut File, &[u8]) -> io::Result<()>,
    {
        let snapshot = GoldenSnapshot::from_records(records).map_err(|e| CoreError::StoreWriteFailed {
            path: self.path.clone(),
            source: e.into(),
        })?;
        self.replace_snapshot_with_writer(&snapshot, write)
    }

    fn replace_snapshot_with_writer<F>(&self, snapshot: &GoldenSnapshot, write: F) -> CoreResult<SnapshotInfo>
    where
        F: FnOnce(&mut File, &[u8]) -> io::Result<()>,
    {
        let write_failed = |source: io::Error| CoreError::StoreWriteFailed {
            path: self.path.clone(),
            source,
        };

        let mut payload = serde_json::to_vec_pretty(snapshot).map_err(|e| write_failed(e.into()))?;
        payload.push(b'\n');

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(write_failed)?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "golden_records".to_string());
        let mut temp = Builder::new()
            .prefix(&format!(".{}.", file_name))
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(write_failed)?;
        debug!("Writing snapshot to temporary file {}", temp.path().display());

        if let Err(e) = write(temp.as_file_mut(), &payload) {
            warn!(
                "Snapshot write to {} failed: {}. Previous snapshot kept.",
                temp.path().display(),
                e
            );
            // dropping `temp` removes the partial file
            return Err(write_failed(e));
        }

        temp.persist(&self.path).map_err(|e| write_failed(e.error))?;
        if let Ok(dir_handle) = File::open(&dir) {
            if let Err(e) = dir_handle.sync_all() {
                debug!("Could not fsync {}: {}", dir.display(), e);
            }
        }

        let info = SnapshotInfo {
            path: self.path.clone(),
            generation: snapshot.generation.clone(),
            record_count: snapshot.record_count,
            bytes: payload.len(),
        };
        info!(
            "Published {} golden records to {} (generation {}, {} bytes)",
            info.record_count,
            info.path.display(),
            &info.generation[..12.min(info.generation.len())],
            info.bytes
        );
        Ok(info)
    }

    /// Current snapshot. A store that was never written reads as empty.
    pub fn read(&self) -> CoreResult<GoldenSnapshot> {
        let read_failed = |reason: String| CoreError::StoreReadFailed {
            path: self.path.clone(),
            reason,
        };

        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No snapshot at {}; reading as empty", self.path.display());
                return Ok(GoldenSnapshot::empty());
            }
            Err(e) => return Err(read_failed(e.to_string())),
        };

        let snapshot: GoldenSnapshot =
            serde_json::from_slice(&bytes).map_err(|e| read_failed(format!("malformed snapshot: {}", e)))?;

        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(read_failed(format!(
                "unsupported format version {} (expected {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        if snapshot.record_count != snapshot.records.len() {
            return Err(read_failed(format!(
                "record count {} does not match {} stored records",
                snapshot.record_count,
                snapshot.records.len()
            )));
        }
        if snapshot.records.is_empty() && snapshot.generation == EMPTY_GENERATION {
            return Ok(snapshot);
        }
        let actual = generation_of(&snapshot.records).map_err(|e| read_failed(e.to_string()))?;
        if actual != snapshot.generation {
            return Err(read_failed(format!(
                "generation {} does not match payload hash {}",
                snapshot.generation, actual
            )));
        }
        Ok(snapshot)
    }
}
