//! Durable storage of the reconciliation status.
//!
//! The supervisor persists once at the end of each tick. Writes carry
//! the revision the caller read; the orchestration layer may have
//! updated the object independently, and a stale write must surface as
//! a conflict the caller retries next tick rather than clobbering.

use crate::status::ReconcileStatus;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("status I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("status serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("write conflict: stored revision {stored}, caller read revision {read}")]
    Conflict { stored: u64, read: u64 },
    #[error("no status stored")]
    Missing,
}

/// A loaded status plus the revision it was read at.
#[derive(Debug, Clone)]
pub struct VersionedStatus {
    pub status: ReconcileStatus,
    pub revision: u64,
}

pub trait StatusStore {
    fn load(&self) -> Result<VersionedStatus, StoreError>;
    /// Persist `status`, asserting the caller last read `read_revision`.
    fn save(&mut self, status: &ReconcileStatus, read_revision: u64) -> Result<u64, StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredDocument {
    revision: u64,
    status: ReconcileStatus,
}

/// JSON-file-backed store. Writes go through a temp file and rename so
/// a crash never leaves a torn document behind.
#[derive(Debug)]
pub struct FileStatusStore {
    path: PathBuf,
}

impl FileStatusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStatusStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Option<StoredDocument>, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl StatusStore for FileStatusStore {
    fn load(&self) -> Result<VersionedStatus, StoreError> {
        match self.read_document()? {
            Some(doc) => Ok(VersionedStatus {
                status: doc.status,
                revision: doc.revision,
            }),
            None => Err(StoreError::Missing),
        }
    }

    fn save(&mut self, status: &ReconcileStatus, read_revision: u64) -> Result<u64, StoreError> {
        let stored = self.read_document()?.map(|d| d.revision).unwrap_or(0);
        if stored != read_revision {
            return Err(StoreError::Conflict {
                stored,
                read: read_revision,
            });
        }
        let doc = StoredDocument {
            revision: stored + 1,
            status: status.clone(),
        };
        let tmp = self.path.with_extension("tmp");
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(&serde_json::to_vec_pretty(&doc)?)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(doc.revision)
    }
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    doc: Option<(u64, ReconcileStatus)>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        MemoryStatusStore::default()
    }
}

impl StatusStore for MemoryStatusStore {
    fn load(&self) -> Result<VersionedStatus, StoreError> {
        match &self.doc {
            Some((rev, status)) => Ok(VersionedStatus {
                status: status.clone(),
                revision: *rev,
            }),
            None => Err(StoreError::Missing),
        }
    }

    fn save(&mut self, status: &ReconcileStatus, read_revision: u64) -> Result<u64, StoreError> {
        let stored = self.doc.as_ref().map(|(r, _)| *r).unwrap_or(0);
        if stored != read_revision {
            return Err(StoreError::Conflict {
                stored,
                read: read_revision,
            });
        }
        let next = stored + 1;
        self.doc = Some((next, status.clone()));
        Ok(next)
    }
}
