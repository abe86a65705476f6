//! Persistence collaborators: record store and evidence store.
//!
//! The core only depends on the traits here; the file-backed
//! implementations are the defaults used by the CLI. Records are written
//! as pretty JSON, one file per record id. Evidence blobs are
//! content-addressed by their SHA-256 so re-submitting the same document
//! is a no-op.

pub mod repository;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::record::AuditRecord;

/// Opaque reference to one stored evidence document. The core never looks
/// inside; it only threads references between the stores and the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceRef(String);

impl EvidenceRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EvidenceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage for opaque evidence blobs.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    async fn resolve(&self, reference: &EvidenceRef) -> Result<Vec<u8>, StoreError>;
    async fn store(&self, bytes: &[u8]) -> Result<EvidenceRef, StoreError>;
}

/// Durable storage for audit records, called after every successful merge.
/// Assumed at-least-once durable; saving the same record twice is harmless.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn load(&self, id: Uuid) -> Result<AuditRecord, StoreError>;
    async fn save(&self, record: &AuditRecord) -> Result<(), StoreError>;
    async fn list(&self) -> Result<Vec<Uuid>, StoreError>;
}

/// Record store writing one pretty-printed JSON file per record.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn record_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::WriteFailed {
            path: self.dir.clone(),
            source,
        })
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn load(&self, id: Uuid) -> Result<AuditRecord, StoreError> {
        let path = self.record_path(id);
        if !path.exists() {
            return Err(StoreError::RecordNotFound { id });
        }
        let content = fs::read_to_string(&path).map_err(|source| StoreError::ReadFailed {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| StoreError::DecodeFailed { path, source })
    }

    async fn save(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.ensure_dir()?;
        let path = self.record_path(record.id);
        let content = serde_json::to_string_pretty(record).map_err(|source| {
            StoreError::EncodeFailed {
                id: record.id,
                source,
            }
        })?;
        fs::write(&path, content).map_err(|source| StoreError::WriteFailed { path, source })
    }

    async fn list(&self) -> Result<Vec<Uuid>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).map_err(|source| StoreError::ReadFailed {
            path: self.dir.clone(),
            source,
        })?;

        let mut ids: Vec<Uuid> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                name.strip_suffix(".json")?.parse().ok()
            })
            .collect();
        ids.sort();
        Ok(ids)
    }
}

/// Evidence store keeping blobs on disk, addressed by content hash.
pub struct FsEvidenceStore {
    dir: PathBuf,
}

impl FsEvidenceStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn blob_path(&self, reference: &EvidenceRef) -> PathBuf {
        self.dir.join(reference.as_str())
    }
}

#[async_trait]
impl EvidenceStore for FsEvidenceStore {
    async fn resolve(&self, reference: &EvidenceRef) -> Result<Vec<u8>, StoreError> {
        let path = self.blob_path(reference);
        if !path.exists() {
            return Err(StoreError::EvidenceNotFound {
                reference: reference.as_str().to_string(),
            });
        }
        fs::read(&path).map_err(|source| StoreError::ReadFailed { path, source })
    }

    async fn store(&self, bytes: &[u8]) -> Result<EvidenceRef, StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::WriteFailed {
            path: self.dir.clone(),
            source,
        })?;

        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let reference = EvidenceRef::new(format!("{:x}", hasher.finalize()));

        let path = self.blob_path(&reference);
        if !path.exists() {
            fs::write(&path, bytes).map_err(|source| StoreError::WriteFailed { path, source })?;
        }
        Ok(reference)
    }
}
