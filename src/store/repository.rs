//! In-memory record repository handing out immutable snapshots.
//!
//! Every read returns an `Arc` snapshot and every update clones, mutates
//! the clone, then swaps it in. No caller ever holds an aliased mutable
//! record, so two concurrent reviews of distinct records cannot observe
//! each other's partial state.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::record::AuditRecord;
use crate::store::RecordStore;

#[derive(Default)]
pub struct RecordRepository {
    records: RwLock<HashMap<Uuid, Arc<AuditRecord>>>,
}

impl RecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record, returning the stored snapshot.
    pub async fn insert(&self, record: AuditRecord) -> Arc<AuditRecord> {
        let snapshot = Arc::new(record);
        self.records
            .write()
            .await
            .insert(snapshot.id, Arc::clone(&snapshot));
        snapshot
    }

    /// Current snapshot for a record id.
    pub async fn get(&self, id: Uuid) -> Result<Arc<AuditRecord>, StoreError> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::RecordNotFound { id })
    }

    /// Apply a mutation copy-on-write: the stored snapshot is cloned, the
    /// closure runs against the clone, and the result replaces the old
    /// snapshot. Readers holding the previous `Arc` keep a consistent view.
    pub async fn update<F>(&self, id: Uuid, mutate: F) -> Result<Arc<AuditRecord>, StoreError>
    where
        F: FnOnce(&mut AuditRecord),
    {
        let mut records = self.records.write().await;
        let current = records
            .get(&id)
            .ok_or(StoreError::RecordNotFound { id })?;

        let mut next = AuditRecord::clone(current);
        mutate(&mut next);
        let snapshot = Arc::new(next);
        records.insert(id, Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Delete a whole record.
    pub async fn remove(&self, id: Uuid) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::RecordNotFound { id })
    }

    pub async fn list(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.records.read().await.keys().copied().collect();
        ids.sort();
        ids
    }
}

/// The repository doubles as a `RecordStore` for in-process use: loads hand
/// out owned copies of the current snapshot, saves swap in a new one.
#[async_trait]
impl RecordStore for RecordRepository {
    async fn load(&self, id: Uuid) -> Result<AuditRecord, StoreError> {
        let snapshot = self.get(id).await?;
        Ok(AuditRecord::clone(&snapshot))
    }

    async fn save(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.insert(record.clone()).await;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Uuid>, StoreError> {
        Ok(RecordRepository::list(self).await)
    }
}
