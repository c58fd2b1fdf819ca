//! Persistence adapter
//!
//! The repository writes through this trait before publishing a change. The
//! in-memory [`MemoryAdapter`] is the default backend and the one used in
//! tests; a database-backed implementation plugs in behind the same trait.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::{AuditLog, EntityKind};

/// Errors raised by a persistence backend
#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    #[error("persistence backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend rejected {kind} {id}: {reason}")]
    Rejected {
        kind: EntityKind,
        id: String,
        reason: String,
    },
    #[error("stored {kind} record is corrupt: {details}")]
    Corrupt { kind: EntityKind, details: String },
}

#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Every stored record of `kind`, in insertion order.
    async fn load_all(&self, kind: EntityKind) -> Result<Vec<Value>, PersistenceError>;

    /// Insert or replace the record with the given id.
    async fn save(&self, kind: EntityKind, id: &str, record: &Value)
    -> Result<(), PersistenceError>;

    /// Delete the record with the given id. Missing ids are not an error.
    async fn remove(&self, kind: EntityKind, id: &str) -> Result<(), PersistenceError>;

    /// Append an audit entry. Entries are never rewritten.
    async fn append_audit(&self, entry: &AuditLog) -> Result<(), PersistenceError>;

    /// Every stored audit entry, oldest first.
    async fn load_audit(&self) -> Result<Vec<AuditLog>, PersistenceError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<EntityKind, Vec<(String, Value)>>,
    audit: Vec<AuditLog>,
}

/// In-process persistence backend.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    state: Mutex<MemoryState>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records of `kind`
    pub fn record_count(&self, kind: EntityKind) -> usize {
        self.lock().records.get(&kind).map_or(0, Vec::len)
    }

    /// Number of stored audit entries
    pub fn audit_count(&self) -> usize {
        self.lock().audit.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryAdapter {
    async fn load_all(&self, kind: EntityKind) -> Result<Vec<Value>, PersistenceError> {
        Ok(self
            .lock()
            .records
            .get(&kind)
            .map(|rows| rows.iter().map(|(_, value)| value.clone()).collect())
            .unwrap_or_default())
    }

    async fn save(
        &self,
        kind: EntityKind,
        id: &str,
        record: &Value,
    ) -> Result<(), PersistenceError> {
        let mut state = self.lock();
        let rows = state.records.entry(kind).or_default();
        match rows.iter_mut().find(|(existing, _)| existing == id) {
            Some((_, stored)) => *stored = record.clone(),
            None => rows.push((id.to_string(), record.clone())),
        }
        Ok(())
    }

    async fn remove(&self, kind: EntityKind, id: &str) -> Result<(), PersistenceError> {
        if let Some(rows) = self.lock().records.get_mut(&kind) {
            rows.retain(|(existing, _)| existing != id);
        }
        Ok(())
    }

    async fn append_audit(&self, entry: &AuditLog) -> Result<(), PersistenceError> {
        self.lock().audit.push(entry.clone());
        Ok(())
    }

    async fn load_audit(&self) -> Result<Vec<AuditLog>, PersistenceError> {
        Ok(self.lock().audit.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_upserts_in_insertion_order() {
        let adapter = MemoryAdapter::new();
        adapter
            .save(EntityKind::School, "SCH-001", &json!({"id": "SCH-001", "v": 1}))
            .await
            .unwrap();
        adapter
            .save(EntityKind::School, "SCH-002", &json!({"id": "SCH-002"}))
            .await
            .unwrap();
        adapter
            .save(EntityKind::School, "SCH-001", &json!({"id": "SCH-001", "v": 2}))
            .await
            .unwrap();

        let rows = adapter.load_all(EntityKind::School).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["v"], 2);
        assert_eq!(rows[1]["id"], "SCH-002");
        assert_eq!(adapter.record_count(EntityKind::Issue), 0);

        adapter.remove(EntityKind::School, "SCH-001").await.unwrap();
        adapter.remove(EntityKind::School, "SCH-404").await.unwrap();
        let rows = adapter.load_all(EntityKind::School).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "SCH-002");
    }
}
