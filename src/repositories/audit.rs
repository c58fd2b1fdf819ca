//! Append-only audit trail shared by every audited collection.

use std::sync::{Arc, RwLock};

use crate::adapters::PersistenceAdapter;
use crate::error::RepositoryError;
use crate::models::{AuditEntityType, AuditLog};

/// Audit entries in append order. There is no update or delete.
pub struct AuditTrail {
    entries: RwLock<Vec<Arc<AuditLog>>>,
    adapter: Arc<dyn PersistenceAdapter>,
}

impl AuditTrail {
    pub fn new(adapter: Arc<dyn PersistenceAdapter>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            adapter,
        }
    }

    /// Load every entry the adapter holds, replacing what is in memory.
    pub async fn hydrate(&self) -> Result<usize, RepositoryError> {
        let stored = self.adapter.load_audit().await?;
        let loaded = stored.len();
        *self
            .entries
            .write()
            .unwrap_or_else(|poison| poison.into_inner()) =
            stored.into_iter().map(Arc::new).collect();
        Ok(loaded)
    }

    /// Persist `entry`, then make it visible.
    pub async fn append(&self, entry: AuditLog) -> Result<AuditLog, RepositoryError> {
        self.adapter.append_audit(&entry).await?;
        self.entries
            .write()
            .unwrap_or_else(|poison| poison.into_inner())
            .push(Arc::new(entry.clone()));
        Ok(entry)
    }

    /// Every entry, oldest first
    pub fn list(&self) -> Vec<AuditLog> {
        self.read().iter().map(|entry| entry.as_ref().clone()).collect()
    }

    /// Entries for one record, oldest first
    pub fn for_entity(&self, entity_type: AuditEntityType, entity_id: &str) -> Vec<AuditLog> {
        self.read()
            .iter()
            .filter(|entry| entry.entity_type == entity_type && entry.entity_id == entity_id)
            .map(|entry| entry.as_ref().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<AuditLog>>> {
        self.entries
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}
