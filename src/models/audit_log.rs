//! Audit log model
//!
//! Immutable record of a single mutation. Entries are only ever appended.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{Actor, EntityKind};

string_enum! {
    pub enum AuditEntityType ("audit entity type") {
        School => "school",
        Issue => "issue",
        Shipping => "shipping",
    }
}

string_enum! {
    pub enum AuditAction ("audit action") {
        Create => "create",
        Update => "update",
        Delete => "delete",
    }
}

impl AuditEntityType {
    /// Audited counterpart of an entity collection; users are not audited.
    pub fn for_kind(kind: EntityKind) -> Option<Self> {
        match kind {
            EntityKind::School => Some(AuditEntityType::School),
            EntityKind::Issue => Some(AuditEntityType::Issue),
            EntityKind::Shipping => Some(AuditEntityType::Shipping),
            EntityKind::User => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: String,
    pub entity_type: AuditEntityType,
    pub entity_id: String,
    pub action: AuditAction,
    /// Field name to new value
    pub changes: BTreeMap<String, Value>,
    pub user_id: String,
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditLog {
    pub fn new(
        entity_type: AuditEntityType,
        entity_id: impl Into<String>,
        action: AuditAction,
        changes: BTreeMap<String, Value>,
        actor: &Actor,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            entity_type,
            entity_id: entity_id.into(),
            action,
            changes,
            user_id: actor.user_id.clone(),
            user_name: actor.user_name.clone(),
            timestamp,
        }
    }
}

/// Top-level fields of `after` whose value differs from `before`.
///
/// Bookkeeping fields that change on every write are left out.
pub fn changed_fields(before: &Value, after: &Value) -> BTreeMap<String, Value> {
    const IGNORED: &[&str] = &["updatedAt", "updatedBy", "createdAt", "createdBy", "lastUpdate"];

    let mut changes = BTreeMap::new();
    let Some(after) = after.as_object() else {
        return changes;
    };
    let empty = serde_json::Map::new();
    let before = before.as_object().unwrap_or(&empty);

    for (field, value) in after {
        if IGNORED.contains(&field.as_str()) {
            continue;
        }
        if before.get(field) != Some(value) {
            changes.insert(field.clone(), value.clone());
        }
    }
    // Fields cleared by the write (skipped when serializing `None`)
    for field in before.keys() {
        if !after.contains_key(field) && !IGNORED.contains(&field.as_str()) {
            changes.insert(field.clone(), Value::Null);
        }
    }
    changes
}
