//! # Repository Layer
//!
//! Generic in-memory repository shared by every entity collection, plus the
//! append-only audit trail.
//!
//! Writes on a collection are serialized by an async write gate and are
//! persisted through the [`PersistenceAdapter`] before the new state is
//! published. A save whose audit append fails is undone through the adapter.
//! Readers take the currently published version, an immutable
//! `Arc`, so they never see a half-applied update and never wait on adapter
//! I/O.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::adapters::{PersistenceAdapter, PersistenceError};
use crate::clock::Clock;
use crate::error::RepositoryError;
use crate::models::audit_log::changed_fields;
use crate::models::{Actor, AuditAction, AuditEntityType, AuditLog, EntityKind};

pub mod audit;
pub mod issue;
pub mod school;
pub mod shipping;
pub mod user;

pub use audit::AuditTrail;
pub use issue::IssueRepository;
pub use school::SchoolRepository;
pub use shipping::ShippingRepository;
pub use user::UserRepository;

/// A value that must be unique across a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueKey {
    pub field: &'static str,
    pub value: String,
}

impl UniqueKey {
    pub fn new(field: &'static str, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }
}

/// A record type stored by [`Repository`].
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;
    /// Prefix of generated ids, e.g. `ISS` for `ISS-007`.
    const ID_PREFIX: &'static str;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn stamp_created(&mut self, actor: &Actor, now: DateTime<Utc>);
    fn stamp_updated(&mut self, actor: &Actor, now: DateTime<Utc>);

    /// Fill lifecycle fields implied by the initial state before validation.
    fn prepare_create(&mut self, _now: DateTime<Utc>) -> Result<(), RepositoryError> {
        Ok(())
    }

    /// Check every write-time invariant.
    fn validate(&self) -> Result<(), RepositoryError>;

    fn unique_keys(&self) -> Vec<UniqueKey> {
        Vec::new()
    }
}

/// A partial update of `E`.
pub trait Patch<E>: Send {
    /// Merge onto `record`, enforcing state-machine guards against its current values.
    fn apply(self, record: &mut E, now: DateTime<Utc>) -> Result<(), RepositoryError>;
}

/// One published state of a collection.
struct Version<E> {
    order: Vec<Arc<E>>,
    index: HashMap<String, usize>,
}

impl<E: Entity> Version<E> {
    fn empty() -> Self {
        Self {
            order: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn get(&self, id: &str) -> Option<&Arc<E>> {
        self.index.get(id).map(|position| &self.order[*position])
    }

    fn with_inserted(&self, record: E) -> Self {
        let mut order = self.order.clone();
        let mut index = self.index.clone();
        index.insert(record.id().to_string(), order.len());
        order.push(Arc::new(record));
        Self { order, index }
    }

    fn with_replaced(&self, record: E) -> Self {
        let mut order = self.order.clone();
        if let Some(position) = self.index.get(record.id()) {
            order[*position] = Arc::new(record);
        }
        Self {
            order,
            index: self.index.clone(),
        }
    }
}

/// Lazy iterator over the collection as published when it was created.
pub struct Records<E> {
    version: Arc<Version<E>>,
    position: usize,
}

impl<E> Clone for Records<E> {
    fn clone(&self) -> Self {
        Self {
            version: self.version.clone(),
            position: self.position,
        }
    }
}

impl<E> Iterator for Records<E> {
    type Item = Arc<E>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.version.order.get(self.position)?.clone();
        self.position += 1;
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.version.order.len().saturating_sub(self.position);
        (0, Some(remaining))
    }
}

/// In-memory repository for one entity collection.
pub struct Repository<E: Entity> {
    current: RwLock<Arc<Version<E>>>,
    /// Serializes writers; holds the id sequence.
    write_gate: Mutex<u64>,
    adapter: Arc<dyn PersistenceAdapter>,
    audit: Arc<AuditTrail>,
    clock: Arc<dyn Clock>,
}

impl<E: Entity> Repository<E> {
    pub fn new(
        adapter: Arc<dyn PersistenceAdapter>,
        audit: Arc<AuditTrail>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            current: RwLock::new(Arc::new(Version::empty())),
            write_gate: Mutex::new(0),
            adapter,
            audit,
            clock,
        }
    }

    /// Replace the in-memory state with everything the adapter holds.
    pub async fn hydrate(&self) -> Result<usize, RepositoryError> {
        let _gate = self.write_gate.lock().await;
        let rows = self.adapter.load_all(E::KIND).await?;

        let mut version = Version::empty();
        for row in rows {
            let record: E = serde_json::from_value(row).map_err(|err| PersistenceError::Corrupt {
                kind: E::KIND,
                details: err.to_string(),
            })?;
            record.validate()?;
            if version.get(record.id()).is_some() {
                return Err(PersistenceError::Corrupt {
                    kind: E::KIND,
                    details: format!("duplicate id {}", record.id()),
                }
                .into());
            }
            version = version.with_inserted(record);
        }

        let loaded = version.order.len();
        self.publish(version);
        Ok(loaded)
    }

    /// Fetch a record by id
    pub fn get(&self, id: &str) -> Result<E, RepositoryError> {
        self.snapshot()
            .get(id)
            .map(|record| record.as_ref().clone())
            .ok_or_else(|| RepositoryError::not_found(E::KIND.label(), id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.snapshot().get(id).is_some()
    }

    /// Every record in insertion order
    pub fn list(&self) -> Vec<E> {
        self.iter().map(|record| record.as_ref().clone()).collect()
    }

    /// Lazy iteration over the current state
    pub fn iter(&self) -> Records<E> {
        Records {
            version: self.snapshot(),
            position: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a new record, assigning an id when none is given.
    pub async fn create(&self, mut entity: E, actor: &Actor) -> Result<E, RepositoryError> {
        let mut sequence = self.write_gate.lock().await;
        let current = self.snapshot();
        let now = self.clock.now();

        let id = entity.id().trim().to_string();
        let mut next_sequence = *sequence;
        if id.is_empty() {
            let (generated, used) = next_id::<E>(&current, *sequence);
            entity.set_id(generated);
            next_sequence = used;
        } else if current.get(&id).is_some() {
            return Err(RepositoryError::conflict(format!(
                "{} {} already exists",
                E::KIND.label(),
                id
            )));
        } else {
            entity.set_id(id);
        }

        entity.stamp_created(actor, now);
        entity.prepare_create(now)?;
        entity.validate()?;
        check_unique(&current, &entity)?;

        let record = to_record(&entity)?;
        self.adapter.save(E::KIND, entity.id(), &record).await?;
        if let Err(err) = self
            .record_audit(entity.id(), AuditAction::Create, &Value::Null, &record, actor, now)
            .await
        {
            self.undo_save(entity.id(), None).await;
            return Err(err);
        }

        self.publish(current.with_inserted(entity.clone()));
        *sequence = next_sequence;
        Ok(entity)
    }

    /// Merge `patch` onto the stored record. On any failure the stored record is untouched.
    pub async fn update<P: Patch<E>>(
        &self,
        id: &str,
        patch: P,
        actor: &Actor,
    ) -> Result<E, RepositoryError> {
        let _gate = self.write_gate.lock().await;
        let current = self.snapshot();
        let now = self.clock.now();

        let existing = current
            .get(id)
            .ok_or_else(|| RepositoryError::not_found(E::KIND.label(), id))?;

        let mut updated = existing.as_ref().clone();
        patch.apply(&mut updated, now)?;
        updated.stamp_updated(actor, now);
        updated.validate()?;
        check_unique(&current, &updated)?;

        let before = to_record(existing.as_ref())?;
        let after = to_record(&updated)?;
        self.adapter.save(E::KIND, id, &after).await?;
        if let Err(err) = self
            .record_audit(id, AuditAction::Update, &before, &after, actor, now)
            .await
        {
            self.undo_save(id, Some(&before)).await;
            return Err(err);
        }

        self.publish(current.with_replaced(updated.clone()));
        Ok(updated)
    }

    async fn record_audit(
        &self,
        id: &str,
        action: AuditAction,
        before: &Value,
        after: &Value,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let Some(entity_type) = AuditEntityType::for_kind(E::KIND) else {
            return Ok(());
        };
        let entry = AuditLog::new(
            entity_type,
            id,
            action,
            changed_fields(before, after),
            actor,
            now,
        );
        self.audit.append(entry).await?;
        Ok(())
    }

    /// Put the backend back to `before`, or drop the row when there was none.
    async fn undo_save(&self, id: &str, before: Option<&Value>) {
        let restored = match before {
            Some(before) => self.adapter.save(E::KIND, id, before).await,
            None => self.adapter.remove(E::KIND, id).await,
        };
        if let Err(err) = restored {
            let kind = E::KIND;
            tracing::error!(
                kind = %kind,
                id,
                error = %err,
                "failed to roll back unaudited write; backend may diverge until the next hydrate"
            );
        }
    }

    fn snapshot(&self) -> Arc<Version<E>> {
        self.current
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }

    fn publish(&self, version: Version<E>) {
        *self
            .current
            .write()
            .unwrap_or_else(|poison| poison.into_inner()) = Arc::new(version);
    }
}

/// The next free id after `sequence`, with the sequence value it consumes.
fn next_id<E: Entity>(current: &Version<E>, mut sequence: u64) -> (String, u64) {
    loop {
        sequence += 1;
        let candidate = format!("{}-{:03}", E::ID_PREFIX, sequence);
        if current.get(&candidate).is_none() {
            return (candidate, sequence);
        }
    }
}

fn check_unique<E: Entity>(current: &Version<E>, entity: &E) -> Result<(), RepositoryError> {
    let keys = entity.unique_keys();
    if keys.is_empty() {
        return Ok(());
    }
    for other in current.order.iter().filter(|other| other.id() != entity.id()) {
        let taken = other.unique_keys();
        if let Some(key) = keys.iter().find(|key| taken.contains(key)) {
            return Err(RepositoryError::conflict(format!(
                "{} {} is already used by {} {}",
                key.field,
                key.value,
                E::KIND.label(),
                other.id()
            )));
        }
    }
    Ok(())
}

fn to_record<E: Entity>(entity: &E) -> Result<Value, RepositoryError> {
    serde_json::to_value(entity).map_err(|err| {
        RepositoryError::Upstream(format!(
            "failed to encode {} {}: {}",
            E::KIND.label(),
            entity.id(),
            err
        ))
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::adapters::MemoryAdapter;
    use crate::clock::FixedClock;

    pub(crate) struct Harness {
        pub adapter: Arc<MemoryAdapter>,
        pub audit: Arc<AuditTrail>,
        pub clock: Arc<FixedClock>,
    }

    impl Harness {
        pub(crate) fn new() -> Self {
            let adapter = Arc::new(MemoryAdapter::new());
            let audit = Arc::new(AuditTrail::new(adapter.clone()));
            let clock = Arc::new(FixedClock::new(
                Utc.with_ymd_and_hms(2024, 3, 20, 9, 0, 0).unwrap(),
            ));
            Self {
                adapter,
                audit,
                clock,
            }
        }

        pub(crate) fn repository<E: Entity>(&self) -> Repository<E> {
            Repository::new(self.adapter.clone(), self.audit.clone(), self.clock.clone())
        }
    }

    pub(crate) fn actor() -> Actor {
        Actor::new("USR-001", "Ops Admin")
    }
}
