//! Test utilities for service-level testing.
//!
//! Builds a [`DashboardService`] over an in-memory backend with a fixed clock,
//! optionally seeded with the sample dataset.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use school_ops::adapters::{
    MemoryAdapter, PersistenceAdapter, PersistenceError, TrackingAdapter, TrackingError,
    TrackingUpdate, UnconfiguredTracking,
};
use school_ops::clock::FixedClock;
use school_ops::models::{Actor, AuditLog, Courier, EntityKind};
use school_ops::seeds::seed_sample_data;
use school_ops::service::{DashboardService, ServiceSettings};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// 2024-03-20 12:00 UTC, the day after the newest sample issue was reported.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap()
}

pub fn ops_actor() -> Actor {
    Actor::new("USR-001", "Ops Admin")
}

/// Service plus handles on its collaborators.
pub struct TestService {
    pub service: DashboardService,
    pub adapter: Arc<MemoryAdapter>,
    pub clock: Arc<FixedClock>,
}

pub fn empty_service() -> TestService {
    service_with_tracking(Arc::new(UnconfiguredTracking))
}

pub fn service_with_tracking(tracking: Arc<dyn TrackingAdapter>) -> TestService {
    let adapter = Arc::new(MemoryAdapter::new());
    let clock = Arc::new(FixedClock::new(test_now()));
    let service = DashboardService::new(
        ServiceSettings::default(),
        adapter.clone(),
        tracking,
        clock.clone(),
    );
    TestService {
        service,
        adapter,
        clock,
    }
}

/// Service holding the five sample schools, six issues and four shipments.
pub async fn seeded_service() -> Result<TestService> {
    let test = empty_service();
    seed_sample_data(&test.service, &Actor::new("USR-000", "System")).await?;
    Ok(test)
}

/// Memory backend whose writes can be switched to fail.
#[derive(Default)]
pub struct FlakyAdapter {
    inner: MemoryAdapter,
    fail_saves: AtomicBool,
    fail_audit: AtomicBool,
}

impl FlakyAdapter {
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_audit(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PersistenceAdapter for FlakyAdapter {
    async fn load_all(&self, kind: EntityKind) -> Result<Vec<Value>, PersistenceError> {
        self.inner.load_all(kind).await
    }

    async fn save(
        &self,
        kind: EntityKind,
        id: &str,
        record: &Value,
    ) -> Result<(), PersistenceError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("database offline".to_string()));
        }
        self.inner.save(kind, id, record).await
    }

    async fn remove(&self, kind: EntityKind, id: &str) -> Result<(), PersistenceError> {
        self.inner.remove(kind, id).await
    }

    async fn append_audit(&self, entry: &AuditLog) -> Result<(), PersistenceError> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("audit store offline".to_string()));
        }
        self.inner.append_audit(entry).await
    }

    async fn load_audit(&self) -> Result<Vec<AuditLog>, PersistenceError> {
        self.inner.load_audit().await
    }
}

/// Tracking backend answering from a fixed table keyed by tracking number.
#[derive(Default)]
pub struct ScriptedTracking {
    updates: Mutex<HashMap<String, TrackingUpdate>>,
}

impl ScriptedTracking {
    pub fn report(&self, tracking_number: &str, update: TrackingUpdate) {
        self.updates
            .lock()
            .unwrap()
            .insert(tracking_number.to_string(), update);
    }
}

#[async_trait]
impl TrackingAdapter for ScriptedTracking {
    fn supports(&self, courier: Courier) -> bool {
        matches!(courier, Courier::Dtdc | Courier::Speedair)
    }

    async fn fetch_status(
        &self,
        courier: Courier,
        tracking_number: &str,
    ) -> Result<TrackingUpdate, TrackingError> {
        if !self.supports(courier) {
            return Err(TrackingError::NotConfigured { courier });
        }
        self.updates
            .lock()
            .unwrap()
            .get(tracking_number)
            .cloned()
            .ok_or_else(|| TrackingError::UnknownShipment {
                tracking_number: tracking_number.to_string(),
            })
    }
}

/// Tracking backend that parks every lookup until the test releases it.
pub struct GatedTracking {
    update: TrackingUpdate,
    pub fetched: Notify,
    pub release: Notify,
}

impl GatedTracking {
    pub fn new(update: TrackingUpdate) -> Self {
        Self {
            update,
            fetched: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl TrackingAdapter for GatedTracking {
    fn supports(&self, _courier: Courier) -> bool {
        true
    }

    async fn fetch_status(
        &self,
        _courier: Courier,
        _tracking_number: &str,
    ) -> Result<TrackingUpdate, TrackingError> {
        self.fetched.notify_one();
        self.release.notified().await;
        Ok(self.update.clone())
    }
}
