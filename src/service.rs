//! # Dashboard Service
//!
//! Inbound contract of the core. Owns one repository per collection, the
//! shared audit trail, the stats service and the outbound adapters, and adds
//! what a single repository cannot check on its own:
//!
//! - an issue must reference an existing school
//! - a shipment must reference an existing hardware issue
//! - read views carry joined fields (school name, ticket aging, the linked
//!   shipment) computed at read time
//!
//! Every write emits a `tracing` debug event and the `entity_writes_total` /
//! `entity_write_failures_total` counters.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::adapters::{
    CourierIntegration, MemoryAdapter, PersistenceAdapter, TrackingAdapter, UnconfiguredTracking,
    courier_integrations,
};
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::error::RepositoryError;
use crate::models::{
    Actor, AuditAction, AuditEntityType, AuditLog, EntityKind, Issue, IssuePatch, IssueType,
    School, SchoolPatch, ShippingPatch, ShippingStatus, User, UserPatch,
};
use crate::query::{Filters, Joins, Matches, Query, search};
use crate::repositories::{
    AuditTrail, Entity, IssueRepository, Repository, SchoolRepository, ShippingRepository,
    UserRepository,
};
use crate::stats::{HeadlineStat, Metrics, Snapshot, SnapshotScheduler, StatsKind, StatsService};

/// Tunables the service takes from [`AppConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    pub aging_thresholds_days: Vec<u32>,
    pub snapshot_retention: usize,
    pub snapshot_interval: Duration,
    pub recent_issues_limit: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            aging_thresholds_days: vec![3, 7],
            snapshot_retention: 90,
            snapshot_interval: Duration::from_secs(86_400),
            recent_issues_limit: 5,
        }
    }
}

impl From<&AppConfig> for ServiceSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            aging_thresholds_days: config.aging_thresholds_days.clone(),
            snapshot_retention: config.snapshots.retention,
            snapshot_interval: Duration::from_secs(config.snapshots.interval_seconds),
            recent_issues_limit: config.recent_issues_limit,
        }
    }
}

/// A school as shown in the schools table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolView {
    #[serde(flatten)]
    pub school: School,
    pub serials_reconciled: bool,
    pub pending_deliveries: u32,
}

impl SchoolView {
    fn new(school: School) -> Self {
        Self {
            serials_reconciled: school.serials_reconciled(),
            pending_deliveries: school.pending_deliveries(),
            school,
        }
    }
}

/// An issue with its derived and joined fields.
///
/// Serializes as the issue plus `schoolName`, `ticketAging` and, when a
/// shipment exists, `hardwareDetails.shippingStatus`.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueView {
    pub issue: Issue,
    pub school_name: Option<String>,
    pub ticket_aging: i64,
    pub shipment: Option<ShippingStatus>,
}

impl Serialize for IssueView {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::Error;

        let mut value = serde_json::to_value(&self.issue).map_err(S::Error::custom)?;
        if let Some(fields) = value.as_object_mut() {
            fields.insert(
                "schoolName".to_string(),
                self.school_name.clone().map_or(Value::Null, Value::String),
            );
            fields.insert("ticketAging".to_string(), Value::from(self.ticket_aging));
            if let Some(shipment) = &self.shipment {
                let shipment = serde_json::to_value(shipment).map_err(S::Error::custom)?;
                let details = fields
                    .entry("hardwareDetails")
                    .or_insert_with(|| Value::Object(Default::default()));
                if let Some(details) = details.as_object_mut() {
                    details.insert("shippingStatus".to_string(), shipment);
                }
            }
        }
        value.serialize(serializer)
    }
}

/// A shipment as shown in the shipping table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentView {
    #[serde(flatten)]
    pub shipment: ShippingStatus,
    pub courier_name: String,
    pub school_name: Option<String>,
    pub part_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub generated_at: DateTime<Utc>,
    pub stats: Vec<HeadlineStat>,
    pub recent_issues: Vec<IssueView>,
}

/// Result of a courier status refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    pub shipment: ShippingStatus,
    pub status_changed: bool,
}

/// Facade over every collection of the dashboard.
pub struct DashboardService {
    schools: Arc<SchoolRepository>,
    issues: Arc<IssueRepository>,
    shipments: Arc<ShippingRepository>,
    users: Arc<UserRepository>,
    audit: Arc<AuditTrail>,
    stats: Arc<StatsService>,
    tracking: Arc<dyn TrackingAdapter>,
    clock: Arc<dyn Clock>,
    /// Serializes writes whose checks span issues and shipments, and shipment
    /// updates against carrier refreshes.
    links: Mutex<()>,
    snapshot_interval: Duration,
    recent_issues_limit: usize,
}

impl DashboardService {
    pub fn new(
        settings: ServiceSettings,
        persistence: Arc<dyn PersistenceAdapter>,
        tracking: Arc<dyn TrackingAdapter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let audit = Arc::new(AuditTrail::new(persistence.clone()));
        let schools = Arc::new(Repository::new(
            persistence.clone(),
            audit.clone(),
            clock.clone(),
        ));
        let issues = Arc::new(Repository::new(
            persistence.clone(),
            audit.clone(),
            clock.clone(),
        ));
        let shipments = Arc::new(Repository::new(
            persistence.clone(),
            audit.clone(),
            clock.clone(),
        ));
        let users = Arc::new(Repository::new(persistence, audit.clone(), clock.clone()));
        let stats = Arc::new(StatsService::new(
            Arc::clone(&schools),
            Arc::clone(&issues),
            Arc::clone(&shipments),
            clock.clone(),
            settings.aging_thresholds_days,
            settings.snapshot_retention,
        ));

        Self {
            schools,
            issues,
            shipments,
            users,
            audit,
            stats,
            tracking,
            clock,
            links: Mutex::new(()),
            snapshot_interval: settings.snapshot_interval,
            recent_issues_limit: settings.recent_issues_limit,
        }
    }

    /// Service over an in-memory backend, the wall clock and no courier integration.
    pub fn in_memory(settings: ServiceSettings) -> Self {
        Self::new(
            settings,
            Arc::new(MemoryAdapter::new()),
            Arc::new(UnconfiguredTracking),
            Arc::new(SystemClock),
        )
    }

    /// Load every collection and the audit trail from the persistence backend.
    pub async fn hydrate(&self) -> Result<(), RepositoryError> {
        let schools = self.schools.hydrate().await?;
        let issues = self.issues.hydrate().await?;
        let shipments = self.shipments.hydrate().await?;
        let users = self.users.hydrate().await?;
        let audit_entries = self.audit.hydrate().await?;
        info!(
            schools,
            issues, shipments, users, audit_entries, "Hydrated collections from persistence"
        );
        Ok(())
    }

    // ----- schools -----

    pub async fn create_school(&self, school: School, actor: &Actor) -> Result<School, RepositoryError> {
        let result = self.schools.create(school, actor).await;
        observe_write(AuditAction::Create, &result);
        result
    }

    pub async fn update_school(
        &self,
        id: &str,
        patch: SchoolPatch,
        actor: &Actor,
    ) -> Result<School, RepositoryError> {
        let result = self.schools.update(id, patch, actor).await;
        observe_write(AuditAction::Update, &result);
        result
    }

    pub fn get_school(&self, id: &str) -> Result<School, RepositoryError> {
        self.schools.get(id)
    }

    /// Lazy school search over the current collection
    pub fn search_schools(&self, text: &str, filters: &Filters) -> Result<Matches<School>, RepositoryError> {
        let query = Query::parse(text, filters)?;
        Ok(search(self.schools.iter(), query, Arc::new(Joins::new())))
    }

    pub fn list_schools(&self, filters: &Filters, text: &str) -> Result<Vec<SchoolView>, RepositoryError> {
        Ok(self
            .search_schools(text, filters)?
            .map(|school| SchoolView::new(school.as_ref().clone()))
            .collect())
    }

    // ----- issues -----

    pub async fn create_issue(&self, issue: Issue, actor: &Actor) -> Result<Issue, RepositoryError> {
        let result = self.checked_create_issue(issue, actor).await;
        observe_write(AuditAction::Create, &result);
        result
    }

    async fn checked_create_issue(&self, issue: Issue, actor: &Actor) -> Result<Issue, RepositoryError> {
        if !self.schools.contains(&issue.school_id) {
            return Err(RepositoryError::validation_error(format!(
                "schoolId {} does not reference an existing school",
                issue.school_id
            )));
        }
        self.issues.create(issue, actor).await
    }

    pub async fn update_issue(
        &self,
        id: &str,
        patch: IssuePatch,
        actor: &Actor,
    ) -> Result<Issue, RepositoryError> {
        let result = self.checked_update_issue(id, patch, actor).await;
        observe_write(AuditAction::Update, &result);
        result
    }

    async fn checked_update_issue(
        &self,
        id: &str,
        patch: IssuePatch,
        actor: &Actor,
    ) -> Result<Issue, RepositoryError> {
        let _links = self.links.lock().await;
        if patch.issue_type == Some(IssueType::Software) && self.shipment_for_issue(id).is_some() {
            return Err(RepositoryError::validation_error(format!(
                "issue {} has a shipment and must stay a hardware issue",
                id
            )));
        }
        self.issues.update(id, patch, actor).await
    }

    pub fn get_issue(&self, id: &str) -> Result<Issue, RepositoryError> {
        self.issues.get(id)
    }

    pub fn issue_view(&self, id: &str) -> Result<IssueView, RepositoryError> {
        let issue = self.issues.get(id)?;
        Ok(self.view_issue(issue, &self.school_names(), &self.shipments_by_issue()))
    }

    pub fn search_issues(&self, text: &str, filters: &Filters) -> Result<Matches<Issue>, RepositoryError> {
        let query = Query::parse(text, filters)?;
        let joins = Joins::new().with_schools(self.schools.iter());
        Ok(search(self.issues.iter(), query, Arc::new(joins)))
    }

    pub fn list_issues(&self, filters: &Filters, text: &str) -> Result<Vec<IssueView>, RepositoryError> {
        let matches = self.search_issues(text, filters)?;
        let names = self.school_names();
        let shipments = self.shipments_by_issue();
        Ok(matches
            .map(|issue| self.view_issue(issue.as_ref().clone(), &names, &shipments))
            .collect())
    }

    /// Most recently reported issues, newest first
    pub fn recent_issues(&self, limit: usize) -> Vec<IssueView> {
        let names = self.school_names();
        let shipments = self.shipments_by_issue();
        self.stats
            .recent_issues(limit)
            .into_iter()
            .map(|issue| self.view_issue(issue, &names, &shipments))
            .collect()
    }

    // ----- shipments -----

    pub async fn create_shipment(
        &self,
        shipment: ShippingStatus,
        actor: &Actor,
    ) -> Result<ShippingStatus, RepositoryError> {
        let result = self.checked_create_shipment(shipment, actor).await;
        observe_write(AuditAction::Create, &result);
        result
    }

    async fn checked_create_shipment(
        &self,
        shipment: ShippingStatus,
        actor: &Actor,
    ) -> Result<ShippingStatus, RepositoryError> {
        let _links = self.links.lock().await;
        let issue = self.issues.get(&shipment.issue_id).map_err(|_| {
            RepositoryError::validation_error(format!(
                "issueId {} does not reference an existing issue",
                shipment.issue_id
            ))
        })?;
        if issue.issue_type != IssueType::Hardware {
            return Err(RepositoryError::validation_error(format!(
                "issue {} is a {} issue; only hardware issues have shipments",
                issue.id, issue.issue_type
            )));
        }
        self.shipments.create(shipment, actor).await
    }

    pub async fn update_shipment(
        &self,
        id: &str,
        patch: ShippingPatch,
        actor: &Actor,
    ) -> Result<ShippingStatus, RepositoryError> {
        let _links = self.links.lock().await;
        let result = self.shipments.update(id, patch, actor).await;
        observe_write(AuditAction::Update, &result);
        result
    }

    pub fn get_shipment(&self, id: &str) -> Result<ShippingStatus, RepositoryError> {
        self.shipments.get(id)
    }

    pub fn search_shipments(
        &self,
        text: &str,
        filters: &Filters,
    ) -> Result<Matches<ShippingStatus>, RepositoryError> {
        let query = Query::parse(text, filters)?;
        Ok(search(self.shipments.iter(), query, Arc::new(self.shipment_joins())))
    }

    pub fn list_shipments(&self, filters: &Filters, text: &str) -> Result<Vec<ShipmentView>, RepositoryError> {
        let query = Query::parse(text, filters)?;
        let joins = Arc::new(self.shipment_joins());
        Ok(search(self.shipments.iter(), query, joins.clone())
            .map(|shipment| ShipmentView {
                courier_name: shipment.courier.display_name().to_string(),
                school_name: joins
                    .school_name_for_issue(&shipment.issue_id)
                    .map(str::to_string),
                part_description: joins.part_description(&shipment.issue_id).map(str::to_string),
                shipment: shipment.as_ref().clone(),
            })
            .collect())
    }

    /// Pull the carrier's view of a shipment and apply it as an update.
    ///
    /// The carrier is queried without holding any lock. The stored status is
    /// compared again under `links`, so a status another writer moved past the
    /// carrier's report is left alone.
    pub async fn refresh_shipment(
        &self,
        id: &str,
        actor: &Actor,
    ) -> Result<RefreshOutcome, RepositoryError> {
        let queried = self.shipments.get(id)?;
        let update = self
            .tracking
            .fetch_status(queried.courier, &queried.tracking_number)
            .await
            .inspect_err(|err| {
                warn!(shipment_id = id, courier = %queried.courier, error = %err, "Courier status refresh failed");
            })?;

        let _links = self.links.lock().await;
        let current = self.shipments.get(id)?;
        if current.courier != queried.courier || current.tracking_number != queried.tracking_number {
            return Err(RepositoryError::conflict(format!(
                "shipment {id} changed courier or tracking number during refresh"
            )));
        }

        let status_changed = update.status > current.status;
        let patch = ShippingPatch {
            status: status_changed.then_some(update.status),
            last_location: update.last_location,
            estimated_delivery: update.estimated_delivery,
            ..Default::default()
        };
        let result = self.shipments.update(id, patch, actor).await;
        observe_write(AuditAction::Update, &result);
        Ok(RefreshOutcome {
            shipment: result?,
            status_changed,
        })
    }

    pub fn courier_integrations(&self) -> Vec<CourierIntegration> {
        courier_integrations(self.tracking.as_ref())
    }

    // ----- users -----

    pub async fn create_user(&self, user: User, actor: &Actor) -> Result<User, RepositoryError> {
        let result = self.users.create(user, actor).await;
        observe_write(AuditAction::Create, &result);
        result
    }

    pub async fn update_user(&self, id: &str, patch: UserPatch, actor: &Actor) -> Result<User, RepositoryError> {
        let result = self.users.update(id, patch, actor).await;
        observe_write(AuditAction::Update, &result);
        result
    }

    pub fn get_user(&self, id: &str) -> Result<User, RepositoryError> {
        self.users.get(id)
    }

    pub fn list_users(&self) -> Vec<User> {
        self.users.list()
    }

    // ----- audit -----

    pub fn audit_log(&self) -> Vec<AuditLog> {
        self.audit.list()
    }

    pub fn audit_history(&self, entity_type: AuditEntityType, entity_id: &str) -> Vec<AuditLog> {
        self.audit.for_entity(entity_type, entity_id)
    }

    // ----- stats -----

    pub fn compute_stats(&self, kind: StatsKind) -> Metrics {
        self.stats.compute(kind)
    }

    pub fn take_snapshot(&self, kind: StatsKind) -> Snapshot {
        self.stats.take_snapshot(kind)
    }

    pub fn delta_since(&self, kind: StatsKind, at: DateTime<Utc>) -> Metrics {
        self.stats.delta_since(kind, at)
    }

    pub fn dashboard_summary(&self) -> DashboardSummary {
        DashboardSummary {
            generated_at: self.clock.now(),
            stats: self.stats.headline(),
            recent_issues: self.recent_issues(self.recent_issues_limit),
        }
    }

    /// Snapshot history of `kind`, oldest first
    pub fn snapshots(&self, kind: StatsKind) -> Vec<Snapshot> {
        self.stats.snapshots(kind)
    }

    /// Periodic snapshot task over this service's collections at the configured interval
    pub fn snapshot_scheduler(&self) -> SnapshotScheduler {
        SnapshotScheduler::new(self.stats.clone(), self.snapshot_interval)
    }

    // ----- JSON contract -----

    pub fn get_entity(&self, kind: EntityKind, id: &str) -> Result<Value, RepositoryError> {
        match kind {
            EntityKind::School => to_json(&SchoolView::new(self.get_school(id)?)),
            EntityKind::Issue => to_json(&self.issue_view(id)?),
            EntityKind::Shipping => to_json(&self.get_shipment(id)?),
            EntityKind::User => to_json(&self.get_user(id)?),
        }
    }

    /// Create from a JSON payload using the camelCase field names.
    pub async fn create_entity(
        &self,
        kind: EntityKind,
        payload: Value,
        actor: &Actor,
    ) -> Result<Value, RepositoryError> {
        match kind {
            EntityKind::School => to_json(&self.create_school(serde_json::from_value(payload)?, actor).await?),
            EntityKind::Issue => to_json(&self.create_issue(serde_json::from_value(payload)?, actor).await?),
            EntityKind::Shipping => {
                to_json(&self.create_shipment(serde_json::from_value(payload)?, actor).await?)
            }
            EntityKind::User => to_json(&self.create_user(serde_json::from_value(payload)?, actor).await?),
        }
    }

    /// Apply a JSON patch; unknown fields are rejected.
    pub async fn update_entity(
        &self,
        kind: EntityKind,
        id: &str,
        patch: Value,
        actor: &Actor,
    ) -> Result<Value, RepositoryError> {
        match kind {
            EntityKind::School => {
                to_json(&self.update_school(id, serde_json::from_value(patch)?, actor).await?)
            }
            EntityKind::Issue => {
                to_json(&self.update_issue(id, serde_json::from_value(patch)?, actor).await?)
            }
            EntityKind::Shipping => {
                to_json(&self.update_shipment(id, serde_json::from_value(patch)?, actor).await?)
            }
            EntityKind::User => to_json(&self.update_user(id, serde_json::from_value(patch)?, actor).await?),
        }
    }

    // ----- joins -----

    fn school_names(&self) -> HashMap<String, String> {
        self.schools
            .iter()
            .map(|school| (school.id.clone(), school.name.clone()))
            .collect()
    }

    fn shipments_by_issue(&self) -> HashMap<String, ShippingStatus> {
        self.shipments
            .iter()
            .map(|shipment| (shipment.issue_id.clone(), shipment.as_ref().clone()))
            .collect()
    }

    fn shipment_for_issue(&self, issue_id: &str) -> Option<Arc<ShippingStatus>> {
        self.shipments
            .iter()
            .find(|shipment| shipment.issue_id == issue_id)
    }

    fn shipment_joins(&self) -> Joins {
        Joins::new()
            .with_schools(self.schools.iter())
            .with_issues(self.issues.iter())
    }

    fn view_issue(
        &self,
        issue: Issue,
        names: &HashMap<String, String>,
        shipments: &HashMap<String, ShippingStatus>,
    ) -> IssueView {
        IssueView {
            school_name: names.get(&issue.school_id).cloned(),
            ticket_aging: issue.ticket_aging(self.clock.now()),
            shipment: shipments.get(&issue.id).cloned(),
            issue,
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, RepositoryError> {
    serde_json::to_value(value)
        .map_err(|err| RepositoryError::Upstream(format!("failed to encode response: {}", err)))
}

fn observe_write<E: Entity>(action: AuditAction, result: &Result<E, RepositoryError>) {
    let kind = E::KIND;
    match result {
        Ok(record) => {
            counter!(
                "entity_writes_total",
                "kind" => kind.as_str(),
                "action" => action.as_str()
            )
            .increment(1);
            debug!(kind = %kind, action = %action, id = record.id(), "Entity write committed");
        }
        Err(err) => {
            counter!(
                "entity_write_failures_total",
                "kind" => kind.as_str(),
                "code" => err.error_code()
            )
            .increment(1);
            debug!(kind = %kind, action = %action, error = %err, "Entity write rejected");
        }
    }
}
