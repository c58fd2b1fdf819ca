//! # Aggregation and Stats
//!
//! Counters derived on demand from the full collections, independent of any
//! active filter. Nothing is cached: every call re-reads the current
//! collection versions.
//!
//! Snapshots of the counters are kept per kind so that the dashboard can show
//! how each headline number moved since the previous snapshot. The
//! [`SnapshotScheduler`] takes them on a fixed interval until cancelled.

use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::clock::Clock;
use crate::models::{
    Issue, IssueStatus, IssueType, Priority, School, SchoolStatus, ShipmentStatus, ShippingStatus,
};
use crate::repositories::{IssueRepository, SchoolRepository, ShippingRepository};

/// Metric name to value
pub type Metrics = BTreeMap<String, i64>;

string_enum! {
    pub enum StatsKind ("stats kind") {
        Schools => "schools",
        Issues => "issues",
        Shipments => "shipments",
    }
}

fn count(metrics: &mut Metrics, key: String) {
    *metrics.entry(key).or_insert(0) += 1;
}

fn is_same_day(at: Option<DateTime<Utc>>, today: NaiveDate) -> bool {
    at.is_some_and(|at| at.date_naive() == today)
}

/// `total`, `status.*`, `units.supplied`, `units.delivered`, `serials.unreconciled`
pub fn school_metrics<I>(schools: I) -> Metrics
where
    I: IntoIterator,
    I::Item: Borrow<School>,
{
    let mut metrics: Metrics = SchoolStatus::ALL
        .iter()
        .map(|status| (format!("status.{}", status), 0))
        .collect();
    let mut total = 0;
    let mut supplied = 0;
    let mut delivered = 0;
    let mut unreconciled = 0;

    for school in schools {
        let school = school.borrow();
        total += 1;
        supplied += i64::from(school.tv_ifp_supplied);
        delivered += i64::from(school.orders_delivered);
        if !school.serials_reconciled() {
            unreconciled += 1;
        }
        count(&mut metrics, format!("status.{}", school.current_status));
    }

    metrics.insert("total".into(), total);
    metrics.insert("units.supplied".into(), supplied);
    metrics.insert("units.delivered".into(), delivered);
    metrics.insert("serials.unreconciled".into(), unreconciled);
    metrics
}

/// `total`, `status.*`, `priority.*`, `type.*`, `open`, `resolved_today`,
/// and `aging.over_<N>_days` for open issues.
pub fn issue_metrics<I>(issues: I, now: DateTime<Utc>, aging_thresholds: &[u32]) -> Metrics
where
    I: IntoIterator,
    I::Item: Borrow<Issue>,
{
    let mut metrics = Metrics::new();
    for status in IssueStatus::ALL {
        metrics.insert(format!("status.{}", status), 0);
    }
    for priority in Priority::ALL {
        metrics.insert(format!("priority.{}", priority), 0);
    }
    for issue_type in IssueType::ALL {
        metrics.insert(format!("type.{}", issue_type), 0);
    }
    let thresholds: BTreeSet<u32> = aging_thresholds.iter().copied().collect();
    for days in &thresholds {
        metrics.insert(format!("aging.over_{}_days", days), 0);
    }

    let today = now.date_naive();
    let mut total = 0;
    let mut open = 0;
    let mut resolved_today = 0;

    for issue in issues {
        let issue = issue.borrow();
        total += 1;
        count(&mut metrics, format!("status.{}", issue.status));
        count(&mut metrics, format!("priority.{}", issue.priority));
        count(&mut metrics, format!("type.{}", issue.issue_type));

        if issue.status.is_active() {
            open += 1;
            let aging = issue.ticket_aging(now);
            for days in thresholds.iter().filter(|days| aging > i64::from(**days)) {
                count(&mut metrics, format!("aging.over_{}_days", days));
            }
        } else if is_same_day(issue.date_closed, today) {
            resolved_today += 1;
        }
    }

    metrics.insert("total".into(), total);
    metrics.insert("open".into(), open);
    metrics.insert("resolved_today".into(), resolved_today);
    metrics
}

/// `total`, `status.*`, `in_shipping`, `delivered_today`
pub fn shipment_metrics<I>(shipments: I, now: DateTime<Utc>) -> Metrics
where
    I: IntoIterator,
    I::Item: Borrow<ShippingStatus>,
{
    let mut metrics: Metrics = ShipmentStatus::ALL
        .iter()
        .map(|status| (format!("status.{}", status), 0))
        .collect();
    let today = now.date_naive();
    let mut total = 0;
    let mut in_shipping = 0;
    let mut delivered_today = 0;

    for shipment in shipments {
        let shipment = shipment.borrow();
        total += 1;
        count(&mut metrics, format!("status.{}", shipment.status));
        if shipment.status == ShipmentStatus::Delivered {
            if is_same_day(shipment.actual_delivery, today) {
                delivered_today += 1;
            }
        } else {
            in_shipping += 1;
        }
    }

    metrics.insert("total".into(), total);
    metrics.insert("in_shipping".into(), in_shipping);
    metrics.insert("delivered_today".into(), delivered_today);
    metrics
}

/// `current - baseline` for every metric in either map; missing values count as 0.
pub fn metrics_delta(current: &Metrics, baseline: Option<&Metrics>) -> Metrics {
    let empty = Metrics::new();
    let baseline = baseline.unwrap_or(&empty);
    current
        .keys()
        .chain(baseline.keys())
        .map(|key| {
            let now = current.get(key).copied().unwrap_or(0);
            let then = baseline.get(key).copied().unwrap_or(0);
            (key.clone(), now - then)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub kind: StatsKind,
    pub taken_at: DateTime<Utc>,
    pub metrics: Metrics,
}

/// Bounded per-kind history of snapshots, oldest first.
pub struct SnapshotStore {
    retention: usize,
    snapshots: RwLock<HashMap<StatsKind, VecDeque<Snapshot>>>,
}

impl SnapshotStore {
    pub fn new(retention: usize) -> Self {
        Self {
            retention: retention.max(1),
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    pub fn record(&self, snapshot: Snapshot) {
        let mut snapshots = self
            .snapshots
            .write()
            .unwrap_or_else(|poison| poison.into_inner());
        let history = snapshots.entry(snapshot.kind).or_default();
        history.push_back(snapshot);
        while history.len() > self.retention {
            history.pop_front();
        }
    }

    /// Most recent snapshot of `kind` taken at or before `at`
    pub fn latest_at_or_before(&self, kind: StatsKind, at: DateTime<Utc>) -> Option<Snapshot> {
        self.snapshots
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(&kind)
            .and_then(|history| history.iter().rev().find(|s| s.taken_at <= at).cloned())
    }

    pub fn history(&self, kind: StatsKind) -> Vec<Snapshot> {
        self.snapshots
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(&kind)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// One dashboard headline number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadlineStat {
    pub label: String,
    pub kind: StatsKind,
    pub metric: String,
    pub value: i64,
    /// Change since the latest snapshot (the full value when none exists)
    pub delta: i64,
}

/// Headline cards shown on the dashboard, in display order
const HEADLINES: &[(&str, StatsKind, &str)] = &[
    ("Total Schools", StatsKind::Schools, "total"),
    ("Open Issues", StatsKind::Issues, "open"),
    ("In Shipping", StatsKind::Shipments, "in_shipping"),
    ("Resolved Today", StatsKind::Issues, "resolved_today"),
];

/// Counter computation over the live repositories plus snapshot history.
pub struct StatsService {
    schools: Arc<SchoolRepository>,
    issues: Arc<IssueRepository>,
    shipments: Arc<ShippingRepository>,
    clock: Arc<dyn Clock>,
    aging_thresholds: Vec<u32>,
    store: SnapshotStore,
}

impl StatsService {
    pub fn new(
        schools: Arc<SchoolRepository>,
        issues: Arc<IssueRepository>,
        shipments: Arc<ShippingRepository>,
        clock: Arc<dyn Clock>,
        aging_thresholds: Vec<u32>,
        snapshot_retention: usize,
    ) -> Self {
        Self {
            schools,
            issues,
            shipments,
            clock,
            aging_thresholds,
            store: SnapshotStore::new(snapshot_retention),
        }
    }

    pub fn compute(&self, kind: StatsKind) -> Metrics {
        let now = self.clock.now();
        match kind {
            StatsKind::Schools => school_metrics(self.schools.iter()),
            StatsKind::Issues => issue_metrics(self.issues.iter(), now, &self.aging_thresholds),
            StatsKind::Shipments => shipment_metrics(self.shipments.iter(), now),
        }
    }

    /// Record the current metrics of `kind`, keyed by the current time.
    pub fn take_snapshot(&self, kind: StatsKind) -> Snapshot {
        let snapshot = Snapshot {
            kind,
            taken_at: self.clock.now(),
            metrics: self.compute(kind),
        };
        self.store.record(snapshot.clone());
        counter!("stats_snapshots_total", "kind" => kind.as_str()).increment(1);
        snapshot
    }

    pub fn take_all_snapshots(&self) -> Vec<Snapshot> {
        StatsKind::ALL
            .iter()
            .map(|kind| self.take_snapshot(*kind))
            .collect()
    }

    /// Current metrics minus the latest snapshot taken at or before `at`.
    pub fn delta_since(&self, kind: StatsKind, at: DateTime<Utc>) -> Metrics {
        let current = self.compute(kind);
        let baseline = self.store.latest_at_or_before(kind, at);
        metrics_delta(&current, baseline.as_ref().map(|s| &s.metrics))
    }

    pub fn snapshots(&self, kind: StatsKind) -> Vec<Snapshot> {
        self.store.history(kind)
    }

    /// Total Schools, Open Issues, In Shipping and Resolved Today with deltas
    pub fn headline(&self) -> Vec<HeadlineStat> {
        let now = self.clock.now();
        let mut deltas: HashMap<StatsKind, (Metrics, Metrics)> = HashMap::new();

        HEADLINES
            .iter()
            .map(|(label, kind, metric)| {
                let (current, delta) = deltas.entry(*kind).or_insert_with(|| {
                    let current = self.compute(*kind);
                    let baseline = self.store.latest_at_or_before(*kind, now);
                    let delta = metrics_delta(&current, baseline.as_ref().map(|s| &s.metrics));
                    (current, delta)
                });
                HeadlineStat {
                    label: label.to_string(),
                    kind: *kind,
                    metric: metric.to_string(),
                    value: current.get(*metric).copied().unwrap_or(0),
                    delta: delta.get(*metric).copied().unwrap_or(0),
                }
            })
            .collect()
    }

    /// Most recently reported issues, newest first
    pub fn recent_issues(&self, limit: usize) -> Vec<Issue> {
        let mut issues = self.issues.list();
        issues.sort_by(|a, b| b.date_reported.cmp(&a.date_reported));
        issues.truncate(limit);
        issues
    }
}

/// Takes a snapshot of every kind on a fixed interval.
pub struct SnapshotScheduler {
    stats: Arc<StatsService>,
    interval: Duration,
}

impl SnapshotScheduler {
    pub fn new(stats: Arc<StatsService>, interval: Duration) -> Self {
        Self { stats, interval }
    }

    /// Run until `shutdown` fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_seconds = self.interval.as_secs(),
            "Starting stats snapshot scheduler"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Stats snapshot scheduler shutdown requested");
                    break;
                }
                _ = sleep(self.interval) => {
                    let taken = self.stats.take_all_snapshots();
                    debug!(snapshots = taken.len(), "Recorded stats snapshots");
                }
            }
        }

        info!("Stats snapshot scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, TimeZone};

    use super::*;
    use crate::models::school::tests::sample_school;
    use crate::models::{IssuePatch, ShippingPatch};
    use crate::repositories::issue::tests::sample_issue;
    use crate::repositories::shipping::tests::sample_shipment;
    use crate::repositories::testing::{Harness, actor};

    struct Fixture {
        harness: Harness,
        schools: Arc<SchoolRepository>,
        issues: Arc<IssueRepository>,
        shipments: Arc<ShippingRepository>,
        stats: Arc<StatsService>,
    }

    fn fixture() -> Fixture {
        let harness = Harness::new();
        let schools = Arc::new(harness.repository());
        let issues = Arc::new(harness.repository());
        let shipments = Arc::new(harness.repository());
        let stats = Arc::new(StatsService::new(
            Arc::clone(&schools),
            Arc::clone(&issues),
            Arc::clone(&shipments),
            harness.clock.clone(),
            vec![7, 3],
            2,
        ));
        Fixture {
            harness,
            schools,
            issues,
            shipments,
            stats,
        }
    }

    #[tokio::test]
    async fn test_school_metrics() {
        let f = fixture();
        let mut pending = sample_school();
        pending.deal_id = "DEAL-2024-002".to_string();
        pending.current_status = SchoolStatus::Pending;
        pending.tv_ifp_supplied = 30;
        pending.orders_delivered = 28;
        f.schools.create(sample_school(), &actor()).await.unwrap();
        f.schools.create(pending, &actor()).await.unwrap();

        let metrics = f.stats.compute(StatsKind::Schools);
        assert_eq!(metrics["total"], 2);
        assert_eq!(metrics["status.active"], 1);
        assert_eq!(metrics["status.pending"], 1);
        assert_eq!(metrics["status.inactive"], 0);
        assert_eq!(metrics["units.supplied"], 40);
        assert_eq!(metrics["units.delivered"], 38);
        assert_eq!(metrics["serials.unreconciled"], 1);
    }

    #[tokio::test]
    async fn test_issue_metrics_aging_and_resolved_today() {
        let f = fixture();
        // clock: 2024-03-20 09:00, sample issues reported 2024-03-15
        let mut old = sample_issue("SCH-001");
        old.date_reported = Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap();
        f.issues.create(old, &actor()).await.unwrap();
        f.issues.create(sample_issue("SCH-001"), &actor()).await.unwrap();
        let resolved = f.issues.create(sample_issue("SCH-002"), &actor()).await.unwrap();
        f.issues
            .update(
                &resolved.id,
                IssuePatch {
                    status: Some(IssueStatus::Resolved),
                    ..Default::default()
                },
                &actor(),
            )
            .await
            .unwrap();

        let metrics = f.stats.compute(StatsKind::Issues);
        assert_eq!(metrics["total"], 3);
        assert_eq!(metrics["open"], 2);
        assert_eq!(metrics["status.resolved"], 1);
        assert_eq!(metrics["priority.high"], 3);
        assert_eq!(metrics["type.hardware"], 3);
        assert_eq!(metrics["resolved_today"], 1);
        assert_eq!(metrics["aging.over_3_days"], 2);
        assert_eq!(metrics["aging.over_7_days"], 1);

        f.harness.clock.advance(ChronoDuration::days(1));
        assert_eq!(f.stats.compute(StatsKind::Issues)["resolved_today"], 0);
    }

    #[tokio::test]
    async fn test_shipment_metrics() {
        let f = fixture();
        let shipment = f
            .shipments
            .create(sample_shipment("ISS-001"), &actor())
            .await
            .unwrap();
        let mut second = sample_shipment("ISS-002");
        second.tracking_number = "DT555000999".to_string();
        f.shipments.create(second, &actor()).await.unwrap();

        f.shipments
            .update(
                &shipment.id,
                ShippingPatch {
                    status: Some(ShipmentStatus::Delivered),
                    ..Default::default()
                },
                &actor(),
            )
            .await
            .unwrap();

        let metrics = f.stats.compute(StatsKind::Shipments);
        assert_eq!(metrics["total"], 2);
        assert_eq!(metrics["in_shipping"], 1);
        assert_eq!(metrics["delivered_today"], 1);
        assert_eq!(metrics["status.in-transit"], 1);
    }

    #[tokio::test]
    async fn test_delta_since_uses_latest_snapshot_at_or_before() {
        let f = fixture();
        let before_any = f.harness.clock.now();
        f.schools.create(sample_school(), &actor()).await.unwrap();

        // no snapshot yet: the delta is the full value
        assert_eq!(f.stats.delta_since(StatsKind::Schools, before_any)["total"], 1);

        f.stats.take_snapshot(StatsKind::Schools);
        let first = f.harness.clock.now();
        f.harness.clock.advance(ChronoDuration::hours(1));

        let mut second = sample_school();
        second.deal_id = "DEAL-2024-500".to_string();
        f.schools.create(second, &actor()).await.unwrap();

        let delta = f.stats.delta_since(StatsKind::Schools, first);
        assert_eq!(delta["total"], 1);
        assert_eq!(delta["units.supplied"], 10);
        assert_eq!(f.stats.delta_since(StatsKind::Schools, first - ChronoDuration::seconds(1))["total"], 2);
    }

    #[test]
    fn test_metrics_delta_treats_missing_as_zero() {
        let current = Metrics::from([("total".to_string(), 5), ("aging.over_3_days".to_string(), 2)]);
        let baseline = Metrics::from([("total".to_string(), 3), ("retired".to_string(), 4)]);
        let delta = metrics_delta(&current, Some(&baseline));
        assert_eq!(delta["total"], 2);
        assert_eq!(delta["aging.over_3_days"], 2);
        assert_eq!(delta["retired"], -4);
    }

    #[tokio::test]
    async fn test_snapshot_retention() {
        let f = fixture();
        for _ in 0..5 {
            f.stats.take_snapshot(StatsKind::Issues);
            f.harness.clock.advance(ChronoDuration::minutes(5));
        }
        assert_eq!(f.stats.snapshots(StatsKind::Issues).len(), 2);
        assert!(f.stats.snapshots(StatsKind::Schools).is_empty());
    }

    #[tokio::test]
    async fn test_headline_and_recent_issues() {
        let f = fixture();
        f.schools.create(sample_school(), &actor()).await.unwrap();
        f.stats.take_all_snapshots();

        let mut newer = sample_issue("SCH-001");
        newer.date_reported = Utc.with_ymd_and_hms(2024, 3, 19, 12, 0, 0).unwrap();
        f.issues.create(sample_issue("SCH-001"), &actor()).await.unwrap();
        f.issues.create(newer, &actor()).await.unwrap();

        let headline = f.stats.headline();
        let labels: Vec<&str> = headline.iter().map(|h| h.label.as_str()).collect();
        assert_eq!(labels, ["Total Schools", "Open Issues", "In Shipping", "Resolved Today"]);
        assert_eq!((headline[0].value, headline[0].delta), (1, 0));
        assert_eq!((headline[1].value, headline[1].delta), (2, 2));

        let recent = f.stats.recent_issues(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "ISS-002");
    }

    #[tokio::test]
    async fn test_scheduler_snapshots_until_cancelled() {
        let f = fixture();
        let shutdown = CancellationToken::new();
        let scheduler = SnapshotScheduler::new(f.stats.clone(), Duration::from_millis(5));
        let handle = tokio::spawn(scheduler.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let taken = f.stats.snapshots(StatsKind::Schools).len();
        assert!(taken >= 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.stats.snapshots(StatsKind::Schools).len(), taken);
    }
}
