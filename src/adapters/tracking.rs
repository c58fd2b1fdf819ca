//! Courier tracking adapter
//!
//! Carrier API integrations are not set up yet; [`UnconfiguredTracking`]
//! answers every lookup with [`TrackingError::NotConfigured`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Courier, ShipmentStatus};

#[derive(Debug, Clone, Error)]
pub enum TrackingError {
    #[error("courier tracking is not configured for {courier}")]
    NotConfigured { courier: Courier },
    #[error("courier does not know tracking number {tracking_number}")]
    UnknownShipment { tracking_number: String },
    #[error("courier API error: {0}")]
    Upstream(String),
}

/// Shipment state as reported by a carrier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingUpdate {
    pub status: ShipmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<NaiveDate>,
    pub observed_at: DateTime<Utc>,
}

#[async_trait]
pub trait TrackingAdapter: Send + Sync {
    /// Whether lookups for `courier` are wired up.
    fn supports(&self, courier: Courier) -> bool;

    async fn fetch_status(
        &self,
        courier: Courier,
        tracking_number: &str,
    ) -> Result<TrackingUpdate, TrackingError>;
}

/// Default adapter: no carrier integration is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredTracking;

#[async_trait]
impl TrackingAdapter for UnconfiguredTracking {
    fn supports(&self, _courier: Courier) -> bool {
        false
    }

    async fn fetch_status(
        &self,
        courier: Courier,
        _tracking_number: &str,
    ) -> Result<TrackingUpdate, TrackingError> {
        Err(TrackingError::NotConfigured { courier })
    }
}

string_enum! {
    pub enum IntegrationStatus ("integration status") {
        Connected => "connected",
        PendingSetup => "pending-setup",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourierIntegration {
    pub courier: Courier,
    pub display_name: String,
    pub status: IntegrationStatus,
}

/// Integration status of every supported courier, in declaration order.
pub fn courier_integrations(adapter: &dyn TrackingAdapter) -> Vec<CourierIntegration> {
    Courier::ALL
        .iter()
        .map(|courier| CourierIntegration {
            courier: *courier,
            display_name: courier.display_name().to_string(),
            status: if adapter.supports(*courier) {
                IntegrationStatus::Connected
            } else {
                IntegrationStatus::PendingSetup
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_tracking_refuses_lookups() {
        let err = UnconfiguredTracking
            .fetch_status(Courier::Dtdc, "DT123456789")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TrackingError::NotConfigured {
                courier: Courier::Dtdc
            }
        ));
    }

    #[test]
    fn test_every_courier_pending_setup() {
        let integrations = courier_integrations(&UnconfiguredTracking);
        assert_eq!(integrations.len(), 6);
        assert!(
            integrations
                .iter()
                .all(|i| i.status == IntegrationStatus::PendingSetup)
        );
        assert_eq!(integrations[0].display_name, "DTDC");
        assert_eq!(integrations[5].display_name, "Rivigo");
    }
}
