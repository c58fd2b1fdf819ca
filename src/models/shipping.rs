//! Shipping status entity model
//!
//! One shipment of a replacement part for a hardware issue.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{AuditFields, require_text};
use crate::error::RepositoryError;

string_enum! {
    /// Supported carriers
    pub enum Courier ("courier") {
        Dtdc => "dtdc",
        DelhiveryB2b => "delhivery-b2b",
        DelhiveryB2c => "delhivery-b2c",
        Speedair => "speedair",
        SafeExpress => "safe-express",
        Rivigo => "rivigo",
    }
}

impl Courier {
    pub fn display_name(&self) -> &'static str {
        match self {
            Courier::Dtdc => "DTDC",
            Courier::DelhiveryB2b => "Delhivery B2B",
            Courier::DelhiveryB2c => "Delhivery B2C",
            Courier::Speedair => "SpeedAir",
            Courier::SafeExpress => "Safe Express",
            Courier::Rivigo => "Rivigo",
        }
    }
}

string_enum! {
    /// Shipment progress, in forward order.
    pub enum ShipmentStatus ("shipment status") {
        Pending => "pending",
        PickedUp => "picked-up",
        InTransit => "in-transit",
        OutForDelivery => "out-for-delivery",
        Delivered => "delivered",
    }
}

impl ShipmentStatus {
    /// Shipments only move forward; skipping steps is allowed.
    pub fn validate_transition(&self, next: ShipmentStatus) -> Result<(), RepositoryError> {
        if next >= *self {
            Ok(())
        } else {
            Err(RepositoryError::validation_error(format!(
                "cannot move shipment from '{}' back to '{}'",
                self, next
            )))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingStatus {
    #[serde(default)]
    pub id: String,
    pub issue_id: String,
    pub courier: Courier,
    pub tracking_number: String,
    pub status: ShipmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_delivery: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_location: Option<String>,
    #[serde(default)]
    pub last_update: DateTime<Utc>,
    #[serde(flatten)]
    pub audit: AuditFields,
}

impl ShippingStatus {
    pub fn validate(&self) -> Result<(), RepositoryError> {
        require_text("issueId", &self.issue_id)?;
        require_text("trackingNumber", &self.tracking_number)?;

        let delivered = self.status == ShipmentStatus::Delivered;
        if delivered != self.actual_delivery.is_some() {
            return Err(RepositoryError::validation_error(if delivered {
                "actualDelivery is required once a shipment is delivered"
            } else {
                "actualDelivery must be empty until the shipment is delivered"
            }));
        }

        Ok(())
    }

    /// Key enforcing tracking-number uniqueness per courier
    pub fn tracking_key(&self) -> String {
        format!("{}:{}", self.courier, self.tracking_number.trim())
    }
}

/// Partial update of a shipment. `issueId` is fixed at creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ShippingPatch {
    pub courier: Option<Courier>,
    pub tracking_number: Option<String>,
    pub status: Option<ShipmentStatus>,
    pub estimated_delivery: Option<NaiveDate>,
    pub last_location: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_only() {
        use ShipmentStatus::*;
        assert!(Pending.validate_transition(PickedUp).is_ok());
        assert!(InTransit.validate_transition(Delivered).is_ok());
        assert!(Delivered.validate_transition(Delivered).is_ok());
        assert!(Delivered.validate_transition(InTransit).is_err());
        assert!(OutForDelivery.validate_transition(Pending).is_err());
    }

    #[test]
    fn test_courier_wire_and_display_names() {
        let courier: Courier = "delhivery-b2b".parse().unwrap();
        assert_eq!(courier, Courier::DelhiveryB2b);
        assert_eq!(courier.display_name(), "Delhivery B2B");
        assert!("fedex".parse::<Courier>().is_err());
        assert_eq!(Courier::ALL.len(), 6);
    }

    #[test]
    fn test_actual_delivery_tracks_status() {
        let mut shipment = ShippingStatus {
            id: "SHP-001".to_string(),
            issue_id: "ISS-003".to_string(),
            courier: Courier::Dtdc,
            tracking_number: "DT123456789".to_string(),
            status: ShipmentStatus::InTransit,
            estimated_delivery: NaiveDate::from_ymd_opt(2024, 3, 22),
            actual_delivery: None,
            last_location: Some("Mumbai Hub".to_string()),
            last_update: Utc::now(),
            audit: AuditFields::default(),
        };
        assert!(shipment.validate().is_ok());

        shipment.status = ShipmentStatus::Delivered;
        assert!(shipment.validate().is_err());

        shipment.actual_delivery = Some(Utc::now());
        assert!(shipment.validate().is_ok());
        assert_eq!(shipment.tracking_key(), "dtdc:DT123456789");
    }
}
