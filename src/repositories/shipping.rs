//! Shipment repository
//!
//! One shipment per issue, and tracking numbers are unique per courier.

use chrono::{DateTime, Utc};

use super::{Entity, Patch, Repository, UniqueKey};
use crate::error::RepositoryError;
use crate::models::{Actor, EntityKind, ShipmentStatus, ShippingPatch, ShippingStatus};

pub type ShippingRepository = Repository<ShippingStatus>;

impl Entity for ShippingStatus {
    const KIND: EntityKind = EntityKind::Shipping;
    const ID_PREFIX: &'static str = "SHP";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn stamp_created(&mut self, actor: &Actor, now: DateTime<Utc>) {
        self.audit.stamp_created(actor, now);
    }

    fn stamp_updated(&mut self, actor: &Actor, now: DateTime<Utc>) {
        self.audit.stamp_updated(actor, now);
    }

    fn prepare_create(&mut self, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        if self.last_update == DateTime::<Utc>::default() {
            self.last_update = now;
        }
        if self.status == ShipmentStatus::Delivered && self.actual_delivery.is_none() {
            self.actual_delivery = Some(now);
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), RepositoryError> {
        ShippingStatus::validate(self)
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        vec![
            UniqueKey::new("issueId", self.issue_id.trim()),
            UniqueKey::new("courier+trackingNumber", self.tracking_key()),
        ]
    }
}

impl Patch<ShippingStatus> for ShippingPatch {
    fn apply(self, shipment: &mut ShippingStatus, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        if let Some(next) = self.status {
            shipment.status.validate_transition(next)?;
            if next == ShipmentStatus::Delivered && shipment.status != ShipmentStatus::Delivered {
                shipment.actual_delivery = Some(now);
            }
            shipment.status = next;
        }
        if let Some(courier) = self.courier {
            shipment.courier = courier;
        }
        if let Some(tracking_number) = self.tracking_number {
            shipment.tracking_number = tracking_number;
        }
        if self.estimated_delivery.is_some() {
            shipment.estimated_delivery = self.estimated_delivery;
        }
        if self.last_location.is_some() {
            shipment.last_location = self.last_location;
        }
        shipment.last_update = now;
        Ok(())
    }
}
