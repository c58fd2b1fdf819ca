//! School repository
//!
//! Schools are keyed by `SCH-NNN` ids and must carry a unique `dealId`.

use chrono::{DateTime, Utc};

use super::{Entity, Patch, Repository, UniqueKey};
use crate::error::RepositoryError;
use crate::models::{Actor, EntityKind, School, SchoolPatch};

pub type SchoolRepository = Repository<School>;

impl Entity for School {
    const KIND: EntityKind = EntityKind::School;
    const ID_PREFIX: &'static str = "SCH";

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

    fn validate(&self) -> Result<(), RepositoryError> {
        School::validate(self)
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        vec![UniqueKey::new("dealId", self.deal_id.trim())]
    }
}

impl Patch<School> for SchoolPatch {
    fn apply(self, school: &mut School, _now: DateTime<Utc>) -> Result<(), RepositoryError> {
        if let Some(deal_id) = self.deal_id {
            school.deal_id = deal_id;
        }
        if let Some(name) = self.name {
            school.name = name;
        }
        if let Some(spoc) = self.spoc_details {
            school.spoc_details = spoc;
        }
        if let Some(address) = self.address {
            school.address = address;
        }
        if let Some(supplied) = self.tv_ifp_supplied {
            school.tv_ifp_supplied = supplied;
        }
        if let Some(delivered) = self.orders_delivered {
            school.orders_delivered = delivered;
        }
        if let Some(status) = self.current_status {
            school.current_status = status;
        }
        if let Some(product_type) = self.product_type {
            school.product_type = product_type;
        }
        if let Some(segment) = self.segment {
            school.segment = segment;
        }
        if let Some(serials) = self.serial_numbers {
            school.serial_numbers = serials;
        }
        if self.dispatch_date.is_some() {
            school.dispatch_date = self.dispatch_date;
        }
        if self.installation_date.is_some() {
            school.installation_date = self.installation_date;
        }
        if self.vendor_name.is_some() {
            school.vendor_name = self.vendor_name;
        }
        if self.brand.is_some() {
            school.brand = self.brand;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::models::school::tests::sample_school;
    use crate::models::{AuditAction, AuditEntityType, SchoolStatus};
    use crate::repositories::testing::{Harness, actor};

    #[tokio::test]
    async fn test_create_assigns_sequential_ids_and_audits() {
        let harness = Harness::new();
        let repo: SchoolRepository = harness.repository();

        let first = repo.create(sample_school(), &actor()).await.unwrap();
        let mut second = sample_school();
        second.deal_id = "DEAL-2024-100".to_string();
        let second = repo.create(second, &actor()).await.unwrap();

        assert_eq!(first.id, "SCH-001");
        assert_eq!(second.id, "SCH-002");
        assert_eq!(first.audit.created_by, "USR-001");
        assert_eq!(first.audit.created_at, harness.clock.now());

        let entries = harness.audit.for_entity(AuditEntityType::School, "SCH-001");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::Create);
        assert_eq!(entries[0].changes["dealId"], "DEAL-2024-099");
    }

    #[tokio::test]
    async fn test_duplicate_deal_id_conflicts() {
        let harness = Harness::new();
        let repo: SchoolRepository = harness.repository();
        repo.create(sample_school(), &actor()).await.unwrap();

        let err = repo.create(sample_school(), &actor()).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(repo.len(), 1);
        assert_eq!(harness.audit.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_create_does_not_consume_an_id() {
        let harness = Harness::new();
        let repo: SchoolRepository = harness.repository();
        let mut invalid = sample_school();
        invalid.orders_delivered = 11;
        assert!(repo.create(invalid, &actor()).await.unwrap_err().is_validation());

        let created = repo.create(sample_school(), &actor()).await.unwrap();
        assert_eq!(created.id, "SCH-001");
    }

    #[tokio::test]
    async fn test_duplicate_explicit_id_conflicts() {
        let harness = Harness::new();
        let repo: SchoolRepository = harness.repository();
        let mut school = sample_school();
        school.id = "SCH-010".to_string();
        repo.create(school.clone(), &actor()).await.unwrap();

        school.deal_id = "DEAL-2024-777".to_string();
        assert!(repo.create(school, &actor()).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_invalid_update_leaves_record_untouched() {
        let harness = Harness::new();
        let repo: SchoolRepository = harness.repository();
        let school = repo.create(sample_school(), &actor()).await.unwrap();

        let patch = SchoolPatch {
            orders_delivered: Some(11),
            ..Default::default()
        };
        let err = repo.update(&school.id, patch, &actor()).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(repo.get(&school.id).unwrap(), school);
        assert_eq!(harness.audit.len(), 1);
    }

    #[tokio::test]
    async fn test_update_records_changed_fields() {
        let harness = Harness::new();
        let repo: SchoolRepository = harness.repository();
        let school = repo.create(sample_school(), &actor()).await.unwrap();

        harness.clock.advance(chrono::Duration::hours(2));
        let patch = SchoolPatch {
            current_status: Some(SchoolStatus::Inactive),
            ..Default::default()
        };
        let updated = repo.update(&school.id, patch, &actor()).await.unwrap();
        assert_eq!(updated.current_status, SchoolStatus::Inactive);
        assert!(updated.audit.updated_at > updated.audit.created_at);

        let entries = harness.audit.for_entity(AuditEntityType::School, &school.id);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].action, AuditAction::Update);
        assert_eq!(entries[1].changes.len(), 1);
        assert_eq!(entries[1].changes["currentStatus"], "inactive");
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_not_found() {
        let harness = Harness::new();
        let repo: SchoolRepository = harness.repository();
        let err = repo
            .update("SCH-404", SchoolPatch::default(), &actor())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_hydrate_reloads_from_adapter() {
        let harness = Harness::new();
        let repo: SchoolRepository = harness.repository();
        repo.create(sample_school(), &actor()).await.unwrap();

        let reloaded: SchoolRepository = harness.repository();
        assert_eq!(reloaded.hydrate().await.unwrap(), 1);
        assert_eq!(reloaded.get("SCH-001").unwrap().deal_id, "DEAL-2024-099");

        // the id sequence skips ids that already exist
        let mut next = sample_school();
        next.deal_id = "DEAL-2024-200".to_string();
        assert_eq!(reloaded.create(next, &actor()).await.unwrap().id, "SCH-002");
    }

    #[tokio::test]
    async fn test_iterator_reads_version_at_call_time() {
        let harness = Harness::new();
        let repo: SchoolRepository = harness.repository();
        repo.create(sample_school(), &actor()).await.unwrap();

        let mut records = repo.iter();
        let mut later = sample_school();
        later.deal_id = "DEAL-2024-300".to_string();
        repo.create(later, &actor()).await.unwrap();

        assert!(records.next().is_some());
        assert!(records.next().is_none());
        assert_eq!(repo.iter().count(), 2);
    }
}
