//! Sample dashboard data
//!
//! Five schools, six issues and four shipments mirroring the records the
//! dashboard ships with. Records are created through the service so they go
//! through validation and the audit trail like any other write.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::error::RepositoryError;
use crate::models::{
    Actor, Address, AuditFields, Courier, EngineerDetails, HardwareDetails, Issue, IssueStatus,
    IssueType, PartInstallationStatus, Priority, School, SchoolStatus, SerialNumber,
    ShipmentStatus, ShippingStatus, SpocDetails, User, UserRole,
};
use crate::service::DashboardService;

/// Counts of records created and skipped by a seeding run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedReport {
    pub created: usize,
    pub skipped: usize,
}

/// Seed the sample users, schools, issues and shipments.
///
/// Records whose id already exists are skipped, so seeding twice is harmless.
pub async fn seed_sample_data(
    service: &DashboardService,
    actor: &Actor,
) -> Result<SeedReport, RepositoryError> {
    let mut report = SeedReport::default();

    for user in sample_users() {
        if service.get_user(&user.id).is_ok() {
            report.skipped += 1;
            continue;
        }
        service.create_user(user, actor).await?;
        report.created += 1;
    }

    for school in sample_schools() {
        if service.get_school(&school.id).is_ok() {
            log::info!("School '{}' already exists, skipping", school.id);
            report.skipped += 1;
            continue;
        }
        log::info!("Creating school: {}", school.name);
        service.create_school(school, actor).await?;
        report.created += 1;
    }

    for issue in sample_issues() {
        if service.get_issue(&issue.id).is_ok() {
            report.skipped += 1;
            continue;
        }
        service.create_issue(issue, actor).await?;
        report.created += 1;
    }

    for shipment in sample_shipments() {
        if service.get_shipment(&shipment.id).is_ok() {
            report.skipped += 1;
            continue;
        }
        service.create_shipment(shipment, actor).await?;
        report.created += 1;
    }

    log::info!(
        "Sample data seeding completed: {} created, {} skipped",
        report.created,
        report.skipped
    );
    Ok(report)
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0)
        .single()
        .unwrap_or_default()
}

fn day(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d)
}

fn sample_users() -> Vec<User> {
    [
        ("USR-001", "ops.admin@schoolops.in", "Ops Admin", UserRole::Admin),
        ("USR-002", "vikram.singh@schoolops.in", "Vikram Singh", UserRole::Manager),
        ("USR-003", "neha.gupta@schoolops.in", "Neha Gupta", UserRole::Operator),
    ]
    .into_iter()
    .map(|(id, email, name, role)| User {
        id: id.to_string(),
        email: email.to_string(),
        name: name.to_string(),
        role,
        created_at: DateTime::<Utc>::default(),
        updated_at: DateTime::<Utc>::default(),
    })
    .collect()
}

struct SchoolSeed {
    id: &'static str,
    deal_id: &'static str,
    name: &'static str,
    spoc: (&'static str, &'static str, &'static str),
    address: (&'static str, &'static str, &'static str, &'static str),
    supplied: u32,
    delivered: u32,
    status: SchoolStatus,
    product_type: &'static str,
    segment: &'static str,
    serials: &'static [(&'static str, u32)],
    dispatch: Option<NaiveDate>,
    installation: Option<NaiveDate>,
}

impl SchoolSeed {
    fn build(self) -> School {
        School {
            id: self.id.to_string(),
            deal_id: self.deal_id.to_string(),
            name: self.name.to_string(),
            spoc_details: SpocDetails {
                name: self.spoc.0.to_string(),
                email: self.spoc.1.to_string(),
                phone: self.spoc.2.to_string(),
            },
            address: Address {
                street: self.address.0.to_string(),
                city: self.address.1.to_string(),
                state: self.address.2.to_string(),
                pincode: self.address.3.to_string(),
            },
            tv_ifp_supplied: self.supplied,
            orders_delivered: self.delivered,
            current_status: self.status,
            product_type: self.product_type.to_string(),
            segment: self.segment.to_string(),
            serial_numbers: self
                .serials
                .iter()
                .map(|(number, size)| SerialNumber {
                    number: number.to_string(),
                    size: *size,
                })
                .collect(),
            dispatch_date: self.dispatch,
            installation_date: self.installation,
            vendor_name: Some("EduTech Distributors".to_string()),
            brand: Some("ViewBoard".to_string()),
            audit: AuditFields::default(),
        }
    }
}

fn sample_schools() -> Vec<School> {
    vec![
        SchoolSeed {
            id: "SCH-001",
            deal_id: "DEAL-2024-001",
            name: "Delhi Public School, Sector 45",
            spoc: ("Rajesh Kumar", "rajesh.kumar@dps45.edu.in", "+91 98110 45001"),
            address: ("Sector 45", "Gurgaon", "Haryana", "122003"),
            supplied: 25,
            delivered: 25,
            status: SchoolStatus::Active,
            product_type: "IFP 75\"",
            segment: "K-12",
            serials: &[("VB75-DPS-0001", 15), ("VB75-DPS-0002", 10)],
            dispatch: day(2024, 1, 5),
            installation: day(2024, 1, 15),
        }
        .build(),
        SchoolSeed {
            id: "SCH-002",
            deal_id: "DEAL-2024-002",
            name: "St. Xavier's High School",
            spoc: ("Priya Sharma", "priya.sharma@stxaviers.edu.in", "+91 98200 22002"),
            address: ("5 Mahapalika Marg", "Mumbai", "Maharashtra", "400001"),
            supplied: 30,
            delivered: 28,
            status: SchoolStatus::Pending,
            product_type: "IFP 65\"",
            segment: "K-12",
            serials: &[("VB65-SXH-0001", 30)],
            dispatch: day(2024, 2, 10),
            installation: day(2024, 2, 20),
        }
        .build(),
        SchoolSeed {
            id: "SCH-003",
            deal_id: "DEAL-2024-003",
            name: "Cambridge International School",
            spoc: ("Amit Patel", "amit.patel@cis.edu.in", "+91 98450 33003"),
            address: ("80 Feet Road, Indiranagar", "Bangalore", "Karnataka", "560038"),
            supplied: 40,
            delivered: 40,
            status: SchoolStatus::Active,
            product_type: "IFP 75\"",
            segment: "International",
            serials: &[("VB75-CIS-0001", 20), ("VB75-CIS-0002", 20)],
            dispatch: day(2024, 1, 2),
            installation: day(2024, 1, 10),
        }
        .build(),
        SchoolSeed {
            id: "SCH-004",
            deal_id: "DEAL-2024-004",
            name: "The Heritage School",
            spoc: ("Sneha Roy", "sneha.roy@heritage.edu.in", "+91 98300 44004"),
            address: ("994 Madurdaha, Anandapur", "Kolkata", "West Bengal", "700107"),
            supplied: 20,
            delivered: 18,
            status: SchoolStatus::Inactive,
            product_type: "TV 55\"",
            segment: "K-12",
            serials: &[("TV55-THS-0001", 20)],
            dispatch: day(2023, 11, 28),
            installation: day(2023, 12, 5),
        }
        .build(),
        SchoolSeed {
            id: "SCH-005",
            deal_id: "DEAL-2024-005",
            name: "Modern Academy",
            spoc: ("Karan Mehta", "karan.mehta@modernacademy.in", "+91 98710 55005"),
            address: ("Sector 62", "Noida", "Uttar Pradesh", "201309"),
            supplied: 15,
            delivered: 12,
            status: SchoolStatus::Pending,
            product_type: "IFP 65\"",
            segment: "Higher Secondary",
            serials: &[("VB65-MA-0001", 12)],
            dispatch: day(2024, 3, 1),
            installation: None,
        }
        .build(),
    ]
}

struct IssueSeed {
    id: &'static str,
    school_id: &'static str,
    hubspot: &'static str,
    issue_type: IssueType,
    description: &'static str,
    status: IssueStatus,
    priority: Priority,
    reported: DateTime<Utc>,
    closed: Option<DateTime<Utc>>,
    resolution: Option<&'static str>,
    latest_update: &'static str,
    hardware: Option<HardwareDetails>,
}

impl IssueSeed {
    fn build(self) -> Issue {
        Issue {
            id: self.id.to_string(),
            school_id: self.school_id.to_string(),
            hubspot_ticket_id: Some(self.hubspot.to_string()),
            issue_type: self.issue_type,
            issue_description: self.description.to_string(),
            status: self.status,
            priority: self.priority,
            date_reported: self.reported,
            date_closed: self.closed,
            resolution_provided: self.resolution.map(str::to_string),
            latest_update: Some(self.latest_update.to_string()),
            hardware_details: self.hardware,
            audit: AuditFields::default(),
        }
    }
}

fn hardware(
    part_type: &str,
    installation: PartInstallationStatus,
    engineer: Option<(&str, &str, Option<NaiveDate>)>,
) -> Option<HardwareDetails> {
    Some(HardwareDetails {
        part_type: Some(part_type.to_string()),
        replacement_required: true,
        part_installation_status: Some(installation),
        engineer_details: engineer.map(|(name, contact, aligned_date)| EngineerDetails {
            name: name.to_string(),
            contact: contact.to_string(),
            aligned_date,
        }),
    })
}

fn sample_issues() -> Vec<Issue> {
    vec![
        IssueSeed {
            id: "ISS-001",
            school_id: "SCH-001",
            hubspot: "HUB-12345",
            issue_type: IssueType::Hardware,
            description: "IFP display not turning on",
            status: IssueStatus::InProgress,
            priority: Priority::High,
            reported: at(2024, 3, 18, 9, 30),
            closed: None,
            resolution: None,
            latest_update: "Technician scheduled for visit",
            hardware: hardware(
                "Power Supply Unit",
                PartInstallationStatus::Scheduled,
                Some(("Suresh Yadav", "+91 98111 70001", day(2024, 3, 22))),
            ),
        }
        .build(),
        IssueSeed {
            id: "ISS-002",
            school_id: "SCH-002",
            hubspot: "HUB-12346",
            issue_type: IssueType::Software,
            description: "Software update failure",
            status: IssueStatus::Open,
            priority: Priority::Medium,
            reported: at(2024, 3, 19, 11, 0),
            closed: None,
            resolution: None,
            latest_update: "Awaiting remote diagnosis",
            hardware: None,
        }
        .build(),
        IssueSeed {
            id: "ISS-003",
            school_id: "SCH-003",
            hubspot: "HUB-12347",
            issue_type: IssueType::Hardware,
            description: "Touch panel not responsive",
            status: IssueStatus::InProgress,
            priority: Priority::Critical,
            reported: at(2024, 3, 15, 8, 45),
            closed: None,
            resolution: None,
            latest_update: "Part shipped for replacement",
            hardware: hardware("Touch Panel Module", PartInstallationStatus::Pending, None),
        }
        .build(),
        IssueSeed {
            id: "ISS-004",
            school_id: "SCH-004",
            hubspot: "HUB-12348",
            issue_type: IssueType::Software,
            description: "Application crash on startup",
            status: IssueStatus::Resolved,
            priority: Priority::Low,
            reported: at(2024, 3, 17, 14, 15),
            closed: Some(at(2024, 3, 20, 10, 0)),
            resolution: Some("Reinstalled launcher build 4.2.1"),
            latest_update: "Issue resolved via remote update",
            hardware: None,
        }
        .build(),
        IssueSeed {
            id: "ISS-005",
            school_id: "SCH-004",
            hubspot: "HUB-12349",
            issue_type: IssueType::Hardware,
            description: "Display flickering on classroom panel",
            status: IssueStatus::InProgress,
            priority: Priority::Medium,
            reported: at(2024, 3, 12, 10, 0),
            closed: None,
            resolution: None,
            latest_update: "Replacement board delivered, installation pending",
            hardware: hardware(
                "Display Controller Board",
                PartInstallationStatus::Scheduled,
                Some(("Arnab Das", "+91 98301 70005", day(2024, 3, 21))),
            ),
        }
        .build(),
        IssueSeed {
            id: "ISS-006",
            school_id: "SCH-005",
            hubspot: "HUB-12350",
            issue_type: IssueType::Hardware,
            description: "No signal from HDMI input",
            status: IssueStatus::Open,
            priority: Priority::Low,
            reported: at(2024, 3, 19, 15, 20),
            closed: None,
            resolution: None,
            latest_update: "Cable set dispatched from warehouse",
            hardware: hardware("HDMI Cable Set", PartInstallationStatus::Pending, None),
        }
        .build(),
    ]
}

#[allow(clippy::too_many_arguments)]
fn shipment(
    id: &str,
    issue_id: &str,
    courier: Courier,
    tracking_number: &str,
    status: ShipmentStatus,
    estimated_delivery: Option<NaiveDate>,
    last_location: &str,
    last_update: DateTime<Utc>,
) -> ShippingStatus {
    ShippingStatus {
        id: id.to_string(),
        issue_id: issue_id.to_string(),
        courier,
        tracking_number: tracking_number.to_string(),
        status,
        estimated_delivery,
        actual_delivery: (status == ShipmentStatus::Delivered).then_some(last_update),
        last_location: Some(last_location.to_string()),
        last_update,
        audit: AuditFields::default(),
    }
}

fn sample_shipments() -> Vec<ShippingStatus> {
    vec![
        shipment(
            "SHP-001",
            "ISS-003",
            Courier::Dtdc,
            "DT123456789",
            ShipmentStatus::InTransit,
            day(2024, 3, 22),
            "Mumbai Hub",
            at(2024, 3, 20, 14, 30),
        ),
        shipment(
            "SHP-002",
            "ISS-001",
            Courier::DelhiveryB2b,
            "DLV987654321",
            ShipmentStatus::OutForDelivery,
            day(2024, 3, 21),
            "Gurgaon DC",
            at(2024, 3, 21, 9, 15),
        ),
        shipment(
            "SHP-003",
            "ISS-005",
            Courier::Speedair,
            "SA456789123",
            ShipmentStatus::Delivered,
            day(2024, 3, 19),
            "Delivered",
            at(2024, 3, 19, 16, 45),
        ),
        shipment(
            "SHP-004",
            "ISS-006",
            Courier::SafeExpress,
            "SE789123456",
            ShipmentStatus::PickedUp,
            day(2024, 3, 24),
            "Warehouse",
            at(2024, 3, 20, 11, 0),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceSettings;

    #[tokio::test]
    async fn test_seeding_is_idempotent() {
        let service = DashboardService::in_memory(ServiceSettings::default());
        let actor = Actor::new("USR-000", "System");

        let first = seed_sample_data(&service, &actor).await.unwrap();
        assert_eq!(first.created, 3 + 5 + 6 + 4);
        assert_eq!(first.skipped, 0);

        let second = seed_sample_data(&service, &actor).await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.skipped, 18);
        assert_eq!(service.audit_log().len(), 15);
    }

    #[test]
    fn test_sample_records_are_valid() {
        for school in sample_schools() {
            school.validate().unwrap();
        }
        for issue in sample_issues() {
            issue.validate().unwrap();
        }
        for shipment in sample_shipments() {
            shipment.validate().unwrap();
        }
    }
}
