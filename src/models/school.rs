//! School entity model
//!
//! A deployment site receiving IFP units. Schools are never hard-deleted;
//! retiring a site moves it to `inactive`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{AuditFields, require_text};
use crate::error::RepositoryError;

string_enum! {
    pub enum SchoolStatus ("school status") {
        Active => "active",
        Inactive => "inactive",
        Pending => "pending",
    }
}

/// Single point of contact at the school
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpocDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
}

/// A serial number and the number of units shipped under it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialNumber {
    pub number: String,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct School {
    #[serde(default)]
    pub id: String,
    pub deal_id: String,
    pub name: String,
    pub spoc_details: SpocDetails,
    pub address: Address,
    pub tv_ifp_supplied: u32,
    pub orders_delivered: u32,
    pub current_status: SchoolStatus,
    pub product_type: String,
    pub segment: String,
    #[serde(default)]
    pub serial_numbers: Vec<SerialNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(flatten)]
    pub audit: AuditFields,
}

impl School {
    /// Check every write-time invariant of a school record.
    pub fn validate(&self) -> Result<(), RepositoryError> {
        require_text("dealId", &self.deal_id)?;
        require_text("name", &self.name)?;

        if self.orders_delivered > self.tv_ifp_supplied {
            return Err(RepositoryError::validation_error(format!(
                "ordersDelivered ({}) cannot exceed tvIfpSupplied ({})",
                self.orders_delivered, self.tv_ifp_supplied
            )));
        }

        for serial in &self.serial_numbers {
            require_text("serialNumbers.number", &serial.number)?;
            if serial.size == 0 {
                return Err(RepositoryError::validation_error(format!(
                    "serial number {} must cover at least one unit",
                    serial.number
                )));
            }
        }

        if let (Some(dispatched), Some(installed)) = (self.dispatch_date, self.installation_date)
            && installed < dispatched
        {
            return Err(RepositoryError::validation_error(format!(
                "installationDate ({}) cannot precede dispatchDate ({})",
                installed, dispatched
            )));
        }

        Ok(())
    }

    /// Total units recorded against serial numbers
    pub fn serial_units(&self) -> u64 {
        self.serial_numbers.iter().map(|s| u64::from(s.size)).sum()
    }

    /// Whether the serial-number totals match the supplied unit count
    pub fn serials_reconciled(&self) -> bool {
        self.serial_units() == u64::from(self.tv_ifp_supplied)
    }

    /// Units supplied but not yet delivered
    pub fn pending_deliveries(&self) -> u32 {
        self.tv_ifp_supplied.saturating_sub(self.orders_delivered)
    }
}

/// Partial update of a school. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct SchoolPatch {
    pub deal_id: Option<String>,
    pub name: Option<String>,
    pub spoc_details: Option<SpocDetails>,
    pub address: Option<Address>,
    pub tv_ifp_supplied: Option<u32>,
    pub orders_delivered: Option<u32>,
    pub current_status: Option<SchoolStatus>,
    pub product_type: Option<String>,
    pub segment: Option<String>,
    pub serial_numbers: Option<Vec<SerialNumber>>,
    pub dispatch_date: Option<NaiveDate>,
    pub installation_date: Option<NaiveDate>,
    pub vendor_name: Option<String>,
    pub brand: Option<String>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_school() -> School {
        School {
            id: String::new(),
            deal_id: "DEAL-2024-099".to_string(),
            name: "Test School".to_string(),
            spoc_details: SpocDetails {
                name: "Asha Verma".to_string(),
                email: "asha@testschool.in".to_string(),
                phone: "+91 98100 00000".to_string(),
            },
            address: Address {
                street: "12 Ring Road".to_string(),
                city: "Pune".to_string(),
                state: "Maharashtra".to_string(),
                pincode: "411001".to_string(),
            },
            tv_ifp_supplied: 10,
            orders_delivered: 10,
            current_status: SchoolStatus::Active,
            product_type: "IFP 75\"".to_string(),
            segment: "K-12".to_string(),
            serial_numbers: vec![SerialNumber {
                number: "SN-TS-0001".to_string(),
                size: 10,
            }],
            dispatch_date: None,
            installation_date: None,
            vendor_name: None,
            brand: None,
            audit: AuditFields::default(),
        }
    }

    #[test]
    fn test_delivered_equal_to_supplied_is_legal() {
        assert!(sample_school().validate().is_ok());
    }

    #[test]
    fn test_delivered_above_supplied_is_rejected() {
        let mut school = sample_school();
        school.orders_delivered = 11;
        let err = school.validate().unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("ordersDelivered"));
    }

    #[test]
    fn test_negative_counts_rejected_on_deserialize() {
        let mut json = serde_json::to_value(sample_school()).unwrap();
        json["tvIfpSupplied"] = serde_json::json!(-1);
        assert!(serde_json::from_value::<School>(json).is_err());
    }

    #[test]
    fn test_unknown_status_rejected_on_deserialize() {
        let mut json = serde_json::to_value(sample_school()).unwrap();
        json["currentStatus"] = serde_json::json!("archived");
        assert!(serde_json::from_value::<School>(json).is_err());
    }

    #[test]
    fn test_serial_reconciliation() {
        let mut school = sample_school();
        assert!(school.serials_reconciled());
        school.serial_numbers.push(SerialNumber {
            number: "SN-TS-0002".to_string(),
            size: 2,
        });
        assert!(!school.serials_reconciled());
        assert_eq!(school.serial_units(), 12);
    }

    #[test]
    fn test_installation_before_dispatch_rejected() {
        let mut school = sample_school();
        school.dispatch_date = NaiveDate::from_ymd_opt(2024, 2, 1);
        school.installation_date = NaiveDate::from_ymd_opt(2024, 1, 15);
        assert!(school.validate().is_err());
    }

    #[test]
    fn test_patch_rejects_unknown_fields() {
        let patch = serde_json::from_value::<SchoolPatch>(serde_json::json!({"color": "red"}));
        assert!(patch.is_err());
    }
}
