//! # Data Models
//!
//! Entity definitions for schools, issues, shipments, users and audit logs.
//! All entities serialize to the camelCase JSON shape the dashboard expects,
//! and every closed enum serializes to its exact wire string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RepositoryError;

/// Declares a closed string enum: serde wire names, `as_str`, `Display`, and a
/// `FromStr` that rejects anything outside the set with a validation error.
///
/// Variant order is significant where the enum is a state machine; the derived
/// `Ord` follows declaration order.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident ($label:literal) {
            $($(#[$vmeta:meta])* $variant:ident => $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        $vis enum $name {
            $($(#[$vmeta])* #[serde(rename = $value)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::RepositoryError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err($crate::error::RepositoryError::validation_error(format!(
                        "invalid {} '{}'; expected one of: {}",
                        $label,
                        other,
                        [$($value),+].join(", ")
                    ))),
                }
            }
        }
    };
}

pub mod audit_log;
pub mod issue;
pub mod school;
pub mod shipping;
pub mod user;

pub use audit_log::{AuditAction, AuditEntityType, AuditLog};
pub use issue::{
    EngineerDetails, HardwareDetails, Issue, IssuePatch, IssueStatus, IssueType,
    PartInstallationStatus, Priority,
};
pub use school::{Address, School, SchoolPatch, SchoolStatus, SerialNumber, SpocDetails};
pub use shipping::{Courier, ShipmentStatus, ShippingPatch, ShippingStatus};
pub use user::{Actor, User, UserPatch, UserRole};

string_enum! {
    /// Entity collections known to the core.
    pub enum EntityKind ("entity type") {
        School => "school",
        Issue => "issue",
        Shipping => "shipping",
        User => "user",
    }
}

impl EntityKind {
    /// Human-readable label used in error messages
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::School => "School",
            EntityKind::Issue => "Issue",
            EntityKind::Shipping => "Shipment",
            EntityKind::User => "User",
        }
    }
}

/// Who created/last changed a record and when.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuditFields {
    pub created_by: String,
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuditFields {
    pub fn stamp_created(&mut self, actor: &Actor, now: DateTime<Utc>) {
        self.created_by = actor.user_id.clone();
        self.updated_by = actor.user_id.clone();
        self.created_at = now;
        self.updated_at = now;
    }

    pub fn stamp_updated(&mut self, actor: &Actor, now: DateTime<Utc>) {
        self.updated_by = actor.user_id.clone();
        self.updated_at = now;
    }
}

/// Reject blank required text fields.
pub(crate) fn require_text(field: &str, value: &str) -> Result<(), RepositoryError> {
    if value.trim().is_empty() {
        return Err(RepositoryError::validation_error(format!(
            "{} cannot be empty",
            field
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_enum_roundtrip_strings() {
        for kind in EntityKind::ALL {
            let parsed: EntityKind = kind.as_str().parse().unwrap();
            assert_eq!(&parsed, kind);
        }
        assert_eq!(
            serde_json::to_value(EntityKind::Shipping).unwrap(),
            serde_json::json!("shipping")
        );
    }

    #[test]
    fn test_string_enum_rejects_unknown_value() {
        let err = "warehouse".parse::<EntityKind>().unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("school, issue, shipping, user"));
    }

    #[test]
    fn test_require_text() {
        assert!(require_text("name", "Test School").is_ok());
        assert!(require_text("name", "   ").unwrap_err().is_validation());
    }
}
