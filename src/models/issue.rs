//! Issue entity model
//!
//! Support tickets raised against a school. `ticketAging` is never stored; it
//! is derived from `dateReported`/`dateClosed` whenever an issue is read.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{AuditFields, require_text};
use crate::clock::whole_days_between;
use crate::error::RepositoryError;

string_enum! {
    pub enum IssueType ("issue type") {
        Hardware => "hardware",
        Software => "software",
    }
}

string_enum! {
    /// Ticket lifecycle, in forward order.
    pub enum IssueStatus ("issue status") {
        Open => "open",
        InProgress => "in-progress",
        Resolved => "resolved",
        Closed => "closed",
    }
}

string_enum! {
    pub enum Priority ("priority") {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

string_enum! {
    pub enum PartInstallationStatus ("part installation status") {
        Pending => "pending",
        Scheduled => "scheduled",
        Completed => "completed",
    }
}

impl IssueStatus {
    /// Resolved and closed tickets carry a `dateClosed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, IssueStatus::Resolved | IssueStatus::Closed)
    }

    /// Counted as an open ticket on the dashboard.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Validate a status change.
    ///
    /// Transition rules:
    /// - any status may move forward (`open` -> `in-progress` -> `resolved` -> `closed`),
    ///   skipping intermediate steps
    /// - backward moves are rejected
    /// - `closed` -> `open` is allowed only with the explicit `reopen` override
    pub fn validate_transition(&self, next: IssueStatus, reopen: bool) -> Result<(), RepositoryError> {
        if reopen {
            if *self == IssueStatus::Closed && next == IssueStatus::Open {
                return Ok(());
            }
            return Err(RepositoryError::validation_error(format!(
                "reopen override only applies to closed -> open, not '{}' -> '{}'",
                self, next
            )));
        }

        if next >= *self {
            return Ok(());
        }

        let hint = if *self == IssueStatus::Closed && next == IssueStatus::Open {
            " (set reopen to reopen a closed ticket)"
        } else {
            ""
        };
        Err(RepositoryError::validation_error(format!(
            "cannot move issue from '{}' back to '{}'{}",
            self, next, hint
        )))
    }
}

/// Assigned field engineer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineerDetails {
    pub name: String,
    pub contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aligned_date: Option<NaiveDate>,
}

/// Hardware-specific details. The linked shipment is resolved at read time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_type: Option<String>,
    #[serde(default)]
    pub replacement_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_installation_status: Option<PartInstallationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engineer_details: Option<EngineerDetails>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    #[serde(default)]
    pub id: String,
    pub school_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hubspot_ticket_id: Option<String>,
    pub issue_type: IssueType,
    pub issue_description: String,
    pub status: IssueStatus,
    pub priority: Priority,
    pub date_reported: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_closed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_provided: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_update: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_details: Option<HardwareDetails>,
    #[serde(flatten)]
    pub audit: AuditFields,
}

impl Issue {
    pub fn validate(&self) -> Result<(), RepositoryError> {
        require_text("schoolId", &self.school_id)?;
        require_text("issueDescription", &self.issue_description)?;

        match (self.status.is_terminal(), self.date_closed) {
            (true, None) => {
                return Err(RepositoryError::validation_error(format!(
                    "dateClosed is required for a {} issue",
                    self.status
                )));
            }
            (false, Some(_)) => {
                return Err(RepositoryError::validation_error(format!(
                    "dateClosed must be empty for a {} issue",
                    self.status
                )));
            }
            _ => {}
        }

        if let Some(closed) = self.date_closed
            && closed < self.date_reported
        {
            return Err(RepositoryError::validation_error(
                "dateClosed cannot precede dateReported",
            ));
        }

        if let Some(details) = &self.hardware_details {
            if self.issue_type != IssueType::Hardware {
                return Err(RepositoryError::validation_error(
                    "hardwareDetails are only allowed on hardware issues",
                ));
            }
            if let Some(engineer) = &details.engineer_details {
                require_text("engineerDetails.name", &engineer.name)?;
            }
        }

        Ok(())
    }

    /// Whole days since the issue was reported, stopping at `dateClosed`.
    pub fn ticket_aging(&self, now: DateTime<Utc>) -> i64 {
        whole_days_between(self.date_reported, self.date_closed.unwrap_or(now))
    }

    pub fn part_type(&self) -> Option<&str> {
        self.hardware_details
            .as_ref()
            .and_then(|details| details.part_type.as_deref())
    }
}

/// Partial update of an issue. `schoolId` is fixed at creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct IssuePatch {
    pub hubspot_ticket_id: Option<String>,
    pub issue_type: Option<IssueType>,
    pub issue_description: Option<String>,
    pub status: Option<IssueStatus>,
    pub priority: Option<Priority>,
    pub resolution_provided: Option<String>,
    pub latest_update: Option<String>,
    pub hardware_details: Option<HardwareDetails>,
    /// Explicit override permitting `closed` -> `open`.
    pub reopen: bool,
}
