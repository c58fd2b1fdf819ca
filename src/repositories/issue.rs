//! Issue repository
//!
//! Status changes go through [`IssueStatus::validate_transition`]; `dateClosed`
//! follows the status into and out of the resolved/closed band.

use chrono::{DateTime, Utc};

use super::{Entity, Patch, Repository};
use crate::error::RepositoryError;
use crate::models::{Actor, EntityKind, Issue, IssuePatch, IssueStatus};

pub type IssueRepository = Repository<Issue>;

impl Entity for Issue {
    const KIND: EntityKind = EntityKind::Issue;
    const ID_PREFIX: &'static str = "ISS";

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

    /// An issue created already resolved or closed is closed as of now.
    fn prepare_create(&mut self, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        if self.status.is_terminal() && self.date_closed.is_none() {
            self.date_closed = Some(now.max(self.date_reported));
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), RepositoryError> {
        Issue::validate(self)
    }
}

impl Patch<Issue> for IssuePatch {
    fn apply(self, issue: &mut Issue, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        match self.status {
            Some(next) => {
                issue.status.validate_transition(next, self.reopen)?;
                if next.is_terminal() {
                    if !issue.status.is_terminal() {
                        issue.date_closed = Some(now);
                    }
                } else {
                    issue.date_closed = None;
                }
                issue.status = next;
            }
            None if self.reopen => {
                return Err(RepositoryError::validation_error(format!(
                    "reopen requires status '{}'",
                    IssueStatus::Open
                )));
            }
            None => {}
        }

        if self.hubspot_ticket_id.is_some() {
            issue.hubspot_ticket_id = self.hubspot_ticket_id;
        }
        if let Some(issue_type) = self.issue_type {
            issue.issue_type = issue_type;
        }
        if let Some(description) = self.issue_description {
            issue.issue_description = description;
        }
        if let Some(priority) = self.priority {
            issue.priority = priority;
        }
        if self.resolution_provided.is_some() {
            issue.resolution_provided = self.resolution_provided;
        }
        if self.latest_update.is_some() {
            issue.latest_update = self.latest_update;
        }
        if self.hardware_details.is_some() {
            issue.hardware_details = self.hardware_details;
        }
        Ok(())
    }
}
