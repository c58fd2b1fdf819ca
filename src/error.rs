//! # Error Handling
//!
//! This module provides the error taxonomy shared by the repositories, the
//! query engine and the service facade, together with a serializable
//! [`ErrorBody`] that presentation layers can render as-is.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapters::{PersistenceError, TrackingError};

/// Errors returned by repository, query and service operations.
///
/// None of these are retried inside the core; retry policy belongs to the
/// persistence or network collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// An invariant or enum-domain violation on write. Never partially applied.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Unknown id on get/update.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Duplicate id or unique key on create/update.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A collaborator (persistence backend, courier tracking) failed.
    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl RepositoryError {
    /// Create a validation error
    pub fn validation_error<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a conflict error
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict(message.into())
    }

    /// Create a not-found error for the given entity label and id
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Stable machine-readable code (SCREAMING_SNAKE_CASE)
    pub fn error_code(&self) -> &'static str {
        match self {
            RepositoryError::Validation(_) => "VALIDATION_FAILED",
            RepositoryError::NotFound { .. } => "NOT_FOUND",
            RepositoryError::Conflict(_) => "CONFLICT",
            RepositoryError::Upstream(_) => "UPSTREAM_ERROR",
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, RepositoryError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RepositoryError::Conflict(_))
    }
}

impl From<PersistenceError> for RepositoryError {
    fn from(error: PersistenceError) -> Self {
        RepositoryError::Upstream(error.to_string())
    }
}

impl From<TrackingError> for RepositoryError {
    fn from(error: TrackingError) -> Self {
        match error {
            TrackingError::NotConfigured { .. } => RepositoryError::Validation(error.to_string()),
            TrackingError::UnknownShipment { tracking_number } => {
                RepositoryError::not_found("Tracking number", tracking_number)
            }
            TrackingError::Upstream(_) => RepositoryError::Upstream(error.to_string()),
        }
    }
}

/// Payloads that fail to deserialize are domain violations (bad enum strings,
/// negative counts, unknown fields), not internal errors.
impl From<serde_json::Error> for RepositoryError {
    fn from(error: serde_json::Error) -> Self {
        RepositoryError::Validation(format!("Invalid payload: {}", error))
    }
}

/// Serializable error shape handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl From<&RepositoryError> for ErrorBody {
    fn from(error: &RepositoryError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            RepositoryError::validation_error("bad").error_code(),
            "VALIDATION_FAILED"
        );
        assert_eq!(
            RepositoryError::not_found("School", "SCH-001").error_code(),
            "NOT_FOUND"
        );
        assert_eq!(RepositoryError::conflict("dup").error_code(), "CONFLICT");
        assert_eq!(
            RepositoryError::Upstream("disk".into()).error_code(),
            "UPSTREAM_ERROR"
        );
    }

    #[test]
    fn test_not_found_message() {
        let err = RepositoryError::not_found("Issue", "ISS-404");
        assert_eq!(err.to_string(), "Issue not found: ISS-404");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_serde_error_maps_to_validation() {
        let parse_err = serde_json::from_str::<u32>("-1").unwrap_err();
        let err: RepositoryError = parse_err.into();
        assert!(err.is_validation());
    }

    #[test]
    fn test_error_body_from_error() {
        let err = RepositoryError::conflict("dealId DEAL-2024-001 already exists");
        let body = ErrorBody::from(&err);
        assert_eq!(body.code, "CONFLICT");
        assert!(body.message.contains("DEAL-2024-001"));

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["code"], "CONFLICT");
    }
}
