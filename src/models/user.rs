//! User model
//!
//! Back-office users who perform mutations. No authentication happens in the
//! core; a user only identifies the actor recorded on audit entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::require_text;
use crate::error::RepositoryError;

string_enum! {
    pub enum UserRole ("user role") {
        Admin => "admin",
        Manager => "manager",
        Operator => "operator",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn validate(&self) -> Result<(), RepositoryError> {
        require_text("name", &self.name)?;
        let (local, domain) = self.email.split_once('@').ok_or_else(|| {
            RepositoryError::validation_error(format!("invalid email '{}'", self.email))
        })?;
        if local.is_empty() || domain.is_empty() {
            return Err(RepositoryError::validation_error(format!(
                "invalid email '{}'",
                self.email
            )));
        }
        Ok(())
    }

    /// The acting identity of this user
    pub fn actor(&self) -> Actor {
        Actor::new(self.id.clone(), self.name.clone())
    }
}

/// Partial update of a user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct UserPatch {
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<UserRole>,
}

/// Identity attached to a mutation (`createdBy`/`updatedBy`, audit `userId`/`userName`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: String,
    pub user_name: String,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str) -> User {
        User {
            id: "USR-001".to_string(),
            email: email.to_string(),
            name: "Priya Sharma".to_string(),
            role: UserRole::Manager,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_email_validation() {
        assert!(user("priya@example.com").validate().is_ok());
        assert!(user("priya.example.com").validate().is_err());
        assert!(user("@example.com").validate().is_err());
    }

    #[test]
    fn test_role_wire_names() {
        let json = serde_json::json!({
            "email": "ops@example.com",
            "name": "Ops",
            "role": "operator"
        });
        let parsed: User = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.role, UserRole::Operator);

        let bad = serde_json::json!({"email": "a@b.c", "name": "x", "role": "root"});
        assert!(serde_json::from_value::<User>(bad).is_err());
    }
}
