//! User repository
//!
//! Users identify actors; they are not audited and emails are unique.

use chrono::{DateTime, Utc};

use super::{Entity, Patch, Repository, UniqueKey};
use crate::error::RepositoryError;
use crate::models::{Actor, EntityKind, User, UserPatch};

pub type UserRepository = Repository<User>;

impl Entity for User {
    const KIND: EntityKind = EntityKind::User;
    const ID_PREFIX: &'static str = "USR";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn stamp_created(&mut self, _actor: &Actor, now: DateTime<Utc>) {
        self.created_at = now;
        self.updated_at = now;
    }

    fn stamp_updated(&mut self, _actor: &Actor, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn validate(&self) -> Result<(), RepositoryError> {
        User::validate(self)
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        vec![UniqueKey::new("email", self.email.trim().to_lowercase())]
    }
}

impl Patch<User> for UserPatch {
    fn apply(self, user: &mut User, _now: DateTime<Utc>) -> Result<(), RepositoryError> {
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(name) = self.name {
            user.name = name;
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        Ok(())
    }
}
