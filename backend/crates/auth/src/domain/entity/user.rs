//! User Entity
//!
//! An account keyed by its normalized email address.

use chrono::{DateTime, Utc};
use kernel::id::UserId;

use crate::domain::value_object::Email;

/// User entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: UserId,
    /// Normalized, unique
    pub email: Email,
    pub display_name: Option<String>,
    /// Set once the account is soft-deleted; never cleared
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Display name, falling back to the email's local part
    pub fn display_name_or_default(&self) -> &str {
        self.display_name
            .as_deref()
            .unwrap_or_else(|| self.email.local_part())
    }
}

/// Insert payload for a new user; the store assigns the id
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: Email,
    pub display_name: Option<String>,
}

impl NewUser {
    pub fn new(email: Email) -> Self {
        Self {
            email,
            display_name: None,
        }
    }
}
