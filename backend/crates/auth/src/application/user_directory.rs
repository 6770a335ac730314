//! User Directory
//!
//! Looks up and provisions users by email.

use std::sync::Arc;

use chrono::Utc;
use kernel::id::UserId;

use crate::domain::entity::{NewUser, User};
use crate::domain::repository::UserRepository;
use crate::domain::value_object::Email;
use crate::error::{AuthError, AuthResult};

/// User directory
pub struct UserDirectory<R>
where
    R: UserRepository,
{
    repo: Arc<R>,
}

impl<R> UserDirectory<R>
where
    R: UserRepository,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Return the user for `email`, creating it on first sign-in
    ///
    /// A soft-deleted user is never resurrected.
    pub async fn find_or_create_by_email(&self, email: &Email) -> AuthResult<User> {
        let user = match self.repo.find_user_by_email(email).await? {
            Some(user) => user,
            None => {
                let user = self.repo.insert_user_or_get(&NewUser::new(email.clone())).await?;
                tracing::info!(user_id = %user.user_id, "User provisioned");
                user
            }
        };

        if user.is_deleted() {
            return Err(AuthError::UserDeleted);
        }
        Ok(user)
    }

    /// Give a name to a user who has none yet; existing names are kept
    pub async fn adopt_display_name(&self, user: &mut User, name: &str) -> AuthResult<()> {
        let name = name.trim();
        if user.display_name.is_some() || name.is_empty() {
            return Ok(());
        }
        if self.repo.adopt_display_name(user.user_id, name).await? {
            user.display_name = Some(name.to_string());
        }
        Ok(())
    }

    /// Soft-delete; existing credentials stop validating immediately
    pub async fn soft_delete(&self, user_id: UserId) -> AuthResult<bool> {
        let deleted = self.repo.soft_delete_user(user_id, Utc::now()).await?;
        if deleted {
            tracing::info!(user_id = %user_id, "User soft-deleted");
        }
        Ok(deleted)
    }
}
