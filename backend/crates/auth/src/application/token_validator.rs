//! Token Validator
//!
//! Resolves a presented refresh secret to the user it authenticates.

use std::sync::Arc;

use chrono::Utc;

use crate::application::config::AuthConfig;
use crate::application::device_sessions::DeviceSessionRegistry;
use crate::domain::entity::{RefreshToken, User};
use crate::domain::repository::{DeviceSessionRepository, RefreshTokenRepository, UserRepository};
use crate::domain::value_object::RefreshSecret;
use crate::error::{AuthError, AuthResult};

/// A validated credential
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user: User,
    pub token: RefreshToken,
}

/// Token validator
pub struct TokenValidator<R>
where
    R: RefreshTokenRepository + UserRepository + DeviceSessionRepository,
{
    repo: Arc<R>,
    config: Arc<AuthConfig>,
}

impl<R> TokenValidator<R>
where
    R: RefreshTokenRepository + UserRepository + DeviceSessionRepository,
{
    pub fn new(repo: Arc<R>, config: Arc<AuthConfig>) -> Self {
        Self { repo, config }
    }

    /// Validate without rotating
    ///
    /// Unknown, revoked and expired secrets all fail with `TokenInvalid`.
    /// A valid secret of a deleted user fails with `UserDeleted`. Success
    /// advances the device session's `last_used_at`.
    pub async fn validate(&self, presented: &RefreshSecret) -> AuthResult<Authenticated> {
        let now = Utc::now();

        let token = self
            .repo
            .find_active_token(&presented.hash(), now)
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        let user = self
            .repo
            .find_user(token.user_id)
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        if user.is_deleted() {
            return Err(AuthError::UserDeleted);
        }

        DeviceSessionRegistry::new(self.repo.clone(), self.config.clone())
            .touch(token.device_session_id)
            .await?;

        Ok(Authenticated { user, token })
    }
}
