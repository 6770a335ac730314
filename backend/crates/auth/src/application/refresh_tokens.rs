//! Refresh Token Ledger
//!
//! Issues, rotates and revokes refresh tokens. The plaintext secret is
//! returned exactly once, at issuance.

use std::sync::Arc;

use chrono::Utc;
use kernel::id::{DeviceSessionId, UserId};

use crate::application::config::AuthConfig;
use crate::domain::entity::{IssuedToken, NewRefreshToken};
use crate::domain::repository::{RefreshTokenRepository, UserRepository};
use crate::domain::value_object::RefreshSecret;
use crate::error::{AuthError, AuthResult};

/// Refresh token ledger
pub struct RefreshTokenLedger<R>
where
    R: RefreshTokenRepository + UserRepository,
{
    repo: Arc<R>,
    config: Arc<AuthConfig>,
}

impl<R> RefreshTokenLedger<R>
where
    R: RefreshTokenRepository + UserRepository,
{
    pub fn new(repo: Arc<R>, config: Arc<AuthConfig>) -> Self {
        Self { repo, config }
    }

    /// Issue a token with the configured lifetime
    pub async fn issue(
        &self,
        user_id: UserId,
        session_id: DeviceSessionId,
    ) -> AuthResult<IssuedToken> {
        self.issue_with_ttl(user_id, session_id, self.config.refresh_token_ttl_chrono()?)
            .await
    }

    pub async fn issue_with_ttl(
        &self,
        user_id: UserId,
        session_id: DeviceSessionId,
        ttl: chrono::Duration,
    ) -> AuthResult<IssuedToken> {
        let now = Utc::now();
        let (new_token, secret) = NewRefreshToken::generate(user_id, session_id, ttl, now);
        let token = self.repo.insert_token(&new_token, now).await?;

        tracing::debug!(token_id = %token.token_id, session_id = %session_id, "Refresh token issued");
        Ok(IssuedToken { token, secret })
    }

    /// Exchange a valid secret for a new one in the same device session
    ///
    /// The presented token is revoked and its successor inserted in one
    /// atomic step; a concurrent rotation of the same secret fails with
    /// `TokenInvalid`. Secrets of soft-deleted users fail with `UserDeleted`.
    pub async fn rotate(&self, presented: &RefreshSecret) -> AuthResult<IssuedToken> {
        let now = Utc::now();
        let hash = presented.hash();

        let Some(current) = self.repo.find_active_token(&hash, now).await? else {
            self.on_inactive_secret(presented).await?;
            return Err(AuthError::TokenInvalid);
        };

        // A deleted account gets no successor, even from a live token
        match self.repo.find_user(current.user_id).await? {
            Some(user) if user.is_deleted() => return Err(AuthError::UserDeleted),
            Some(_) => {}
            None => return Err(AuthError::TokenInvalid),
        }

        let (successor, secret) = NewRefreshToken::generate(
            current.user_id,
            current.device_session_id,
            self.config.refresh_token_ttl_chrono()?,
            now,
        );

        let token = self
            .repo
            .rotate_token(current.token_id, &successor, now)
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        tracing::debug!(
            revoked = %current.token_id,
            issued = %token.token_id,
            session_id = %token.device_session_id,
            "Refresh token rotated"
        );
        Ok(IssuedToken { token, secret })
    }

    /// Revoke the token behind a presented secret, if it is active
    pub async fn revoke_by_plain(&self, presented: &RefreshSecret) -> AuthResult<bool> {
        let now = Utc::now();
        let Some(token) = self.repo.find_active_token(&presented.hash(), now).await? else {
            return Ok(false);
        };
        let revoked = self.repo.revoke_token(token.token_id, now).await?;
        if revoked {
            tracing::info!(user_id = %token.user_id, session_id = %token.device_session_id, "Refresh token revoked");
        }
        Ok(revoked)
    }

    pub async fn revoke_all_for_user(&self, user_id: UserId) -> AuthResult<u64> {
        let revoked = self.repo.revoke_tokens_for_user(user_id, Utc::now()).await?;
        tracing::info!(user_id = %user_id, revoked, "Revoked all refresh tokens of user");
        Ok(revoked)
    }

    pub async fn revoke_all_for_session(
        &self,
        user_id: UserId,
        session_id: DeviceSessionId,
    ) -> AuthResult<u64> {
        let revoked = self
            .repo
            .revoke_tokens_for_session(user_id, session_id, Utc::now())
            .await?;
        tracing::info!(user_id = %user_id, session_id = %session_id, revoked, "Revoked device session");
        Ok(revoked)
    }

    /// A revoked secret coming back means the chain was copied; optionally
    /// cut off the whole device session
    async fn on_inactive_secret(&self, presented: &RefreshSecret) -> AuthResult<()> {
        if !self.config.revoke_family_on_reuse {
            return Ok(());
        }
        let Some(token) = self.repo.find_latest_token(&presented.hash()).await? else {
            return Ok(());
        };
        if !token.is_revoked() {
            return Ok(());
        }

        let revoked = self
            .repo
            .revoke_tokens_for_session(token.user_id, token.device_session_id, Utc::now())
            .await?;
        tracing::warn!(
            user_id = %token.user_id,
            session_id = %token.device_session_id,
            revoked,
            "Revoked refresh secret replayed; device session revoked"
        );
        Ok(())
    }
}
