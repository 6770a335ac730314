//! Device Session Registry
//!
//! Tracks the devices a user is signed in on.

use std::sync::Arc;

use chrono::Utc;
use kernel::id::{DeviceSessionId, UserId};
use platform::client::ClientInfo;

use crate::application::config::AuthConfig;
use crate::application::refresh_tokens::RefreshTokenLedger;
use crate::domain::entity::{DeviceSession, NewDeviceSession};
use crate::domain::repository::{
    DeviceSessionRepository, RefreshTokenRepository, UserRepository,
};
use crate::error::AuthResult;

/// Device session registry
pub struct DeviceSessionRegistry<R>
where
    R: DeviceSessionRepository + RefreshTokenRepository + UserRepository,
{
    repo: Arc<R>,
    config: Arc<AuthConfig>,
}

impl<R> DeviceSessionRegistry<R>
where
    R: DeviceSessionRepository + RefreshTokenRepository + UserRepository,
{
    pub fn new(repo: Arc<R>, config: Arc<AuthConfig>) -> Self {
        Self { repo, config }
    }

    pub async fn create(
        &self,
        user_id: UserId,
        device_name: Option<String>,
        client: &ClientInfo,
    ) -> AuthResult<DeviceSession> {
        let session = self
            .repo
            .insert_session(&NewDeviceSession::new(user_id, device_name, client), Utc::now())
            .await?;

        tracing::info!(
            user_id = %user_id,
            session_id = %session.session_id,
            device = session.device_name.as_deref().unwrap_or("-"),
            "Device session created"
        );
        Ok(session)
    }

    /// Mark the session as used now
    pub async fn touch(&self, session_id: DeviceSessionId) -> AuthResult<()> {
        self.repo.touch_session(session_id, Utc::now()).await
    }

    /// The user's sessions, most recently used first
    pub async fn list(&self, user_id: UserId) -> AuthResult<Vec<DeviceSession>> {
        self.repo
            .list_sessions(user_id, self.config.session_list_limit)
            .await
    }

    /// Sign one device out by revoking its active tokens
    ///
    /// Scoped to `user_id`: another user's session id revokes nothing.
    pub async fn revoke(&self, user_id: UserId, session_id: DeviceSessionId) -> AuthResult<u64> {
        RefreshTokenLedger::new(self.repo.clone(), self.config.clone())
            .revoke_all_for_session(user_id, session_id)
            .await
    }
}
