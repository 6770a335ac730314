//! Sign Out Use Case
//!
//! Revokes refresh tokens for one device or for every device.

use std::sync::Arc;

use kernel::id::UserId;

use crate::application::config::AuthConfig;
use crate::application::refresh_tokens::RefreshTokenLedger;
use crate::domain::repository::{RefreshTokenRepository, UserRepository};
use crate::domain::value_object::RefreshSecret;
use crate::error::AuthResult;

/// Sign out use case
pub struct SignOutUseCase<R>
where
    R: RefreshTokenRepository + UserRepository,
{
    ledger: RefreshTokenLedger<R>,
}

impl<R> SignOutUseCase<R>
where
    R: RefreshTokenRepository + UserRepository,
{
    pub fn new(repo: Arc<R>, config: Arc<AuthConfig>) -> Self {
        Self {
            ledger: RefreshTokenLedger::new(repo, config),
        }
    }

    /// Sign out the presenting device
    ///
    /// Unknown or already revoked secrets are not an error; returns
    /// whether anything was revoked.
    pub async fn execute(&self, presented: &RefreshSecret) -> AuthResult<bool> {
        self.ledger.revoke_by_plain(presented).await
    }

    /// Sign out from every device of the user
    pub async fn execute_all(&self, user_id: UserId) -> AuthResult<u64> {
        self.ledger.revoke_all_for_user(user_id).await
    }
}
