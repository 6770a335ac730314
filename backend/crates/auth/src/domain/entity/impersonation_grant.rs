//! Impersonation Grant Entity
//!
//! A single-use ticket minted by an admin to open a session as another
//! user. Only the hash of the grant token is stored.

use chrono::{DateTime, Duration, Utc};
use kernel::id::{ImpersonationGrantId, UserId};

use crate::domain::value_object::{RefreshSecret, SecretHash};
use crate::error::{AuthError, AuthResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpersonationGrant {
    pub grant_id: ImpersonationGrantId,
    pub admin_user_id: UserId,
    pub target_user_id: UserId,
    pub token_hash: SecretHash,
    pub expires_at: DateTime<Utc>,
    /// Once set, never cleared
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ImpersonationGrant {
    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Reports the first failing condition in the order used, expired
    pub fn ensure_redeemable(&self, now: DateTime<Utc>) -> AuthResult<()> {
        if self.is_used() {
            return Err(AuthError::GrantAlreadyUsed);
        }
        if self.is_expired_at(now) {
            return Err(AuthError::GrantExpired);
        }
        Ok(())
    }
}

/// Insert payload for a new grant
#[derive(Debug, Clone)]
pub struct NewImpersonationGrant {
    pub admin_user_id: UserId,
    pub target_user_id: UserId,
    pub token_hash: SecretHash,
    pub expires_at: DateTime<Utc>,
}

impl NewImpersonationGrant {
    /// Mint a grant token and the record that will store its hash
    pub fn generate(
        admin_user_id: UserId,
        target_user_id: UserId,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> (Self, RefreshSecret) {
        let token = RefreshSecret::generate();
        let grant = Self {
            admin_user_id,
            target_user_id,
            token_hash: token.hash(),
            expires_at: now + ttl,
        };
        (grant, token)
    }
}
