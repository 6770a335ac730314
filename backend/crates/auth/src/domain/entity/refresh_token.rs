//! Refresh Token Entity
//!
//! Stored record of one refresh secret. Rotation revokes a record and
//! issues its successor for the same device session.

use chrono::{DateTime, Duration, Utc};
use kernel::id::{DeviceSessionId, RefreshTokenId, UserId};

use crate::domain::value_object::{RefreshSecret, SecretHash};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub token_id: RefreshTokenId,
    pub user_id: UserId,
    pub device_session_id: DeviceSessionId,
    pub token_hash: SecretHash,
    pub expires_at: DateTime<Utc>,
    /// Once set, never cleared
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Active = not revoked and `expires_at > now`
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired_at(now)
    }
}

/// Insert payload for a new refresh token
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: UserId,
    pub device_session_id: DeviceSessionId,
    pub token_hash: SecretHash,
    pub expires_at: DateTime<Utc>,
}

impl NewRefreshToken {
    /// Mint a fresh secret and the record that will store its hash
    pub fn generate(
        user_id: UserId,
        device_session_id: DeviceSessionId,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> (Self, RefreshSecret) {
        let secret = RefreshSecret::generate();
        let token = Self {
            user_id,
            device_session_id,
            token_hash: secret.hash(),
            expires_at: now + ttl,
        };
        (token, secret)
    }
}

/// A stored token together with the plaintext secret to hand to the client
///
/// The plaintext exists only here, between issuance and the response.
#[derive(Debug)]
pub struct IssuedToken {
    pub token: RefreshToken,
    pub secret: RefreshSecret,
}
