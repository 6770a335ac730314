//! Login Challenge Entity
//!
//! A pending proof-of-email-ownership. Holds only the hash of the code
//! and is redeemable at most once.

use chrono::{DateTime, Duration, Utc};

use crate::domain::value_object::{ChallengeId, Email, LoginCode, SecretHash};
use crate::error::{AuthError, AuthResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginChallenge {
    pub challenge_id: ChallengeId,
    pub email: Email,
    pub code_hash: SecretHash,
    pub expires_at: DateTime<Utc>,
    /// Verification attempts counted so far
    pub attempts: i32,
    pub max_attempts: i32,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl LoginChallenge {
    /// Open a new challenge for `code`, expiring `ttl` after `now`
    pub fn new(
        email: Email,
        code: &LoginCode,
        ttl: Duration,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            challenge_id: ChallengeId::new(),
            email,
            code_hash: code.hash(),
            expires_at: now + ttl,
            attempts: 0,
            max_attempts,
            consumed_at: None,
            created_at: now,
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    /// Expiry is strict: at `expires_at` the challenge is already dead
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Check that another verification attempt may be made
    ///
    /// Reports the first failing condition in the order consumed,
    /// expired, exhausted.
    pub fn ensure_consumable(&self, now: DateTime<Utc>) -> AuthResult<()> {
        if self.is_consumed() {
            return Err(AuthError::ChallengeAlreadyConsumed);
        }
        if self.is_expired_at(now) {
            return Err(AuthError::ChallengeExpired);
        }
        if self.is_exhausted() {
            return Err(AuthError::ChallengeExhausted);
        }
        Ok(())
    }

    pub fn matches(&self, code: &LoginCode) -> bool {
        self.code_hash.matches(&code.hash())
    }
}
