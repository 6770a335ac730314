//! Login Challenge Service
//!
//! Issues one-time login codes and redeems them at most once.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::application::config::AuthConfig;
use crate::domain::entity::LoginChallenge;
use crate::domain::repository::LoginChallengeRepository;
use crate::domain::value_object::{ChallengeId, Email, LoginCode};
use crate::error::{AuthError, AuthResult};

/// Login challenge service
pub struct LoginChallengeService<R>
where
    R: LoginChallengeRepository,
{
    repo: Arc<R>,
    config: Arc<AuthConfig>,
}

impl<R> LoginChallengeService<R>
where
    R: LoginChallengeRepository,
{
    pub fn new(repo: Arc<R>, config: Arc<AuthConfig>) -> Self {
        Self { repo, config }
    }

    /// Store a challenge for `code` that expires after `ttl`
    ///
    /// Only the code's hash is persisted.
    pub async fn create(
        &self,
        email: Email,
        code: &LoginCode,
        ttl: chrono::Duration,
    ) -> AuthResult<LoginChallenge> {
        let challenge =
            LoginChallenge::new(email, code, ttl, self.config.max_login_attempts, Utc::now());
        self.repo.insert_challenge(&challenge).await?;

        tracing::debug!(challenge_id = %challenge.challenge_id, "Login challenge created");
        Ok(challenge)
    }

    /// Redeem a challenge with the code the user supplied
    ///
    /// Every call that finds an open challenge counts one attempt, whether
    /// or not the code matches. On success the challenge is consumed and
    /// cannot be redeemed again.
    pub async fn consume(
        &self,
        challenge_id: ChallengeId,
        code: &LoginCode,
    ) -> AuthResult<LoginChallenge> {
        let now = Utc::now();

        let challenge = self
            .repo
            .find_challenge(challenge_id)
            .await?
            .ok_or(AuthError::ChallengeNotFound)?;
        challenge.ensure_consumable(now)?;

        let challenge = match self.repo.register_attempt(challenge_id, now).await? {
            Some(challenge) => challenge,
            // Closed between the read and the increment
            None => return Err(self.closed_reason(challenge_id, now).await?),
        };

        if !challenge.matches(code) {
            tracing::warn!(
                challenge_id = %challenge_id,
                attempts = challenge.attempts,
                max_attempts = challenge.max_attempts,
                "Login code mismatch"
            );
            return Err(AuthError::CodeMismatch);
        }

        let consumed = self
            .repo
            .mark_consumed(challenge_id, now)
            .await?
            .ok_or(AuthError::ChallengeAlreadyConsumed)?;

        tracing::info!(challenge_id = %challenge_id, "Login challenge consumed");
        Ok(consumed)
    }

    async fn closed_reason(
        &self,
        challenge_id: ChallengeId,
        now: DateTime<Utc>,
    ) -> AuthResult<AuthError> {
        let Some(challenge) = self.repo.find_challenge(challenge_id).await? else {
            return Ok(AuthError::ChallengeNotFound);
        };
        Ok(challenge
            .ensure_consumable(now)
            .err()
            .unwrap_or(AuthError::ChallengeExhausted))
    }
}
