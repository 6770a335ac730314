//! Request Login Code Use Case
//!
//! Rate-limits, issues a challenge and hands the code to a notifier.

use std::sync::Arc;

use platform::client::ClientInfo;
use platform::rate_limit::RateLimitStore;

use crate::application::config::AuthConfig;
use crate::application::login_challenge::LoginChallengeService;
use crate::application::notifier::{LoginCodeDelivery, LoginCodeNotifier};
use crate::domain::repository::LoginChallengeRepository;
use crate::domain::value_object::{ChallengeId, Email, LoginCode};
use crate::error::{AuthError, AuthResult};

/// Request login code use case
pub struct RequestLoginCodeUseCase<R, L, N>
where
    R: LoginChallengeRepository,
    L: RateLimitStore,
    N: LoginCodeNotifier,
{
    repo: Arc<R>,
    rate_limiter: Arc<L>,
    notifier: Arc<N>,
    config: Arc<AuthConfig>,
}

impl<R, L, N> RequestLoginCodeUseCase<R, L, N>
where
    R: LoginChallengeRepository,
    L: RateLimitStore,
    N: LoginCodeNotifier,
{
    pub fn new(
        repo: Arc<R>,
        rate_limiter: Arc<L>,
        notifier: Arc<N>,
        config: Arc<AuthConfig>,
    ) -> Self {
        Self {
            repo,
            rate_limiter,
            notifier,
            config,
        }
    }

    /// Issue a login code for `email`
    ///
    /// Succeeds whether or not an account exists for the email. Delivery
    /// failures are logged, not surfaced.
    pub async fn execute(&self, email: &str, client: &ClientInfo) -> AuthResult<ChallengeId> {
        let email = Email::new(email)?;

        let key = format!(
            "login_code:{}|{}",
            email,
            client.ip_string().as_deref().unwrap_or("unknown")
        );
        let limit = self
            .rate_limiter
            .check_and_increment(&key, &self.config.code_rate_limit())
            .await?;
        if !limit.allowed {
            return Err(AuthError::RateLimited);
        }

        let code = LoginCode::generate();
        let challenge = LoginChallengeService::new(self.repo.clone(), self.config.clone())
            .create(email, &code, self.config.login_code_ttl_chrono()?)
            .await?;

        let delivery = LoginCodeDelivery {
            login_link: self.config.login_link(&challenge.challenge_id, &code),
            email: challenge.email,
            challenge_id: challenge.challenge_id,
            code,
        };
        if let Err(e) = self.notifier.deliver(&delivery).await {
            tracing::error!(
                challenge_id = %delivery.challenge_id,
                error = %e,
                "Failed to deliver login code"
            );
        }

        Ok(challenge.challenge_id)
    }
}
