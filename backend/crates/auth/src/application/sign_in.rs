//! Sign In Use Case
//!
//! Turns a proof of identity (a redeemed login code, or an identity
//! asserted by an external provider) into a device session and its first
//! refresh token.

use std::sync::Arc;

use platform::client::ClientInfo;

use crate::application::config::AuthConfig;
use crate::application::device_sessions::DeviceSessionRegistry;
use crate::application::login_challenge::LoginChallengeService;
use crate::application::refresh_tokens::RefreshTokenLedger;
use crate::application::user_directory::UserDirectory;
use crate::domain::entity::{DeviceSession, IssuedToken, User};
use crate::domain::repository::SessionStore;
use crate::domain::value_object::{ChallengeId, Email, LoginCode};
use crate::error::AuthResult;

/// Identity vouched for by an external provider (OAuth callback)
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    /// Provider key, e.g. "google"
    pub provider: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Sign in output
#[derive(Debug)]
pub struct SignInOutput {
    pub user: User,
    pub session: DeviceSession,
    /// Carries the plaintext secret for the cookie
    pub issued: IssuedToken,
}

/// Sign in use case
pub struct SignInUseCase<R>
where
    R: SessionStore,
{
    repo: Arc<R>,
    config: Arc<AuthConfig>,
}

impl<R> SignInUseCase<R>
where
    R: SessionStore,
{
    pub fn new(repo: Arc<R>, config: Arc<AuthConfig>) -> Self {
        Self { repo, config }
    }

    /// Redeem a login code
    ///
    /// The challenge is consumed before any user or session is touched.
    pub async fn with_code(
        &self,
        challenge_id: ChallengeId,
        code: &LoginCode,
        client: &ClientInfo,
    ) -> AuthResult<SignInOutput> {
        let challenge = LoginChallengeService::new(self.repo.clone(), self.config.clone())
            .consume(challenge_id, code)
            .await?;

        let user = UserDirectory::new(self.repo.clone())
            .find_or_create_by_email(&challenge.email)
            .await?;

        self.open_session(user, client.device_label().to_string(), client)
            .await
    }

    /// Sign in with an identity the provider already verified
    pub async fn with_external_identity(
        &self,
        identity: &ExternalIdentity,
        client: &ClientInfo,
    ) -> AuthResult<SignInOutput> {
        let email = Email::new(&identity.email)?;
        let directory = UserDirectory::new(self.repo.clone());

        let mut user = directory.find_or_create_by_email(&email).await?;
        if let Some(name) = identity.display_name.as_deref() {
            directory.adopt_display_name(&mut user, name).await?;
        }

        let device_name = format!("{} Login", provider_label(&identity.provider));
        self.open_session(user, device_name, client).await
    }

    async fn open_session(
        &self,
        user: User,
        device_name: String,
        client: &ClientInfo,
    ) -> AuthResult<SignInOutput> {
        let session = DeviceSessionRegistry::new(self.repo.clone(), self.config.clone())
            .create(user.user_id, Some(device_name), client)
            .await?;

        let issued = RefreshTokenLedger::new(self.repo.clone(), self.config.clone())
            .issue(user.user_id, session.session_id)
            .await?;

        tracing::info!(
            user_id = %user.user_id,
            session_id = %session.session_id,
            "User signed in"
        );

        Ok(SignInOutput {
            user,
            session,
            issued,
        })
    }
}

/// "google" -> "Google"
fn provider_label(provider: &str) -> String {
    let mut chars = provider.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "External".to_string(),
    }
}
