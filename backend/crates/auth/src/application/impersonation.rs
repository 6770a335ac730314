//! Impersonation Service
//!
//! Lets an admin open a short-lived session as another user. The admin
//! mints a single-use grant; whoever redeems its token gets a fresh device
//! session for the target, carried in the impersonation cookie.

use std::sync::Arc;

use chrono::Utc;
use kernel::id::UserId;
use platform::client::ClientInfo;

use crate::application::config::AuthConfig;
use crate::application::device_sessions::DeviceSessionRegistry;
use crate::application::refresh_tokens::RefreshTokenLedger;
use crate::domain::entity::{
    DeviceSession, ImpersonationGrant, IssuedToken, NewImpersonationGrant, User,
};
use crate::domain::repository::SessionStore;
use crate::domain::value_object::RefreshSecret;
use crate::error::{AuthError, AuthResult};

/// A freshly minted grant with the token to hand out
#[derive(Debug)]
pub struct MintedGrant {
    pub grant: ImpersonationGrant,
    pub target: User,
    /// Plaintext grant token; exists only until the response is written
    pub token: RefreshSecret,
}

/// Redemption output
#[derive(Debug)]
pub struct ImpersonationOutput {
    pub admin_user_id: UserId,
    pub user: User,
    pub session: DeviceSession,
    /// Carries the plaintext secret for the impersonation cookie
    pub issued: IssuedToken,
}

/// Impersonation service
pub struct ImpersonationService<R>
where
    R: SessionStore,
{
    repo: Arc<R>,
    config: Arc<AuthConfig>,
}

impl<R> ImpersonationService<R>
where
    R: SessionStore,
{
    pub fn new(repo: Arc<R>, config: Arc<AuthConfig>) -> Self {
        Self { repo, config }
    }

    /// Mint a grant for `admin_user_id` to act as `target_user_id`
    ///
    /// Only configured admins may mint, and admins cannot be targeted.
    pub async fn grant(
        &self,
        admin_user_id: UserId,
        target_user_id: UserId,
    ) -> AuthResult<MintedGrant> {
        if !self.config.is_admin(admin_user_id) || self.config.is_admin(target_user_id) {
            return Err(AuthError::Forbidden);
        }

        let target = self
            .repo
            .find_user(target_user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if target.is_deleted() {
            return Err(AuthError::UserNotFound);
        }

        let now = Utc::now();
        let (new_grant, token) = NewImpersonationGrant::generate(
            admin_user_id,
            target_user_id,
            self.config.impersonation_ttl_chrono()?,
            now,
        );
        let grant = self.repo.insert_grant(&new_grant, now).await?;

        tracing::info!(
            admin_user_id = %admin_user_id,
            target_user_id = %target_user_id,
            grant_id = %grant.grant_id,
            "Impersonation grant minted"
        );

        Ok(MintedGrant {
            grant,
            target,
            token,
        })
    }

    /// Redeem a grant token
    ///
    /// The grant is marked used before any session is opened. Unknown
    /// tokens fail with `GrantNotFound`; used or expired ones with
    /// `GrantAlreadyUsed` or `GrantExpired`.
    pub async fn redeem(
        &self,
        presented: &RefreshSecret,
        client: &ClientInfo,
    ) -> AuthResult<ImpersonationOutput> {
        let now = Utc::now();

        let grant = self
            .repo
            .find_grant(&presented.hash())
            .await?
            .ok_or(AuthError::GrantNotFound)?;
        grant.ensure_redeemable(now)?;

        // Lost a race with a concurrent redemption
        let grant = self
            .repo
            .mark_grant_used(grant.grant_id, now)
            .await?
            .ok_or(AuthError::GrantAlreadyUsed)?;

        let user = self
            .repo
            .find_user(grant.target_user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if user.is_deleted() {
            return Err(AuthError::UserDeleted);
        }

        let admin = self
            .repo
            .find_user(grant.admin_user_id)
            .await?
            .filter(|admin| !admin.is_deleted())
            .ok_or(AuthError::Forbidden)?;
        let label = format!(
            "Impersonation by {}",
            admin.display_name.as_deref().unwrap_or(admin.email.as_str())
        );

        let session = DeviceSessionRegistry::new(self.repo.clone(), self.config.clone())
            .create(user.user_id, Some(label), client)
            .await?;

        let issued = RefreshTokenLedger::new(self.repo.clone(), self.config.clone())
            .issue_with_ttl(
                user.user_id,
                session.session_id,
                self.config.impersonation_ttl_chrono()?,
            )
            .await?;

        tracing::warn!(
            admin_user_id = %admin.user_id,
            user_id = %user.user_id,
            session_id = %session.session_id,
            "Impersonation session opened"
        );

        Ok(ImpersonationOutput {
            admin_user_id: admin.user_id,
            user,
            session,
            issued,
        })
    }
}
