//! Repository Traits
//!
//! Interfaces for data persistence. Implementations are in the
//! infrastructure layer.
//!
//! Method names are unique across the traits so a single store type can
//! implement all of them without ambiguity in generic code.

use chrono::{DateTime, Utc};
use kernel::id::{DeviceSessionId, ImpersonationGrantId, RefreshTokenId, UserId};

use crate::domain::entity::{
    DeviceSession, ImpersonationGrant, LoginChallenge, NewDeviceSession, NewImpersonationGrant,
    NewRefreshToken, NewUser, RefreshToken, User,
};
use crate::domain::value_object::{ChallengeId, Email, SecretHash};
use crate::error::AuthResult;

/// User repository trait
#[trait_variant::make(UserRepository: Send)]
pub trait LocalUserRepository {
    /// Find user by ID (deleted users included)
    async fn find_user(&self, user_id: UserId) -> AuthResult<Option<User>>;

    /// Find user by normalized email (deleted users included)
    async fn find_user_by_email(&self, email: &Email) -> AuthResult<Option<User>>;

    /// Insert a user, or return the existing one if the email is taken
    ///
    /// Two concurrent calls for the same email yield the same user.
    async fn insert_user_or_get(&self, user: &NewUser) -> AuthResult<User>;

    /// Set the display name only if the user has none. Returns whether it was set.
    async fn adopt_display_name(&self, user_id: UserId, name: &str) -> AuthResult<bool>;

    /// Mark the user deleted. Returns false if already deleted or unknown.
    async fn soft_delete_user(&self, user_id: UserId, at: DateTime<Utc>) -> AuthResult<bool>;
}

/// Login challenge repository trait
#[trait_variant::make(LoginChallengeRepository: Send)]
pub trait LocalLoginChallengeRepository {
    async fn insert_challenge(&self, challenge: &LoginChallenge) -> AuthResult<()>;

    async fn find_challenge(&self, challenge_id: ChallengeId)
    -> AuthResult<Option<LoginChallenge>>;

    /// Count one verification attempt, atomically
    ///
    /// Only applies while the challenge is unconsumed, unexpired at `now`
    /// and below its attempt ceiling. Returns the updated challenge, or
    /// `None` if the challenge is unknown or no longer open.
    async fn register_attempt(
        &self,
        challenge_id: ChallengeId,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<LoginChallenge>>;

    /// Set `consumed_at` if still unset. `None` means another caller won.
    async fn mark_consumed(
        &self,
        challenge_id: ChallengeId,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<LoginChallenge>>;
}

/// Device session repository trait
#[trait_variant::make(DeviceSessionRepository: Send)]
pub trait LocalDeviceSessionRepository {
    async fn insert_session(
        &self,
        session: &NewDeviceSession,
        now: DateTime<Utc>,
    ) -> AuthResult<DeviceSession>;

    async fn find_session(&self, session_id: DeviceSessionId)
    -> AuthResult<Option<DeviceSession>>;

    /// Advance `last_used_at` to `now`; never moves it backwards
    async fn touch_session(&self, session_id: DeviceSessionId, now: DateTime<Utc>)
    -> AuthResult<()>;

    /// Most recently used first, at most `limit`
    async fn list_sessions(&self, user_id: UserId, limit: i64) -> AuthResult<Vec<DeviceSession>>;
}

/// Refresh token repository trait
#[trait_variant::make(RefreshTokenRepository: Send)]
pub trait LocalRefreshTokenRepository {
    async fn insert_token(
        &self,
        token: &NewRefreshToken,
        now: DateTime<Utc>,
    ) -> AuthResult<RefreshToken>;

    /// Most recently created active token with this hash
    async fn find_active_token(
        &self,
        token_hash: &SecretHash,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<RefreshToken>>;

    /// Most recently created token with this hash, in any state
    async fn find_latest_token(&self, token_hash: &SecretHash)
    -> AuthResult<Option<RefreshToken>>;

    /// Revoke `predecessor` and insert `successor` as one atomic step
    ///
    /// Returns `None` (and inserts nothing) if the predecessor was no
    /// longer active at `now`, so of two concurrent rotations of the same
    /// token exactly one succeeds.
    async fn rotate_token(
        &self,
        predecessor: RefreshTokenId,
        successor: &NewRefreshToken,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<RefreshToken>>;

    /// Revoke one token if still unrevoked
    async fn revoke_token(&self, token_id: RefreshTokenId, now: DateTime<Utc>)
    -> AuthResult<bool>;

    /// Revoke every active token of the user; returns the count
    async fn revoke_tokens_for_user(&self, user_id: UserId, now: DateTime<Utc>)
    -> AuthResult<u64>;

    /// Revoke every active token of one device session of the user
    async fn revoke_tokens_for_session(
        &self,
        user_id: UserId,
        session_id: DeviceSessionId,
        now: DateTime<Utc>,
    ) -> AuthResult<u64>;
}

/// Impersonation grant repository trait
#[trait_variant::make(ImpersonationGrantRepository: Send)]
pub trait LocalImpersonationGrantRepository {
    async fn insert_grant(
        &self,
        grant: &NewImpersonationGrant,
        now: DateTime<Utc>,
    ) -> AuthResult<ImpersonationGrant>;

    /// Grant with this token hash, in any state
    async fn find_grant(&self, token_hash: &SecretHash) -> AuthResult<Option<ImpersonationGrant>>;

    /// Set `used_at` if the grant is unused and unexpired at `now`
    ///
    /// `None` means the grant was no longer redeemable, so of two
    /// concurrent redemptions exactly one succeeds.
    async fn mark_grant_used(
        &self,
        grant_id: ImpersonationGrantId,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<ImpersonationGrant>>;
}

/// Everything the auth flows need from one backing store
pub trait SessionStore:
    UserRepository
    + LoginChallengeRepository
    + DeviceSessionRepository
    + RefreshTokenRepository
    + ImpersonationGrantRepository
    + Clone
    + Send
    + Sync
    + 'static
{
}

impl<T> SessionStore for T where
    T: UserRepository
        + LoginChallengeRepository
        + DeviceSessionRepository
        + RefreshTokenRepository
        + ImpersonationGrantRepository
        + Clone
        + Send
        + Sync
        + 'static
{
}
