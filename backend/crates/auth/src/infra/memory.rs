//! In-Memory Repository Implementations
//!
//! Process-local store for development and tests. One lock guards all
//! state, so every repository operation is atomic with respect to the
//! others.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kernel::id::{DeviceSessionId, ImpersonationGrantId, RefreshTokenId, UserId};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::entity::{
    DeviceSession, ImpersonationGrant, LoginChallenge, NewDeviceSession, NewImpersonationGrant,
    NewRefreshToken, NewUser, RefreshToken, User,
};
use crate::domain::repository::{
    DeviceSessionRepository, ImpersonationGrantRepository, LoginChallengeRepository,
    RefreshTokenRepository, UserRepository,
};
use crate::domain::value_object::{ChallengeId, Email, SecretHash};
use crate::error::AuthResult;

#[derive(Default)]
struct State {
    /// Shared id sequence for users, sessions, tokens and grants
    next_id: i64,
    users: BTreeMap<i64, User>,
    user_ids_by_email: HashMap<String, i64>,
    challenges: HashMap<Uuid, LoginChallenge>,
    sessions: BTreeMap<i64, DeviceSession>,
    tokens: BTreeMap<i64, RefreshToken>,
    grants: BTreeMap<i64, ImpersonationGrant>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert_token(&mut self, token: &NewRefreshToken, now: DateTime<Utc>) -> RefreshToken {
        let id = self.next_id();
        let token = RefreshToken {
            token_id: RefreshTokenId::new(id),
            user_id: token.user_id,
            device_session_id: token.device_session_id,
            token_hash: token.token_hash.clone(),
            expires_at: token.expires_at,
            revoked_at: None,
            created_at: now,
        };
        self.tokens.insert(id, token.clone());
        token
    }

    fn revoke_where(&mut self, now: DateTime<Utc>, pred: impl Fn(&RefreshToken) -> bool) -> u64 {
        let mut revoked = 0;
        for token in self.tokens.values_mut() {
            if token.is_active_at(now) && pred(token) {
                token.revoked_at = Some(now);
                revoked += 1;
            }
        }
        revoked
    }
}

/// In-memory session store
///
/// Clones share state.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    state: Arc<Mutex<State>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// ============================================================================
// User Repository Implementation
// ============================================================================

impl UserRepository for InMemorySessionStore {
    async fn find_user(&self, user_id: UserId) -> AuthResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&user_id.get()).cloned())
    }

    async fn find_user_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .user_ids_by_email
            .get(email.as_str())
            .and_then(|id| state.users.get(id))
            .cloned())
    }

    async fn insert_user_or_get(&self, user: &NewUser) -> AuthResult<User> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state
            .user_ids_by_email
            .get(user.email.as_str())
            .and_then(|id| state.users.get(id))
        {
            return Ok(existing.clone());
        }

        let id = state.next_id();
        let created = User {
            user_id: UserId::new(id),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            deleted_at: None,
            created_at: Utc::now(),
        };
        state.users.insert(id, created.clone());
        state
            .user_ids_by_email
            .insert(user.email.as_str().to_string(), id);

        Ok(created)
    }

    async fn adopt_display_name(&self, user_id: UserId, name: &str) -> AuthResult<bool> {
        let mut state = self.state.lock().await;
        match state.users.get_mut(&user_id.get()) {
            Some(user) if user.display_name.is_none() => {
                user.display_name = Some(name.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn soft_delete_user(&self, user_id: UserId, at: DateTime<Utc>) -> AuthResult<bool> {
        let mut state = self.state.lock().await;
        match state.users.get_mut(&user_id.get()) {
            Some(user) if user.deleted_at.is_none() => {
                user.deleted_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ============================================================================
// Login Challenge Repository Implementation
// ============================================================================

impl LoginChallengeRepository for InMemorySessionStore {
    async fn insert_challenge(&self, challenge: &LoginChallenge) -> AuthResult<()> {
        self.state
            .lock()
            .await
            .challenges
            .insert(challenge.challenge_id.as_uuid(), challenge.clone());
        Ok(())
    }

    async fn find_challenge(
        &self,
        challenge_id: ChallengeId,
    ) -> AuthResult<Option<LoginChallenge>> {
        Ok(self
            .state
            .lock()
            .await
            .challenges
            .get(&challenge_id.as_uuid())
            .cloned())
    }

    async fn register_attempt(
        &self,
        challenge_id: ChallengeId,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<LoginChallenge>> {
        let mut state = self.state.lock().await;
        let Some(challenge) = state.challenges.get_mut(&challenge_id.as_uuid()) else {
            return Ok(None);
        };
        if challenge.ensure_consumable(now).is_err() {
            return Ok(None);
        }
        challenge.attempts += 1;
        Ok(Some(challenge.clone()))
    }

    async fn mark_consumed(
        &self,
        challenge_id: ChallengeId,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<LoginChallenge>> {
        let mut state = self.state.lock().await;
        match state.challenges.get_mut(&challenge_id.as_uuid()) {
            Some(challenge) if !challenge.is_consumed() => {
                challenge.consumed_at = Some(now);
                Ok(Some(challenge.clone()))
            }
            _ => Ok(None),
        }
    }
}

// ============================================================================
// Device Session Repository Implementation
// ============================================================================

impl DeviceSessionRepository for InMemorySessionStore {
    async fn insert_session(
        &self,
        session: &NewDeviceSession,
        now: DateTime<Utc>,
    ) -> AuthResult<DeviceSession> {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let created = DeviceSession {
            session_id: DeviceSessionId::new(id),
            user_id: session.user_id,
            device_name: session.device_name.clone(),
            ip: session.ip.clone(),
            user_agent: session.user_agent.clone(),
            last_used_at: now,
            created_at: now,
        };
        state.sessions.insert(id, created.clone());
        Ok(created)
    }

    async fn find_session(
        &self,
        session_id: DeviceSessionId,
    ) -> AuthResult<Option<DeviceSession>> {
        Ok(self
            .state
            .lock()
            .await
            .sessions
            .get(&session_id.get())
            .cloned())
    }

    async fn touch_session(
        &self,
        session_id: DeviceSessionId,
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        let mut state = self.state.lock().await;
        if let Some(session) = state.sessions.get_mut(&session_id.get()) {
            session.last_used_at = session.last_used_at.max(now);
        }
        Ok(())
    }

    async fn list_sessions(&self, user_id: UserId, limit: i64) -> AuthResult<Vec<DeviceSession>> {
        let state = self.state.lock().await;
        let mut sessions: Vec<DeviceSession> = state
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| {
            b.last_used_at
                .cmp(&a.last_used_at)
                .then(b.session_id.cmp(&a.session_id))
        });
        sessions.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(sessions)
    }
}

// ============================================================================
// Refresh Token Repository Implementation
// ============================================================================

impl RefreshTokenRepository for InMemorySessionStore {
    async fn insert_token(
        &self,
        token: &NewRefreshToken,
        now: DateTime<Utc>,
    ) -> AuthResult<RefreshToken> {
        Ok(self.state.lock().await.insert_token(token, now))
    }

    async fn find_active_token(
        &self,
        token_hash: &SecretHash,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<RefreshToken>> {
        let state = self.state.lock().await;
        Ok(state
            .tokens
            .values()
            .rev()
            .find(|t| t.is_active_at(now) && t.token_hash.matches(token_hash))
            .cloned())
    }

    async fn find_latest_token(
        &self,
        token_hash: &SecretHash,
    ) -> AuthResult<Option<RefreshToken>> {
        let state = self.state.lock().await;
        Ok(state
            .tokens
            .values()
            .rev()
            .find(|t| t.token_hash.matches(token_hash))
            .cloned())
    }

    async fn rotate_token(
        &self,
        predecessor: RefreshTokenId,
        successor: &NewRefreshToken,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<RefreshToken>> {
        let mut state = self.state.lock().await;
        match state.tokens.get_mut(&predecessor.get()) {
            Some(current) if current.is_active_at(now) => current.revoked_at = Some(now),
            _ => return Ok(None),
        }
        Ok(Some(state.insert_token(successor, now)))
    }

    async fn revoke_token(&self, token_id: RefreshTokenId, now: DateTime<Utc>) -> AuthResult<bool> {
        let mut state = self.state.lock().await;
        match state.tokens.get_mut(&token_id.get()) {
            Some(token) if !token.is_revoked() => {
                token.revoked_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_tokens_for_user(&self, user_id: UserId, now: DateTime<Utc>) -> AuthResult<u64> {
        Ok(self
            .state
            .lock()
            .await
            .revoke_where(now, |t| t.user_id == user_id))
    }

    async fn revoke_tokens_for_session(
        &self,
        user_id: UserId,
        session_id: DeviceSessionId,
        now: DateTime<Utc>,
    ) -> AuthResult<u64> {
        Ok(self
            .state
            .lock()
            .await
            .revoke_where(now, |t| t.user_id == user_id && t.device_session_id == session_id))
    }
}

// ============================================================================
// Impersonation Grant Repository Implementation
// ============================================================================

impl ImpersonationGrantRepository for InMemorySessionStore {
    async fn insert_grant(
        &self,
        grant: &NewImpersonationGrant,
        now: DateTime<Utc>,
    ) -> AuthResult<ImpersonationGrant> {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let created = ImpersonationGrant {
            grant_id: ImpersonationGrantId::new(id),
            admin_user_id: grant.admin_user_id,
            target_user_id: grant.target_user_id,
            token_hash: grant.token_hash.clone(),
            expires_at: grant.expires_at,
            used_at: None,
            created_at: now,
        };
        state.grants.insert(id, created.clone());
        Ok(created)
    }

    async fn find_grant(&self, token_hash: &SecretHash) -> AuthResult<Option<ImpersonationGrant>> {
        let state = self.state.lock().await;
        Ok(state
            .grants
            .values()
            .find(|g| g.token_hash.matches(token_hash))
            .cloned())
    }

    async fn mark_grant_used(
        &self,
        grant_id: ImpersonationGrantId,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<ImpersonationGrant>> {
        let mut state = self.state.lock().await;
        match state.grants.get_mut(&grant_id.get()) {
            Some(grant) if grant.ensure_redeemable(now).is_ok() => {
                grant.used_at = Some(now);
                Ok(Some(grant.clone()))
            }
            _ => Ok(None),
        }
    }
}
