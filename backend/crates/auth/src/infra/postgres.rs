//! PostgreSQL Repository Implementations

use chrono::{DateTime, Duration, Utc};
use kernel::id::{DeviceSessionId, ImpersonationGrantId, RefreshTokenId, UserId};
use sqlx::PgPool;
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

/// How long expired challenges are kept before purging
const CHALLENGE_RETENTION_HOURS: i64 = 24;

/// PostgreSQL-backed session store
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete login challenges that expired more than a day ago
    pub async fn purge_stale_challenges(&self) -> AuthResult<u64> {
        let cutoff = Utc::now() - Duration::hours(CHALLENGE_RETENTION_HOURS);

        let deleted = sqlx::query("DELETE FROM login_challenges WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::info!(challenges_deleted = deleted, "Purged stale login challenges");

        Ok(deleted)
    }
}

// ============================================================================
// User Repository Implementation
// ============================================================================

impl UserRepository for PgSessionStore {
    async fn find_user(&self, user_id: UserId) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, display_name, deleted_at, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserRow::into_user))
    }

    async fn find_user_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, display_name, deleted_at, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserRow::into_user))
    }

    async fn insert_user_or_get(&self, user: &NewUser) -> AuthResult<User> {
        // The no-op update makes RETURNING yield the existing row on conflict
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (email, display_name, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
            RETURNING id, email, display_name, deleted_at, created_at
            "#,
        )
        .bind(user.email.as_str())
        .bind(user.display_name.as_deref())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_user())
    }

    async fn adopt_display_name(&self, user_id: UserId, name: &str) -> AuthResult<bool> {
        let updated = sqlx::query(
            "UPDATE users SET display_name = $2 WHERE id = $1 AND display_name IS NULL",
        )
        .bind(user_id.get())
        .bind(name)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    async fn soft_delete_user(&self, user_id: UserId, at: DateTime<Utc>) -> AuthResult<bool> {
        let updated =
            sqlx::query("UPDATE users SET deleted_at = $2 WHERE id = $1 AND deleted_at IS NULL")
                .bind(user_id.get())
                .bind(at)
                .execute(&self.pool)
                .await?
                .rows_affected();

        Ok(updated > 0)
    }
}

// ============================================================================
// Login Challenge Repository Implementation
// ============================================================================

impl LoginChallengeRepository for PgSessionStore {
    async fn insert_challenge(&self, challenge: &LoginChallenge) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO login_challenges (
                challenge_id,
                email,
                code_hash,
                expires_at,
                attempts,
                max_attempts,
                consumed_at,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(challenge.challenge_id.as_uuid())
        .bind(challenge.email.as_str())
        .bind(challenge.code_hash.as_str())
        .bind(challenge.expires_at)
        .bind(challenge.attempts)
        .bind(challenge.max_attempts)
        .bind(challenge.consumed_at)
        .bind(challenge.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_challenge(
        &self,
        challenge_id: ChallengeId,
    ) -> AuthResult<Option<LoginChallenge>> {
        let row = sqlx::query_as::<_, LoginChallengeRow>(
            r#"
            SELECT
                challenge_id,
                email,
                code_hash,
                expires_at,
                attempts,
                max_attempts,
                consumed_at,
                created_at
            FROM login_challenges
            WHERE challenge_id = $1
            "#,
        )
        .bind(challenge_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(LoginChallengeRow::into_challenge))
    }

    async fn register_attempt(
        &self,
        challenge_id: ChallengeId,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<LoginChallenge>> {
        let row = sqlx::query_as::<_, LoginChallengeRow>(
            r#"
            UPDATE login_challenges
            SET attempts = attempts + 1
            WHERE challenge_id = $1
              AND consumed_at IS NULL
              AND expires_at > $2
              AND attempts < max_attempts
            RETURNING
                challenge_id,
                email,
                code_hash,
                expires_at,
                attempts,
                max_attempts,
                consumed_at,
                created_at
            "#,
        )
        .bind(challenge_id.as_uuid())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(LoginChallengeRow::into_challenge))
    }

    async fn mark_consumed(
        &self,
        challenge_id: ChallengeId,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<LoginChallenge>> {
        let row = sqlx::query_as::<_, LoginChallengeRow>(
            r#"
            UPDATE login_challenges
            SET consumed_at = $2
            WHERE challenge_id = $1
              AND consumed_at IS NULL
            RETURNING
                challenge_id,
                email,
                code_hash,
                expires_at,
                attempts,
                max_attempts,
                consumed_at,
                created_at
            "#,
        )
        .bind(challenge_id.as_uuid())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(LoginChallengeRow::into_challenge))
    }
}

// ============================================================================
// Device Session Repository Implementation
// ============================================================================

impl DeviceSessionRepository for PgSessionStore {
    async fn insert_session(
        &self,
        session: &NewDeviceSession,
        now: DateTime<Utc>,
    ) -> AuthResult<DeviceSession> {
        let row = sqlx::query_as::<_, DeviceSessionRow>(
            r#"
            INSERT INTO device_sessions (
                user_id,
                device_name,
                ip,
                user_agent,
                last_used_at,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING id, user_id, device_name, ip, user_agent, last_used_at, created_at
            "#,
        )
        .bind(session.user_id.get())
        .bind(session.device_name.as_deref())
        .bind(session.ip.as_deref())
        .bind(session.user_agent.as_deref())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_session())
    }

    async fn find_session(
        &self,
        session_id: DeviceSessionId,
    ) -> AuthResult<Option<DeviceSession>> {
        let row = sqlx::query_as::<_, DeviceSessionRow>(
            r#"
            SELECT id, user_id, device_name, ip, user_agent, last_used_at, created_at
            FROM device_sessions
            WHERE id = $1
            "#,
        )
        .bind(session_id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(DeviceSessionRow::into_session))
    }

    async fn touch_session(
        &self,
        session_id: DeviceSessionId,
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        sqlx::query(
            "UPDATE device_sessions SET last_used_at = GREATEST(last_used_at, $2) WHERE id = $1",
        )
        .bind(session_id.get())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_sessions(&self, user_id: UserId, limit: i64) -> AuthResult<Vec<DeviceSession>> {
        let rows = sqlx::query_as::<_, DeviceSessionRow>(
            r#"
            SELECT id, user_id, device_name, ip, user_agent, last_used_at, created_at
            FROM device_sessions
            WHERE user_id = $1
            ORDER BY last_used_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id.get())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DeviceSessionRow::into_session).collect())
    }
}

// ============================================================================
// Refresh Token Repository Implementation
// ============================================================================

impl RefreshTokenRepository for PgSessionStore {
    async fn insert_token(
        &self,
        token: &NewRefreshToken,
        now: DateTime<Utc>,
    ) -> AuthResult<RefreshToken> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            INSERT INTO refresh_tokens (
                user_id,
                device_session_id,
                token_hash,
                expires_at,
                created_at
            ) VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, device_session_id, token_hash, expires_at, revoked_at, created_at
            "#,
        )
        .bind(token.user_id.get())
        .bind(token.device_session_id.get())
        .bind(token.token_hash.as_str())
        .bind(token.expires_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_token())
    }

    async fn find_active_token(
        &self,
        token_hash: &SecretHash,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<RefreshToken>> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT id, user_id, device_session_id, token_hash, expires_at, revoked_at, created_at
            FROM refresh_tokens
            WHERE token_hash = $1
              AND revoked_at IS NULL
              AND expires_at > $2
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(token_hash.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RefreshTokenRow::into_token))
    }

    async fn find_latest_token(
        &self,
        token_hash: &SecretHash,
    ) -> AuthResult<Option<RefreshToken>> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT id, user_id, device_session_id, token_hash, expires_at, revoked_at, created_at
            FROM refresh_tokens
            WHERE token_hash = $1
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(token_hash.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RefreshTokenRow::into_token))
    }

    async fn rotate_token(
        &self,
        predecessor: RefreshTokenId,
        successor: &NewRefreshToken,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<RefreshToken>> {
        let mut tx = self.pool.begin().await?;

        // Compare-and-swap: only one rotation of the same token can revoke it
        let revoked = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $2
            WHERE id = $1
              AND revoked_at IS NULL
              AND expires_at > $2
            "#,
        )
        .bind(predecessor.get())
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if revoked == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            INSERT INTO refresh_tokens (
                user_id,
                device_session_id,
                token_hash,
                expires_at,
                created_at
            ) VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, device_session_id, token_hash, expires_at, revoked_at, created_at
            "#,
        )
        .bind(successor.user_id.get())
        .bind(successor.device_session_id.get())
        .bind(successor.token_hash.as_str())
        .bind(successor.expires_at)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(row.into_token()))
    }

    async fn revoke_token(&self, token_id: RefreshTokenId, now: DateTime<Utc>) -> AuthResult<bool> {
        let updated = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(token_id.get())
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    async fn revoke_tokens_for_user(&self, user_id: UserId, now: DateTime<Utc>) -> AuthResult<u64> {
        let updated = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $2
            WHERE user_id = $1
              AND revoked_at IS NULL
              AND expires_at > $2
            "#,
        )
        .bind(user_id.get())
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated)
    }

    async fn revoke_tokens_for_session(
        &self,
        user_id: UserId,
        session_id: DeviceSessionId,
        now: DateTime<Utc>,
    ) -> AuthResult<u64> {
        let updated = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $3
            WHERE user_id = $1
              AND device_session_id = $2
              AND revoked_at IS NULL
              AND expires_at > $3
            "#,
        )
        .bind(user_id.get())
        .bind(session_id.get())
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated)
    }
}

// ============================================================================
// Impersonation Grant Repository Implementation
// ============================================================================

impl ImpersonationGrantRepository for PgSessionStore {
    async fn insert_grant(
        &self,
        grant: &NewImpersonationGrant,
        now: DateTime<Utc>,
    ) -> AuthResult<ImpersonationGrant> {
        let row = sqlx::query_as::<_, ImpersonationGrantRow>(
            r#"
            INSERT INTO impersonation_grants (
                admin_user_id,
                target_user_id,
                token_hash,
                expires_at,
                created_at
            ) VALUES ($1, $2, $3, $4, $5)
            RETURNING id, admin_user_id, target_user_id, token_hash, expires_at, used_at, created_at
            "#,
        )
        .bind(grant.admin_user_id.get())
        .bind(grant.target_user_id.get())
        .bind(grant.token_hash.as_str())
        .bind(grant.expires_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_grant())
    }

    async fn find_grant(&self, token_hash: &SecretHash) -> AuthResult<Option<ImpersonationGrant>> {
        let row = sqlx::query_as::<_, ImpersonationGrantRow>(
            r#"
            SELECT id, admin_user_id, target_user_id, token_hash, expires_at, used_at, created_at
            FROM impersonation_grants
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ImpersonationGrantRow::into_grant))
    }

    async fn mark_grant_used(
        &self,
        grant_id: ImpersonationGrantId,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<ImpersonationGrant>> {
        let row = sqlx::query_as::<_, ImpersonationGrantRow>(
            r#"
            UPDATE impersonation_grants
            SET used_at = $2
            WHERE id = $1
              AND used_at IS NULL
              AND expires_at > $2
            RETURNING id, admin_user_id, target_user_id, token_hash, expires_at, used_at, created_at
            "#,
        )
        .bind(grant_id.get())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ImpersonationGrantRow::into_grant))
    }
}

// ============================================================================
// Row Types for sqlx mapping
// ============================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    display_name: Option<String>,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> User {
        User {
            user_id: UserId::new(self.id),
            email: Email::from_db(self.email),
            display_name: self.display_name,
            deleted_at: self.deleted_at,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LoginChallengeRow {
    challenge_id: Uuid,
    email: String,
    code_hash: String,
    expires_at: DateTime<Utc>,
    attempts: i32,
    max_attempts: i32,
    consumed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl LoginChallengeRow {
    fn into_challenge(self) -> LoginChallenge {
        LoginChallenge {
            challenge_id: ChallengeId::from_uuid(self.challenge_id),
            email: Email::from_db(self.email),
            code_hash: SecretHash::from_db(self.code_hash),
            expires_at: self.expires_at,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            consumed_at: self.consumed_at,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DeviceSessionRow {
    id: i64,
    user_id: i64,
    device_name: Option<String>,
    ip: Option<String>,
    user_agent: Option<String>,
    last_used_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl DeviceSessionRow {
    fn into_session(self) -> DeviceSession {
        DeviceSession {
            session_id: DeviceSessionId::new(self.id),
            user_id: UserId::new(self.user_id),
            device_name: self.device_name,
            ip: self.ip,
            user_agent: self.user_agent,
            last_used_at: self.last_used_at,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RefreshTokenRow {
    id: i64,
    user_id: i64,
    device_session_id: i64,
    token_hash: String,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl RefreshTokenRow {
    fn into_token(self) -> RefreshToken {
        RefreshToken {
            token_id: RefreshTokenId::new(self.id),
            user_id: UserId::new(self.user_id),
            device_session_id: DeviceSessionId::new(self.device_session_id),
            token_hash: SecretHash::from_db(self.token_hash),
            expires_at: self.expires_at,
            revoked_at: self.revoked_at,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ImpersonationGrantRow {
    id: i64,
    admin_user_id: i64,
    target_user_id: i64,
    token_hash: String,
    expires_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl ImpersonationGrantRow {
    fn into_grant(self) -> ImpersonationGrant {
        ImpersonationGrant {
            grant_id: ImpersonationGrantId::new(self.id),
            admin_user_id: UserId::new(self.admin_user_id),
            target_user_id: UserId::new(self.target_user_id),
            token_hash: SecretHash::from_db(self.token_hash),
            expires_at: self.expires_at,
            used_at: self.used_at,
            created_at: self.created_at,
        }
    }
}
