//! Auth Error Types
//!
//! Auth-specific error variants that integrate with the unified
//! `kernel::error::AppError` system.
//!
//! Internally every challenge failure keeps its own variant so logs can
//! tell them apart. At the HTTP boundary they collapse into one generic
//! message each, so callers cannot tell which condition failed.

use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

/// Auth-specific result type alias
pub type AuthResult<T> = Result<T, AuthError>;

/// Client-facing message for every login challenge failure
pub const INVALID_CODE_MESSAGE: &str = "Invalid or expired code";

/// Client-facing message for every credential failure
pub const INVALID_SESSION_MESSAGE: &str = "Invalid or expired session";

/// Auth-specific error variants
#[derive(Debug, Error)]
pub enum AuthError {
    /// No challenge with the given id
    #[error("Login challenge not found")]
    ChallengeNotFound,

    /// Challenge past its expiry instant
    #[error("Login challenge expired")]
    ChallengeExpired,

    /// Challenge hit its attempt ceiling
    #[error("Login challenge exhausted")]
    ChallengeExhausted,

    /// Challenge was already redeemed
    #[error("Login challenge already consumed")]
    ChallengeAlreadyConsumed,

    /// Supplied code does not match
    #[error("Login code mismatch")]
    CodeMismatch,

    /// Refresh secret unknown, revoked or expired
    #[error("Refresh token invalid")]
    TokenInvalid,

    /// Account is soft-deleted
    #[error("User is deleted")]
    UserDeleted,

    /// No credential presented
    #[error("Not authenticated")]
    Unauthenticated,

    /// No impersonation grant with the given token
    #[error("Impersonation grant not found")]
    GrantNotFound,

    /// Grant past its expiry instant
    #[error("Impersonation grant expired")]
    GrantExpired,

    /// Grant was already redeemed
    #[error("Impersonation grant already used")]
    GrantAlreadyUsed,

    /// Referenced user does not exist
    #[error("User not found")]
    UserNotFound,

    /// Caller lacks the required role
    #[error("Forbidden")]
    Forbidden,

    /// Malformed email address
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// Malformed request field
    #[error("Invalid request: {0}")]
    InvalidRequest(&'static str),

    /// Too many login code requests
    #[error("Too many login code requests")]
    RateLimited,

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// True for any reason a login challenge could not be redeemed
    pub fn is_challenge_failure(&self) -> bool {
        matches!(
            self,
            AuthError::ChallengeNotFound
                | AuthError::ChallengeExpired
                | AuthError::ChallengeExhausted
                | AuthError::ChallengeAlreadyConsumed
                | AuthError::CodeMismatch
        )
    }

    /// True for any reason a presented credential was refused
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            AuthError::TokenInvalid | AuthError::UserDeleted | AuthError::Unauthenticated
        )
    }

    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            _ if self.is_challenge_failure() => ErrorKind::BadRequest,
            _ if self.is_credential_failure() => ErrorKind::Unauthorized,
            AuthError::InvalidEmail(_) | AuthError::InvalidRequest(_) => ErrorKind::BadRequest,
            AuthError::GrantExpired | AuthError::GrantAlreadyUsed => ErrorKind::Unauthorized,
            AuthError::GrantNotFound | AuthError::UserNotFound => ErrorKind::NotFound,
            AuthError::Forbidden => ErrorKind::Forbidden,
            AuthError::RateLimited => ErrorKind::TooManyRequests,
            AuthError::Database(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) => {
                ErrorKind::ServiceUnavailable
            }
            _ => ErrorKind::InternalServerError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Convert to AppError
    ///
    /// Challenge and credential failures each collapse into a single
    /// message; server errors never expose their detail.
    pub fn to_app_error(self) -> AppError {
        let kind = self.kind();
        match self {
            e if e.is_challenge_failure() => {
                AppError::new(kind, INVALID_CODE_MESSAGE).with_action("Request a new login code")
            }
            e if e.is_credential_failure() => {
                AppError::new(kind, INVALID_SESSION_MESSAGE).with_action("Sign in again")
            }
            AuthError::InvalidEmail(_) => AppError::new(kind, "Invalid email address"),
            AuthError::InvalidRequest(field) => AppError::new(kind, format!("Invalid {field}")),
            AuthError::GrantNotFound => AppError::new(kind, "Invalid impersonation token"),
            AuthError::GrantExpired | AuthError::GrantAlreadyUsed => {
                AppError::new(kind, "Impersonation token expired or already used")
                    .with_action("Request a new impersonation link")
            }
            AuthError::UserNotFound => AppError::new(kind, "User not found"),
            AuthError::Forbidden => AppError::new(kind, "Forbidden"),
            AuthError::RateLimited => {
                AppError::new(kind, "Too many requests").with_action("Try again in a minute")
            }
            AuthError::Database(e) => {
                let message = match kind {
                    ErrorKind::ServiceUnavailable => "Service temporarily unavailable",
                    _ => "Internal server error",
                };
                AppError::new(kind, message).with_source(e)
            }
            _ => AppError::internal("Internal server error"),
        }
    }

    /// Log the error with appropriate level
    pub(crate) fn log(&self) {
        match self {
            AuthError::Database(e) => {
                tracing::error!(error = %e, "Auth database error");
            }
            AuthError::Internal(msg) => {
                tracing::error!(message = %msg, "Auth internal error");
            }
            AuthError::CodeMismatch | AuthError::ChallengeExhausted => {
                tracing::warn!(error = %self, "Rejected login code");
            }
            AuthError::UserDeleted => {
                tracing::warn!("Credential presented for deleted user");
            }
            AuthError::RateLimited => {
                tracing::warn!("Login code request rate limited");
            }
            AuthError::GrantNotFound | AuthError::GrantExpired | AuthError::GrantAlreadyUsed => {
                tracing::warn!(error = %self, "Rejected impersonation grant");
            }
            AuthError::Forbidden => {
                tracing::warn!("Impersonation refused");
            }
            _ => {
                tracing::debug!(error = %self, "Auth error");
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();
        self.to_app_error().into_response()
    }
}

impl From<platform::rate_limit::RateLimitError> for AuthError {
    fn from(err: platform::rate_limit::RateLimitError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<chrono::OutOfRangeError> for AuthError {
    fn from(err: chrono::OutOfRangeError) -> Self {
        AuthError::Internal(format!("duration out of range: {err}"))
    }
}

impl From<http::header::InvalidHeaderValue> for AuthError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        AuthError::Internal(format!("invalid header value: {err}"))
    }
}
