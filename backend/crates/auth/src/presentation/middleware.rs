//! Auth Middleware
//!
//! Resolves the presented refresh secret on protected routes.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use platform::cookie::{CookieConfig, extract_cookie};

use crate::application::config::AuthConfig;
use crate::application::notifier::LoginCodeNotifier;
use crate::application::token_validator::TokenValidator;
use crate::domain::entity::{RefreshToken, User};
use crate::domain::repository::SessionStore;
use crate::domain::value_object::RefreshSecret;
use crate::error::AuthError;
use crate::presentation::handlers::AuthAppState;

/// Which cookie a credential came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Impersonation,
    Refresh,
}

impl CredentialSource {
    pub fn cookie(&self, config: &AuthConfig) -> CookieConfig {
        match self {
            CredentialSource::Impersonation => config.impersonate_cookie(),
            CredentialSource::Refresh => config.refresh_cookie(),
        }
    }
}

/// Pick the presented secret; the impersonation cookie wins
pub fn presented_credential(
    headers: &HeaderMap,
    config: &AuthConfig,
) -> Option<(CredentialSource, RefreshSecret)> {
    extract_cookie(headers, &config.impersonate_cookie_name)
        .map(|v| (CredentialSource::Impersonation, RefreshSecret::from_presented(v)))
        .or_else(|| {
            extract_cookie(headers, &config.refresh_cookie_name)
                .map(|v| (CredentialSource::Refresh, RefreshSecret::from_presented(v)))
        })
}

/// Authenticated caller, stored in request extensions
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    /// Token the request was authenticated with
    pub token: RefreshToken,
    pub source: CredentialSource,
}

/// Middleware that requires a valid credential
pub async fn require_session<R, N>(
    State(state): State<AuthAppState<R, N>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError>
where
    R: SessionStore,
    N: LoginCodeNotifier + Clone + Send + Sync + 'static,
{
    let (source, secret) =
        presented_credential(req.headers(), &state.config).ok_or(AuthError::Unauthenticated)?;

    let authenticated = TokenValidator::new(state.store.clone(), state.config.clone())
        .validate(&secret)
        .await?;

    req.extensions_mut().insert(AuthenticatedUser {
        user: authenticated.user,
        token: authenticated.token,
        source,
    });

    Ok(next.run(req).await)
}
