//! HTTP Handlers

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use kernel::id::{DeviceSessionId, UserId};
use platform::client::ClientInfo;
use platform::cookie::{delete_cookie_header, extract_cookie, set_cookie_header};
use platform::rate_limit::InMemoryRateLimitStore;

use crate::application::config::AuthConfig;
use crate::application::notifier::LoginCodeNotifier;
use crate::application::{
    DeviceSessionRegistry, ImpersonationService, RefreshTokenLedger, RequestLoginCodeUseCase,
    SignInUseCase, SignOutUseCase,
};
use crate::domain::entity::SessionInfo;
use crate::domain::repository::SessionStore;
use crate::domain::value_object::{ChallengeId, LoginCode, RefreshSecret};
use crate::error::{AuthError, AuthResult};
use crate::presentation::dto::{
    ImpersonationGrantRequest, ImpersonationGrantResponse, ImpersonationResponse, MeResponse,
    RedeemImpersonationRequest, RefreshResponse, RequestCodeRequest, RequestCodeResponse,
    SessionListResponse, SessionResponse, SignInResponse, UserSummary, VerifyCodeRequest,
};
use crate::presentation::middleware::{AuthenticatedUser, CredentialSource, presented_credential};

/// Shared state for auth handlers
#[derive(Clone)]
pub struct AuthAppState<R, N>
where
    R: SessionStore,
    N: LoginCodeNotifier + Clone + Send + Sync + 'static,
{
    pub store: Arc<R>,
    pub notifier: Arc<N>,
    pub rate_limiter: Arc<InMemoryRateLimitStore>,
    pub config: Arc<AuthConfig>,
}

impl<R, N> AuthAppState<R, N>
where
    R: SessionStore,
    N: LoginCodeNotifier + Clone + Send + Sync + 'static,
{
    pub fn new(store: R, notifier: N, config: AuthConfig) -> Self {
        Self {
            store: Arc::new(store),
            notifier: Arc::new(notifier),
            rate_limiter: Arc::new(InMemoryRateLimitStore::new()),
            config: Arc::new(config),
        }
    }
}

// ============================================================================
// Email Code
// ============================================================================

/// POST /api/auth/email-code/request
pub async fn request_code<R, N>(
    State(state): State<AuthAppState<R, N>>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<RequestCodeRequest>,
) -> AuthResult<Json<RequestCodeResponse>>
where
    R: SessionStore,
    N: LoginCodeNotifier + Clone + Send + Sync + 'static,
{
    let client = ClientInfo::from_headers(&headers, Some(addr.ip()));

    let use_case = RequestLoginCodeUseCase::new(
        state.store.clone(),
        state.rate_limiter.clone(),
        state.notifier.clone(),
        state.config.clone(),
    );

    let challenge_id = use_case.execute(&req.email, &client).await?;

    Ok(Json(RequestCodeResponse {
        challenge_id: challenge_id.to_string(),
    }))
}

/// POST /api/auth/email-code/verify
pub async fn verify_code<R, N>(
    State(state): State<AuthAppState<R, N>>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<VerifyCodeRequest>,
) -> AuthResult<impl IntoResponse>
where
    R: SessionStore,
    N: LoginCodeNotifier + Clone + Send + Sync + 'static,
{
    let code = req.code.trim();
    if code.is_empty() {
        return Err(AuthError::InvalidRequest("code"));
    }
    let challenge_id = ChallengeId::parse_str(&req.challenge_id)?;
    let client = ClientInfo::from_headers(&headers, Some(addr.ip()));

    let output = SignInUseCase::new(state.store.clone(), state.config.clone())
        .with_code(challenge_id, &LoginCode::from_input(code), &client)
        .await?;

    let cookie = set_cookie_header(&state.config.refresh_cookie(), output.issued.secret.expose())?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(SignInResponse {
            user_id: output.user.user_id.get(),
            email: output.user.email.to_string(),
            session_id: output.session.session_id.get(),
        }),
    ))
}

// ============================================================================
// Refresh
// ============================================================================

/// POST /api/auth/refresh
pub async fn refresh<R, N>(
    State(state): State<AuthAppState<R, N>>,
    headers: HeaderMap,
) -> AuthResult<impl IntoResponse>
where
    R: SessionStore,
    N: LoginCodeNotifier + Clone + Send + Sync + 'static,
{
    let presented = extract_cookie(&headers, &state.config.refresh_cookie_name)
        .map(RefreshSecret::from_presented)
        .ok_or(AuthError::Unauthenticated)?;

    let issued = RefreshTokenLedger::new(state.store.clone(), state.config.clone())
        .rotate(&presented)
        .await?;

    let cookie = set_cookie_header(&state.config.refresh_cookie(), issued.secret.expose())?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(RefreshResponse {
            session_id: issued.token.device_session_id.get(),
            expires_at: issued.token.expires_at,
        }),
    ))
}

// ============================================================================
// Impersonation
// ============================================================================

/// POST /api/auth/impersonate
///
/// Redeems a grant token and sets the impersonation cookie. The admin's
/// own refresh cookie is left untouched.
pub async fn redeem_impersonation<R, N>(
    State(state): State<AuthAppState<R, N>>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<RedeemImpersonationRequest>,
) -> AuthResult<impl IntoResponse>
where
    R: SessionStore,
    N: LoginCodeNotifier + Clone + Send + Sync + 'static,
{
    let token = req.token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidRequest("token"));
    }
    let client = ClientInfo::from_headers(&headers, Some(addr.ip()));

    let output = ImpersonationService::new(state.store.clone(), state.config.clone())
        .redeem(&RefreshSecret::from_presented(token), &client)
        .await?;

    let cookie =
        set_cookie_header(&state.config.impersonate_cookie(), output.issued.secret.expose())?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(ImpersonationResponse {
            admin_id: output.admin_user_id.get(),
            user: UserSummary::from(&output.user),
            session_id: output.session.session_id.get(),
        }),
    ))
}

/// POST /api/auth/impersonation/grants (admin only)
///
/// Must be called with the admin's own refresh cookie, not while
/// impersonating.
pub async fn mint_impersonation_grant<R, N>(
    State(state): State<AuthAppState<R, N>>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<ImpersonationGrantRequest>,
) -> AuthResult<Json<ImpersonationGrantResponse>>
where
    R: SessionStore,
    N: LoginCodeNotifier + Clone + Send + Sync + 'static,
{
    if auth.source != CredentialSource::Refresh {
        return Err(AuthError::Forbidden);
    }

    let minted = ImpersonationService::new(state.store.clone(), state.config.clone())
        .grant(auth.user.user_id, UserId::new(req.user_id))
        .await?;

    Ok(Json(ImpersonationGrantResponse {
        url: state.config.impersonation_link(&minted.token),
        token: minted.token.expose().to_string(),
        expires_at: minted.grant.expires_at,
        user: UserSummary::from(&minted.target),
    }))
}

// ============================================================================
// Sign Out
// ============================================================================

/// POST /api/auth/logout
///
/// Signs out whichever credential wins (impersonation first) and clears
/// only that cookie. Always 204.
pub async fn logout<R, N>(
    State(state): State<AuthAppState<R, N>>,
    headers: HeaderMap,
) -> AuthResult<impl IntoResponse>
where
    R: SessionStore,
    N: LoginCodeNotifier + Clone + Send + Sync + 'static,
{
    let source = match presented_credential(&headers, &state.config) {
        Some((source, secret)) => {
            let use_case = SignOutUseCase::new(state.store.clone(), state.config.clone());
            if let Err(e) = use_case.execute(&secret).await {
                // The cookie is cleared regardless
                tracing::warn!(error = %e, "Failed to revoke refresh token on logout");
            }
            source
        }
        None => CredentialSource::Refresh,
    };

    let cookie = delete_cookie_header(&source.cookie(&state.config))?;

    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]))
}

// ============================================================================
// Current User (requires authentication)
// ============================================================================

/// GET /api/auth/me
pub async fn me(Extension(auth): Extension<AuthenticatedUser>) -> Json<MeResponse> {
    Json(MeResponse {
        id: auth.user.user_id.get(),
        name: auth.user.display_name_or_default().to_string(),
        email: auth.user.email.to_string(),
        impersonated: auth.source == CredentialSource::Impersonation,
    })
}

// ============================================================================
// Device Sessions (requires authentication)
// ============================================================================

/// GET /api/auth/sessions
pub async fn list_sessions<R, N>(
    State(state): State<AuthAppState<R, N>>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> AuthResult<Json<SessionListResponse>>
where
    R: SessionStore,
    N: LoginCodeNotifier + Clone + Send + Sync + 'static,
{
    let sessions = DeviceSessionRegistry::new(state.store.clone(), state.config.clone())
        .list(auth.user.user_id)
        .await?;

    let current = auth.token.device_session_id;
    Ok(Json(SessionListResponse {
        sessions: sessions
            .into_iter()
            .map(|s| SessionResponse::from(SessionInfo::from_session(s, current)))
            .collect(),
    }))
}

/// DELETE /api/auth/sessions
pub async fn revoke_all_sessions<R, N>(
    State(state): State<AuthAppState<R, N>>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> AuthResult<StatusCode>
where
    R: SessionStore,
    N: LoginCodeNotifier + Clone + Send + Sync + 'static,
{
    SignOutUseCase::new(state.store.clone(), state.config.clone())
        .execute_all(auth.user.user_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/auth/sessions/{id}
pub async fn revoke_session<R, N>(
    State(state): State<AuthAppState<R, N>>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(session_id): Path<i64>,
) -> AuthResult<StatusCode>
where
    R: SessionStore,
    N: LoginCodeNotifier + Clone + Send + Sync + 'static,
{
    DeviceSessionRegistry::new(state.store.clone(), state.config.clone())
        .revoke(auth.user.user_id, DeviceSessionId::new(session_id))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
