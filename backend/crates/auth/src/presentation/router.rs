//! Auth Router

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};

use crate::application::config::AuthConfig;
use crate::application::notifier::LoginCodeNotifier;
use crate::domain::repository::SessionStore;
use crate::infra::notifier::LogNotifier;
use crate::infra::postgres::PgSessionStore;
use crate::presentation::handlers::{self, AuthAppState};
use crate::presentation::middleware::require_session;

/// Create the Auth router with the PostgreSQL store and log-only delivery
pub fn auth_router(store: PgSessionStore, config: AuthConfig) -> Router {
    auth_router_generic(store, LogNotifier, config)
}

/// Create a generic Auth router for any store and notifier
pub fn auth_router_generic<R, N>(store: R, notifier: N, config: AuthConfig) -> Router
where
    R: SessionStore,
    N: LoginCodeNotifier + Clone + Send + Sync + 'static,
{
    let state = AuthAppState::new(store, notifier, config);

    let protected = Router::new()
        .route("/me", get(handlers::me))
        .route(
            "/sessions",
            get(handlers::list_sessions::<R, N>).delete(handlers::revoke_all_sessions::<R, N>),
        )
        .route("/sessions/{id}", delete(handlers::revoke_session::<R, N>))
        .route(
            "/impersonation/grants",
            post(handlers::mint_impersonation_grant::<R, N>),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session::<R, N>,
        ));

    Router::new()
        .route("/email-code/request", post(handlers::request_code::<R, N>))
        .route("/email-code/verify", post(handlers::verify_code::<R, N>))
        .route("/refresh", post(handlers::refresh::<R, N>))
        .route("/logout", post(handlers::logout::<R, N>))
        .route("/impersonate", post(handlers::redeem_impersonation::<R, N>))
        .merge(protected)
        .with_state(state)
}
