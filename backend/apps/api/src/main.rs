//! API Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors; request-level errors go through
//! `fitq_auth::AuthError` and the kernel `AppError`.

use std::env;
use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    Router, http,
    http::{Method, header},
};
use fitq_auth::infra::LogNotifier;
use fitq_auth::{
    AuthConfig, InMemorySessionStore, PgSessionStore, auth_router, auth_router_generic,
};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:31113";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fitq_api=info,fitq_auth=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let auth_config = auth_config_from_env()?;

    // Without DATABASE_URL everything lives in memory and is lost on restart
    let auth_routes = match env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&database_url)
                .await?;

            tracing::info!("Connected to database");

            sqlx::migrate!("../../../database/migrations")
                .run(&pool)
                .await?;

            tracing::info!("Migrations completed");

            let store = PgSessionStore::new(pool);

            // Startup cleanup must not prevent server startup
            if let Err(e) = store.purge_stale_challenges().await {
                tracing::warn!(error = %e, "Login challenge cleanup failed, continuing anyway");
            }

            auth_router(store, auth_config)
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, using in-memory session store");
            auth_router_generic(InMemorySessionStore::new(), LogNotifier, auth_config)
        }
    };

    // CORS configuration
    let frontend_origins = env::var("FRONTEND_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3002,http://127.0.0.1:3002".to_string());

    let allowed_origins: Vec<http::HeaderValue> = frontend_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([header::CONTENT_TYPE, header::ACCEPT]))
        .allow_credentials(true);

    // Build router
    let app = Router::new()
        .nest("/api/auth", auth_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr: SocketAddr = env::var("LISTEN_ADDR")
        .unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string())
        .parse()
        .context("LISTEN_ADDR must be host:port")?;
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Auth settings; debug builds start from the insecure-cookie profile
fn auth_config_from_env() -> anyhow::Result<AuthConfig> {
    let mut config = if cfg!(debug_assertions) {
        AuthConfig::development()
    } else {
        AuthConfig::default()
    };

    if let Ok(base_url) = env::var("LOGIN_LINK_BASE_URL") {
        config.login_link_base_url = base_url;
    }
    if let Ok(secure) = env::var("AUTH_COOKIE_SECURE") {
        config.cookie_secure = secure
            .parse()
            .context("AUTH_COOKIE_SECURE must be true or false")?;
    }
    if let Ok(revoke) = env::var("AUTH_REVOKE_FAMILY_ON_REUSE") {
        config.revoke_family_on_reuse = revoke
            .parse()
            .context("AUTH_REVOKE_FAMILY_ON_REUSE must be true or false")?;
    }
    if let Ok(ids) = env::var("AUTH_ADMIN_USER_IDS") {
        let ids: Vec<i64> = ids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::parse)
            .collect::<Result<_, _>>()
            .context("AUTH_ADMIN_USER_IDS must be comma-separated user ids")?;
        config.admin_user_ids = ids.into_iter().map(Into::into).collect();
    }

    Ok(config)
}
