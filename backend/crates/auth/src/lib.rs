//! Auth (Authentication) Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Entities, value objects, repository traits
//! - `application/` - Use cases and application services
//! - `infra/` - PostgreSQL and in-memory stores, notifiers
//! - `presentation/` - HTTP handlers, DTOs, router
//!
//! ## Features
//! - Passwordless sign-in with emailed one-time codes
//! - Device sessions with rotating refresh tokens carried in a cookie
//! - Per-device and "everywhere" sign-out
//! - Sign-in from an identity verified by an external (OAuth) provider
//! - Admin impersonation through single-use, short-lived grants
//!
//! ## Security Model
//! - Login codes and refresh secrets are stored only as SHA-256 hashes
//! - A login challenge is redeemable once, within its TTL and attempt budget
//! - Rotation revokes the old token and issues its successor atomically
//! - Soft-deleted users are rejected on every validation and rotation
//! - Impersonation grants are stored hashed and redeemable once

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

// Re-exports for convenience
pub use application::config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use infra::memory::InMemorySessionStore;
pub use infra::postgres::PgSessionStore;
pub use presentation::router::{auth_router, auth_router_generic};

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

// Convenience re-exports
pub mod config {
    pub use crate::application::config::*;
}

pub mod models {
    pub use crate::domain::entity::*;
    pub use crate::domain::value_object::*;
    pub use crate::presentation::dto::*;
}

pub mod store {
    pub use crate::domain::repository::SessionStore;
    pub use crate::infra::memory::InMemorySessionStore;
    pub use crate::infra::postgres::PgSessionStore;
}

pub mod middleware {
    pub use crate::presentation::middleware::*;
}

#[cfg(test)]
mod tests;
