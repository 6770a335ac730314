//! Domain Layer
//!
//! Contains entities, value objects, and repository traits.

pub mod entity;
pub mod repository;
pub mod value_object;

// Re-exports
pub use entity::{DeviceSession, LoginChallenge, RefreshToken, User};
pub use repository::{
    DeviceSessionRepository, LoginChallengeRepository, RefreshTokenRepository, SessionStore,
    UserRepository,
};
