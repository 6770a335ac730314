//! Application Layer
//!
//! Use cases and application services.

pub mod config;
pub mod device_sessions;
pub mod impersonation;
pub mod login_challenge;
pub mod notifier;
pub mod refresh_tokens;
pub mod request_code;
pub mod sign_in;
pub mod sign_out;
pub mod token_validator;
pub mod user_directory;

// Re-exports
pub use config::AuthConfig;
pub use device_sessions::DeviceSessionRegistry;
pub use impersonation::{ImpersonationOutput, ImpersonationService, MintedGrant};
pub use login_challenge::LoginChallengeService;
pub use notifier::{DeliveryError, LoginCodeDelivery, LoginCodeNotifier};
pub use refresh_tokens::RefreshTokenLedger;
pub use request_code::RequestLoginCodeUseCase;
pub use sign_in::{ExternalIdentity, SignInOutput, SignInUseCase};
pub use sign_out::SignOutUseCase;
pub use token_validator::{Authenticated, TokenValidator};
pub use user_directory::UserDirectory;
