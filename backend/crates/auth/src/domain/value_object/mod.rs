//! Value Object Module

pub mod challenge_id;
pub mod email;
pub mod login_code;
pub mod secret;

pub use challenge_id::ChallengeId;
pub use email::Email;
pub use login_code::LoginCode;
pub use secret::{RefreshSecret, SecretHash};
