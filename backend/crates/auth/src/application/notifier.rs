//! Login Code Delivery
//!
//! Port through which freshly issued login codes leave the system.

use crate::domain::value_object::{ChallengeId, Email, LoginCode};

/// Everything a notifier needs to reach the user
#[derive(Debug, Clone)]
pub struct LoginCodeDelivery {
    pub email: Email,
    pub challenge_id: ChallengeId,
    pub code: LoginCode,
    /// Link that completes sign-in without typing the code
    pub login_link: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Login code delivery failed: {0}")]
    Failed(String),
}

/// Login code notifier trait
#[trait_variant::make(LoginCodeNotifier: Send)]
pub trait LocalLoginCodeNotifier {
    async fn deliver(&self, delivery: &LoginCodeDelivery) -> Result<(), DeliveryError>;
}
