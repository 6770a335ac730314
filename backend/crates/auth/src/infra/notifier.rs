//! Log Notifier
//!
//! Writes login codes to the application log instead of sending email.
//! For local development only.

use crate::application::notifier::{DeliveryError, LoginCodeDelivery, LoginCodeNotifier};

#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl LoginCodeNotifier for LogNotifier {
    async fn deliver(&self, delivery: &LoginCodeDelivery) -> Result<(), DeliveryError> {
        tracing::info!(
            email = %delivery.email,
            challenge_id = %delivery.challenge_id,
            code = delivery.code.as_str(),
            link = %delivery.login_link,
            "Login code issued"
        );
        Ok(())
    }
}
