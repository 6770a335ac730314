//! Application Configuration
//!
//! Configuration for the Auth application layer.

use std::time::Duration;

use kernel::id::UserId;
use platform::cookie::CookieConfig;
use platform::rate_limit::RateLimitConfig;

use crate::domain::value_object::{ChallengeId, LoginCode, RefreshSecret};
use crate::error::AuthResult;

/// Re-export SameSite from platform
pub use platform::cookie::SameSite;

/// Auth application configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Cookie carrying the regular refresh secret
    pub refresh_cookie_name: String,
    /// Cookie carrying an impersonation refresh secret; wins over the regular one
    pub impersonate_cookie_name: String,
    /// Login code lifetime (10 minutes)
    pub login_code_ttl: Duration,
    /// Verification attempts per challenge
    pub max_login_attempts: i32,
    /// Refresh token lifetime (1 year)
    pub refresh_token_ttl: Duration,
    /// Whether to require Secure cookie
    pub cookie_secure: bool,
    /// SameSite policy
    pub cookie_same_site: SameSite,
    /// Base URL the emailed deep link points at
    pub login_link_base_url: String,
    /// Login code requests allowed per (email, ip) per window
    pub code_request_limit: u32,
    pub code_request_window: Duration,
    /// Revoke the whole device session when a revoked secret is replayed
    pub revoke_family_on_reuse: bool,
    /// Maximum sessions returned by the device list
    pub session_list_limit: i64,
    /// Lifetime of an impersonation grant and of the session it opens (4 hours)
    pub impersonation_ttl: Duration,
    /// Users allowed to mint impersonation grants; never impersonable themselves
    pub admin_user_ids: Vec<UserId>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_cookie_name: "fitq_refresh".to_string(),
            impersonate_cookie_name: "fitq_impersonate".to_string(),
            login_code_ttl: Duration::from_secs(10 * 60),
            max_login_attempts: 5,
            refresh_token_ttl: Duration::from_secs(365 * 24 * 3600),
            cookie_secure: true,
            cookie_same_site: SameSite::Lax,
            login_link_base_url: "http://localhost:3002".to_string(),
            code_request_limit: 5,
            code_request_window: Duration::from_secs(60),
            revoke_family_on_reuse: false,
            session_list_limit: 50,
            impersonation_ttl: Duration::from_secs(4 * 3600),
            admin_user_ids: Vec::new(),
        }
    }
}

impl AuthConfig {
    /// Create config for development (insecure cookie)
    pub fn development() -> Self {
        Self {
            cookie_secure: false,
            ..Default::default()
        }
    }

    /// Cookie carrying the refresh secret, lives as long as the token
    pub fn refresh_cookie(&self) -> CookieConfig {
        CookieConfig {
            secure: self.cookie_secure,
            same_site: self.cookie_same_site,
            max_age_secs: Some(self.refresh_token_ttl.as_secs()),
            ..CookieConfig::named(&self.refresh_cookie_name)
        }
    }

    /// Cookie carrying an impersonation secret, lives as long as the grant
    pub fn impersonate_cookie(&self) -> CookieConfig {
        CookieConfig {
            secure: self.cookie_secure,
            same_site: self.cookie_same_site,
            max_age_secs: Some(self.impersonation_ttl.as_secs()),
            ..CookieConfig::named(&self.impersonate_cookie_name)
        }
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admin_user_ids.contains(&user_id)
    }

    /// Link the admin hands to the browser that will impersonate
    pub fn impersonation_link(&self, token: &RefreshSecret) -> String {
        format!(
            "{}/auth/impersonate?token={}",
            self.login_link_base_url.trim_end_matches('/'),
            token.expose()
        )
    }

    pub fn code_rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig::new(self.code_request_limit, self.code_request_window)
    }

    /// Deep link that signs the user in without typing the code
    pub fn login_link(&self, challenge_id: &ChallengeId, code: &LoginCode) -> String {
        format!(
            "{}/login?challenge={}&code={}",
            self.login_link_base_url.trim_end_matches('/'),
            challenge_id,
            code.as_str()
        )
    }

    pub fn login_code_ttl_chrono(&self) -> AuthResult<chrono::Duration> {
        Ok(chrono::Duration::from_std(self.login_code_ttl)?)
    }

    pub fn refresh_token_ttl_chrono(&self) -> AuthResult<chrono::Duration> {
        Ok(chrono::Duration::from_std(self.refresh_token_ttl)?)
    }

    pub fn impersonation_ttl_chrono(&self) -> AuthResult<chrono::Duration> {
        Ok(chrono::Duration::from_std(self.impersonation_ttl)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.login_code_ttl.as_secs(), 600);
        assert_eq!(config.max_login_attempts, 5);
        assert_eq!(config.refresh_token_ttl.as_secs(), 31_536_000);
        assert!(config.cookie_secure);
        assert!(!config.revoke_family_on_reuse);
        assert_eq!(config.impersonation_ttl.as_secs(), 14_400);
        assert!(config.admin_user_ids.is_empty());
    }

    #[test]
    fn test_impersonate_cookie_lives_four_hours() {
        let cookie = AuthConfig::development()
            .impersonate_cookie()
            .build_set_cookie("abc");
        assert!(cookie.starts_with("fitq_impersonate=abc"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=14400"));
    }

    #[test]
    fn test_refresh_cookie_attributes() {
        let cookie = AuthConfig::development().refresh_cookie().build_set_cookie("abc");
        assert!(cookie.starts_with("fitq_refresh=abc"));
        assert!(cookie.contains("HttpOnly"));
        assert!(!cookie.contains("Secure"));
        assert!(cookie.contains("Max-Age=31536000"));
    }

    #[test]
    fn test_login_link() {
        let config = AuthConfig {
            login_link_base_url: "https://app.fitq.example/".to_string(),
            ..Default::default()
        };
        let id = ChallengeId::new();
        let link = config.login_link(&id, &LoginCode::from_input("123456"));
        assert_eq!(
            link,
            format!("https://app.fitq.example/login?challenge={id}&code=123456")
        );
    }
}
