//! API DTOs (Data Transfer Objects)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entity::{SessionInfo, User};

// ============================================================================
// Email Code
// ============================================================================

/// Login code request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCodeRequest {
    pub email: String,
}

/// Login code response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCodeResponse {
    pub challenge_id: String,
}

/// Login code verification request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeRequest {
    pub challenge_id: String,
    pub code: String,
}

/// Sign in response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub user_id: i64,
    pub email: String,
    pub session_id: i64,
}

// ============================================================================
// Refresh
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub session_id: i64,
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Impersonation
// ============================================================================

/// Grant minting request (admin only)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpersonationGrantRequest {
    pub user_id: i64,
}

/// Minted grant; `url` carries the single-use token
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpersonationGrantResponse {
    pub token: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserSummary,
}

/// Grant redemption request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemImpersonationRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpersonationResponse {
    pub admin_id: i64,
    pub user: UserSummary,
    pub session_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.user_id.get(),
            name: user.display_name_or_default().to_string(),
            email: user.email.to_string(),
        }
    }
}

// ============================================================================
// Current User
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
    /// True when authenticated through the impersonation cookie
    pub impersonated: bool,
}

// ============================================================================
// Device Sessions
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: i64,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub is_current: bool,
}

impl From<SessionInfo> for SessionResponse {
    fn from(info: SessionInfo) -> Self {
        Self {
            id: info.session_id.get(),
            device_name: info.device_name,
            ip_address: info.ip,
            user_agent: info.user_agent,
            created_at: info.created_at,
            last_used_at: info.last_used_at,
            is_current: info.is_current,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionResponse>,
}
