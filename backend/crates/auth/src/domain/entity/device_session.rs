//! Device Session Entity
//!
//! One signed-in device (browser) of a user. The refresh token chain
//! issued to that device hangs off it.

use chrono::{DateTime, Utc};
use kernel::id::{DeviceSessionId, UserId};
use platform::client::ClientInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSession {
    pub session_id: DeviceSessionId,
    pub user_id: UserId,
    pub device_name: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    /// Monotonically non-decreasing
    pub last_used_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a new device session
#[derive(Debug, Clone)]
pub struct NewDeviceSession {
    pub user_id: UserId,
    pub device_name: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl NewDeviceSession {
    pub fn new(user_id: UserId, device_name: Option<String>, client: &ClientInfo) -> Self {
        Self {
            user_id,
            device_name,
            ip: client.ip_string(),
            user_agent: client.user_agent.clone(),
        }
    }
}

/// Session info for API responses (non-sensitive)
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: DeviceSessionId,
    pub device_name: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    /// Whether this is the device making the request
    pub is_current: bool,
}

impl SessionInfo {
    pub fn from_session(session: DeviceSession, current: DeviceSessionId) -> Self {
        Self {
            is_current: session.session_id == current,
            session_id: session.session_id,
            device_name: session.device_name,
            ip: session.ip,
            user_agent: session.user_agent,
            created_at: session.created_at,
            last_used_at: session.last_used_at,
        }
    }
}
