//! Entity Module

pub mod device_session;
pub mod impersonation_grant;
pub mod login_challenge;
pub mod refresh_token;
pub mod user;

pub use device_session::{DeviceSession, NewDeviceSession, SessionInfo};
pub use impersonation_grant::{ImpersonationGrant, NewImpersonationGrant};
pub use login_challenge::LoginChallenge;
pub use refresh_token::{IssuedToken, NewRefreshToken, RefreshToken};
pub use user::{NewUser, User};
