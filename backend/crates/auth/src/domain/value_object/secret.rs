//! Secret Value Objects
//!
//! [`RefreshSecret`] is the high-entropy bearer credential stored in the
//! client's cookie; impersonation grant tokens share its shape.
//! [`SecretHash`] is the only form any secret (refresh secret, grant token
//! or login code) takes at rest.

use platform::crypto::{constant_time_eq, random_hex, sha256_hex};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Random bytes per refresh secret (256 bits)
pub const REFRESH_SECRET_BYTES: usize = 32;

/// Plaintext refresh secret; wiped from memory on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct RefreshSecret(String);

impl RefreshSecret {
    pub fn generate() -> Self {
        Self(random_hex(REFRESH_SECRET_BYTES))
    }

    /// Wrap a secret presented by a client
    pub fn from_presented(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Plaintext, for the Set-Cookie header or a one-time link only
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn hash(&self) -> SecretHash {
        SecretHash::of(&self.0)
    }
}

impl std::fmt::Debug for RefreshSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RefreshSecret(***)")
    }
}

/// Hex SHA-256 digest of a secret
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretHash(String);

impl SecretHash {
    pub fn of(plaintext: &str) -> Self {
        Self(sha256_hex(plaintext.as_bytes()))
    }

    /// Create from database value
    pub fn from_db(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison
    pub fn matches(&self, other: &SecretHash) -> bool {
        constant_time_eq(self.0.as_bytes(), other.0.as_bytes())
    }
}
