//! Login Code Value Object
//!
//! Short numeric one-time code sent to the user's inbox. Only its
//! [`SecretHash`] is ever stored.

use rand::Rng;

use super::secret::SecretHash;

/// Number of digits in a generated code
pub const LOGIN_CODE_DIGITS: usize = 6;

const LOGIN_CODE_SPACE: u32 = 1_000_000;

/// Plaintext login code
#[derive(Clone, PartialEq, Eq)]
pub struct LoginCode(String);

impl LoginCode {
    /// Generate a uniformly random 6-digit code (leading zeros kept)
    pub fn generate() -> Self {
        let value = rand::rng().random_range(0..LOGIN_CODE_SPACE);
        Self(format!("{:0width$}", value, width = LOGIN_CODE_DIGITS))
    }

    /// Wrap a code typed by the user
    ///
    /// No format check here: a malformed code is simply a wrong code and
    /// still counts against the challenge's attempt budget.
    pub fn from_input(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn hash(&self) -> SecretHash {
        SecretHash::of(&self.0)
    }
}

impl std::fmt::Debug for LoginCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LoginCode(******)")
    }
}
