//! ChallengeId Value Object
//!
//! Opaque, unguessable identifier handed to the client when a login code
//! is issued. The client echoes it back alongside the code.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChallengeId(Uuid);

impl ChallengeId {
    /// Fresh random (v4) id
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[inline]
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Parse a client-supplied id
    ///
    /// Malformed input is reported the same way as an unknown id.
    pub fn parse_str(s: &str) -> AuthResult<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| AuthError::ChallengeNotFound)
    }

    #[inline]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ChallengeId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ChallengeId {
    type Err = AuthError;

    fn from_str(s: &str) -> AuthResult<Self> {
        ChallengeId::parse_str(s)
    }
}

impl std::fmt::Display for ChallengeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
