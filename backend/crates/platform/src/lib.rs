//! Platform Crate - Technical Infrastructure
//!
//! This crate provides shared technical foundations:
//! - Cryptographic utilities (SHA-256, hex, secure random, constant-time compare)
//! - Cookie parsing and `Set-Cookie` building
//! - Client identification (IP, User-Agent, device label)
//! - Rate limiting infrastructure

pub mod client;
pub mod cookie;
pub mod crypto;
pub mod rate_limit;
