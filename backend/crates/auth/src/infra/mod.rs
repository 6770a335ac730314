//! Infrastructure Layer
//!
//! Database implementations and external service integrations.

pub mod memory;
pub mod notifier;
pub mod postgres;

pub use memory::InMemorySessionStore;
pub use notifier::LogNotifier;
pub use postgres::PgSessionStore;
