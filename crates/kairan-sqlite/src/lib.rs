//! SQLite storage backend.
//!
//! Wraps a single `rusqlite` connection behind a mutex and implements
//! the [`CommunityStore`](kairan_core::CommunityStore) trait on top of
//! a versioned schema. Timestamps are stored as RFC 3339 text in UTC,
//! which keeps lexicographic and chronological order identical.

pub mod config;
pub mod connection;
pub mod error;
pub mod schema;
pub mod store;

pub use config::SqliteConfig;
pub use connection::SqlitePool;
pub use error::{SqliteError, SqliteResult};
pub use store::SqliteStore;
