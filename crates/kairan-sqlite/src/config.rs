//! SQLite backend configuration

use std::path::PathBuf;

/// Settings for opening the database.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file path, or `:memory:` for an in-memory database.
    pub path: PathBuf,
    /// WAL journal mode for better read concurrency.
    pub wal_mode: bool,
    /// Enforce foreign keys (cascading deletes depend on this).
    pub foreign_keys: bool,
    /// How long a writer waits on a locked database.
    pub busy_timeout_ms: u32,
}

impl SqliteConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            wal_mode: true,
            foreign_keys: true,
            busy_timeout_ms: 5_000,
        }
    }

    /// In-memory database for tests.
    pub fn memory() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            // WAL is meaningless in memory
            wal_mode: false,
            foreign_keys: true,
            busy_timeout_ms: 5_000,
        }
    }
}
