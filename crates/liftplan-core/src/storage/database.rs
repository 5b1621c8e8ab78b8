//! SQLite database wrapper with versioned migrations

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::info;

/// Current schema version
const SCHEMA_VERSION: i32 = 2;

/// SQLite database wrapper
pub struct Database {
    conn: Connection,
}

/// Database shared between async tasks
///
/// Statements are short, so a blocking mutex held across a single call is
/// enough; it is never held across an `.await`.
pub type SharedDatabase = Arc<Mutex<Database>>;

impl Database {
    /// Create a new database at the given path
    pub fn new(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL keeps the CLI and a long-running editor from blocking each other
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        // Set busy timeout to avoid immediate failures on lock contention
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let db = Self { conn };
        db.run_migrations()?;
        Ok(db)
    }

    /// Wrap for sharing across tasks
    pub fn shared(self) -> SharedDatabase {
        Arc::new(Mutex::new(self))
    }

    /// Get the underlying connection
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Mutable connection, needed for transactions
    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Get the current schema version from database
    pub(crate) fn get_schema_version(&self) -> i32 {
        // Create version table if it doesn't exist
        if let Err(e) = self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        ) {
            tracing::warn!("Failed to create schema_version table: {}", e);
            return 0;
        }

        self.conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0)
    }

    /// Set schema version after successful migration
    fn set_schema_version(&self, version: i32) -> Result<()> {
        self.conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
        Ok(())
    }

    /// Run database migrations incrementally
    pub(crate) fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version();
        info!(
            "Database schema version: {} (target: {})",
            current_version, SCHEMA_VERSION
        );

        if current_version >= SCHEMA_VERSION {
            return Ok(());
        }

        // Migration 1: Plans and exercise catalog
        if current_version < 1 {
            info!("Running migration 1: Plans and exercise catalog");
            self.conn.execute_batch(
                r#"
                -- One plan per client; the whole tree is stored as a snapshot
                CREATE TABLE IF NOT EXISTS plans (
                    id TEXT PRIMARY KEY,
                    client_id TEXT NOT NULL UNIQUE,
                    tree TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS exercise_catalog (
                    catalog_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    motion TEXT,
                    target_area TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_exercise_catalog_name
                    ON exercise_catalog(name COLLATE NOCASE);
                "#,
            )?;
            self.set_schema_version(1)?;
        }

        // Migration 2: Crash-recovery backups
        if current_version < 2 {
            info!("Running migration 2: Crash-recovery backups");
            self.conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS backups (
                    client_id TEXT PRIMARY KEY,
                    payload TEXT NOT NULL,
                    saved_at INTEGER NOT NULL,
                    version TEXT NOT NULL
                );
                "#,
            )?;
            self.set_schema_version(2)?;
        }

        info!("Migrations complete");
        Ok(())
    }
}
