//! Local crash-recovery backup
//!
//! Mirrors the in-memory tree to a client-local database after every edit.
//! The backup is only ever read when the authoritative fetch came back empty,
//! and it never blocks the primary save path: every failure is logged and
//! swallowed here.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::database::SharedDatabase;
use crate::constants::backup::SCHEMA_VERSION;
use crate::plan::PlanTree;

/// Stored backup payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub phases: PlanTree,
    /// Epoch milliseconds
    pub timestamp: i64,
    pub version: String,
}

/// Best-effort backup store keyed by client id
#[derive(Clone)]
pub struct LocalBackupStore {
    db: SharedDatabase,
}

impl LocalBackupStore {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    /// Write the current tree for `client_id`
    pub fn write(&self, client_id: &str, tree: &PlanTree) {
        let record = BackupRecord {
            phases: tree.clone(),
            timestamp: Utc::now().timestamp_millis(),
            version: SCHEMA_VERSION.to_string(),
        };
        let result = (|| -> anyhow::Result<()> {
            let payload = serde_json::to_string(&record)?;
            self.db.lock().conn().execute(
                "INSERT INTO backups (client_id, payload, saved_at, version)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(client_id) DO UPDATE SET
                    payload = excluded.payload,
                    saved_at = excluded.saved_at,
                    version = excluded.version",
                params![client_id, payload, record.timestamp, record.version],
            )?;
            Ok(())
        })();

        match result {
            Ok(()) => debug!(client_id, "Backup written"),
            Err(e) => warn!(client_id, "Failed to write backup: {}", e),
        }
    }

    /// Read the raw record, if any
    pub fn read(&self, client_id: &str) -> Option<BackupRecord> {
        let result = (|| -> anyhow::Result<Option<BackupRecord>> {
            let payload: Option<String> = self
                .db
                .lock()
                .conn()
                .query_row(
                    "SELECT payload FROM backups WHERE client_id = ?1",
                    [client_id],
                    |row| row.get(0),
                )
                .optional()?;
            payload
                .map(|p| serde_json::from_str(&p))
                .transpose()
                .map_err(Into::into)
        })();

        match result {
            Ok(record) => record,
            Err(e) => {
                warn!(client_id, "Failed to read backup: {}", e);
                None
            }
        }
    }

    /// Drop the entry after a successful full save
    pub fn clear(&self, client_id: &str) {
        if let Err(e) = self
            .db
            .lock()
            .conn()
            .execute("DELETE FROM backups WHERE client_id = ?1", [client_id])
        {
            warn!(client_id, "Failed to clear backup: {}", e);
        }
    }

    /// Tree to restore after the authoritative fetch completed
    ///
    /// Returns `None` whenever the server produced data, the backup is
    /// missing, empty, or written by a different schema version.
    pub fn recover(&self, client_id: &str, server_tree: &PlanTree) -> Option<PlanTree> {
        if !server_tree.is_empty() {
            return None;
        }
        let record = self.read(client_id)?;
        if record.version != SCHEMA_VERSION {
            warn!(
                client_id,
                version = %record.version,
                "Ignoring backup with unknown schema version"
            );
            return None;
        }
        if record.phases.is_empty() {
            return None;
        }
        info!(
            client_id,
            phases = record.phases.phases.len(),
            "Recovered plan from local backup"
        );
        let mut tree = record.phases;
        tree.recompute();
        Some(tree)
    }
}
