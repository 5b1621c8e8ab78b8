//! SQLite-backed plan store
//!
//! Local implementation of [`PlanRemote`]: one snapshot row per client with
//! a millisecond-precision `updated_at` revision. Updates compare the
//! caller's expected revision with the stored one inside a transaction, so
//! two writers holding the same revision cannot both succeed.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info, warn};

use super::database::SharedDatabase;
use super::remote::{CreateOutcome, PlanRemote, RemotePlan, UpdateOutcome};
use crate::catalog::CatalogEntry;
use crate::plan::{new_id, PlanTree};

/// Plan and catalog persistence on a local database
#[derive(Clone)]
pub struct SqlitePlanStore {
    db: SharedDatabase,
}

impl SqlitePlanStore {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    /// Insert or replace a catalog entry
    pub fn upsert_catalog_entry(&self, entry: &CatalogEntry) -> Result<()> {
        let db = self.db.lock();
        db.conn().execute(
            "INSERT INTO exercise_catalog (catalog_id, name, motion, target_area)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(catalog_id) DO UPDATE SET
                name = excluded.name,
                motion = excluded.motion,
                target_area = excluded.target_area",
            params![entry.catalog_id, entry.name, entry.motion, entry.target_area],
        )?;
        Ok(())
    }

    /// All catalog entries ordered by name
    pub fn list_catalog(&self) -> Result<Vec<CatalogEntry>> {
        let db = self.db.lock();
        let mut stmt = db.conn().prepare(
            "SELECT catalog_id, name, motion, target_area
             FROM exercise_catalog
             ORDER BY name COLLATE NOCASE",
        )?;
        let entries = stmt
            .query_map([], |row| {
                Ok(CatalogEntry {
                    catalog_id: row.get(0)?,
                    name: row.get(1)?,
                    motion: row.get(2)?,
                    target_area: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Load a plan row by client
    fn load_plan(&self, client_id: &str) -> Result<Option<RemotePlan>> {
        let db = self.db.lock();
        let row: Option<(String, String, String)> = db
            .conn()
            .query_row(
                "SELECT id, tree, updated_at FROM plans WHERE client_id = ?1",
                [client_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((plan_id, tree_json, updated_at)) = row else {
            return Ok(None);
        };
        let mut tree: PlanTree = serde_json::from_str(&tree_json)?;
        tree.recompute();
        Ok(Some(RemotePlan {
            plan_id,
            updated_at: parse_revision(&updated_at)?,
            tree,
        }))
    }
}

/// Stored revision format; millisecond precision survives the round trip
fn format_revision(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_revision(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

/// Next revision: now at millisecond precision, strictly after `previous`
fn next_revision(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    let now = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
    match previous {
        Some(prev) if prev >= now => prev + Duration::milliseconds(1),
        _ => now,
    }
}

/// Server-side guard against persisting unresolved exercises
fn first_unresolved(tree: &PlanTree) -> Option<String> {
    tree.exercises()
        .find(|e| !e.is_resolved())
        .map(|e| format!("exercise '{}' has no catalog reference", e.description.trim()))
}

#[async_trait]
impl PlanRemote for SqlitePlanStore {
    async fn create_plan(&self, client_id: &str, tree: &PlanTree) -> Result<CreateOutcome> {
        if let Some(error) = first_unresolved(tree) {
            return Ok(CreateOutcome::Rejected { error });
        }

        let db = self.db.lock();
        let exists: Option<String> = db
            .conn()
            .query_row(
                "SELECT id FROM plans WHERE client_id = ?1",
                [client_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(plan_id) = exists {
            warn!(client_id, plan_id = %plan_id, "Create refused, client already has a plan");
            return Ok(CreateOutcome::Rejected {
                error: format!("client {} already has plan {}", client_id, plan_id),
            });
        }

        let plan_id = new_id();
        let updated_at = next_revision(None);
        let stamp = format_revision(updated_at);
        db.conn().execute(
            "INSERT INTO plans (id, client_id, tree, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![plan_id, client_id, serde_json::to_string(tree)?, stamp],
        )?;

        info!(client_id, plan_id = %plan_id, "Created plan");
        Ok(CreateOutcome::Created {
            plan_id,
            updated_at,
        })
    }

    async fn update_plan(
        &self,
        plan_id: &str,
        expected_updated_at: DateTime<Utc>,
        tree: &PlanTree,
    ) -> Result<UpdateOutcome> {
        if let Some(error) = first_unresolved(tree) {
            return Ok(UpdateOutcome::Rejected { error });
        }

        let mut db = self.db.lock();
        let tx = db.conn_mut().transaction()?;

        let stored: Option<String> = tx
            .query_row(
                "SELECT updated_at FROM plans WHERE id = ?1",
                [plan_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(stored) = stored else {
            return Ok(UpdateOutcome::Rejected {
                error: format!("plan {} not found", plan_id),
            });
        };
        let server_updated_at = parse_revision(&stored)?;

        if server_updated_at != expected_updated_at {
            debug!(
                plan_id,
                expected = %expected_updated_at,
                actual = %server_updated_at,
                "Revision mismatch"
            );
            return Ok(UpdateOutcome::Conflict {
                error: "plan was modified by another session".to_string(),
                server_updated_at,
            });
        }

        let updated_at = next_revision(Some(server_updated_at));
        tx.execute(
            "UPDATE plans SET tree = ?1, updated_at = ?2 WHERE id = ?3",
            params![serde_json::to_string(tree)?, format_revision(updated_at), plan_id],
        )?;
        tx.commit()?;

        debug!(plan_id, updated_at = %updated_at, "Updated plan");
        Ok(UpdateOutcome::Saved { updated_at })
    }

    async fn fetch_plan(&self, client_id: &str) -> Result<Option<RemotePlan>> {
        self.load_plan(client_id)
    }

    async fn fetch_exercise_catalog(&self) -> Result<Vec<CatalogEntry>> {
        self.list_catalog()
    }
}
