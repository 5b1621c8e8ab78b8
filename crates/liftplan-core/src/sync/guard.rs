//! Optimistic concurrency for plan saves
//!
//! The guard remembers which plan this editor is bound to and the server
//! revision it last observed. Every update sends that revision as the
//! expected version; a mismatch surfaces as [`SyncError::Conflict`] and is
//! never retried or merged here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::error::{SyncError, SyncResult};
use crate::plan::PlanTree;
use crate::storage::{CreateOutcome, PlanRemote, RemotePlan, UpdateOutcome};

/// Outcome of a successful save
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveReceipt {
    pub plan_id: String,
    pub updated_at: DateTime<Utc>,
    /// The save created the plan
    pub created: bool,
}

pub struct ConcurrencyGuard {
    remote: Arc<dyn PlanRemote>,
    plan_id: Option<String>,
    last_known_updated_at: Option<DateTime<Utc>>,
}

impl ConcurrencyGuard {
    pub fn new(remote: Arc<dyn PlanRemote>) -> Self {
        Self {
            remote,
            plan_id: None,
            last_known_updated_at: None,
        }
    }

    pub fn remote(&self) -> &Arc<dyn PlanRemote> {
        &self.remote
    }

    pub fn plan_id(&self) -> Option<&str> {
        self.plan_id.as_deref()
    }

    pub fn last_known_updated_at(&self) -> Option<DateTime<Utc>> {
        self.last_known_updated_at
    }

    /// Bind to a plan revision observed elsewhere (initial fetch, reload)
    pub fn adopt(&mut self, plan_id: impl Into<String>, updated_at: DateTime<Utc>) {
        self.plan_id = Some(plan_id.into());
        self.last_known_updated_at = Some(updated_at);
    }

    /// Forget the bound plan; the next save creates one
    pub fn clear(&mut self) {
        self.plan_id = None;
        self.last_known_updated_at = None;
    }

    /// Persist the full tree, creating the plan on first save
    pub async fn save(&mut self, client_id: &str, tree: &PlanTree) -> SyncResult<SaveReceipt> {
        let Some(plan_id) = self.plan_id.clone() else {
            return self.create(client_id, tree).await;
        };
        let Some(expected) = self.last_known_updated_at else {
            return Err(SyncError::Transport(format!(
                "plan {} has no known revision",
                plan_id
            )));
        };

        match self.remote.update_plan(&plan_id, expected, tree).await? {
            UpdateOutcome::Saved { updated_at } => {
                debug!(plan_id = %plan_id, updated_at = %updated_at, "Plan saved");
                self.last_known_updated_at = Some(updated_at);
                Ok(SaveReceipt {
                    plan_id,
                    updated_at,
                    created: false,
                })
            }
            UpdateOutcome::Conflict {
                error,
                server_updated_at,
            } => {
                warn!(
                    plan_id = %plan_id,
                    expected = %expected,
                    server = %server_updated_at,
                    "Save conflict"
                );
                Err(SyncError::Conflict {
                    message: error,
                    server_time: server_updated_at,
                })
            }
            UpdateOutcome::Rejected { error } => Err(SyncError::Transport(error)),
        }
    }

    async fn create(&mut self, client_id: &str, tree: &PlanTree) -> SyncResult<SaveReceipt> {
        match self.remote.create_plan(client_id, tree).await? {
            CreateOutcome::Created {
                plan_id,
                updated_at,
            } => {
                info!(client_id, plan_id = %plan_id, "Plan created");
                self.adopt(plan_id.clone(), updated_at);
                Ok(SaveReceipt {
                    plan_id,
                    updated_at,
                    created: true,
                })
            }
            CreateOutcome::Rejected { error } => Err(SyncError::Transport(error)),
        }
    }

    /// Load authoritative state and adopt its identity
    pub async fn refetch(&mut self, client_id: &str) -> SyncResult<Option<RemotePlan>> {
        let plan = self.remote.fetch_plan(client_id).await?;
        match &plan {
            Some(plan) => self.adopt(plan.plan_id.clone(), plan.updated_at),
            None => self.clear(),
        }
        Ok(plan)
    }
}
