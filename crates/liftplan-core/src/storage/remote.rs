//! Persistence collaborator contract
//!
//! The engine never talks to a database directly. Everything it needs from
//! the authoritative store goes through [`PlanRemote`]. Business outcomes
//! (created, saved, conflict, rejected) are values; `Err` is reserved for
//! transport failures such as a dropped connection or a timeout.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogEntry;
use crate::plan::PlanTree;

/// Result of creating a plan for a client with none yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CreateOutcome {
    Created {
        plan_id: String,
        updated_at: DateTime<Utc>,
    },
    Rejected {
        error: String,
    },
}

/// Result of an optimistic-concurrency update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UpdateOutcome {
    Saved {
        updated_at: DateTime<Utc>,
    },
    /// The stored revision differs from the expected one
    Conflict {
        error: String,
        server_updated_at: DateTime<Utc>,
    },
    Rejected {
        error: String,
    },
}

/// Authoritative plan state for a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePlan {
    pub plan_id: String,
    pub updated_at: DateTime<Utc>,
    pub tree: PlanTree,
}

/// Server-side plan persistence
#[async_trait]
pub trait PlanRemote: Send + Sync {
    /// Create the first plan for `client_id`
    async fn create_plan(&self, client_id: &str, tree: &PlanTree) -> Result<CreateOutcome>;

    /// Replace the stored tree if its revision still equals `expected_updated_at`
    async fn update_plan(
        &self,
        plan_id: &str,
        expected_updated_at: DateTime<Utc>,
        tree: &PlanTree,
    ) -> Result<UpdateOutcome>;

    /// Current plan for `client_id`, if any
    async fn fetch_plan(&self, client_id: &str) -> Result<Option<RemotePlan>>;

    /// Shared exercise catalog
    async fn fetch_exercise_catalog(&self) -> Result<Vec<CatalogEntry>>;
}
