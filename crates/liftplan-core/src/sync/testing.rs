//! In-memory remote and fixtures for sync tests

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::catalog::{CatalogEntry, ExerciseCatalog};
use crate::plan::{new_id, ExercisePatch, PlanTree};
use crate::storage::{CreateOutcome, PlanRemote, RemotePlan, UpdateOutcome};

const EPOCH_MS: i64 = 1_700_000_000_000;

#[derive(Default)]
struct State {
    /// Keyed by client id
    plans: HashMap<String, RemotePlan>,
    catalog: Vec<CatalogEntry>,
    fail_next: Option<String>,
    fail_next_fetch: Option<String>,
    revisions: i64,
    writes: usize,
}

impl State {
    fn next_revision(&mut self) -> DateTime<Utc> {
        self.revisions += 1;
        DateTime::from_timestamp_millis(EPOCH_MS + self.revisions).unwrap_or_default()
    }

    fn take_failure(&mut self) -> Result<()> {
        match self.fail_next.take() {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }
}

/// Deterministic [`PlanRemote`] with failure injection
#[derive(Default)]
pub(crate) struct MemoryRemote {
    state: Mutex<State>,
}

impl MemoryRemote {
    pub fn with_catalog(entries: Vec<CatalogEntry>) -> Self {
        let remote = Self::default();
        remote.state.lock().catalog = entries;
        remote
    }

    /// Make the next call fail with a transport error
    pub fn fail_next(&self, message: &str) {
        self.state.lock().fail_next = Some(message.to_string());
    }

    /// Make the next `fetch_plan` fail, leaving other calls alone
    pub fn fail_next_fetch(&self, message: &str) {
        self.state.lock().fail_next_fetch = Some(message.to_string());
    }

    /// Simulate a write from another session; returns the new revision
    pub fn touch(&self, plan_id: &str) -> DateTime<Utc> {
        let mut state = self.state.lock();
        let revision = state.next_revision();
        if let Some(plan) = state.plans.values_mut().find(|p| p.plan_id == plan_id) {
            plan.updated_at = revision;
        }
        revision
    }

    /// Store a plan as if another session had created it
    pub fn seed(&self, client_id: &str, tree: PlanTree) -> RemotePlan {
        let mut state = self.state.lock();
        let plan = RemotePlan {
            plan_id: new_id(),
            updated_at: state.next_revision(),
            tree,
        };
        state.plans.insert(client_id.to_string(), plan.clone());
        plan
    }

    pub fn stored(&self, client_id: &str) -> Option<RemotePlan> {
        self.state.lock().plans.get(client_id).cloned()
    }

    /// Successful creates and updates so far
    pub fn writes(&self) -> usize {
        self.state.lock().writes
    }
}

#[async_trait]
impl PlanRemote for MemoryRemote {
    async fn create_plan(&self, client_id: &str, tree: &PlanTree) -> Result<CreateOutcome> {
        let mut state = self.state.lock();
        state.take_failure()?;
        if state.plans.contains_key(client_id) {
            return Ok(CreateOutcome::Rejected {
                error: "plan exists".to_string(),
            });
        }
        let plan = RemotePlan {
            plan_id: new_id(),
            updated_at: state.next_revision(),
            tree: tree.clone(),
        };
        let outcome = CreateOutcome::Created {
            plan_id: plan.plan_id.clone(),
            updated_at: plan.updated_at,
        };
        state.plans.insert(client_id.to_string(), plan);
        state.writes += 1;
        Ok(outcome)
    }

    async fn update_plan(
        &self,
        plan_id: &str,
        expected_updated_at: DateTime<Utc>,
        tree: &PlanTree,
    ) -> Result<UpdateOutcome> {
        let mut state = self.state.lock();
        state.take_failure()?;
        let revision = state.next_revision();
        let Some(plan) = state.plans.values_mut().find(|p| p.plan_id == plan_id) else {
            return Ok(UpdateOutcome::Rejected {
                error: "unknown plan".to_string(),
            });
        };
        if plan.updated_at != expected_updated_at {
            return Ok(UpdateOutcome::Conflict {
                error: "stale revision".to_string(),
                server_updated_at: plan.updated_at,
            });
        }
        plan.tree = tree.clone();
        plan.updated_at = revision;
        state.writes += 1;
        Ok(UpdateOutcome::Saved {
            updated_at: revision,
        })
    }

    async fn fetch_plan(&self, client_id: &str) -> Result<Option<RemotePlan>> {
        let mut state = self.state.lock();
        state.take_failure()?;
        if let Some(message) = state.fail_next_fetch.take() {
            return Err(anyhow!(message));
        }
        Ok(state.plans.get(client_id).cloned())
    }

    async fn fetch_exercise_catalog(&self) -> Result<Vec<CatalogEntry>> {
        let mut state = self.state.lock();
        state.take_failure()?;
        Ok(state.catalog.clone())
    }
}

pub(crate) fn catalog_entries() -> Vec<CatalogEntry> {
    ["Back Squat", "Bench Press", "Romanian Deadlift"]
        .iter()
        .enumerate()
        .map(|(i, name)| CatalogEntry {
            catalog_id: format!("c{}", i + 1),
            name: name.to_string(),
            motion: None,
            target_area: None,
        })
        .collect()
}

pub(crate) fn catalog() -> ExerciseCatalog {
    ExerciseCatalog::new(catalog_entries())
}

/// One active phase, one session, one resolved exercise
pub(crate) fn resolved_tree() -> PlanTree {
    let (tree, phase_id) = PlanTree::default().add_phase(Some("Base"));
    let tree = tree.toggle_activation(&phase_id).unwrap();
    let (tree, session_id) = tree.add_session(&phase_id, Some("Lower")).unwrap();
    let (tree, exercise_id) = tree.add_exercise(&session_id).unwrap();
    tree.update_exercise(
        &exercise_id,
        ExercisePatch {
            description: Some("Back Squat".to_string()),
            exercise_catalog_id: Some(Some("c1".to_string())),
            ..Default::default()
        },
    )
    .unwrap()
}
