//! Debounced save scheduling
//!
//! Pure state machine: every method takes the current time, nothing sleeps
//! or spawns. The worker task owns the clock and calls [`SaveScheduler::poll`]
//! when the deadline passes.
//!
//! Rules:
//! - each mutation (re)starts the debounce; the delay doubles while any row
//!   is being edited
//! - a deadline reached while editing, or while a save is in flight, is
//!   pushed back instead of firing
//! - ending an edit re-checks the queue after a short grace period
//! - a fired batch is held until the save finishes; on failure it goes back
//!   into the queue for a manual retry

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use super::error::{SyncError, SyncResult};
use crate::config::SyncConfig;
use crate::plan::EntityKind;

/// Queue key; one pending entry per entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityKey {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationAction {
    Added,
    Updated,
    Deleted,
}

/// Latest queued mutation for one entity
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    pub key: EntityKey,
    pub action: MutationAction,
    pub queued_at: Instant,
}

/// Who started the running save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOrigin {
    Manual,
    Background,
}

/// What the worker should do at `now`
#[derive(Debug, Clone, PartialEq)]
pub enum Poll {
    /// Nothing scheduled
    Idle,
    /// Deadline not reached yet
    Wait(Instant),
    /// Deadline reached but deferred to the new instant
    Rescheduled(Instant),
    /// Run a background save for this batch
    Fire(Vec<PendingMutation>),
}

#[derive(Debug)]
pub struct SaveScheduler {
    base_delay: Duration,
    backoff_factor: u32,
    grace: Duration,
    pending: HashMap<EntityKey, PendingMutation>,
    editing: HashSet<String>,
    deadline: Option<Instant>,
    in_flight: Option<SaveOrigin>,
    batch: Vec<PendingMutation>,
}

impl SaveScheduler {
    pub fn new(config: &SyncConfig) -> Self {
        let config = config.clone().normalized();
        Self {
            base_delay: config.base_delay(),
            backoff_factor: config.editing_backoff_factor,
            grace: config.editing_grace(),
            pending: HashMap::new(),
            editing: HashSet::new(),
            deadline: None,
            in_flight: None,
            batch: Vec::new(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn is_editing(&self) -> bool {
        !self.editing.is_empty()
    }

    pub fn in_flight(&self) -> Option<SaveOrigin> {
        self.in_flight
    }

    /// Debounce delay given the current editing state
    pub fn current_delay(&self) -> Duration {
        if self.is_editing() {
            self.base_delay.saturating_mul(self.backoff_factor)
        } else {
            self.base_delay
        }
    }

    /// Queue a mutation, replacing any earlier one for the same entity
    pub fn enqueue(&mut self, key: EntityKey, action: MutationAction, now: Instant) {
        let action = match self.pending.get(&key).map(|p| p.action) {
            // Added then edited is still an add; added then deleted is a delete
            Some(MutationAction::Added) if action == MutationAction::Updated => MutationAction::Added,
            _ => action,
        };
        self.pending.insert(
            key.clone(),
            PendingMutation {
                key,
                action,
                queued_at: now,
            },
        );
        self.schedule_auto_save(now);
    }

    /// (Re)start the debounce timer
    pub fn schedule_auto_save(&mut self, now: Instant) -> Instant {
        let deadline = later(now, self.current_delay());
        self.deadline = Some(deadline);
        deadline
    }

    /// Stop the debounce timer but keep everything queued
    pub fn hold(&mut self) {
        self.deadline = None;
    }

    pub fn on_editing_start(&mut self, id: &str, now: Instant) {
        self.editing.insert(id.to_string());
        if self.deadline.is_some() {
            self.schedule_auto_save(now);
        }
    }

    pub fn on_editing_end(&mut self, id: &str, now: Instant) {
        self.editing.remove(id);
        if self.pending.is_empty() {
            return;
        }
        if self.is_editing() {
            self.schedule_auto_save(now);
        } else {
            self.deadline = Some(later(now, self.grace));
        }
    }

    pub fn poll(&mut self, now: Instant) -> Poll {
        let Some(deadline) = self.deadline else {
            return Poll::Idle;
        };
        if now < deadline {
            return Poll::Wait(deadline);
        }
        if self.pending.is_empty() {
            self.deadline = None;
            return Poll::Idle;
        }
        if self.is_editing() || self.in_flight.is_some() {
            let next = self.schedule_auto_save(now);
            debug!(
                editing = self.editing.len(),
                in_flight = self.in_flight.is_some(),
                "Background save deferred"
            );
            return Poll::Rescheduled(next);
        }

        self.deadline = None;
        self.in_flight = Some(SaveOrigin::Background);
        Poll::Fire(self.take_batch())
    }

    /// Claim the in-flight slot for a manual save
    pub fn begin_manual(&mut self) -> SyncResult<Vec<PendingMutation>> {
        if self.in_flight.is_some() {
            return Err(SyncError::SaveInFlight);
        }
        self.deadline = None;
        self.in_flight = Some(SaveOrigin::Manual);
        Ok(self.take_batch())
    }

    /// Release the in-flight slot
    ///
    /// A failed batch is merged back without overwriting mutations queued
    /// while the save was running; no retry is scheduled for it.
    pub fn finish(&mut self, success: bool) {
        self.in_flight = None;
        let batch = std::mem::take(&mut self.batch);
        if success {
            return;
        }
        for mutation in batch {
            self.pending.entry(mutation.key.clone()).or_insert(mutation);
        }
    }

    /// Drop everything queued, e.g. after a reload replaced the tree
    pub fn clear(&mut self) {
        self.pending.clear();
        self.batch.clear();
        self.deadline = None;
    }

    fn take_batch(&mut self) -> Vec<PendingMutation> {
        let mut batch: Vec<PendingMutation> = self.pending.drain().map(|(_, m)| m).collect();
        batch.sort_by(|a, b| a.queued_at.cmp(&b.queued_at).then_with(|| a.key.cmp(&b.key)));
        self.batch = batch.clone();
        batch
    }
}

fn later(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay)
        .unwrap_or_else(|| now + crate::constants::sync::MAX_SAVE_DELAY)
}
