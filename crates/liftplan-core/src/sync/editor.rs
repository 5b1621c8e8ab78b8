//! Plan editor
//!
//! Owns one client's tree together with its change tracker, concurrency
//! guard, save scheduler and backup store. Every mutation goes through
//! [`PlanEditor::apply`], which swaps in the new tree, records it with the
//! tracker, mirrors it to the backup and queues it for a background save.
//!
//! Saves always send the full tree. A save only runs when the tracker reports
//! changes or mutations are queued; the change set is returned in the
//! [`SaveReport`].
//!
//! A conflict freezes the editor: local edits stay visible, but edits and
//! saves are refused until [`PlanEditor::reload_from_server`] replaces them
//! with server state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::error::{SyncError, SyncResult};
use super::guard::{ConcurrencyGuard, SaveReceipt};
use super::scheduler::{EntityKey, MutationAction, PendingMutation, Poll, SaveScheduler};
use super::tracker::{ChangeSet, ChangeTracker};
use super::validate::validate;
use crate::catalog::ExerciseCatalog;
use crate::config::SyncConfig;
use crate::plan::{EntityKind, ExercisePatch, PhasePatch, PlanTree, SessionPatch};
use crate::storage::{LocalBackupStore, PlanRemote};

/// Save state shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    /// Nothing edited since load
    Idle,
    /// A row is being edited
    Editing,
    /// Changes waiting for the debounce
    Queued,
    Saving,
    Saved,
    /// Server has a newer revision; edits are held until a reload
    Conflict,
}

impl std::fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SaveStatus::Idle => "idle",
            SaveStatus::Editing => "editing",
            SaveStatus::Queued => "queued",
            SaveStatus::Saving => "saving",
            SaveStatus::Saved => "saved",
            SaveStatus::Conflict => "conflict",
        };
        f.write_str(label)
    }
}

/// Conflict details for the user notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictInfo {
    pub message: String,
    pub server_time: DateTime<Utc>,
}

/// A user-level mutation
#[derive(Debug, Clone, PartialEq)]
pub enum PlanEdit {
    AddPhase { name: Option<String> },
    AddSession { phase_id: String, name: Option<String> },
    AddExercise { session_id: String },
    UpdatePhase { phase_id: String, patch: PhasePatch },
    UpdateSession { session_id: String, patch: SessionPatch },
    UpdateExercise { exercise_id: String, patch: ExercisePatch },
    /// Inline description edit, resolved against the catalog
    SetDescription { exercise_id: String, description: String },
    SetExpanded { kind: EntityKind, id: String, expanded: bool },
    DeletePhase { phase_id: String },
    DeleteSession { session_id: String },
    DeleteExercise { exercise_id: String },
    DuplicatePhase { phase_id: String },
    DuplicateSession { session_id: String },
    ToggleActivation { phase_id: String },
    /// Swap in a whole tree, e.g. from a CSV import
    ReplaceTree { tree: PlanTree },
}

/// Result of a save attempt that did not fail
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveReport {
    /// `None` when there was nothing to save
    pub receipt: Option<SaveReceipt>,
    pub changes: ChangeSet,
    /// Queued mutations covered by this save
    pub mutations: usize,
}

/// Result of the initial load
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub plan_id: Option<String>,
    /// The tree came from the local backup
    pub recovered: bool,
    pub phases: usize,
    pub catalog_entries: usize,
}

pub struct PlanEditor {
    client_id: String,
    tree: PlanTree,
    tracker: ChangeTracker,
    guard: ConcurrencyGuard,
    scheduler: SaveScheduler,
    catalog: ExerciseCatalog,
    backup: Option<LocalBackupStore>,
    status: watch::Sender<SaveStatus>,
    conflict: Option<ConflictInfo>,
    /// Conflict seen; local edits are kept until the server state is reloaded
    reload_required: bool,
    /// Active phase before an unsaved activation toggle
    activation_revert: Option<Option<String>>,
}

impl PlanEditor {
    pub fn new(client_id: impl Into<String>, remote: Arc<dyn PlanRemote>, config: &SyncConfig) -> Self {
        let (status, _) = watch::channel(SaveStatus::Idle);
        Self {
            client_id: client_id.into(),
            tree: PlanTree::default(),
            tracker: ChangeTracker::default(),
            guard: ConcurrencyGuard::new(remote),
            scheduler: SaveScheduler::new(config),
            catalog: ExerciseCatalog::default(),
            backup: None,
            status,
            conflict: None,
            reload_required: false,
            activation_revert: None,
        }
    }

    /// Mirror every edit into `backup`
    pub fn with_backup(mut self, backup: LocalBackupStore) -> Self {
        self.backup = Some(backup);
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn tree(&self) -> &PlanTree {
        &self.tree
    }

    pub fn catalog(&self) -> &ExerciseCatalog {
        &self.catalog
    }

    pub fn plan_id(&self) -> Option<&str> {
        self.guard.plan_id()
    }

    pub fn status(&self) -> SaveStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.status.subscribe()
    }

    pub fn conflict(&self) -> Option<&ConflictInfo> {
        self.conflict.as_ref()
    }

    pub fn change_set(&self) -> ChangeSet {
        self.tracker.change_set()
    }

    pub fn has_pending(&self) -> bool {
        self.scheduler.has_pending()
    }

    /// When the worker should next poll the scheduler
    ///
    /// Always `None` while a conflict waits for a reload.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.reload_required {
            return None;
        }
        self.scheduler.deadline()
    }

    /// A conflict is waiting for [`PlanEditor::reload_from_server`]
    pub fn reload_required(&self) -> bool {
        self.reload_required
    }

    fn publish(&self, status: SaveStatus) {
        self.status.send_replace(status);
    }

    /// Status reflecting the queue after an edit or a finished save
    fn settle_status(&self, otherwise: SaveStatus) {
        let status = if self.scheduler.is_editing() {
            SaveStatus::Editing
        } else if self.scheduler.has_pending() {
            SaveStatus::Queued
        } else {
            otherwise
        };
        self.publish(status);
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Fetch catalog and plan; fall back to the local backup when the server
    /// has nothing for this client
    pub async fn load(&mut self) -> SyncResult<LoadReport> {
        let entries = self.guard.remote().fetch_exercise_catalog().await?;
        self.catalog = ExerciseCatalog::new(entries);
        self.adopt_server_state().await?;

        let recovered = self
            .backup
            .as_ref()
            .and_then(|backup| backup.recover(&self.client_id, &self.tree));
        let was_recovered = recovered.is_some();
        match recovered {
            Some(tree) => {
                let keys = phase_keys(&tree, MutationAction::Added);
                self.replace_tree(tree, keys);
                self.publish(SaveStatus::Queued);
            }
            None => self.publish(SaveStatus::Idle),
        }

        info!(
            client_id = %self.client_id,
            plan_id = ?self.guard.plan_id(),
            phases = self.tree.phases.len(),
            recovered = was_recovered,
            "Plan loaded"
        );
        Ok(LoadReport {
            plan_id: self.guard.plan_id().map(str::to_string),
            recovered: was_recovered,
            phases: self.tree.phases.len(),
            catalog_entries: self.catalog.len(),
        })
    }

    /// Replace tree and baseline with server truth, discarding local edits
    ///
    /// This is the only way out of a conflict. The backup is cleared too, so
    /// the discarded edits cannot come back through recovery.
    pub async fn reload_from_server(&mut self) -> SyncResult<()> {
        self.adopt_server_state().await?;
        if let Some(backup) = &self.backup {
            backup.clear(&self.client_id);
        }
        info!(
            client_id = %self.client_id,
            plan_id = ?self.guard.plan_id(),
            "Reloaded plan from server"
        );
        self.publish(SaveStatus::Idle);
        Ok(())
    }

    async fn adopt_server_state(&mut self) -> SyncResult<()> {
        let plan = self.guard.refetch(&self.client_id).await?;
        let tree = plan.map(|p| p.tree).unwrap_or_default();
        self.tracker.reset(&tree);
        self.tree = tree;
        self.scheduler.clear();
        self.activation_revert = None;
        self.conflict = None;
        self.reload_required = false;
        Ok(())
    }

    // =========================================================================
    // Editing
    // =========================================================================

    /// Apply a mutation; returns the id of a created entity, if any
    ///
    /// Refused with [`SyncError::ConflictPending`] until a conflict is reloaded.
    pub fn apply(&mut self, edit: PlanEdit) -> SyncResult<Option<String>> {
        if self.reload_required {
            return Err(SyncError::ConflictPending);
        }
        let toggles = matches!(edit, PlanEdit::ToggleActivation { .. });
        let previous_active = self.tree.active_phase().map(|p| p.id.clone());
        let (tree, created, keys) = self.evaluate(edit)?;

        // Remember the first unsaved toggle so a failed save can undo it
        if toggles && self.activation_revert.is_none() {
            self.activation_revert = Some(previous_active);
        }

        self.replace_tree(tree, keys);
        self.settle_status(self.status());
        Ok(created)
    }

    fn evaluate(&self, edit: PlanEdit) -> SyncResult<(PlanTree, Option<String>, Vec<(EntityKey, MutationAction)>)> {
        use MutationAction::*;
        let key = EntityKey::new;

        let result = match edit {
            PlanEdit::AddPhase { name } => {
                let (tree, id) = self.tree.add_phase(name.as_deref());
                (tree, Some(id.clone()), vec![(key(EntityKind::Phase, id), Added)])
            }
            PlanEdit::AddSession { phase_id, name } => {
                let (tree, id) = self.tree.add_session(&phase_id, name.as_deref())?;
                (tree, Some(id.clone()), vec![(key(EntityKind::Session, id), Added)])
            }
            PlanEdit::AddExercise { session_id } => {
                let (tree, id) = self.tree.add_exercise(&session_id)?;
                (tree, Some(id.clone()), vec![(key(EntityKind::Exercise, id), Added)])
            }
            PlanEdit::UpdatePhase { phase_id, patch } => {
                let tree = self.tree.update_phase(&phase_id, patch)?;
                (tree, None, vec![(key(EntityKind::Phase, phase_id), Updated)])
            }
            PlanEdit::UpdateSession { session_id, patch } => {
                let tree = self.tree.update_session(&session_id, patch)?;
                (tree, None, vec![(key(EntityKind::Session, session_id), Updated)])
            }
            PlanEdit::UpdateExercise { exercise_id, patch } => {
                let tree = self.tree.update_exercise(&exercise_id, patch)?;
                (tree, None, vec![(key(EntityKind::Exercise, exercise_id), Updated)])
            }
            PlanEdit::SetDescription {
                exercise_id,
                description,
            } => {
                let entry = self.catalog.require(&description)?;
                let patch = ExercisePatch {
                    description: Some(description.trim().to_string()),
                    exercise_catalog_id: Some(Some(entry.catalog_id.clone())),
                    motion: entry.motion.clone().map(Some),
                    target_area: entry.target_area.clone().map(Some),
                    ..Default::default()
                };
                let tree = self.tree.update_exercise(&exercise_id, patch)?;
                (tree, None, vec![(key(EntityKind::Exercise, exercise_id), Updated)])
            }
            PlanEdit::SetExpanded { kind, id, expanded } => {
                (self.tree.set_expanded(kind, &id, expanded)?, None, Vec::new())
            }
            PlanEdit::DeletePhase { phase_id } => {
                let tree = self.tree.delete_phase(&phase_id)?;
                (tree, None, vec![(key(EntityKind::Phase, phase_id), Deleted)])
            }
            PlanEdit::DeleteSession { session_id } => {
                let tree = self.tree.delete_session(&session_id)?;
                (tree, None, vec![(key(EntityKind::Session, session_id), Deleted)])
            }
            PlanEdit::DeleteExercise { exercise_id } => {
                let tree = self.tree.delete_exercise(&exercise_id)?;
                (tree, None, vec![(key(EntityKind::Exercise, exercise_id), Deleted)])
            }
            PlanEdit::DuplicatePhase { phase_id } => {
                let (tree, id) = self.tree.duplicate_phase(&phase_id)?;
                (tree, Some(id.clone()), vec![(key(EntityKind::Phase, id), Added)])
            }
            PlanEdit::DuplicateSession { session_id } => {
                let (tree, id) = self.tree.duplicate_session(&session_id)?;
                (tree, Some(id.clone()), vec![(key(EntityKind::Session, id), Added)])
            }
            PlanEdit::ToggleActivation { phase_id } => {
                let tree = self.tree.toggle_activation(&phase_id)?;
                let keys = phase_keys(&tree, Updated);
                (tree, None, keys)
            }
            PlanEdit::ReplaceTree { tree } => {
                let mut tree = tree;
                tree.recompute();
                let keys = phase_keys(&tree, Updated);
                (tree, None, keys)
            }
        };
        Ok(result)
    }

    fn replace_tree(&mut self, tree: PlanTree, keys: Vec<(EntityKey, MutationAction)>) {
        self.tree = tree;
        self.tracker.update_current_state(&self.tree);
        if let Some(backup) = &self.backup {
            backup.write(&self.client_id, &self.tree);
        }
        let now = Instant::now();
        for (key, action) in keys {
            self.scheduler.enqueue(key, action, now);
        }
    }

    pub fn editing_started(&mut self, id: &str) {
        self.scheduler.on_editing_start(id, Instant::now());
        if self.reload_required {
            self.scheduler.hold();
            return;
        }
        self.publish(SaveStatus::Editing);
    }

    pub fn editing_ended(&mut self, id: &str) {
        self.scheduler.on_editing_end(id, Instant::now());
        if self.reload_required {
            self.scheduler.hold();
            return;
        }
        self.settle_status(match self.status() {
            SaveStatus::Editing => SaveStatus::Idle,
            other => other,
        });
    }

    // =========================================================================
    // Saving
    // =========================================================================

    /// Manual save: validate, then persist immediately
    pub async fn save(&mut self) -> SyncResult<SaveReport> {
        if self.reload_required {
            return Err(SyncError::ConflictPending);
        }
        if self.scheduler.in_flight().is_some() {
            return Err(SyncError::SaveInFlight);
        }
        validate(&self.tree)?;
        let batch = self.scheduler.begin_manual()?;
        self.run_save(batch).await
    }

    /// Run a background save if the debounce deadline has passed
    ///
    /// Returns `None` when nothing was attempted.
    pub async fn flush_due(&mut self) -> Option<SyncResult<SaveReport>> {
        if self.reload_required {
            self.scheduler.hold();
            return None;
        }
        match self.scheduler.poll(Instant::now()) {
            Poll::Idle | Poll::Wait(_) => None,
            Poll::Rescheduled(at) => {
                debug!(client_id = %self.client_id, ?at, "Background save rescheduled");
                None
            }
            Poll::Fire(batch) => {
                if let Err(err) = validate(&self.tree) {
                    warn!(client_id = %self.client_id, "Background save skipped: {}", err);
                    self.scheduler.finish(false);
                    self.publish(SaveStatus::Queued);
                    return Some(Err(err.into()));
                }
                Some(self.run_save(batch).await)
            }
        }
    }

    async fn run_save(&mut self, batch: Vec<PendingMutation>) -> SyncResult<SaveReport> {
        let changes = self.tracker.change_set();
        let mutations = batch.len();
        // Untracked edits (e.g. description text) still arrive as queued mutations
        if changes.is_empty() && batch.is_empty() {
            self.scheduler.finish(true);
            self.settle_status(self.status());
            return Ok(SaveReport {
                receipt: None,
                changes,
                mutations,
            });
        }

        self.publish(SaveStatus::Saving);
        debug!(
            client_id = %self.client_id,
            changed = changes.len(),
            mutations,
            "Saving plan"
        );

        match self.guard.save(&self.client_id, &self.tree).await {
            Ok(receipt) => {
                self.scheduler.finish(true);
                self.tracker.reset(&self.tree);
                self.activation_revert = None;
                if let Some(backup) = &self.backup {
                    backup.clear(&self.client_id);
                }
                self.settle_status(SaveStatus::Saved);
                Ok(SaveReport {
                    receipt: Some(receipt),
                    changes,
                    mutations,
                })
            }
            Err(SyncError::Conflict {
                message,
                server_time,
            }) => {
                self.scheduler.finish(false);
                self.handle_conflict(message.clone(), server_time);
                Err(SyncError::Conflict {
                    message,
                    server_time,
                })
            }
            Err(err) => {
                warn!(client_id = %self.client_id, "Save failed: {}", err);
                self.scheduler.finish(false);
                self.revert_activation();
                self.settle_status(SaveStatus::Queued);
                Err(err)
            }
        }
    }

    /// Block edits and saves until the caller reloads server state
    fn handle_conflict(&mut self, message: String, server_time: DateTime<Utc>) {
        warn!(
            client_id = %self.client_id,
            server_time = %server_time,
            pending = self.scheduler.pending_len(),
            "Save conflict, waiting for reload"
        );
        self.conflict = Some(ConflictInfo {
            message,
            server_time,
        });
        self.reload_required = true;
        self.scheduler.hold();
        self.publish(SaveStatus::Conflict);
    }

    fn revert_activation(&mut self) {
        let Some(previous) = self.activation_revert.take() else {
            return;
        };
        let mut tree = self.tree.clone();
        for phase in &mut tree.phases {
            phase.is_active = previous.as_deref() == Some(phase.id.as_str());
        }
        debug!(client_id = %self.client_id, ?previous, "Reverted phase activation");
        self.tree = tree;
        self.tracker.update_current_state(&self.tree);
        if let Some(backup) = &self.backup {
            backup.write(&self.client_id, &self.tree);
        }
    }
}

fn phase_keys(tree: &PlanTree, action: MutationAction) -> Vec<(EntityKey, MutationAction)> {
    tree.phases
        .iter()
        .map(|p| (EntityKey::new(EntityKind::Phase, p.id.clone()), action))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use crate::sync::testing::{catalog_entries, resolved_tree, MemoryRemote};
    use tempfile::TempDir;

    const CLIENT: &str = "client-1";

    async fn loaded(remote: Arc<MemoryRemote>) -> PlanEditor {
        let mut editor = PlanEditor::new(CLIENT, remote, &SyncConfig::default());
        editor.load().await.unwrap();
        editor
    }

    fn remote() -> Arc<MemoryRemote> {
        Arc::new(MemoryRemote::with_catalog(catalog_entries()))
    }

    fn first_exercise(editor: &PlanEditor) -> String {
        editor.tree().exercises().next().unwrap().id.clone()
    }

    #[tokio::test]
    async fn test_inline_description_resolves_through_catalog() {
        let remote = remote();
        remote.seed(CLIENT, resolved_tree());
        let mut editor = loaded(remote).await;
        let exercise_id = first_exercise(&editor);

        editor
            .apply(PlanEdit::SetDescription {
                exercise_id: exercise_id.clone(),
                description: "bench press".to_string(),
            })
            .unwrap();
        let exercise = editor.tree().find_exercise(&exercise_id).unwrap();
        assert_eq!(exercise.exercise_catalog_id.as_deref(), Some("c2"));
        assert_eq!(editor.status(), SaveStatus::Queued);

        let err = editor
            .apply(PlanEdit::SetDescription {
                exercise_id: exercise_id.clone(),
                description: "Nordic Curl".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::Resolution(_)));
        // Edit dropped
        let exercise = editor.tree().find_exercise(&exercise_id).unwrap();
        assert_eq!(exercise.description, "bench press");
    }

    #[tokio::test]
    async fn test_manual_save_creates_then_updates() {
        let remote = remote();
        let mut editor = loaded(remote.clone()).await;
        assert_eq!(editor.status(), SaveStatus::Idle);

        editor
            .apply(PlanEdit::ReplaceTree { tree: resolved_tree() })
            .unwrap();
        let report = editor.save().await.unwrap();
        assert!(report.receipt.as_ref().unwrap().created);
        assert_eq!(report.changes.phases.added.len(), 1);
        assert_eq!(editor.status(), SaveStatus::Saved);
        assert!(!editor.has_pending());
        assert!(editor.change_set().is_empty());

        // Nothing changed: no remote call
        let report = editor.save().await.unwrap();
        assert!(report.receipt.is_none());
        assert_eq!(remote.writes(), 1);
    }

    #[tokio::test]
    async fn test_validation_blocks_save_before_any_call() {
        let remote = remote();
        let mut editor = loaded(remote.clone()).await;
        let phase_id = editor.apply(PlanEdit::AddPhase { name: None }).unwrap().unwrap();
        let session_id = editor
            .apply(PlanEdit::AddSession {
                phase_id,
                name: None,
            })
            .unwrap()
            .unwrap();
        editor.apply(PlanEdit::AddExercise { session_id }).unwrap();

        let err = editor.save().await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert_eq!(remote.writes(), 0);
        assert!(editor.has_pending());
    }

    #[tokio::test]
    async fn test_conflict_holds_edits_until_reload() {
        let remote = remote();
        let seeded = remote.seed(CLIENT, resolved_tree());
        let mut editor = loaded(remote.clone()).await;

        editor.apply(PlanEdit::AddPhase { name: Some("Mine".to_string()) }).unwrap();
        let server_time = remote.touch(&seeded.plan_id);

        let err = editor.save().await.unwrap_err();
        assert_eq!(
            err,
            SyncError::Conflict {
                message: "stale revision".to_string(),
                server_time,
            }
        );
        assert_eq!(editor.status(), SaveStatus::Conflict);
        assert_eq!(editor.conflict().unwrap().server_time, server_time);

        // Local edits survive until the caller asks for server state
        assert!(editor.reload_required());
        assert!(editor.tree().phases.iter().any(|p| p.name == "Mine"));
        assert!(!editor.change_set().is_empty());
        assert_eq!(
            editor.apply(PlanEdit::AddPhase { name: None }).unwrap_err(),
            SyncError::ConflictPending
        );
        assert_eq!(editor.save().await.unwrap_err(), SyncError::ConflictPending);
        assert_eq!(editor.next_deadline(), None);

        editor.reload_from_server().await.unwrap();
        assert_eq!(editor.tree(), &seeded.tree);
        assert!(editor.change_set().is_empty());
        assert!(editor.conflict().is_none());
        assert_eq!(editor.status(), SaveStatus::Idle);

        // Saving again works against the new revision
        editor.apply(PlanEdit::AddPhase { name: Some("Again".to_string()) }).unwrap();
        assert!(editor.save().await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_conflict() {
        let remote = remote();
        let seeded = remote.seed(CLIENT, resolved_tree());
        let mut editor = loaded(remote.clone()).await;
        editor.apply(PlanEdit::AddPhase { name: Some("Mine".to_string()) }).unwrap();
        remote.touch(&seeded.plan_id);
        assert!(matches!(editor.save().await, Err(SyncError::Conflict { .. })));

        remote.fail_next_fetch("offline");
        assert!(matches!(
            editor.reload_from_server().await,
            Err(SyncError::Transport(_))
        ));
        assert!(editor.reload_required());
        assert_eq!(editor.status(), SaveStatus::Conflict);
        assert_eq!(editor.save().await.unwrap_err(), SyncError::ConflictPending);

        editor.reload_from_server().await.unwrap();
        assert_eq!(editor.tree(), &remote.stored(CLIENT).unwrap().tree);
    }

    #[tokio::test]
    async fn test_reload_after_conflict_clears_backup() {
        let temp = TempDir::new().unwrap();
        let db = Database::new(&temp.path().join("backup.db")).unwrap().shared();
        let backup = LocalBackupStore::new(db);

        let remote = remote();
        let seeded = remote.seed(CLIENT, resolved_tree());
        let mut editor = PlanEditor::new(CLIENT, remote.clone(), &SyncConfig::default())
            .with_backup(backup.clone());
        editor.load().await.unwrap();

        editor
            .apply(PlanEdit::AddPhase { name: Some("Discarded".to_string()) })
            .unwrap();
        remote.touch(&seeded.plan_id);
        assert!(editor.save().await.is_err());
        // Still mirrored while the conflict is open
        assert_eq!(backup.read(CLIENT).unwrap().phases.phases.len(), 2);

        editor.reload_from_server().await.unwrap();
        assert!(backup.read(CLIENT).is_none());

        // An empty server plan cannot resurrect the discarded phase
        let empty = Arc::new(MemoryRemote::with_catalog(catalog_entries()));
        let mut fresh = PlanEditor::new(CLIENT, empty, &SyncConfig::default()).with_backup(backup);
        assert!(!fresh.load().await.unwrap().recovered);
        assert!(fresh.tree().is_empty());
    }

    #[tokio::test]
    async fn test_failed_save_reverts_activation_toggle() {
        let remote = remote();
        let mut tree = resolved_tree();
        let (with_second, second_id) = tree.add_phase(Some("Peak"));
        tree = with_second;
        let first_id = tree.phases[0].id.clone();
        remote.seed(CLIENT, tree);
        let mut editor = loaded(remote.clone()).await;

        editor
            .apply(PlanEdit::ToggleActivation {
                phase_id: second_id.clone(),
            })
            .unwrap();
        assert_eq!(editor.tree().active_phase().unwrap().id, second_id);

        remote.fail_next("timeout");
        let err = editor.save().await.unwrap_err();
        assert!(err.is_retryable());
        // Left queued for a manual retry
        assert_eq!(editor.status(), SaveStatus::Queued);
        assert_eq!(editor.tree().active_phase().unwrap().id, first_id);
        assert!(editor.has_pending());
    }

    #[tokio::test]
    async fn test_backup_recovers_when_server_is_empty() {
        let temp = TempDir::new().unwrap();
        let db = Database::new(&temp.path().join("backup.db")).unwrap().shared();
        let backup = LocalBackupStore::new(db);

        let remote = remote();
        let mut editor = PlanEditor::new(CLIENT, remote.clone(), &SyncConfig::default())
            .with_backup(backup.clone());
        editor.load().await.unwrap();
        editor
            .apply(PlanEdit::ReplaceTree { tree: resolved_tree() })
            .unwrap();
        let edited = editor.tree().clone();
        drop(editor);

        // Crash before saving; a new editor picks up the backup
        let mut editor = PlanEditor::new(CLIENT, remote.clone(), &SyncConfig::default())
            .with_backup(backup.clone());
        let report = editor.load().await.unwrap();
        assert!(report.recovered);
        assert_eq!(editor.tree(), &edited);
        assert_eq!(editor.status(), SaveStatus::Queued);

        editor.save().await.unwrap();
        assert!(backup.read(CLIENT).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_flush_waits_for_debounce() {
        let remote = remote();
        remote.seed(CLIENT, resolved_tree());
        let mut editor = loaded(remote.clone()).await;
        let exercise_id = first_exercise(&editor);

        editor.editing_started(&exercise_id);
        editor
            .apply(PlanEdit::UpdateExercise {
                exercise_id: exercise_id.clone(),
                patch: ExercisePatch {
                    sets_max: Some(Some(5)),
                    ..Default::default()
                },
            })
            .unwrap();
        assert_eq!(editor.status(), SaveStatus::Editing);

        tokio::time::advance(std::time::Duration::from_millis(9_999)).await;
        assert!(editor.flush_due().await.is_none());

        editor.editing_ended(&exercise_id);
        assert_eq!(editor.status(), SaveStatus::Queued);
        tokio::time::advance(std::time::Duration::from_millis(1_500)).await;
        let report = editor.flush_due().await.unwrap().unwrap();
        assert_eq!(report.changes.exercises.updated.len(), 1);
        assert_eq!(remote.writes(), 1);
        assert_eq!(editor.status(), SaveStatus::Saved);
    }
}
