//! Plan synchronization engine
//!
//! Edits are applied optimistically to the in-memory tree, diffed against the
//! last synced snapshot, debounced, and saved with an expected-revision check.
//!
//! - [`ChangeTracker`] diffs the tree against the baseline
//! - [`ConcurrencyGuard`] binds the editor to a plan revision
//! - [`SaveScheduler`] decides when background saves fire
//! - [`PlanEditor`] ties them together behind one API
//! - [`EditorWorker`] runs an editor as a message-driven task

mod editor;
mod error;
mod guard;
mod scheduler;
mod tracker;
mod validate;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use editor::{ConflictInfo, LoadReport, PlanEdit, PlanEditor, SaveReport, SaveStatus};
pub use error::{SyncError, SyncResult, ValidationError};
pub use guard::{ConcurrencyGuard, SaveReceipt};
pub use scheduler::{EntityKey, MutationAction, PendingMutation, Poll, SaveOrigin, SaveScheduler};
pub use tracker::{ChangeSet, ChangeTracker, LevelDiff, UpdateRecord};
pub use validate::validate;
pub use worker::{EditorCommand, EditorHandle, EditorWorker};
