//! LiftPlan Core - workout plan editing and synchronization
//!
//! This crate provides the engine behind the `liftplan` CLI:
//! - Phase / Session / Exercise plan tree with pure edit operations
//! - Change tracking against the last synced snapshot
//! - Debounced saves with optimistic-concurrency conflict detection
//! - Local crash-recovery backups
//! - CSV import/export with catalog resolution

pub mod catalog;
pub mod config;
pub mod constants;
pub mod paths;
pub mod plan;
pub mod storage;
pub mod sync;
pub mod transfer;

// Re-exports for convenience
pub use catalog::{CatalogEntry, ExerciseCatalog};
pub use config::SyncConfig;
pub use plan::{EntityKind, Exercise, Phase, PlanTree, Session};
pub use storage::{Database, LocalBackupStore, PlanRemote, SqlitePlanStore};
pub use sync::{EditorHandle, EditorWorker, PlanEdit, PlanEditor, SaveStatus, SyncError};
