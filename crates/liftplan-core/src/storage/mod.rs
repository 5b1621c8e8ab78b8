//! Persistence layer
//!
//! SQLite-based storage for:
//! - Plan snapshots with revision timestamps (local stand-in for the server)
//! - The shared exercise catalog
//! - Per-client crash-recovery backups

mod backup;
mod database;
mod plans;
mod remote;

pub use backup::{BackupRecord, LocalBackupStore};
pub use database::{Database, SharedDatabase};
pub use plans::SqlitePlanStore;
pub use remote::{CreateOutcome, PlanRemote, RemotePlan, UpdateOutcome};

#[cfg(test)]
mod database_tests;
