//! Application constants and configuration defaults
//!
//! Centralized location for magic numbers and default values

use std::time::Duration;

/// Plan tree defaults
pub mod plan {
    /// Minutes counted for an exercise with no explicit duration
    pub const DEFAULT_EXERCISE_MINUTES: u32 = 8;
}

/// Save scheduling
pub mod sync {
    use super::*;

    /// Debounce delay before a background save fires
    pub const BASE_SAVE_DELAY: Duration = Duration::from_millis(5000);

    /// Debounce multiplier while any row is being edited
    pub const EDITING_BACKOFF_FACTOR: u32 = 2;

    /// Pause after an editing session ends before the queue is re-checked
    ///
    /// Covers tabbing from one row to the next without a save in between.
    pub const EDITING_GRACE: Duration = Duration::from_millis(1500);

    /// Upper bound for configured delays
    pub const MAX_SAVE_DELAY: Duration = Duration::from_secs(60 * 60);

    /// Upper bound for the editing multiplier
    pub const MAX_BACKOFF_FACTOR: u32 = 16;

    /// Capacity of the editor command channel
    pub const COMMAND_CHANNEL_CAPACITY: usize = 256;
}

/// Local crash-recovery backups
pub mod backup {
    /// Schema version written into every backup record
    pub const SCHEMA_VERSION: &str = "1";
}

/// Filesystem layout
pub mod fs {
    /// Config directory name
    pub const CONFIG_DIR_NAME: &str = ".liftplan";

    /// Plan store database (local stand-in for the remote service)
    pub const PLANS_DB_NAME: &str = "plans.db";

    /// Crash-recovery backup database
    pub const BACKUP_DB_NAME: &str = "backup.db";

    /// Config file name
    pub const CONFIG_FILE_NAME: &str = "config.toml";
}
