//! Filesystem locations
//!
//! Everything lives under `~/.liftplan/` unless `LIFTPLAN_HOME` overrides it.

use std::path::PathBuf;

use crate::constants::fs::{BACKUP_DB_NAME, CONFIG_DIR_NAME, CONFIG_FILE_NAME, PLANS_DB_NAME};

/// Environment variable that relocates the data directory
pub const HOME_ENV: &str = "LIFTPLAN_HOME";

/// Root data directory
pub fn config_dir() -> PathBuf {
    if let Some(custom) = std::env::var_os(HOME_ENV) {
        return PathBuf::from(custom);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}

pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

pub fn plans_db_path() -> PathBuf {
    config_dir().join(PLANS_DB_NAME)
}

pub fn backup_db_path() -> PathBuf {
    config_dir().join(BACKUP_DB_NAME)
}
