//! Tests for database migrations
//!
//! These tests verify that:
//! - All migrations apply successfully
//! - Schema version is tracked correctly
//! - Re-opening an existing database keeps its data

use tempfile::TempDir;

use crate::storage::database::Database;

/// Helper to create a temporary database for testing
fn create_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(&db_path).expect("Failed to create database");
    (db, temp_dir)
}

fn table_columns(db: &Database, table: &str) -> Vec<String> {
    let mut stmt = db
        .conn()
        .prepare(&format!("PRAGMA table_info({})", table))
        .expect("Failed to prepare PRAGMA");
    stmt.query_map([], |row| row.get::<_, String>(1))
        .expect("Failed to get columns")
        .filter_map(Result::ok)
        .collect()
}

#[test]
fn test_database_creation() {
    let (db, _temp) = create_test_db();
    assert_eq!(db.get_schema_version(), 2, "Expected current schema version to be 2");
}

#[test]
fn test_plans_table_exists() {
    let (db, _temp) = create_test_db();
    let columns = table_columns(&db, "plans");

    for expected in ["id", "client_id", "tree", "created_at", "updated_at"] {
        assert!(columns.contains(&expected.to_string()), "missing {}", expected);
    }
}

#[test]
fn test_client_id_is_unique() {
    let (db, _temp) = create_test_db();
    let conn = db.conn();
    conn.execute(
        "INSERT INTO plans (id, client_id, tree, created_at, updated_at) VALUES ('p1', 'c', '[]', 'x', 'x')",
        [],
    )
    .expect("First insert should succeed");

    let second = conn.execute(
        "INSERT INTO plans (id, client_id, tree, created_at, updated_at) VALUES ('p2', 'c', '[]', 'x', 'x')",
        [],
    );
    assert!(second.is_err());
}

#[test]
fn test_catalog_and_backup_tables_exist() {
    let (db, _temp) = create_test_db();

    let catalog = table_columns(&db, "exercise_catalog");
    assert!(catalog.contains(&"catalog_id".to_string()));
    assert!(catalog.contains(&"target_area".to_string()));

    // migration 2
    let backups = table_columns(&db, "backups");
    assert!(backups.contains(&"payload".to_string()));
    assert!(backups.contains(&"saved_at".to_string()));
    assert!(backups.contains(&"version".to_string()));
}

#[test]
fn test_wal_mode_enabled() {
    let (db, _temp) = create_test_db();

    let journal_mode: String = db
        .conn()
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .expect("Failed to get journal_mode");

    assert_eq!(journal_mode.to_lowercase(), "wal", "WAL mode should be enabled");
}

#[test]
fn test_migration_idempotency() {
    let (db, _temp) = create_test_db();
    let version1 = db.get_schema_version();

    db.run_migrations().expect("Re-running migrations failed");

    assert_eq!(version1, db.get_schema_version(), "Schema version should not change");
}

#[test]
fn test_data_survives_reopen() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.db");

    {
        let db = Database::new(&db_path).expect("Failed to create database");
        db.conn()
            .execute(
                "INSERT INTO exercise_catalog (catalog_id, name) VALUES ('c1', 'Deadlift')",
                [],
            )
            .expect("Insert failed");
    }

    let db = Database::new(&db_path).expect("Failed to reopen database");
    let name: String = db
        .conn()
        .query_row("SELECT name FROM exercise_catalog WHERE catalog_id = 'c1'", [], |row| {
            row.get(0)
        })
        .expect("Row should survive reopen");
    assert_eq!(name, "Deadlift");
}
