use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::MigrationHarness;
use tempfile::TempDir;

use crate::storage::{SqliteStore, MIGRATIONS};

/// Create a test store backed by a temporary database file
pub fn create_test_store() -> (TempDir, SqliteStore) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");

    let store = SqliteStore::open(&db_path.display().to_string(), 4)
        .expect("Failed to open test store");

    (temp_dir, store)
}

/// Create an in-memory test database connection
pub fn get_test_db_connection() -> SqliteConnection {
    let mut conn = SqliteConnection::establish(":memory:")
        .unwrap_or_else(|_| panic!("Error connecting to in-memory SQLite database"));

    conn.batch_execute("PRAGMA foreign_keys = ON")
        .expect("Failed to enable foreign keys");
    conn.run_pending_migrations(MIGRATIONS)
        .expect("Failed to run migrations");
    conn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::User;

    #[test]
    fn test_create_test_store() {
        let (_temp_dir, store) = create_test_store();
        let mut conn = store.conn().expect("Failed to get connection");
        let result = diesel::sql_query("SELECT 1").execute(&mut conn);
        assert_eq!(result, Ok(1));
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let mut conn = get_test_db_connection();
        let user = User::create(&mut conn, "a@example.com").unwrap();
        let orphan = crate::models::feed::NewFeed::new(user.id + 100, "https://example.com", "")
            .insert(&mut conn);
        assert!(orphan.is_err());
    }
}
