pub mod config;
pub mod errors;
pub mod ingest;
pub mod models;
pub mod observability;
pub mod schema;
pub mod storage;
pub mod tasks;
#[cfg(test)]
pub mod test_helpers;

// Type definitions
use diesel::r2d2::{self, ConnectionManager};
use diesel::sqlite::SqliteConnection;

pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;

pub use config::AppConfig;
pub use storage::{SharedStore, SqliteStore, Store};
