use chrono::{DateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::r2d2::{self, ConnectionManager, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::{debug, info};

use super::Store;
use crate::errors::StorageError;
use crate::models::{
    bookmark::Bookmark,
    feed::{Feed, NewFeed, PartialFeed},
    feed_entry::{FeedEntry, NewEntry},
};
use crate::DbPool;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/migrations");

/// Applied to every pooled connection.
#[derive(Debug)]
struct SqlitePragmas;

impl r2d2::CustomizeConnection<SqliteConnection, r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), r2d2::Error> {
        conn.batch_execute(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL;",
        )
        .map_err(r2d2::Error::QueryError)
    }
}

/// diesel/SQLite implementation of [`Store`]. Opened once at startup and
/// handed to the scheduler and the workers; dropping it closes the pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn open(database_url: &str, pool_size: u32) -> Result<Self, StorageError> {
        info!(database_url, pool_size, "Opening database");
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = r2d2::Pool::builder()
            .max_size(pool_size.max(1))
            .connection_customizer(Box::new(SqlitePragmas))
            .build(manager)?;

        let store = SqliteStore { pool };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn conn(
        &self,
    ) -> Result<PooledConnection<ConnectionManager<SqliteConnection>>, StorageError> {
        Ok(self.pool.get()?)
    }

    pub fn run_migrations(&self) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| StorageError::Migration(e.to_string()))?;
        debug!(count = applied.len(), "Applied pending migrations");
        Ok(())
    }
}

impl Store for SqliteStore {
    fn find_entry_guids(
        &self,
        feed_id: i32,
        user_id: i32,
        guids: &[String],
    ) -> Result<Vec<String>, StorageError> {
        if guids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn()?;
        FeedEntry::existing_guids(&mut conn, feed_id, user_id, guids)
    }

    fn create_entry(&self, entry: &NewEntry) -> Result<FeedEntry, StorageError> {
        let mut conn = self.conn()?;
        entry.insert(&mut conn)
    }

    fn update_feed_last_fetched(
        &self,
        feed_id: i32,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        if Feed::set_last_fetched(&mut conn, feed_id, fetched_at.timestamp())? {
            Ok(())
        } else {
            Err(StorageError::NotFound(format!("feed {feed_id}")))
        }
    }

    fn find_stale_feeds(&self, threshold: DateTime<Utc>) -> Result<Vec<Feed>, StorageError> {
        let mut conn = self.conn()?;
        Feed::find_stale(&mut conn, threshold.timestamp())
    }

    fn get_feed(&self, feed_id: i32) -> Result<Option<Feed>, StorageError> {
        let mut conn = self.conn()?;
        Feed::get_by_id(&mut conn, feed_id)
    }

    fn find_or_create_feed(
        &self,
        user_id: i32,
        url: &str,
        name: &str,
    ) -> Result<Feed, StorageError> {
        let mut conn = self.conn()?;
        if let Some(feed) = Feed::get_by_user_url(&mut conn, user_id, url)? {
            return Ok(feed);
        }
        match NewFeed::new(user_id, url, name).insert(&mut conn) {
            Ok(feed) => Ok(feed),
            // lost a race against another add-feed for the same (url, user)
            Err(StorageError::Conflict(_)) => Feed::get_by_user_url(&mut conn, user_id, url)?
                .ok_or_else(|| StorageError::NotFound(format!("feed {url}"))),
            Err(e) => Err(e),
        }
    }

    fn update_feed_metadata(&self, feed_id: i32, update: &PartialFeed) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        Feed::update(&mut conn, feed_id, update)?;
        Ok(())
    }

    fn get_bookmark(&self, bookmark_id: i32) -> Result<Option<Bookmark>, StorageError> {
        let mut conn = self.conn()?;
        Bookmark::get_by_id(&mut conn, bookmark_id)
    }

    fn set_bookmark_screenshot(&self, bookmark_id: i32, path: &str) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        if Bookmark::set_screenshot(&mut conn, bookmark_id, path)? {
            Ok(())
        } else {
            Err(StorageError::NotFound(format!("bookmark {bookmark_id}")))
        }
    }
}
