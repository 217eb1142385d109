//! Storage seam used by the ingestion pipeline, the scheduler and the workers.
//!
//! The pipeline only ever talks to a [`Store`]. [`SqliteStore`] is the diesel
//! implementation; tests swap in wrappers that inject failures.

mod sqlite;

pub use sqlite::{SqliteStore, MIGRATIONS};

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::errors::StorageError;
use crate::models::{
    bookmark::Bookmark,
    feed::{Feed, PartialFeed},
    feed_entry::{FeedEntry, NewEntry},
};

pub type SharedStore = Arc<dyn Store>;

/// Blocking persistence operations. Async callers go through [`blocking`].
pub trait Store: Send + Sync + 'static {
    /// The subset of `guids` already persisted for `(feed_id, user_id)`.
    fn find_entry_guids(
        &self,
        feed_id: i32,
        user_id: i32,
        guids: &[String],
    ) -> Result<Vec<String>, StorageError>;

    /// Insert one entry together with its media.
    fn create_entry(&self, entry: &NewEntry) -> Result<FeedEntry, StorageError>;

    fn update_feed_last_fetched(
        &self,
        feed_id: i32,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Feeds never fetched or last fetched before `threshold`.
    fn find_stale_feeds(&self, threshold: DateTime<Utc>) -> Result<Vec<Feed>, StorageError>;

    fn get_feed(&self, feed_id: i32) -> Result<Option<Feed>, StorageError>;

    fn find_or_create_feed(&self, user_id: i32, url: &str, name: &str)
        -> Result<Feed, StorageError>;

    fn update_feed_metadata(&self, feed_id: i32, update: &PartialFeed) -> Result<(), StorageError>;

    fn get_bookmark(&self, bookmark_id: i32) -> Result<Option<Bookmark>, StorageError>;

    fn set_bookmark_screenshot(&self, bookmark_id: i32, path: &str) -> Result<(), StorageError>;
}

/// Run a storage call on the blocking pool.
pub async fn blocking<S, T, F>(store: &Arc<S>, f: F) -> Result<T, StorageError>
where
    S: Store + ?Sized,
    T: Send + 'static,
    F: FnOnce(&S) -> Result<T, StorageError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(&*store)).await?
}
