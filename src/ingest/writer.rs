use chrono::Utc;
use tracing::{debug, warn};

use crate::errors::StorageError;
use crate::models::feed::Feed;
use crate::models::feed_entry::{join_categories, NewEntry, NewFeedEntry, NewMedia};
use crate::storage::{blocking, SharedStore};

use super::parser::ParsedEntry;
use super::settle::{settle_all, Outcome};

/// Result of one write batch.
#[derive(Debug, Default)]
pub struct WriteReport {
    pub created: usize,
    /// GUID and cause of every entry that failed to persist
    pub failed: Vec<(String, StorageError)>,
}

impl WriteReport {
    pub fn attempted(&self) -> usize {
        self.created + self.failed.len()
    }
}

/// Map a parsed entry onto the rows stored for `feed`.
pub fn to_new_entry(feed: &Feed, entry: ParsedEntry, ingested: i64) -> NewEntry {
    let media = entry
        .media
        .into_iter()
        .map(|m| NewMedia {
            href: m.href,
            title: m.title,
            description: m.description,
            credit: m.credit,
            medium: m.medium,
            height: m.height,
            width: m.width,
        })
        .collect();

    NewEntry {
        entry: NewFeedEntry {
            feed_id: feed.id,
            user_id: feed.user_id,
            guid: entry.guid,
            title: entry.title,
            link: entry.link,
            author: entry.author,
            content: entry.content,
            snippet: entry.snippet,
            published: entry.published.map(|p| p.timestamp()),
            ingested,
            categories: join_categories(&entry.categories),
        },
        media,
    }
}

/// Persist every entry independently. A failed entry is logged and reported
/// without affecting the others.
pub async fn write_entries(
    store: &SharedStore,
    feed: &Feed,
    entries: Vec<ParsedEntry>,
) -> WriteReport {
    let ingested = Utc::now().timestamp();
    let rows: Vec<NewEntry> = entries
        .into_iter()
        .map(|e| to_new_entry(feed, e, ingested))
        .collect();
    let guids: Vec<String> = rows.iter().map(|r| r.entry.guid.clone()).collect();

    let writes = rows
        .into_iter()
        .map(|row| blocking(store, move |s| s.create_entry(&row)));
    let outcomes = settle_all(writes).await;

    let mut report = WriteReport::default();
    for (guid, outcome) in guids.into_iter().zip(outcomes) {
        match outcome {
            Outcome::Fulfilled(created) => {
                debug!(feed_id = feed.id, entry_id = created.id, guid = %guid, "Stored entry");
                report.created += 1;
            }
            Outcome::Rejected(e) => {
                warn!(feed_id = feed.id, guid = %guid, error = %e, "Failed to store entry");
                report.failed.push((guid, e));
            }
        }
    }
    report
}
