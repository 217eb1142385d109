use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::errors::{IngestError, StorageError};
use crate::models::feed::Feed;
use crate::storage::{blocking, SharedStore};

use super::dedup::find_new_entries;
use super::fetcher::{FeedFetcher, FetchOutcome};
use super::parser::parse_feed;
use super::writer::{write_entries, WriteReport};

/// What one pipeline run did for one feed.
#[derive(Debug)]
pub enum PipelineReport {
    /// 304; nothing parsed or written, last-fetched untouched.
    NotModified,
    Ingested(IngestSummary),
}

#[derive(Debug, Default)]
pub struct IngestSummary {
    pub parsed: usize,
    pub new: usize,
    pub write: WriteReport,
    /// Set when the final last-fetched update failed. The run still counts as done.
    pub last_fetched_error: Option<StorageError>,
}

impl PipelineReport {
    pub fn created(&self) -> usize {
        match self {
            PipelineReport::NotModified => 0,
            PipelineReport::Ingested(summary) => summary.write.created,
        }
    }
}

/// Fetch -> parse -> dedup -> write for a single feed.
#[derive(Clone)]
pub struct FeedPipeline {
    store: SharedStore,
    fetcher: FeedFetcher,
}

impl FeedPipeline {
    pub fn new(store: SharedStore, fetcher: FeedFetcher) -> Self {
        FeedPipeline { store, fetcher }
    }

    #[instrument(skip_all, fields(feed_id = feed.id, url = %feed.url))]
    pub async fn run(&self, feed: &Feed) -> Result<PipelineReport, IngestError> {
        let body = match self.fetcher.fetch(&feed.url, feed.last_fetched_at()).await? {
            FetchOutcome::NotModified => {
                info!("Feed not modified since last fetch");
                return Ok(PipelineReport::NotModified);
            }
            FetchOutcome::Body(body) => body,
        };

        let parsed = parse_feed(&body)?;

        let metadata = parsed.metadata();
        if !metadata.is_empty() {
            let feed_id = feed.id;
            let updated =
                blocking(&self.store, move |s| s.update_feed_metadata(feed_id, &metadata)).await;
            if let Err(e) = updated {
                warn!(error = %e, "Failed to update feed metadata");
            }
        }

        let parsed_count = parsed.entries.len();
        let fresh = find_new_entries(&self.store, feed, parsed.entries).await?;
        let new_count = fresh.len();

        let write = if fresh.is_empty() {
            info!(parsed = parsed_count, "No new entries");
            WriteReport::default()
        } else {
            let report = write_entries(&self.store, feed, fresh).await;
            info!(
                parsed = parsed_count,
                created = report.created,
                failed = report.failed.len(),
                "Stored new entries"
            );
            report
        };

        let feed_id = feed.id;
        let fetched_at = Utc::now();
        let updated =
            blocking(&self.store, move |s| s.update_feed_last_fetched(feed_id, fetched_at)).await;
        let last_fetched_error = match updated {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "Failed to update last fetched time");
                Some(e)
            }
        };

        Ok(PipelineReport::Ingested(IngestSummary {
            parsed: parsed_count,
            new: new_count,
            write,
            last_fetched_error,
        }))
    }
}
