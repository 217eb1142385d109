//! Recurring sync of stale feeds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::errors::IngestError;
use crate::ingest::settle::{settle_bounded, Outcome};
use crate::ingest::{FeedPipeline, PipelineReport};
use crate::storage::{blocking, SharedStore};

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub freshness: Duration,
    pub feed_concurrency: usize,
    /// How long `run` waits for an in-flight tick once shutdown is signalled.
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            interval: Duration::from_secs(60),
            freshness: Duration::from_secs(3600),
            feed_concurrency: 8,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    Ingested { created: usize, failed: usize },
    NotModified,
    Failed(String),
}

/// Per-feed outcomes of one tick.
#[derive(Debug, Default)]
pub struct TickReport {
    pub feeds: Vec<(i32, FeedOutcome)>,
}

impl TickReport {
    pub fn outcome(&self, feed_id: i32) -> Option<&FeedOutcome> {
        self.feeds
            .iter()
            .find(|(id, _)| *id == feed_id)
            .map(|(_, outcome)| outcome)
    }

    pub fn failed(&self) -> usize {
        self.feeds
            .iter()
            .filter(|(_, o)| matches!(o, FeedOutcome::Failed(_)))
            .count()
    }
}

#[derive(Debug)]
pub enum TickOutcome {
    /// Another tick was still running.
    Skipped,
    Completed(TickReport),
}

/// Clears the in-flight flag when the tick ends, even by panic.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct Scheduler {
    store: SharedStore,
    pipeline: FeedPipeline,
    config: SchedulerConfig,
    in_flight: Arc<AtomicBool>,
    next_run: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl Scheduler {
    pub fn new(store: SharedStore, pipeline: FeedPipeline, config: SchedulerConfig) -> Self {
        Scheduler {
            store,
            pipeline,
            config,
            in_flight: Arc::new(AtomicBool::new(false)),
            next_run: Arc::new(Mutex::new(None)),
        }
    }

    /// When the next tick is due. None until the first tick has been scheduled.
    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        self.next_run.lock().ok().and_then(|next| *next)
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Tick on every interval until `shutdown` flips to true or its sender is dropped.
    /// Before returning, waits up to `shutdown_timeout` for ticks still in flight.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            freshness_secs = self.config.freshness.as_secs(),
            "Starting feed scheduler"
        );
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = JoinSet::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let scheduler = self.clone();
                    ticks.spawn(async move { scheduler.tick().await });
                }
                Some(joined) = ticks.join_next(), if !ticks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Sync tick task failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Feed scheduler shutting down");
                        break;
                    }
                }
            }
        }

        if ticks.is_empty() {
            return;
        }
        info!(in_flight = ticks.len(), "Waiting for running sync to finish");
        let drain = async {
            while let Some(joined) = ticks.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "Sync tick task failed");
                }
            }
        };
        if timeout(self.config.shutdown_timeout, drain).await.is_err() {
            warn!(
                timeout_secs = self.config.shutdown_timeout.as_secs(),
                "Sync still running at shutdown, aborting it"
            );
            ticks.abort_all();
        }
    }

    /// One pass: select stale feeds and run the pipeline for each, capped at
    /// `feed_concurrency` in flight.
    pub async fn tick(&self) -> TickOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Previous sync still running, skipping tick");
            return TickOutcome::Skipped;
        }
        let _guard = InFlight(&self.in_flight);
        let started = Utc::now();

        let report = self.sync_stale(started).await;
        self.schedule_next(started);
        TickOutcome::Completed(report)
    }

    async fn sync_stale(&self, now: DateTime<Utc>) -> TickReport {
        let threshold = freshness_threshold(now, self.config.freshness);
        let feeds = match blocking(&self.store, move |s| s.find_stale_feeds(threshold)).await {
            Ok(feeds) => feeds,
            Err(e) => {
                error!(error = %e, "Failed to load stale feeds");
                return TickReport::default();
            }
        };

        if feeds.is_empty() {
            debug!("No stale feeds");
            return TickReport::default();
        }
        info!(count = feeds.len(), "Syncing stale feeds");

        let pipeline = &self.pipeline;
        let runs: Vec<BoxFuture<'_, Result<PipelineReport, IngestError>>> =
            feeds.iter().map(|feed| pipeline.run(feed).boxed()).collect();
        let outcomes = settle_bounded(runs, self.config.feed_concurrency).await;

        let feeds: Vec<(i32, FeedOutcome)> = feeds
            .iter()
            .zip(outcomes)
            .map(|(feed, outcome)| {
                let outcome = match outcome {
                    Outcome::Fulfilled(PipelineReport::NotModified) => FeedOutcome::NotModified,
                    Outcome::Fulfilled(PipelineReport::Ingested(summary)) => {
                        FeedOutcome::Ingested {
                            created: summary.write.created,
                            failed: summary.write.failed.len(),
                        }
                    }
                    Outcome::Rejected(e) => {
                        warn!(feed_id = feed.id, url = %feed.url, error = %e, "Feed sync failed");
                        FeedOutcome::Failed(e.to_string())
                    }
                };
                (feed.id, outcome)
            })
            .collect();

        let report = TickReport { feeds };
        info!(
            feeds = report.feeds.len(),
            failed = report.failed(),
            "Sync finished"
        );
        report
    }

    fn schedule_next(&self, started: DateTime<Utc>) {
        let next = chrono::Duration::from_std(self.config.interval)
            .ok()
            .and_then(|d| started.checked_add_signed(d));
        if let Some(next) = next {
            info!(next_run = %next, "Next feed sync scheduled");
        }
        if let Ok(mut slot) = self.next_run.lock() {
            *slot = next;
        }
    }
}

/// Feeds last fetched before this instant are stale.
pub fn freshness_threshold(now: DateTime<Utc>, freshness: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(freshness)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
