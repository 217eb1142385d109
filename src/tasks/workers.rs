use futures_util::future::{BoxFuture, FutureExt};
use tracing::{info, instrument};

use crate::errors::WorkerError;
use crate::ingest::fetcher::validate_url;
use crate::ingest::{FeedPipeline, PipelineReport};
use crate::storage::{blocking, SharedStore};

use super::queue::{AddFeedTask, Task, TaskHandler};
use super::screenshot::ScreenshotWorker;

/// Routes each task variant to its worker.
#[derive(Clone)]
pub struct Dispatcher {
    feeds: FeedWorker,
    screenshots: ScreenshotWorker,
}

impl Dispatcher {
    pub fn new(feeds: FeedWorker, screenshots: ScreenshotWorker) -> Self {
        Dispatcher { feeds, screenshots }
    }
}

impl TaskHandler for Dispatcher {
    fn handle(&self, task: Task) -> BoxFuture<'static, Result<(), WorkerError>> {
        match task {
            Task::AddFeed(task) => {
                let worker = self.feeds.clone();
                async move { worker.run(task).await.map(|_| ()) }.boxed()
            }
            Task::AddScreenshot(task) => {
                let worker = self.screenshots.clone();
                async move { worker.run(task).await.map(|_| ()) }.boxed()
            }
        }
    }
}

/// Subscribes a user to a feed and ingests it right away.
#[derive(Clone)]
pub struct FeedWorker {
    store: SharedStore,
    pipeline: FeedPipeline,
}

impl FeedWorker {
    pub fn new(store: SharedStore, pipeline: FeedPipeline) -> Self {
        FeedWorker { store, pipeline }
    }

    #[instrument(skip_all, fields(user_id = task.user_id, url = %task.url))]
    pub async fn run(&self, task: AddFeedTask) -> Result<PipelineReport, WorkerError> {
        validate_url(&task.url)?;

        let AddFeedTask { user_id, url, name } = task;
        let feed = blocking(&self.store, move |s| {
            s.find_or_create_feed(user_id, &url, name.as_deref().unwrap_or(""))
        })
        .await?;
        info!(feed_id = feed.id, "Feed subscribed, fetching");

        let report = self.pipeline.run(&feed).await?;
        info!(feed_id = feed.id, created = report.created(), "Feed added");
        Ok(report)
    }
}
