//! Bounded in-memory job queue shared by all background work.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::{QueueDispatchError, WorkerError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddFeedTask {
    pub user_id: i32,
    pub url: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotTask {
    pub bookmark_id: i32,
    pub url: String,
}

/// Every kind of background work the queue runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Task {
    AddFeed(AddFeedTask),
    AddScreenshot(ScreenshotTask),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskAction {
    AddFeed,
    AddScreenshot,
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskAction::AddFeed => write!(f, "add-feed"),
            TaskAction::AddScreenshot => write!(f, "add-screenshot"),
        }
    }
}

impl Task {
    pub fn action(&self) -> TaskAction {
        match self {
            Task::AddFeed(_) => TaskAction::AddFeed,
            Task::AddScreenshot(_) => TaskAction::AddScreenshot,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Task::AddFeed(t) => format!("add feed {} for user {}", t.url, t.user_id),
            Task::AddScreenshot(t) => {
                format!("screenshot {} for bookmark {}", t.url, t.bookmark_id)
            }
        }
    }
}

/// A queued task that has not started yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    pub id: Uuid,
    pub action: TaskAction,
    pub enqueued_at: DateTime<Utc>,
    pub description: String,
}

/// Runs one task to completion.
pub trait TaskHandler: Send + Sync + 'static {
    fn handle(&self, task: Task) -> BoxFuture<'static, Result<(), WorkerError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// All queued and running work finished before the timeout.
    pub drained: bool,
    /// Tasks still waiting when the queue closed.
    pub abandoned: usize,
}

struct Inner {
    handler: Arc<dyn TaskHandler>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    accepting: AtomicBool,
    running: AtomicUsize,
    pending: Mutex<VecDeque<TaskSummary>>,
}

impl Inner {
    fn remove_pending(&self, id: Uuid) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.retain(|t| t.id != id);
        }
    }
}

/// Drops a task from the pending list however `push` exits.
struct PendingSlot<'a> {
    inner: &'a Inner,
    id: Uuid,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.inner.remove_pending(self.id);
    }
}

struct RunningSlot(Arc<Inner>);

impl Drop for RunningSlot {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<Inner>,
}

impl JobQueue {
    pub fn new(handler: Arc<dyn TaskHandler>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        JobQueue {
            inner: Arc::new(Inner {
                handler,
                semaphore: Arc::new(Semaphore::new(concurrency)),
                concurrency,
                accepting: AtomicBool::new(true),
                running: AtomicUsize::new(0),
                pending: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Enqueue `task` and wait for it to finish.
    pub async fn push(&self, task: Task) -> Result<(), QueueDispatchError> {
        if !self.inner.accepting.load(Ordering::Acquire) {
            return Err(QueueDispatchError::Closed);
        }

        let summary = TaskSummary {
            id: Uuid::new_v4(),
            action: task.action(),
            enqueued_at: Utc::now(),
            description: task.describe(),
        };
        let task_id = summary.id;
        let action = summary.action;
        if let Ok(mut pending) = self.inner.pending.lock() {
            pending.push_back(summary);
        }
        info!(%task_id, %action, "Task queued");

        let slot = PendingSlot {
            inner: &self.inner,
            id: task_id,
        };
        let permit = match self.inner.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(%task_id, %action, "Task abandoned, queue closed");
                return Err(QueueDispatchError::Abandoned);
            }
        };
        drop(slot);

        self.inner.running.fetch_add(1, Ordering::AcqRel);
        let running = RunningSlot(Arc::clone(&self.inner));
        let work = self.inner.handler.handle(task);
        let handle = tokio::spawn(async move {
            let _permit = permit;
            let _running = running;
            work.await
        });

        match handle.await {
            Ok(Ok(())) => {
                info!(%task_id, %action, "Task completed");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(%task_id, %action, error = %e, "Task failed");
                Err(QueueDispatchError::Worker(e))
            }
            Err(e) => {
                let message = if e.is_panic() {
                    panic_message(e.into_panic())
                } else {
                    e.to_string()
                };
                error!(%task_id, %action, error = %message, "Task panicked");
                Err(QueueDispatchError::Panicked(message))
            }
        }
    }

    /// Snapshot of queued tasks that have not started, oldest first.
    pub fn pending(&self) -> Vec<TaskSummary> {
        self.inner
            .pending
            .lock()
            .map(|pending| pending.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn running(&self) -> usize {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::Acquire)
    }

    /// Refuse new pushes, give queued and running work up to `timeout` to finish,
    /// then abandon whatever is still waiting.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        self.inner.accepting.store(false, Ordering::Release);
        info!(
            pending = self.pending().len(),
            running = self.running(),
            "Draining job queue"
        );

        let permits = u32::try_from(self.inner.concurrency).unwrap_or(u32::MAX);
        let drained = matches!(
            tokio::time::timeout(timeout, self.inner.semaphore.acquire_many(permits)).await,
            Ok(Ok(_))
        );

        let abandoned = self.pending().len();
        self.inner.semaphore.close();
        if drained {
            info!("Job queue drained");
        } else {
            warn!(abandoned, running = self.running(), "Job queue shutdown timed out");
        }

        ShutdownReport { drained, abandoned }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::{join_all, FutureExt};

    /// Counts concurrent executions and fails or panics on request.
    #[derive(Default)]
    struct CountingHandler {
        active: AtomicUsize,
        peak: AtomicUsize,
        completed: AtomicUsize,
    }

    impl TaskHandler for Arc<CountingHandler> {
        fn handle(&self, task: Task) -> BoxFuture<'static, Result<(), WorkerError>> {
            let this = Arc::clone(self);
            async move {
                let now = this.active.fetch_add(1, Ordering::SeqCst) + 1;
                this.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                this.active.fetch_sub(1, Ordering::SeqCst);

                match task {
                    Task::AddFeed(t) if t.url.ends_with("/fail") => {
                        Err(WorkerError::ScreenshotDisabled)
                    }
                    Task::AddFeed(t) if t.url.ends_with("/panic") => panic!("boom"),
                    _ => {
                        this.completed.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }
            }
            .boxed()
        }
    }

    fn feed_task(url: &str) -> Task {
        Task::AddFeed(AddFeedTask {
            user_id: 1,
            url: url.to_string(),
            name: None,
        })
    }

    fn queue(concurrency: usize) -> (Arc<CountingHandler>, JobQueue) {
        let handler = Arc::new(CountingHandler::default());
        let queue = JobQueue::new(Arc::new(Arc::clone(&handler)), concurrency);
        (handler, queue)
    }

    #[tokio::test]
    async fn test_concurrency_bound() {
        let (handler, queue) = queue(2);
        let pushes = (0..6).map(|i| queue.push(feed_task(&format!("https://example.com/{i}"))));
        let results = join_all(pushes).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(handler.completed.load(Ordering::SeqCst), 6);
        assert_eq!(handler.peak.load(Ordering::SeqCst), 2);
        assert!(queue.pending().is_empty());
        assert_eq!(queue.running(), 0);
    }

    #[tokio::test]
    async fn test_default_concurrency_is_serial() {
        let (handler, queue) = queue(1);
        let pushes = (0..3).map(|i| queue.push(feed_task(&format!("https://example.com/{i}"))));
        join_all(pushes).await;
        assert_eq!(handler.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_errors_and_panics_are_isolated() {
        let (handler, queue) = queue(1);
        let results = join_all(vec![
            queue.push(feed_task("https://example.com/fail")),
            queue.push(feed_task("https://example.com/panic")),
            queue.push(feed_task("https://example.com/ok")),
        ])
        .await;

        assert!(matches!(results[0], Err(QueueDispatchError::Worker(_))));
        assert!(matches!(&results[1], Err(QueueDispatchError::Panicked(m)) if m == "boom"));
        assert!(results[2].is_ok());
        assert_eq!(handler.completed.load(Ordering::SeqCst), 1);

        queue.push(feed_task("https://example.com/after")).await.unwrap();
        assert_eq!(queue.running(), 0);
    }

    #[tokio::test]
    async fn test_pending_snapshot() {
        let (_handler, queue) = queue(1);
        let first = tokio::spawn({
            let queue = queue.clone();
            async move { queue.push(feed_task("https://example.com/a")).await }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = tokio::spawn({
            let queue = queue.clone();
            async move {
                queue
                    .push(Task::AddScreenshot(ScreenshotTask {
                        bookmark_id: 9,
                        url: "https://example.com/page".to_string(),
                    }))
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;

        let pending = queue.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].action, TaskAction::AddScreenshot);
        assert!(pending[0].description.contains("bookmark 9"));
        assert_eq!(queue.running(), 1);

        let json = serde_json::to_value(&pending[0]).unwrap();
        assert_eq!(json["action"], "add-screenshot");
        assert!(json["enqueued_at"].is_string());

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert!(queue.pending().is_empty());
    }

    #[tokio::test]
    async fn test_push_after_shutdown_is_refused() {
        let (_handler, queue) = queue(1);
        let report = queue.shutdown(Duration::from_secs(1)).await;
        assert!(report.drained);
        assert!(!queue.is_accepting());

        let result = queue.push(feed_task("https://example.com/late")).await;
        assert!(matches!(result, Err(QueueDispatchError::Closed)));
    }

    #[tokio::test]
    async fn test_shutdown_abandons_waiting_tasks_after_timeout() {
        let (_handler, queue) = queue(1);
        let pushes: Vec<_> = (0..3)
            .map(|i| {
                let queue = queue.clone();
                let task = feed_task(&format!("https://example.com/{i}"));
                tokio::spawn(async move { queue.push(task).await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let report = queue.shutdown(Duration::from_millis(10)).await;
        assert!(!report.drained);
        assert_eq!(report.abandoned, 2);

        let mut abandoned = 0;
        for push in pushes {
            if let Err(QueueDispatchError::Abandoned) = push.await.unwrap() {
                abandoned += 1;
            }
        }
        assert_eq!(abandoned, 2);
    }

    #[test]
    fn test_task_action_display() {
        assert_eq!(TaskAction::AddFeed.to_string(), "add-feed");
        assert_eq!(feed_task("https://x").action(), TaskAction::AddFeed);
    }
}
