pub mod queue;
pub mod scheduler;
pub mod screenshot;
pub mod workers;

pub use queue::{AddFeedTask, JobQueue, ScreenshotTask, Task, TaskAction, TaskHandler, TaskSummary};
pub use scheduler::{Scheduler, SchedulerConfig, TickOutcome, TickReport};
pub use screenshot::ScreenshotWorker;
pub use workers::{Dispatcher, FeedWorker};
