use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::sync::watch;
use tracing::{error, info};

use markfeed::errors::{AppError, AppResult};
use markfeed::ingest::{FeedFetcher, FeedPipeline};
use markfeed::models::user::User;
use markfeed::observability::init_logging;
use markfeed::tasks::{
    AddFeedTask, Dispatcher, FeedWorker, JobQueue, Scheduler, SchedulerConfig, ScreenshotTask,
    ScreenshotWorker, Task, TickOutcome,
};
use markfeed::{AppConfig, SharedStore, SqliteStore};

/// CLI options
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler until interrupted (default)
    Serve,
    /// Run a single sync pass over stale feeds and exit
    Sync,
    /// Subscribe a user to a feed and ingest it
    AddFeed {
        #[arg(long)]
        user: i32,
        #[arg(long)]
        url: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Capture a screenshot for a bookmark
    Screenshot {
        #[arg(long)]
        bookmark: i32,
        /// Page to capture; defaults to the bookmark's URL
        #[arg(long, default_value = "")]
        url: String,
    },
    /// Create an owner account for feeds and bookmarks
    CreateUser {
        #[arg(long)]
        email: String,
    },
}

/// Everything the commands need, built once from the config.
struct App {
    config: AppConfig,
    sqlite: SqliteStore,
    scheduler: Scheduler,
    queue: JobQueue,
}

impl App {
    fn build(config: AppConfig) -> AppResult<Self> {
        let sqlite = SqliteStore::open(&config.database_url, config.db_pool_size)?;
        let store: SharedStore = Arc::new(sqlite.clone());

        let fetcher = FeedFetcher::new(config.relaxed_tls_hosts.clone())?;
        let pipeline = FeedPipeline::new(store.clone(), fetcher);
        let scheduler = Scheduler::new(
            store.clone(),
            pipeline.clone(),
            SchedulerConfig {
                interval: config.sync_interval,
                freshness: config.freshness,
                feed_concurrency: config.feed_concurrency,
                shutdown_timeout: config.shutdown_timeout,
            },
        );

        let screenshots = ScreenshotWorker::new(store.clone(), config.screenshot.clone())?;
        if !screenshots.is_enabled() {
            info!("No screenshot endpoint configured, screenshot tasks will fail");
        }
        let dispatcher = Dispatcher::new(FeedWorker::new(store, pipeline), screenshots);
        let queue = JobQueue::new(Arc::new(dispatcher), config.queue_concurrency);

        Ok(App {
            config,
            sqlite,
            scheduler,
            queue,
        })
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    if let Err(e) = run(Args::parse()).await {
        error!(error = %e, "markfeed exited with an error");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> AppResult<()> {
    let config = AppConfig::from_env()?;
    let app = App::build(config)?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(app).await,
        Command::Sync => {
            match app.scheduler.tick().await {
                TickOutcome::Completed(report) => {
                    println!("Synced {} feeds ({} failed)", report.feeds.len(), report.failed())
                }
                TickOutcome::Skipped => println!("A sync is already running"),
            }
            Ok(())
        }
        Command::AddFeed { user, url, name } => {
            app.queue
                .push(Task::AddFeed(AddFeedTask {
                    user_id: user,
                    url,
                    name,
                }))
                .await?;
            println!("Feed added");
            Ok(())
        }
        Command::Screenshot { bookmark, url } => {
            app.queue
                .push(Task::AddScreenshot(ScreenshotTask {
                    bookmark_id: bookmark,
                    url,
                }))
                .await?;
            println!("Screenshot saved");
            Ok(())
        }
        Command::CreateUser { email } => {
            let mut conn = app.sqlite.conn()?;
            let user = User::create(&mut conn, email.trim())?;
            println!("Created user {} ({})", user.id, user.email);
            Ok(())
        }
    }
}

async fn serve(app: App) -> AppResult<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = app.scheduler.clone();
    let scheduler_handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    tokio::signal::ctrl_c().await.map_err(AppError::Io)?;
    info!("Shutdown requested");

    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_handle.await {
        error!(error = %e, "Scheduler task failed");
    }

    let report = app.queue.shutdown(app.config.shutdown_timeout).await;
    info!(
        drained = report.drained,
        abandoned = report.abandoned,
        "Shutdown complete"
    );
    Ok(())
}
