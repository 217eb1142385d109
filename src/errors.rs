use diesel::r2d2;
use thiserror::Error;

/// Network or HTTP failure while fetching a feed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid feed URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("feed too large: {size} bytes (max {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl FetchError {
    pub fn invalid_url(url: &str, reason: impl Into<String>) -> Self {
        FetchError::InvalidUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convert network/reqwest errors
impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Request(err.to_string())
        }
    }
}

/// The fetched body is not a feed we can read.
#[derive(Debug, Error)]
#[error("unable to parse feed: {0}")]
pub struct ParseError(pub String);

/// Convert feed parsing errors
impl From<feed_rs::parser::ParseFeedError> for ParseError {
    fn from(err: feed_rs::parser::ParseFeedError) -> Self {
        ParseError(err.to_string())
    }
}

/// Persistence failure, either for a single entry or for feed-level updates.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database connection pool error: {0}")]
    Pool(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("storage task failed: {0}")]
    Blocking(String),

    #[error("migration failed: {0}")]
    Migration(String),
}

/// Convert database connection pool errors
impl From<r2d2::PoolError> for StorageError {
    fn from(err: r2d2::PoolError) -> Self {
        StorageError::Pool(err.to_string())
    }
}

/// Convert diesel database errors
impl From<diesel::result::Error> for StorageError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error as DieselError};

        match err {
            DieselError::NotFound => StorageError::NotFound("record".to_string()),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StorageError::Conflict(info.message().to_string())
            }
            _ => StorageError::Database(err.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::Blocking(err.to_string())
    }
}

/// Failure of one pipeline run for one feed.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failure of a worker function for a single queued task.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("feed ingestion failed: {0}")]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("screenshot capture is not configured")]
    ScreenshotDisabled,

    #[error("screenshot service error: {0}")]
    Screenshot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FetchError> for WorkerError {
    fn from(err: FetchError) -> Self {
        WorkerError::Ingest(IngestError::Fetch(err))
    }
}

/// A task could not be dispatched or its worker failed.
#[derive(Debug, Error)]
pub enum QueueDispatchError {
    #[error("job queue is shut down")]
    Closed,

    #[error("task abandoned during shutdown")]
    Abandoned,

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("worker panicked: {0}")]
    Panicked(String),
}

/// Invalid configuration value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// Top-level error for the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Queue(#[from] QueueDispatchError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;
