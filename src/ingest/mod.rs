pub mod dedup;
pub mod fetcher;
pub mod parser;
pub mod pipeline;
pub mod settle;
pub mod writer;

pub use fetcher::{FeedFetcher, FetchOutcome};
pub use pipeline::{FeedPipeline, IngestSummary, PipelineReport};
