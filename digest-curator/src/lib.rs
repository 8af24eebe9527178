pub mod config;
pub mod dedup;
pub mod fetcher;
pub mod orchestrator;
pub mod parser;
pub mod pipeline;
pub mod ranker;
pub mod relevance;
pub mod rss_utils;
pub mod sources;
pub mod traits;
pub mod types;

pub use config::{CuratorConfig, ForumCredentials, Vocabulary};
pub use dedup::{jaccard_similarity, DedupConfig, Deduplicator};
pub use fetcher::{Fetcher, HttpMethod, HttpRequest, HttpResponse};
pub use orchestrator::{FetchOrchestrator, FetchReport};
pub use parser::FeedParser;
pub use pipeline::{CurationPipeline, PipelineBuilder};
pub use ranker::{Ranker, RankerConfig};
pub use relevance::RelevanceFilter;
pub use traits::{FetchContext, HttpTransport, RunMetricsSink, SourceFetcher, TracingMetricsSink};
pub use types::*;
