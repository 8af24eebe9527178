use crate::fetcher::{HttpRequest, HttpResponse};
use crate::types::{Category, FetchBatch, Result, RunMetrics, SourceKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::info;

/// Outbound HTTP, abstracted so fetchers can run against canned responses.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Per-run context shared by every fetcher.
#[derive(Debug, Clone, Copy)]
pub struct FetchContext {
    /// Global deadline for the fetch phase.
    pub deadline: Instant,
    /// Reference time for all window checks in this run.
    pub now: DateTime<Utc>,
}

impl FetchContext {
    pub fn new(deadline: Instant, now: DateTime<Utc>) -> Self {
        Self { deadline, now }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Trait for pulling curated content from one source (feed, forum, discovery, ...)
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Human-readable name for this source
    fn source_name(&self) -> String;

    fn source_kind(&self) -> SourceKind;

    /// Display bucket every item from this fetcher lands in
    fn category(&self) -> Category;

    /// Fetch, filter and bound the items currently available from the source.
    ///
    /// Malformed records are skipped and counted, never returned as errors.
    async fn fetch(&self, ctx: &FetchContext) -> Result<FetchBatch>;
}

/// Receives the summary of each completed run.
pub trait RunMetricsSink: Send + Sync {
    fn record(&self, metrics: &RunMetrics);
}

/// Writes run metrics to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricsSink;

impl RunMetricsSink for TracingMetricsSink {
    fn record(&self, metrics: &RunMetrics) {
        info!(
            "Run {} finished in {}ms: fetched={} duplicates_removed={} selected={} errors={} timed_out={} skipped_records={}",
            metrics.run_id,
            metrics.elapsed_ms,
            metrics.fetched,
            metrics.duplicates_removed,
            metrics.selected,
            metrics.errors,
            metrics.timed_out,
            metrics.skipped_records
        );
        for (category, count) in &metrics.per_category {
            info!("  {}: {} items", category, count);
        }
        for report in &metrics.sources {
            info!(
                "  {} [{}] {:?} ({}ms, {} skipped)",
                report.source_name, report.category, report.outcome, report.elapsed_ms, report.skipped
            );
        }
    }
}
