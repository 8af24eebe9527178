use crate::config::CuratorConfig;
use crate::dedup::{DedupConfig, Deduplicator};
use crate::orchestrator::{FetchOrchestrator, FetchReport};
use crate::ranker::{Ranker, RankerConfig};
use crate::traits::{FetchContext, RunMetricsSink, SourceFetcher, TracingMetricsSink};
use crate::types::{Category, CuratorError, Digest, Result, RunMetrics};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(300);

/// Fetch, deduplicate, rank. One run produces one `Digest`.
pub struct CurationPipeline {
    fetchers: Vec<Arc<dyn SourceFetcher>>,
    orchestrator: FetchOrchestrator,
    deduplicator: Deduplicator,
    ranker: Ranker,
    budgets: BTreeMap<Category, usize>,
    deadline: Duration,
    metrics_sink: Arc<dyn RunMetricsSink>,
}

impl CurationPipeline {
    pub fn builder(config: &CuratorConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    pub fn fetcher_names(&self) -> Vec<String> {
        self.fetchers.iter().map(|f| f.source_name()).collect()
    }

    /// Run with the configured deadline starting now. Always returns a digest, possibly empty.
    pub async fn run(&self) -> Digest {
        let ctx = FetchContext::new(Instant::now() + self.deadline, Utc::now());
        self.run_in(ctx).await
    }

    pub async fn run_in(&self, ctx: FetchContext) -> Digest {
        let started = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        info!("Starting curation run {}", run_id);

        let report = self.orchestrator.run_in(&self.fetchers, ctx).await;
        let fetched = report.total_items();
        let errors = report.errors();
        let timed_out = report.timed_out();
        let skipped_records = report.skipped_records();

        // Registration order decides which copy of a duplicate survives.
        let FetchReport { batches, sources } = report;
        let combined: Vec<_> = batches.into_iter().flatten().collect();
        let unique = self.deduplicator.dedupe(combined);
        let duplicates_removed = fetched - unique.len();
        info!("Removed {} near-duplicates", duplicates_removed);

        let items = self.ranker.select(unique, &self.budgets);
        let per_category: BTreeMap<Category, usize> =
            items.iter().map(|(c, list)| (*c, list.len())).collect();
        let selected = per_category.values().sum();

        let metrics = RunMetrics {
            run_id,
            started_at,
            elapsed_ms: started.elapsed().as_millis() as u64,
            fetched,
            duplicates_removed,
            selected,
            per_category,
            errors,
            timed_out,
            skipped_records,
            sources,
        };
        self.metrics_sink.record(&metrics);

        Digest { items, metrics }
    }
}

pub struct PipelineBuilder {
    fetchers: Vec<Arc<dyn SourceFetcher>>,
    dedup: DedupConfig,
    ranker: RankerConfig,
    budgets: BTreeMap<Category, usize>,
    deadline: Duration,
    metrics_sink: Arc<dyn RunMetricsSink>,
}

impl PipelineBuilder {
    pub fn new(config: &CuratorConfig) -> Self {
        Self {
            fetchers: Vec::new(),
            dedup: DedupConfig::default(),
            ranker: RankerConfig::from_vocabulary(&config.vocabulary),
            budgets: config.budgets.clone(),
            deadline: DEFAULT_DEADLINE,
            metrics_sink: Arc::new(TracingMetricsSink),
        }
    }

    pub fn add_fetcher(mut self, fetcher: impl SourceFetcher + 'static) -> Self {
        self.fetchers.push(Arc::new(fetcher));
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn dedup_config(mut self, config: DedupConfig) -> Self {
        self.dedup = config;
        self
    }

    pub fn ranker_config(mut self, config: RankerConfig) -> Self {
        self.ranker = config;
        self
    }

    pub fn budget(mut self, category: Category, max_items: usize) -> Self {
        self.budgets.insert(category, max_items);
        self
    }

    pub fn metrics_sink(mut self, sink: Arc<dyn RunMetricsSink>) -> Self {
        self.metrics_sink = sink;
        self
    }

    /// Construction is the only place the pipeline can fail.
    pub fn build(self) -> Result<CurationPipeline> {
        if self.fetchers.is_empty() {
            return Err(CuratorError::Configuration(
                "pipeline needs at least one fetcher".to_string(),
            ));
        }
        if self.deadline.is_zero() {
            return Err(CuratorError::Configuration(
                "deadline must be positive".to_string(),
            ));
        }
        if self.budgets.is_empty() {
            return Err(CuratorError::Configuration(
                "no category budgets configured".to_string(),
            ));
        }
        if let Some((category, _)) = self.budgets.iter().find(|(_, budget)| **budget == 0) {
            return Err(CuratorError::Configuration(format!(
                "budget for {} must be positive",
                category
            )));
        }

        info!(
            "Built pipeline with {} fetchers, deadline {:?}",
            self.fetchers.len(),
            self.deadline
        );
        Ok(CurationPipeline {
            fetchers: self.fetchers,
            orchestrator: FetchOrchestrator::new(),
            deduplicator: Deduplicator::new(self.dedup),
            ranker: Ranker::new(self.ranker),
            budgets: self.budgets,
            deadline: self.deadline,
            metrics_sink: self.metrics_sink,
        })
    }
}
