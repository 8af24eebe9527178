use crate::traits::{FetchContext, SourceFetcher};
use crate::types::{Category, ContentItem, FetchOutcome, SourceReport};
use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// What each fetcher returned and how it ended, both in registration order.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub batches: Vec<Vec<ContentItem>>,
    pub sources: Vec<SourceReport>,
}

impl FetchReport {
    pub fn total_items(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    /// Items keyed by their own category. Every fetcher's category has an entry, possibly
    /// empty.
    pub fn into_grouped(self) -> BTreeMap<Category, Vec<ContentItem>> {
        let mut grouped: BTreeMap<Category, Vec<ContentItem>> = self
            .sources
            .iter()
            .map(|s| (s.category, Vec::new()))
            .collect();
        for item in self.batches.into_iter().flatten() {
            grouped.entry(item.category()).or_default().push(item);
        }
        grouped
    }

    pub fn skipped_records(&self) -> usize {
        self.sources.iter().map(|s| s.skipped).sum()
    }

    pub fn errors(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| matches!(s.outcome, FetchOutcome::FailedSoft { .. }))
            .count()
    }

    pub fn timed_out(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| s.outcome == FetchOutcome::TimedOut)
            .count()
    }
}

/// Runs every fetcher concurrently under one deadline. Never fails: a fetcher that
/// errors, panics or overruns contributes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct FetchOrchestrator;

impl FetchOrchestrator {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(
        &self,
        fetchers: &[Arc<dyn SourceFetcher>],
        deadline: Duration,
    ) -> BTreeMap<Category, Vec<ContentItem>> {
        self.run_with_report(fetchers, deadline).await.into_grouped()
    }

    pub async fn run_with_report(
        &self,
        fetchers: &[Arc<dyn SourceFetcher>],
        deadline: Duration,
    ) -> FetchReport {
        let ctx = FetchContext::new(Instant::now() + deadline, Utc::now());
        self.run_in(fetchers, ctx).await
    }

    /// Run against an explicit context (fixed `now`, absolute deadline).
    pub async fn run_in(&self, fetchers: &[Arc<dyn SourceFetcher>], ctx: FetchContext) -> FetchReport {
        info!("Dispatching {} fetchers", fetchers.len());

        let handles: Vec<_> = fetchers
            .iter()
            .map(|fetcher| {
                let fetcher = fetcher.clone();
                tokio::spawn(async move {
                    let started = Instant::now();
                    let result = tokio::time::timeout_at(ctx.deadline, fetcher.fetch(&ctx)).await;
                    (result, started.elapsed())
                })
            })
            .collect();

        let settled = join_all(handles).await;

        let mut report = FetchReport::default();
        for (fetcher, joined) in fetchers.iter().zip(settled) {
            let name = fetcher.source_name();
            let category = fetcher.category();

            let (outcome, skipped, elapsed) = match joined {
                Ok((Ok(Ok(batch)), elapsed)) => {
                    let count = batch.items.len();
                    let skipped = batch.skipped;
                    report.batches.push(batch.items);
                    let outcome = match batch.degraded {
                        Some(reason) => {
                            info!("{} degraded ({} items): {}", name, count, reason);
                            FetchOutcome::Degraded { items: count, reason }
                        }
                        None => {
                            info!("{} returned {} items", name, count);
                            FetchOutcome::Succeeded { items: count }
                        }
                    };
                    (outcome, skipped, elapsed)
                }
                Ok((Ok(Err(e)), elapsed)) => {
                    report.batches.push(Vec::new());
                    error!("{} failed: {}", name, e);
                    (FetchOutcome::FailedSoft { error: e.to_string() }, 0, elapsed)
                }
                Ok((Err(_), elapsed)) => {
                    report.batches.push(Vec::new());
                    warn!("{} abandoned at the deadline", name);
                    (FetchOutcome::TimedOut, 0, elapsed)
                }
                Err(join_error) => {
                    report.batches.push(Vec::new());
                    error!("{} task failed: {}", name, join_error);
                    let outcome = FetchOutcome::FailedSoft {
                        error: format!("task failed: {}", join_error),
                    };
                    (outcome, 0, Duration::ZERO)
                }
            };

            report.sources.push(SourceReport {
                source_name: name,
                category,
                outcome,
                skipped,
                elapsed_ms: elapsed.as_millis() as u64,
            });
        }

        info!(
            "Fetch phase done: {} items, {} errors, {} timed out",
            report.total_items(),
            report.errors(),
            report.timed_out()
        );
        report
    }
}
