mod common;

use common::*;
use digest_curator::{
    jaccard_similarity, Category, ContentItem, CurationPipeline, CuratorConfig, CuratorError,
    DedupConfig, Deduplicator, FetchOrchestrator, FetchOutcome, Ranker, RankerConfig, Result,
    RunMetrics, RunMetricsSink, SourceFetcher,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct RecordingSink {
    runs: Mutex<Vec<RunMetrics>>,
}

impl RunMetricsSink for RecordingSink {
    fn record(&self, metrics: &RunMetrics) {
        self.runs.lock().unwrap().push(metrics.clone());
    }
}

fn titles(items: &[ContentItem]) -> Vec<&str> {
    items.iter().map(|i| i.title.as_str()).collect()
}

#[test]
fn test_near_identical_titles_collapse_to_the_first() {
    let dedup = Deduplicator::new(DedupConfig::default());
    let items = vec![
        item(Category::News, "OpenAI launches GPT-5 model for developers today", "https://a.test/1"),
        item(Category::News, "Robots learn household chores from video", "https://b.test/2"),
        item(Category::News, "OpenAI launches GPT-5 model for developers", "https://c.test/3"),
    ];

    let kept = dedup.dedupe(items);
    assert_eq!(
        titles(&kept),
        vec![
            "OpenAI launches GPT-5 model for developers today",
            "Robots learn household chores from video",
        ]
    );
    assert!(
        jaccard_similarity(
            "OpenAI launches GPT-5 model for developers today",
            "OpenAI launches GPT-5 model for developers"
        ) > 0.7
    );
}

#[test]
fn test_body_overlap_alone_marks_a_duplicate() {
    let dedup = Deduplicator::new(DedupConfig::default());
    let body = "The lab released weights for a seven billion parameter model under an open licence";
    let items = vec![
        item(Category::News, "Lab opens its model", "https://a.test/1").with_body(body),
        item(Category::ForumDiscussion, "Weights are out, discuss", "https://b.test/2").with_body(body),
    ];

    let kept = dedup.dedupe(items);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].url, "https://a.test/1");
}

#[test]
fn test_empty_bodies_never_match_each_other() {
    let dedup = Deduplicator::new(DedupConfig::default());
    let items = vec![
        item(Category::News, "Chip export rules tighten again", "https://a.test/1"),
        item(Category::News, "Startup wins robotics grant", "https://b.test/2"),
    ];
    assert_eq!(dedup.dedupe(items).len(), 2);
}

#[test]
fn test_dedupe_is_idempotent() {
    let dedup = Deduplicator::new(DedupConfig::default());
    let items = vec![
        item(Category::News, "OpenAI launches GPT-5 model for developers today", "https://a.test/1"),
        item(Category::News, "OpenAI launches GPT-5 model for developers", "https://a.test/2"),
        item(Category::Research, "Sparse attention cuts inference cost", "https://a.test/3"),
    ];
    let once = dedup.dedupe(items);
    let twice = dedup.dedupe(once.clone());
    assert_eq!(once, twice);
}

#[test]
fn test_select_honours_budgets_and_keeps_tie_order() {
    let ranker = Ranker::new(RankerConfig::default());
    let items = vec![
        item(Category::News, "Alpha", "https://n.test/a"),
        item(Category::News, "Bravo", "https://n.test/b"),
        item(Category::News, "Charlie", "https://n.test/c"),
        item(Category::News, "Delta", "https://n.test/d").with_engagement(500, 0),
        item(Category::Research, "Unbudgeted paper", "https://r.test/p"),
    ];
    let budgets = BTreeMap::from([(Category::News, 2)]);

    let selected = ranker.select(items, &budgets);

    assert_eq!(selected.len(), 1);
    assert_eq!(titles(&selected[&Category::News]), vec!["Delta", "Alpha"]);
}

#[tokio::test]
async fn test_orchestrator_survives_failures_and_panics() {
    init_tracing();
    let fetchers: Vec<Arc<dyn SourceFetcher>> = vec![
        Arc::new(StaticFetcher::new(
            "papers",
            Category::Research,
            Behavior::Items(vec![item(Category::Research, "Paper one", "https://p.test/1")]),
        )),
        Arc::new(StaticFetcher::new("forum", Category::ForumDiscussion, Behavior::Fail)),
        Arc::new(StaticFetcher::new(
            "news",
            Category::News,
            Behavior::Items(vec![
                item(Category::News, "Story one", "https://n.test/1"),
                item(Category::News, "Story two", "https://n.test/2"),
            ]),
        )),
        Arc::new(StaticFetcher::new("trending", Category::ForumTrending, Behavior::Fail)),
        Arc::new(StaticFetcher::new("discovery", Category::NewsDiscovery, Behavior::Panic)),
    ];

    let report = FetchOrchestrator::new()
        .run_with_report(&fetchers, Duration::from_secs(5))
        .await;

    assert_eq!(report.total_items(), 3);
    assert_eq!(report.errors(), 3);
    assert_eq!(report.sources.len(), 5);
    assert_eq!(report.batches.len(), 5);
    assert!(matches!(
        report.sources[4].outcome,
        FetchOutcome::FailedSoft { .. }
    ));

    let grouped = report.into_grouped();
    assert_eq!(grouped.len(), 5);
    assert!(grouped[&Category::ForumDiscussion].is_empty());
    assert_eq!(grouped[&Category::News].len(), 2);
}

#[tokio::test]
async fn test_slow_fetcher_is_abandoned_at_the_deadline() {
    init_tracing();
    let fetchers: Vec<Arc<dyn SourceFetcher>> = vec![
        Arc::new(StaticFetcher::new(
            "slow",
            Category::Research,
            Behavior::Sleep(
                Duration::from_secs(10),
                vec![item(Category::Research, "Late paper", "https://p.test/late")],
            ),
        )),
        Arc::new(StaticFetcher::new(
            "fast",
            Category::News,
            Behavior::Items(vec![item(Category::News, "Quick story", "https://n.test/q")]),
        )),
    ];

    let started = Instant::now();
    let report = FetchOrchestrator::new()
        .run_with_report(&fetchers, Duration::from_millis(200))
        .await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(report.timed_out(), 1);
    assert_eq!(report.sources[0].outcome, FetchOutcome::TimedOut);
    let grouped = report.into_grouped();
    assert!(grouped[&Category::Research].is_empty());
    assert_eq!(grouped[&Category::News].len(), 1);
}

#[test]
fn test_builder_rejects_unusable_configuration() {
    let config = CuratorConfig::default();
    let fetcher = || StaticFetcher::new("news", Category::News, Behavior::Items(vec![]));

    let no_fetchers = CurationPipeline::builder(&config).build();
    assert!(matches!(no_fetchers, Err(CuratorError::Configuration(_))));

    let zero_deadline = CurationPipeline::builder(&config)
        .add_fetcher(fetcher())
        .deadline(Duration::ZERO)
        .build();
    assert!(matches!(zero_deadline, Err(CuratorError::Configuration(_))));

    let zero_budget = CurationPipeline::builder(&config)
        .add_fetcher(fetcher())
        .budget(Category::News, 0)
        .build();
    assert!(matches!(zero_budget, Err(CuratorError::Configuration(_))));

    let mut unbudgeted = CuratorConfig::default();
    unbudgeted.budgets.clear();
    let no_budgets = CurationPipeline::builder(&unbudgeted)
        .add_fetcher(fetcher())
        .build();
    assert!(matches!(no_budgets, Err(CuratorError::Configuration(_))));
}

#[tokio::test]
async fn test_pipeline_dedupes_ranks_and_reports() -> Result<()> {
    init_tracing();
    let config = CuratorConfig::default();
    let research: Vec<ContentItem> = [
        "OpenAI launches GPT-5 model for developers today",
        "Sparse attention cuts inference cost",
        "Robots learn household chores from video",
        "Protein folding predictions get sharper",
        "Benchmark suite for code agents",
        "Diffusion models compose music",
    ]
    .iter()
    .enumerate()
    .map(|(idx, title)| item(Category::Research, title, &format!("https://p.test/{}", idx)))
    .collect();
    let news = vec![
        item(Category::News, "OpenAI launches GPT-5 model for developers", "https://n.test/gpt5"),
        item(Category::News, "Chip export rules tighten again", "https://n.test/chips"),
    ];

    let sink = Arc::new(RecordingSink::default());
    let pipeline = CurationPipeline::builder(&config)
        .add_fetcher(StaticFetcher::new("papers", Category::Research, Behavior::Items(research)))
        .add_fetcher(StaticFetcher::new("news", Category::News, Behavior::Items(news)))
        .add_fetcher(StaticFetcher::new("forum", Category::ForumDiscussion, Behavior::Fail))
        .deadline(Duration::from_secs(5))
        .metrics_sink(sink.clone())
        .build()?;

    assert_eq!(pipeline.fetcher_names(), vec!["papers", "news", "forum"]);

    let digest = pipeline.run().await;

    assert_eq!(digest.category(Category::Research).len(), 4);
    assert_eq!(
        titles(digest.category(Category::News)),
        vec!["Chip export rules tighten again"]
    );
    assert!(digest.category(Category::ForumDiscussion).is_empty());
    assert_eq!(digest.total_items(), 5);

    let runs = sink.runs.lock().unwrap();
    assert_eq!(runs.len(), 1);
    let metrics = &runs[0];
    assert_eq!(metrics.fetched, 8);
    assert_eq!(metrics.duplicates_removed, 1);
    assert_eq!(metrics.selected, 5);
    assert_eq!(metrics.errors, 1);
    assert_eq!(metrics.timed_out, 0);
    assert_eq!(metrics.per_category[&Category::Research], 4);
    assert_eq!(metrics.run_id, digest.metrics.run_id);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_across_categories_keeps_the_earlier_fetcher() -> Result<()> {
    init_tracing();
    let config = CuratorConfig::default();
    let title = "Sparse mixture of experts beats dense baselines";
    let pipeline = CurationPipeline::builder(&config)
        .add_fetcher(StaticFetcher::new(
            "forum",
            Category::ForumDiscussion,
            Behavior::Items(vec![item(Category::ForumDiscussion, title, "https://reddit.test/moe")]),
        ))
        .add_fetcher(StaticFetcher::new(
            "papers",
            Category::Research,
            Behavior::Items(vec![item(Category::Research, title, "https://arxiv.test/moe")]),
        ))
        .deadline(Duration::from_secs(5))
        .build()?;

    let digest = pipeline.run().await;

    assert_eq!(digest.category(Category::ForumDiscussion).len(), 1);
    assert!(digest.category(Category::Research).is_empty());
    assert_eq!(digest.metrics.duplicates_removed, 1);
    Ok(())
}

#[test]
fn test_short_headline_rewording_stays_below_the_threshold() {
    assert_eq!(
        jaccard_similarity("GPT-5 launches today", "OpenAI launches GPT-5"),
        0.5
    );

    let dedup = Deduplicator::new(DedupConfig::default());
    let kept = dedup.dedupe(vec![
        item(Category::News, "GPT-5 launches today", "https://a.test/gpt5"),
        item(Category::News, "OpenAI launches GPT-5", "https://b.test/gpt5"),
    ]);
    assert_eq!(kept.len(), 2);
}
