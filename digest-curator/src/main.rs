use anyhow::Context;
use clap::Parser;
use digest_curator::sources::{DiscoverySource, FeedSource, ForumSource, HackerNewsSource};
use digest_curator::{Category, CurationPipeline, CuratorConfig, Fetcher, HttpTransport, Vocabulary};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Collect, deduplicate and rank fresh AI news, papers and forum posts.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Global deadline for the fetch phase, in seconds
    #[arg(long, default_value_t = 300)]
    deadline_secs: u64,

    /// JSON file replacing the built-in keyword vocabulary
    #[arg(long)]
    vocabulary: Option<PathBuf>,

    /// Print the digest as JSON instead of a text summary
    #[arg(long)]
    json: bool,

    /// Leave out the forum fetchers
    #[arg(long)]
    skip_forums: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    info!("Starting digest curator");

    let mut config = CuratorConfig::from_env().context("loading configuration")?;
    if let Some(path) = &cli.vocabulary {
        let vocabulary = Vocabulary::from_json_file(path)
            .with_context(|| format!("loading vocabulary from {}", path.display()))?;
        config = config
            .with_vocabulary(vocabulary)
            .context("validating vocabulary")?;
    }
    config.log_credentials();

    let transport: Arc<dyn HttpTransport> =
        Arc::new(Fetcher::new(config.fetch.clone()).context("building HTTP client")?);

    // Forums first: on a duplicate the earlier fetcher's copy is kept.
    let mut builder =
        CurationPipeline::builder(&config).deadline(Duration::from_secs(cli.deadline_secs));
    if cli.skip_forums {
        warn!("Forum fetchers disabled");
    } else {
        builder = builder
            .add_fetcher(ForumSource::discussions(transport.clone(), &config))
            .add_fetcher(ForumSource::trending(transport.clone(), &config));
    }
    let pipeline = builder
        .add_fetcher(FeedSource::research(transport.clone(), &config)?)
        .add_fetcher(DiscoverySource::news(transport.clone(), &config))
        .add_fetcher(FeedSource::news_queries(transport.clone(), &config)?)
        .add_fetcher(HackerNewsSource::new(transport.clone(), &config))
        .build()
        .context("building pipeline")?;

    let digest = pipeline.run().await;

    if cli.json {
        let json = serde_json::to_string_pretty(&digest).context("serializing digest")?;
        println!("{}", json);
    } else {
        for category in Category::ALL {
            let items = digest.category(category);
            if items.is_empty() {
                continue;
            }
            println!("== {} ({}) ==", category, items.len());
            for item in items {
                println!("- {} [{}]", item.title, item.source_name);
                println!("  {}", item.url);
            }
        }
    }

    info!(
        "Digest ready: {} items in {}ms",
        digest.total_items(),
        digest.metrics.elapsed_ms
    );
    Ok(())
}
