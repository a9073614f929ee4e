//! Sumi-Linkgraph main entry point
//!
//! Crawls outward from seed URLs and streams every graph update to stdout as
//! one JSON object per line.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sumi_linkgraph::config::{load_config_with_hash, validate, Config};
use sumi_linkgraph::events::{handler_fn, EventKind, EventPayload};
use sumi_linkgraph::pipeline::{Pipeline, PipelineContext};
use sumi_linkgraph::url::fetch_target;
use sumi_linkgraph::{build_cache, SumiError};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Sumi-Linkgraph: a polite crawler that maps the web as a link graph
///
/// Every node added or updated is printed to stdout as a JSON line.
/// Logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "sumi-linkgraph")]
#[command(version)]
#[command(about = "Crawl from seed URLs and stream link-graph updates", long_about = None)]
struct Cli {
    /// Seed URLs to start crawling from
    #[arg(value_name = "URL", required = true)]
    seeds: Vec<String>,

    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Stop after this many seconds even if work remains
    #[arg(long, value_name = "SECS")]
    run_for: Option<u64>,

    /// Stop once no handler has run for this many seconds
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    idle_secs: u64,

    /// Validate config and seeds, then exit without crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => {
            let config = Config::default();
            validate(&config)?;
            tracing::info!("No configuration file given, using defaults");
            config
        }
    };

    let seeds = cli
        .seeds
        .iter()
        .map(|seed| fetch_target(seed).with_context(|| format!("invalid seed URL: {}", seed)))
        .collect::<anyhow::Result<Vec<_>>>()?;

    if cli.dry_run {
        print_dry_run(&config, &seeds);
        return Ok(());
    }

    handle_crawl(config, seeds, &cli).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_linkgraph=info,warn"),
            1 => EnvFilter::new("sumi_linkgraph=debug,info"),
            2 => EnvFilter::new("sumi_linkgraph=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn print_dry_run(config: &Config, seeds: &[url::Url]) {
    println!("=== Sumi-Linkgraph Dry Run ===\n");

    println!("Service: {}", config.service.name);
    println!("User agent: {}", config.user_agent.user_agent_string());

    println!("\nCache:");
    println!("  Backend: {:?}", config.cache.backend);
    println!(
        "  Window: {}s - {}s",
        config.cache.min_duration_secs, config.cache.max_duration_secs
    );

    println!("\nCrawl:");
    println!("  Max depth: {}", config.crawl.max_depth);
    println!("  Max links per page: {}", config.crawl.max_links);
    println!("  Minimum host delay: {}ms", config.crawl.min_host_delay_ms);
    println!("  Re-crawl after: {} days", config.crawl.stale_after_days);

    println!("\nAdmission ceilings:");
    let ceilings = config.dispatch.ceilings();
    for kind in EventKind::all() {
        let ceiling = ceilings
            .get(&kind)
            .copied()
            .unwrap_or(config.dispatch.default_concurrency);
        println!("  {}: {}", kind, ceiling);
    }

    println!("\nSeeds ({}):", seeds.len());
    for seed in seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Runs the pipeline until idle, the time limit, or Ctrl-C
async fn handle_crawl(config: Config, seeds: Vec<url::Url>, cli: &Cli) -> anyhow::Result<()> {
    let cache = build_cache(&config.cache).await?;
    let context = Arc::new(PipelineContext::from_config(&config, cache)?);
    let pipeline = Pipeline::register(context.clone());

    let printer = handler_fn("stdout", |event, _cancel| async move {
        if let EventPayload::NodeAdded(added) = &event.payload {
            let line =
                serde_json::to_string(&added.node).map_err(|e| SumiError::Handler(e.to_string()))?;
            println!("{}", line);
        }
        Ok::<_, SumiError>(())
    });
    context
        .dispatcher
        .subscribe(EventKind::NodeAdded, printer.clone());

    let cancel = CancellationToken::new();
    let seeded = futures::future::join_all(
        seeds
            .iter()
            .map(|seed| pipeline.seed(seed.as_str(), &cancel)),
    )
    .await;
    for result in seeded {
        result?;
    }
    tracing::info!("Seeded {} URLs", seeds.len());

    let limit = cli.run_for.map(Duration::from_secs);
    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted, shutting down"),
        _ = sleep_or_forever(limit) => tracing::info!("Time limit reached, shutting down"),
        _ = pipeline.wait_until_idle(Duration::from_secs(cli.idle_secs)) => {
            tracing::info!("Pipeline idle, shutting down")
        }
    }

    cancel.cancel();
    pipeline.unregister();
    context.dispatcher.unsubscribe(EventKind::NodeAdded, &printer);

    tracing::info!(
        nodes = context.graph.node_count(),
        edges = context.graph.edge_count(),
        "Crawl finished"
    );
    Ok(())
}

async fn sleep_or_forever(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}
