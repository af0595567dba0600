//! Command-line entry point: `crawl`, `schedule`, and `validate-sources`.
//! Flags are assembled into the library crates' config structs and threaded
//! straight through; this binary owns no business logic of its own.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use crawl_core::EntityType;
use crawl_orchestrate::{
    plan, run_crawl, run_scheduler_loop, PlannedJobView, RunConfig, SchedulerConfig,
};

#[derive(Debug, Parser)]
#[command(name = "crawl-cli")]
#[command(about = "Listings crawler command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Plan and run a single crawl across the enabled sources.
    Crawl(CrawlArgs),
    /// Drive the crawl on a fixed interval, per a scheduler config file.
    Schedule(ScheduleArgs),
    /// Validate the sources CSV without crawling anything.
    ValidateSources(ValidateSourcesArgs),
}

#[derive(Debug, Args)]
struct CrawlArgs {
    #[arg(long, default_value = "sources.csv")]
    sources: PathBuf,
    #[arg(long, default_value = "schemas")]
    schemas: PathBuf,
    #[arg(long, default_value = "data")]
    data_root: PathBuf,
    #[arg(long = "type", default_value = "events", value_parser = parse_entity_type_filter)]
    entity_type: Option<EntityType>,
    #[arg(long, default_value_t = 100)]
    limit: usize,
    #[arg(long = "source-id")]
    source_id: Option<String>,
    #[arg(long, default_value_t = 3)]
    concurrency: usize,
    #[arg(long, default_value_t = 2.0)]
    qps: f64,
    #[arg(long, default_value_t = 30)]
    timeout: u64,
    #[arg(long)]
    since: Option<DateTime<Utc>>,
    #[arg(long)]
    until: Option<DateTime<Utc>>,
    #[arg(long, default_value = "listings-crawler/0.1")]
    user_agent: String,
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct ScheduleArgs {
    #[arg(long, default_value = "sources.csv")]
    sources: PathBuf,
    #[arg(long, default_value = "schemas")]
    schemas: PathBuf,
    #[arg(long, default_value = "data")]
    data_root: PathBuf,
    #[arg(long, default_value = "scheduler.yaml")]
    scheduler_config: PathBuf,
    #[arg(long)]
    ticks: Option<u64>,
    #[arg(long = "interval-secs")]
    interval_secs: Option<u64>,
    #[arg(long, default_value_t = 3)]
    concurrency: usize,
    #[arg(long, default_value_t = 2.0)]
    qps: f64,
    #[arg(long, default_value_t = 30)]
    timeout: u64,
    #[arg(long, default_value = "listings-crawler/0.1")]
    user_agent: String,
}

#[derive(Debug, Args)]
struct ValidateSourcesArgs {
    #[arg(long, default_value = "sources.csv")]
    sources: PathBuf,
}

fn parse_entity_type_filter(raw: &str) -> std::result::Result<Option<EntityType>, String> {
    if raw.eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    raw.parse::<EntityType>().map(Some).map_err(|e| e.to_string())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("CRAWL_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl(args) => run_crawl_command(args).await,
        Commands::Schedule(args) => run_schedule_command(args).await,
        Commands::ValidateSources(args) => run_validate_sources_command(args),
    }
}

async fn run_crawl_command(args: CrawlArgs) -> Result<()> {
    let mut config = RunConfig::new(args.sources, args.schemas, args.data_root);
    config.entity_type = args.entity_type;
    config.source_id_filter = args.source_id;
    config.limit = args.limit;
    config.concurrency = args.concurrency.max(1);
    config.qps = args.qps;
    config.timeout = Duration::from_secs(args.timeout);
    config.since = args.since;
    config.until = args.until;
    config.user_agent = args.user_agent;

    if args.dry_run {
        let jobs = plan(&config).context("planning jobs")?;
        let views: Vec<PlannedJobView> = jobs.iter().map(PlannedJobView::from).collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    let manifest = run_crawl(config).await.context("running crawl")?;
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}

async fn run_schedule_command(args: ScheduleArgs) -> Result<()> {
    let scheduler = SchedulerConfig::load(&args.scheduler_config).context("loading scheduler config")?;
    let interval_seconds = args.interval_secs.unwrap_or(scheduler.interval_seconds);
    let mut scheduler = scheduler;
    scheduler.interval_seconds = interval_seconds;

    let mut base = RunConfig::new(args.sources, args.schemas, args.data_root);
    base.concurrency = args.concurrency.max(1);
    base.qps = args.qps;
    base.timeout = Duration::from_secs(args.timeout);
    base.user_agent = args.user_agent;

    let manifests = run_scheduler_loop(base, scheduler, args.ticks)
        .await
        .context("running scheduler loop")?;
    println!("{}", serde_json::to_string_pretty(&manifests)?);
    Ok(())
}

fn run_validate_sources_command(args: ValidateSourcesArgs) -> Result<()> {
    let results = crawl_orchestrate::source_registry::validate_sources(&args.sources)
        .context("validating sources")?;

    let mut any_failed = false;
    for result in &results {
        let status = if !result.ok {
            any_failed = true;
            "FAIL"
        } else if result.detail == "disabled" {
            "DISABLED"
        } else {
            "OK"
        };
        let line = serde_json::json!({
            "source_id": result.source_id,
            "status": status,
            "detail": result.detail,
        });
        println!("{line}");
    }

    if any_failed {
        std::process::exit(1);
    }
    Ok(())
}
