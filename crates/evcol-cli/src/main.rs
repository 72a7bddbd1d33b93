use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use evcol_storage::{EventStore, InMemoryEventStore, PgEventStore};
use evcol_sync::{build_collector, build_scheduler, CollectorConfig, RegionBackfill, RunSummary};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "evcol")]
#[command(about = "Event collector command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run every enabled source once, then backfill regions.
    Collect {
        /// Keep records in process memory instead of Postgres.
        #[arg(long)]
        in_memory: bool,
        /// Print the full run summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Classify stored records that have no region.
    BackfillRegions,
    /// Print the region code a location string maps to.
    Classify { location: Vec<String> },
    /// Apply the embedded Postgres migrations.
    Migrate,
    /// Run collections on a cron schedule until interrupted.
    Schedule {
        /// Six-field cron expression; overrides EVCOL_SCHEDULER_CRON.
        #[arg(long)]
        cron: Option<String>,
        #[arg(long)]
        in_memory: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_json = std::env::var("EVCOL_LOG_JSON")
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(false);
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn open_store(config: &CollectorConfig, in_memory: bool) -> Result<Arc<dyn EventStore>> {
    if in_memory {
        return Ok(Arc::new(InMemoryEventStore::new()));
    }
    let store = PgEventStore::connect(&config.database_url)
        .await
        .context("connecting to DATABASE_URL")?;
    Ok(Arc::new(store))
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(summary).context("serializing run summary")?
        );
        return Ok(());
    }
    println!(
        "collect complete: run_id={} pages={} created={} updated={} skipped={} rejected={} enriched={} backfilled={} errors={}",
        summary.run_id,
        summary.pages_fetched,
        summary.created,
        summary.updated,
        summary.skipped_duplicates + summary.skipped_frozen,
        summary.rejected,
        summary.enriched,
        summary.backfilled,
        summary.errors.len()
    );
    for (category, count) in &summary.counts_by_category {
        println!("  {category}: {count}");
    }
    if let Some(dir) = &summary.report_dir {
        println!("  report: {dir}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = CollectorConfig::from_env();

    match cli.command.unwrap_or(Commands::Collect {
        in_memory: false,
        json: false,
    }) {
        Commands::Collect { in_memory, json } => {
            let store = open_store(&config, in_memory).await?;
            let collector = build_collector(&config, store)?;
            let summary = collector.run().await;
            print_summary(&summary, json)?;
        }
        Commands::BackfillRegions => {
            let store = open_store(&config, false).await?;
            let classifier = Arc::new(config.load_classifier()?);
            let report = RegionBackfill::new(store, classifier).run().await;
            println!(
                "backfill complete: examined={} updated={} errors={}",
                report.examined,
                report.updated,
                report.errors.len()
            );
        }
        Commands::Classify { location } => {
            let classifier = config.load_classifier()?;
            println!("{}", classifier.classify(&location.join(" ")));
        }
        Commands::Migrate => {
            let store = PgEventStore::connect(&config.database_url)
                .await
                .context("connecting to DATABASE_URL")?;
            store.migrate().await.context("applying migrations")?;
            println!("migrations applied");
        }
        Commands::Schedule { cron, in_memory } => {
            let cron = cron.unwrap_or_else(|| config.scheduler_cron.clone());
            let store = open_store(&config, in_memory).await?;
            let collector = Arc::new(build_collector(&config, store)?);
            let mut sched = build_scheduler(collector, &cron).await?;
            sched.start().await.context("starting scheduler")?;
            info!(%cron, "scheduler started; waiting for ctrl-c");
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            sched.shutdown().await.context("stopping scheduler")?;
        }
    }

    Ok(())
}
