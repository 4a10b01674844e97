use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::info;
use url::Url;

use quotes_scraper::api::{self, AppState};
use quotes_scraper::config::Settings;
use quotes_scraper::db::Store;
use quotes_scraper::fetch::HttpSessionFactory;
use quotes_scraper::pipeline::{run_scrape, PipelineOptions};
use quotes_scraper::promote::promote_authors;
use quotes_scraper::scheduler::Scheduler;
use quotes_scraper::service::{ScrapeService, SCRAPE_KIND};
use quotes_scraper::stats::{catalog_stats, print_stats};
use quotes_scraper::tasks::{TaskBackend, TaskExecutor};

#[derive(Parser)]
#[command(name = "quotes_scraper", about = "Quotes catalog with a scrape-ingest pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API with background workers and the scheduler
    Serve,
    /// Scrape quotes and authors once, in the foreground
    Scrape {
        /// Only the first listing page
        #[arg(long)]
        single_page: bool,
    },
    /// Promote staging authors to canonical authors
    Promote,
    /// Show catalog statistics
    Stats,
    /// List recorded scrape tasks
    Tasks {
        /// Filter by task kind (e.g. "scrape_data")
        #[arg(short, long)]
        kind: Option<String>,
    },
    /// Drop expired staging authors no quote refers to
    Purge,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load().context("loading settings")?;
    info!(?settings, "Starting quotes_scraper");

    let store = Arc::new(
        Store::open(&settings.db_path)
            .with_context(|| format!("opening {:?}", settings.db_path))?,
    );
    let source_url = Url::parse(&settings.source_url)
        .with_context(|| format!("invalid source url {}", settings.source_url))?;
    let sessions = Arc::new(HttpSessionFactory {
        detail_timeout: settings.fetch_timeout(),
    });

    let result = match cli.command {
        Commands::Serve => {
            let backend = TaskBackend::new();
            let scrape = ScrapeService::new(Arc::clone(&store), backend, sessions, source_url);
            let _workers = TaskExecutor::start(scrape.backend(), settings.workers);
            let _scheduler = settings.scheduler_enabled.then(|| {
                Scheduler::new(
                    Arc::clone(&scrape),
                    settings.schedule_period(),
                    settings.retention(),
                )
                .start()
            });
            api::serve(AppState { store, scrape }, &settings.bind).await
        }
        Commands::Scrape { single_page } => {
            let record = store.create_task(SCRAPE_KIND, None, None)?;
            let options = PipelineOptions {
                source_url,
                single_page,
            };

            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
            );
            let report = |meta: Value| {
                let phase = meta["scraping"].as_str().unwrap_or("-");
                let fetched = meta["fetched_records"].as_u64().unwrap_or(0);
                match meta["total"].as_u64() {
                    Some(total) => pb.set_message(format!("{phase}: {fetched}/{total}")),
                    None => pb.set_message(format!("{phase}: {fetched}")),
                }
                pb.tick();
            };

            let outcome =
                run_scrape(&store, sessions.as_ref(), record.id, &options, &report).await?;
            pb.finish_and_clear();
            println!(
                "Task {}: quotes {}, authors {}",
                record.id, outcome.phases.quote_phase, outcome.phases.author_phase
            );
            println!("{}", serde_json::to_string_pretty(&outcome.result)?);
            Ok(())
        }
        Commands::Promote => {
            let s = promote_authors(&store)?;
            println!(
                "Promoted: {} created, {} merged, {} quotes relinked.",
                s.created, s.merged, s.relinked_quotes
            );
            Ok(())
        }
        Commands::Stats => {
            print_stats(&catalog_stats(&store)?);
            Ok(())
        }
        Commands::Tasks { kind } => {
            let tasks = store.list_tasks(kind.as_deref())?;
            if tasks.is_empty() {
                println!("No tasks recorded.");
                return Ok(());
            }
            println!(
                "{:>4} | {:<13} | {:<11} | {:<11} | {:<36} | {:<19}",
                "#", "Kind", "Quotes", "Authors", "Task id", "Created"
            );
            println!("{}", "-".repeat(108));
            for t in &tasks {
                println!(
                    "{:>4} | {:<13} | {:<11} | {:<11} | {:<36} | {:<19}",
                    t.id,
                    truncate(&t.description, 13),
                    t.status.quote_phase,
                    t.status.author_phase,
                    t.external_task_id.as_deref().unwrap_or("-"),
                    t.created_on.format("%Y-%m-%d %H:%M:%S"),
                );
            }
            println!("\n{} tasks", tasks.len());
            Ok(())
        }
        Commands::Purge => {
            let cutoff = Utc::now() - settings.retention();
            let n = store.purge_scraped_authors(cutoff)?;
            println!("Removed {} staging authors created before {}.", n, cutoff);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
