mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use crawlq_core::config::{self, Config};
use crawlq_core::Request;
use crawlq_queue::{Scheduler, SchedulerSettings, SeedSource};
use crawlq_storage::Database;

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    config::load_dotenv();
    let args = CliArgs::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    config.log_summary();

    let db = Database::connect(&config.database)
        .await
        .context("failed to connect to database")?;

    let result = run(&args, &config, &db).await;
    db.close().await;
    result
}

async fn run(args: &CliArgs, config: &Config, db: &Database) -> Result<()> {
    let spider = args.spider.as_str();
    match &args.command {
        Command::Seed { data } => {
            let seeds = SeedSource::open(db, &config.seed, spider).await?;
            for row in data {
                seeds.push_seed(row).await?;
            }
            info!(spider, pushed = data.len(), pending = seeds.len().await?, "Seeds stored");
        }
        Command::Enqueue {
            urls,
            priority,
            dont_filter,
        } => {
            let mut scheduler = open_scheduler(db, config, spider).await?;
            let (mut accepted, mut filtered) = (0usize, 0usize);
            for url in urls {
                let request = Request::new(url.as_str())
                    .with_priority(*priority)
                    .with_dont_filter(*dont_filter);
                if scheduler.enqueue(request).await? {
                    accepted += 1;
                } else {
                    filtered += 1;
                }
            }
            scheduler.close("enqueue").await?;
            println!("accepted={accepted} filtered={filtered}");
        }
        Command::Drain { limit } => {
            let mut scheduler = open_scheduler(db, config, spider).await?;
            let mut drained = 0usize;
            while limit.map_or(true, |max| drained < max) {
                let Some(request) = scheduler.dequeue().await? else {
                    break;
                };
                println!("{}", serde_json::to_string(&request)?);
                drained += 1;
            }
            scheduler.close("drain").await?;
            info!(spider, drained, "Drain finished");
        }
        Command::Status => {
            let mut scheduler = open_scheduler(db, config, spider).await?;
            let seeds = SeedSource::open(db, &config.seed, spider).await?;
            println!("spider={spider}");
            println!("queue_pending={}", scheduler.len().await?);
            println!("seed_pending={}", seeds.len().await?);
            scheduler.close("status").await?;
        }
        Command::Flush => {
            let mut scheduler = open_scheduler(db, config, spider).await?;
            scheduler.flush().await?;
            scheduler.close("flush").await?;
            info!(spider, "Queue and duplicate filter flushed");
        }
    }
    Ok(())
}

/// Scheduler for one-shot commands. It always persists and never flushes on
/// start, so a command leaves the run's tables in place.
async fn open_scheduler(db: &Database, config: &Config, spider: &str) -> Result<Scheduler> {
    let settings = SchedulerSettings {
        persist: true,
        flush_on_start: false,
        ..SchedulerSettings::from_config(&config.scheduler)?
    };
    let mut scheduler = Scheduler::new(db.clone(), settings)?;
    scheduler
        .open(spider)
        .await
        .with_context(|| format!("failed to open scheduler for {spider}"))?;
    Ok(scheduler)
}
