use clap::{Parser, Subcommand};

/// Operator commands for persistent crawl queues.
///
/// Connection and table settings come from the environment (`DB_URL`,
/// `SCHEDULER_*`, `START_URLS_*`), optionally profiled via `CRAWLQ_PROFILE`.
#[derive(Parser, Debug)]
#[command(name = "crawlq", version, about = "Persistent crawl queue toolkit")]
pub struct CliArgs {
    /// Run (spider) name substituted into table templates.
    #[arg(long, env = "CRAWLQ_SPIDER", global = true, default_value = "default")]
    pub spider: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Push raw start rows (JSON objects or bare URLs) into the seed table.
    Seed {
        #[arg(required = true)]
        data: Vec<String>,
    },

    /// Admit URLs through the scheduler, skipping duplicates.
    Enqueue {
        #[arg(required = true)]
        urls: Vec<String>,

        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        priority: i32,

        /// Bypass the duplicate filter.
        #[arg(long)]
        dont_filter: bool,
    },

    /// Dequeue requests and print them as JSON lines.
    Drain {
        /// Stop after this many requests.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show pending request and seed counts.
    Status,

    /// Drop the queue and duplicate filter tables of the run.
    Flush,
}
