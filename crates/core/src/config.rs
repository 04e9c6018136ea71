use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

/// Like `profiled_env_or`, but a malformed value is an error instead of
/// silently falling back to the default.
fn profiled_env_parse<T>(profile: &str, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match profiled_env_opt(profile, key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::invalid(key, &raw, e)),
        None => Ok(default),
    }
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> Result<bool, ConfigError> {
    match profiled_env_opt(profile, key) {
        Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::invalid(key, &raw, "expected a boolean")),
        None => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Placeholder substituted with the run (spider) name in table templates.
pub const SPIDER_PLACEHOLDER: &str = "{spider}";

/// Substitute the run name into a table template and validate the result.
///
/// Table names are quoted into SQL, so only a conservative character set is
/// accepted.
pub fn render_table_name(template: &str, spider: &str) -> Result<String, ConfigError> {
    let name = template.replace(SPIDER_PLACEHOLDER, spider);
    validate_table_name(&name)?;
    Ok(name)
}

pub fn validate_table_name(name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::Empty("table_name".into()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ConfigError::InvalidTableName(name.to_string()));
    }
    Ok(())
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub seed: SeedConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CRAWLQ_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let profile = env_or("CRAWLQ_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Result<Self, ConfigError> {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Ok(Self {
            profile: p.to_string(),
            database: DatabaseConfig::from_env_profiled(p)?,
            scheduler: SchedulerConfig::from_env_profiled(p)?,
            seed: SeedConfig::from_env_profiled(p)?,
        })
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  database:    url={}", self.database.redacted_url());
        tracing::info!(
            "  scheduler:   queue={} ({}), dupefilter={} ({}), persist={}, idle={}s",
            self.scheduler.queue_table,
            self.scheduler.queue_class,
            self.scheduler.dupefilter_table,
            self.scheduler.dupefilter_class,
            self.scheduler.persist,
            self.scheduler.idle_before_close,
        );
        tracing::info!(
            "  seed:        table={}, batch={}, max_idle={}s",
            self.seed.table,
            self.seed.batch_size,
            self.seed.max_idle_time
        );
    }
}

// ── Database ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `sqlite:` or `postgres:` connection string.
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    fn from_env_profiled(p: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            url: profiled_env_or(p, "DB_URL", "sqlite://crawlq.db?mode=rwc"),
            max_connections: profiled_env_parse(p, "DB_MAX_CONNECTIONS", 5)?,
        })
    }

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 5,
        }
    }

    /// Connection string with any password replaced by `***`.
    pub fn redacted_url(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(mut parsed) if parsed.password().is_some() => {
                let _ = parsed.set_password(Some("***"));
                parsed.to_string()
            }
            _ => self.url.clone(),
        }
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub persist: bool,
    pub flush_on_start: bool,
    pub queue_table: String,
    /// "fifo", "lifo", "priority"
    pub queue_class: String,
    pub dupefilter_table: String,
    /// "table", "none"
    pub dupefilter_class: String,
    pub dupefilter_debug: bool,
    /// Seconds a dequeue may wait for work. Validated by the scheduler.
    pub idle_before_close: f64,
    pub poll_interval_ms: u64,
    /// "json", "msgpack"
    pub serializer: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            persist: false,
            flush_on_start: false,
            queue_table: "{spider}_requests".to_string(),
            queue_class: "priority".to_string(),
            dupefilter_table: "{spider}_dupefilter".to_string(),
            dupefilter_class: "table".to_string(),
            dupefilter_debug: false,
            idle_before_close: 0.0,
            poll_interval_ms: 10,
            serializer: "json".to_string(),
        }
    }
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            persist: profiled_env_bool(p, "SCHEDULER_PERSIST", d.persist)?,
            flush_on_start: profiled_env_bool(p, "SCHEDULER_FLUSH_ON_START", d.flush_on_start)?,
            queue_table: profiled_env_or(p, "SCHEDULER_QUEUE_TABLE", &d.queue_table),
            queue_class: profiled_env_or(p, "SCHEDULER_QUEUE_CLASS", &d.queue_class),
            dupefilter_table: profiled_env_or(p, "SCHEDULER_DUPEFILTER_TABLE", &d.dupefilter_table),
            dupefilter_class: profiled_env_or(p, "SCHEDULER_DUPEFILTER_CLASS", &d.dupefilter_class),
            dupefilter_debug: profiled_env_bool(p, "DUPEFILTER_DEBUG", d.dupefilter_debug)?,
            idle_before_close: profiled_env_parse(p, "SCHEDULER_IDLE_BEFORE_CLOSE", d.idle_before_close)?,
            poll_interval_ms: profiled_env_parse(p, "SCHEDULER_POLL_INTERVAL_MS", d.poll_interval_ms)?,
            serializer: profiled_env_or(p, "SCHEDULER_SERIALIZER", &d.serializer),
        })
    }
}

// ── Seed (start URLs) ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConfig {
    pub table: String,
    pub batch_size: i64,
    /// Seconds; 0 keeps the crawl alive forever.
    pub max_idle_time: u64,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            table: "{spider}_start_urls".to_string(),
            batch_size: 16,
            max_idle_time: 0,
        }
    }
}

impl SeedConfig {
    fn from_env_profiled(p: &str) -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            table: profiled_env_or(p, "START_URLS_TABLE", &d.table),
            batch_size: profiled_env_parse(p, "START_URLS_BATCH_SIZE", d.batch_size)?,
            max_idle_time: profiled_env_parse(p, "MAX_IDLE_TIME_BEFORE_CLOSE", d.max_idle_time)?,
        })
    }
}
