//! Start-URL ingestion: turns raw seed rows into requests.
//!
//! Seed rows live in their own `start_url` table, written by any external
//! producer (see [`SeedSource::push_seed`]). Each row is either a JSON object
//! with a required `url` key, or a bare URL string.

use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use url::form_urlencoded;

use crawlq_core::config::{render_table_name, SeedConfig};
use crawlq_core::{ConfigError, Request};
use crawlq_storage::{Database, NewRow, TableSchema, TableStore};

use crate::error::QueueError;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Result of one idle round.
#[derive(Debug, Clone, PartialEq)]
pub struct IdleOutcome {
    pub requests: Vec<Request>,
    /// Whether the crawl should stay alive waiting for more seeds.
    pub keep_alive: bool,
}

pub struct SeedSource {
    spider: String,
    table: TableStore,
    batch_size: usize,
    /// Zero keeps the crawl alive forever.
    max_idle: Duration,
    idle_since: Instant,
}

impl SeedSource {
    pub async fn open(db: &Database, config: &SeedConfig, spider: &str) -> Result<Self, QueueError> {
        let table_name = render_table_name(&config.table, spider)?;
        let batch_size = match config.batch_size {
            0 => return Err(ConfigError::Zero("batch_size".into()).into()),
            n if n < 0 => return Err(ConfigError::Negative("batch_size".into()).into()),
            n => n as usize,
        };

        let table = TableStore::build(db, &table_name, TableSchema::StartUrl).await?;
        info!(spider, table = %table_name, batch_size, "Reading start URLs from table");

        Ok(Self {
            spider: spider.to_string(),
            table,
            batch_size,
            max_idle: Duration::from_secs(config.max_idle_time),
            idle_since: Instant::now(),
        })
    }

    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn table(&self) -> &TableStore {
        &self.table
    }

    /// Store one raw seed row.
    pub async fn push_seed(&self, data: &str) -> Result<(), QueueError> {
        self.table.push(NewRow::new(data)).await?;
        Ok(())
    }

    /// Unconsumed seed rows.
    pub async fn len(&self) -> Result<u64, QueueError> {
        Ok(self.table.len().await?)
    }

    /// Consume the next batch of seed rows, newest first.
    ///
    /// Rows that cannot produce a request are consumed and skipped.
    pub async fn next_requests(&self) -> Result<Vec<Request>, QueueError> {
        let rows = self.table.fetch_data(self.batch_size).await?;
        let mut requests = Vec::with_capacity(rows.len());
        for row in rows {
            match request_from_data(&row.key) {
                Some(request) => {
                    debug!(spider = %self.spider, url = %request.url, "Start request");
                    requests.push(request);
                }
                None => debug!(spider = %self.spider, data = %row.key, "Request not made from data"),
            }
        }
        if !requests.is_empty() {
            debug!(
                spider = %self.spider,
                table = %self.table.table_name(),
                found = requests.len(),
                "Read start requests"
            );
        }
        Ok(requests)
    }

    /// Handle an idle engine: schedule the next batch and decide whether the
    /// crawl stays open.
    ///
    /// The idle clock restarts whenever seed rows are still waiting, so a
    /// crawl only closes after `max_idle` without any seeds.
    pub async fn on_idle(&mut self) -> Result<IdleOutcome, QueueError> {
        if self.table.len().await? > 0 {
            self.idle_since = Instant::now();
        }

        let requests = self.next_requests().await?;
        let keep_alive = self.max_idle.is_zero() || self.idle_since.elapsed() < self.max_idle;
        Ok(IdleOutcome { requests, keep_alive })
    }
}

/// Build a request from one seed row.
///
/// JSON objects supply `url` (required), `method` (default `GET`), `meta`,
/// and form data from every other key. Anything else is taken as a bare URL.
/// Seed requests always bypass the duplicate filter.
pub fn request_from_data(data: &str) -> Option<Request> {
    let mut params = match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(map)) => map,
        _ => {
            warn!(data, "Bare URL seed rows are deprecated, push a JSON object instead");
            return Some(Request::new(data.trim()).with_dont_filter(true));
        }
    };

    let url = match params.remove("url") {
        Some(Value::String(url)) if !url.is_empty() => url,
        _ => {
            warn!(data, "Seed row has no url key");
            return None;
        }
    };
    let method = match params.remove("method") {
        Some(Value::String(method)) => method,
        _ => "GET".to_string(),
    };
    let meta = match params.remove("meta") {
        Some(Value::Object(meta)) => meta,
        _ => Map::new(),
    };

    let mut request = Request::new(url).with_method(method).with_dont_filter(true);
    request.meta = meta;

    if params.is_empty() {
        return Some(request);
    }
    let form = encode_form(&params);
    if request.method == "GET" {
        let sep = if request.url.contains('?') { '&' } else { '?' };
        request.url = format!("{}{sep}{form}", request.url);
    } else {
        request = request
            .with_header("Content-Type", FORM_CONTENT_TYPE)
            .with_body(form);
    }
    Some(request)
}

fn encode_form(params: &Map<String, Value>) -> String {
    let mut form = form_urlencoded::Serializer::new(String::new());
    for (name, value) in params {
        match value {
            Value::Array(items) => {
                for item in items {
                    form.append_pair(name, &form_value(item));
                }
            }
            Value::Null => {}
            other => {
                form.append_pair(name, &form_value(other));
            }
        }
    }
    form.finish()
}

fn form_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
