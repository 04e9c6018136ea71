//! Soft-delete table store: one relational table used as a crash-safe queue.
//!
//! Rows are never removed during normal operation. Consuming a row flips its
//! `deleted` flag, after which no read ever returns it again. The only way
//! rows physically disappear is [`TableStore::drop_table`].

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::any::AnyRow;
use sqlx::Row as _;
use tracing::debug;

use crawlq_core::config::validate_table_name;
use crawlq_core::ConfigError;

use crate::error::StorageError;
use crate::poll::poll_with_timeout;
use crate::pool::Database;
use crate::schema::{quote, TableSchema};

/// Default pause between attempts of a blocking pop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Identifier order used by [`TableStore::pop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Oldest row first.
    Fifo,
    /// Newest row first.
    Lifo,
}

impl Order {
    fn sql(self) -> &'static str {
        match self {
            Order::Fifo => "id ASC",
            Order::Lifo => "id DESC",
        }
    }
}

/// A row read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: i64,
    pub key: String,
    /// Present only for tables whose schema has a score column.
    pub score: Option<i64>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

/// Payload of a row to insert. Identifier, timestamps and the tombstone are
/// filled in by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRow {
    pub key: String,
    pub score: Option<i64>,
}

impl NewRow {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            score: None,
        }
    }

    pub fn with_score(mut self, score: i64) -> Self {
        self.score = Some(score);
        self
    }
}

/// Generic soft-delete operations over one table.
#[derive(Debug)]
pub struct TableStore {
    db: Database,
    table: String,
    schema: TableSchema,
    poll_interval: Duration,
}

impl TableStore {
    /// Bind `table` with the given layout, creating it if it does not exist.
    pub async fn build(db: &Database, table: &str, schema: TableSchema) -> Result<Self, StorageError> {
        validate_table_name(table)?;
        for statement in schema.create_statements(db.dialect(), table) {
            sqlx::query(&statement).execute(db.pool()).await?;
        }
        debug!(table, schema = schema.name(), "Table ready");
        Ok(Self {
            db: db.clone(),
            table: table.to_string(),
            schema,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Like [`TableStore::build`], selecting the layout by its schema key
    /// (`"queue"`, `"dupefilter"`, `"start_url"`).
    pub async fn build_from_key(db: &Database, table: &str, key: &str) -> Result<Self, StorageError> {
        let schema = key.parse()?;
        Self::build(db, table, schema).await
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> TableSchema {
        self.schema
    }

    /// Insert one row with `deleted = false`.
    pub async fn push(&self, row: NewRow) -> Result<(), StorageError> {
        let now = now_string();
        let table = quote(&self.table);
        if self.schema.has_score() {
            let sql = format!(
                "INSERT INTO {table} (create_time, update_time, \"key\", score) VALUES ($1, $2, $3, $4)"
            );
            sqlx::query(&sql)
                .bind(now.clone())
                .bind(now)
                .bind(row.key)
                .bind(row.score.unwrap_or(0))
                .execute(self.db.pool())
                .await?;
        } else {
            if row.score.is_some() {
                return Err(self.missing_score());
            }
            let sql = format!("INSERT INTO {table} (create_time, update_time, \"key\") VALUES ($1, $2, $3)");
            sqlx::query(&sql)
                .bind(now.clone())
                .bind(now)
                .bind(row.key)
                .execute(self.db.pool())
                .await?;
        }
        Ok(())
    }

    /// Take the single live row at the `order` end of the table.
    ///
    /// With a non-zero `timeout` the attempt is repeated until a row shows
    /// up or the timeout elapses; zero means one attempt.
    pub async fn pop(&self, timeout: Duration, order: Order) -> Result<Option<Row>, StorageError> {
        poll_with_timeout(timeout, self.poll_interval, move || async move {
            self.claim_one(order.sql()).await
        })
        .await
    }

    /// Take up to `batch_size` live rows from the `order` end of the table.
    pub async fn pop_batch(
        &self,
        timeout: Duration,
        order: Order,
        batch_size: usize,
    ) -> Result<Vec<Row>, StorageError> {
        check_batch_size(batch_size)?;
        let rows = poll_with_timeout(timeout, self.poll_interval, move || async move {
            let rows = self.claim(order.sql(), batch_size).await?;
            Ok::<_, StorageError>((!rows.is_empty()).then_some(rows))
        })
        .await?;
        Ok(rows.unwrap_or_default())
    }

    /// Take the live row with the highest score. Equal scores come out in
    /// insertion order.
    pub async fn pop_by_score(&self, timeout: Duration) -> Result<Option<Row>, StorageError> {
        if !self.schema.has_score() {
            return Err(self.missing_score());
        }
        poll_with_timeout(timeout, self.poll_interval, move || async move {
            self.claim_one("score DESC, id ASC").await
        })
        .await
    }

    /// Take up to `batch_size` live rows, newest first, without waiting.
    pub async fn fetch_data(&self, batch_size: usize) -> Result<Vec<Row>, StorageError> {
        check_batch_size(batch_size)?;
        self.claim(Order::Lifo.sql(), batch_size).await
    }

    /// Number of live (not soft-deleted) rows.
    pub async fn len(&self) -> Result<u64, StorageError> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE deleted = FALSE", quote(&self.table));
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(self.db.pool()).await?;
        Ok(count.max(0) as u64)
    }

    pub async fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len().await? == 0)
    }

    /// Number of rows, live or consumed, whose key equals `key`.
    pub async fn count_key(&self, key: &str) -> Result<u64, StorageError> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE \"key\" = $1", quote(&self.table));
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(key.to_string())
            .fetch_one(self.db.pool())
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Total number of rows including consumed ones.
    pub async fn total_rows(&self) -> Result<u64, StorageError> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote(&self.table));
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(self.db.pool()).await?;
        Ok(count.max(0) as u64)
    }

    /// Destroy the backing table. Later operations fail with the store's
    /// own "no such table" error until the table is built again.
    pub async fn drop_table(&self) -> Result<(), StorageError> {
        let sql = format!("DROP TABLE IF EXISTS {}", quote(&self.table));
        sqlx::query(&sql).execute(self.db.pool()).await?;
        debug!(table = %self.table, "Table dropped");
        Ok(())
    }

    async fn claim_one(&self, order_by: &str) -> Result<Option<Row>, StorageError> {
        Ok(self.claim(order_by, 1).await?.into_iter().next())
    }

    /// Select live rows, then mark them deleted. Rows another consumer
    /// marked in between are dropped from the result.
    async fn claim(&self, order_by: &str, limit: usize) -> Result<Vec<Row>, StorageError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE deleted = FALSE ORDER BY {} LIMIT $1",
            self.columns(),
            quote(&self.table),
            order_by
        );
        let selected = sqlx::query(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(self.db.pool())
            .await?
            .iter()
            .map(|row| self.decode_row(row))
            .collect::<Result<Vec<_>, _>>()?;
        if selected.is_empty() {
            return Ok(selected);
        }

        let placeholders = (0..selected.len())
            .map(|i| format!("${}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET deleted = TRUE, update_time = $1 WHERE deleted = FALSE AND id IN ({}) RETURNING id",
            quote(&self.table),
            placeholders
        );
        let mut update = sqlx::query_scalar::<_, i64>(&sql).bind(now_string());
        for row in &selected {
            update = update.bind(row.id);
        }
        let claimed: HashSet<i64> = update.fetch_all(self.db.pool()).await?.into_iter().collect();

        if claimed.len() < selected.len() {
            debug!(
                table = %self.table,
                selected = selected.len(),
                claimed = claimed.len(),
                "Rows taken by another consumer"
            );
        }
        Ok(selected
            .into_iter()
            .filter(|row| claimed.contains(&row.id))
            .collect())
    }

    fn columns(&self) -> &'static str {
        if self.schema.has_score() {
            "id, \"key\", score, create_time, update_time"
        } else {
            "id, \"key\", create_time, update_time"
        }
    }

    fn decode_row(&self, row: &AnyRow) -> Result<Row, StorageError> {
        let id: i64 = row.try_get("id")?;
        let score = if self.schema.has_score() {
            Some(row.try_get::<i64, _>("score")?)
        } else {
            None
        };
        Ok(Row {
            id,
            key: row.try_get("key")?,
            score,
            create_time: self.parse_time(id, row.try_get("create_time")?)?,
            update_time: self.parse_time(id, row.try_get("update_time")?)?,
        })
    }

    fn parse_time(&self, id: i64, raw: String) -> Result<DateTime<Utc>, StorageError> {
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| StorageError::CorruptRow {
                table: self.table.clone(),
                id,
                reason: format!("bad timestamp {raw:?}: {e}"),
            })
    }

    fn missing_score(&self) -> StorageError {
        StorageError::MissingColumn {
            table: self.table.clone(),
            column: "score",
        }
    }
}

fn check_batch_size(batch_size: usize) -> Result<(), ConfigError> {
    if batch_size == 0 {
        return Err(ConfigError::Zero("batch_size".into()));
    }
    // Bound as a signed SQL integer; a wrapped negative LIMIT means "no limit" to SQLite.
    if i64::try_from(batch_size).is_err() {
        return Err(ConfigError::invalid(
            "batch_size",
            &batch_size.to_string(),
            "exceeds the largest SQL integer",
        ));
    }
    Ok(())
}

fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
