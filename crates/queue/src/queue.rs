//! Request queues backed by a soft-delete table.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crawlq_core::{ConfigError, Request, RequestCodec};
use crawlq_storage::{Database, NewRow, Order, TableSchema, TableStore};

use crate::error::QueueError;

/// Dequeue order of a [`RequestQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueKind {
    /// Oldest request first.
    Fifo,
    /// Newest request first.
    Lifo,
    /// Highest stored score first, where the stored score is the negated
    /// request priority. Lower declared priorities therefore leave first.
    #[default]
    Priority,
}

impl FromStr for QueueKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
        match name.as_str() {
            "fifo" | "fifoqueue" => Ok(QueueKind::Fifo),
            "lifo" | "lifoqueue" => Ok(QueueKind::Lifo),
            "priority" | "priorityqueue" => Ok(QueueKind::Priority),
            _ => Err(ConfigError::UnknownQueueClass(s.to_string())),
        }
    }
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueKind::Fifo => write!(f, "fifo"),
            QueueKind::Lifo => write!(f, "lifo"),
            QueueKind::Priority => write!(f, "priority"),
        }
    }
}

/// Stored score for a request in a priority queue.
pub fn priority_score(request: &Request) -> i64 {
    -i64::from(request.priority)
}

/// A persistent queue of [`Request`]s.
pub struct RequestQueue {
    kind: QueueKind,
    table: TableStore,
    codec: Arc<dyn RequestCodec>,
}

impl RequestQueue {
    /// Bind (creating if needed) the queue table `table`.
    pub async fn open(
        db: &Database,
        table: &str,
        kind: QueueKind,
        codec: Arc<dyn RequestCodec>,
    ) -> Result<Self, QueueError> {
        let table = TableStore::build(db, table, TableSchema::Queue).await?;
        Ok(Self { kind, table, codec })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.table = self.table.with_poll_interval(interval);
        self
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    pub fn table(&self) -> &TableStore {
        &self.table
    }

    pub fn encode_request(&self, request: &Request) -> Result<String, QueueError> {
        Ok(self.codec.encode(request)?)
    }

    pub fn decode_request(&self, encoded: &str) -> Result<Request, QueueError> {
        Ok(self.codec.decode(encoded)?)
    }

    pub async fn push(&self, request: &Request) -> Result<(), QueueError> {
        let row = NewRow::new(self.encode_request(request)?);
        let row = match self.kind {
            QueueKind::Priority => row.with_score(priority_score(request)),
            QueueKind::Fifo | QueueKind::Lifo => row,
        };
        self.table.push(row).await?;
        Ok(())
    }

    /// Next request in this queue's order, waiting up to `timeout` for one.
    pub async fn pop(&self, timeout: Duration) -> Result<Option<Request>, QueueError> {
        let row = match self.kind {
            QueueKind::Fifo => self.table.pop(timeout, Order::Fifo).await?,
            QueueKind::Lifo => self.table.pop(timeout, Order::Lifo).await?,
            QueueKind::Priority => self.table.pop_by_score(timeout).await?,
        };
        row.map(|row| self.decode_request(&row.key)).transpose()
    }

    pub async fn len(&self) -> Result<u64, QueueError> {
        Ok(self.table.len().await?)
    }

    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }

    /// Drop the backing table.
    pub async fn clear(&self) -> Result<(), QueueError> {
        Ok(self.table.drop_table().await?)
    }
}
