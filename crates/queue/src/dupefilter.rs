//! Duplicate filters keyed by request fingerprint.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crawlq_core::{ConfigError, Fingerprinter, Request, RequestFingerprinter};
use crawlq_storage::{Database, NewRow, TableSchema, TableStore};

use crate::error::QueueError;

/// Admission check used by the scheduler.
#[async_trait]
pub trait DupeFilter: Send + Sync {
    /// Whether an equivalent request was checked before. Implementations may
    /// record the check itself.
    async fn request_seen(&self, request: &Request) -> Result<bool, QueueError>;

    /// Forget everything seen so far.
    async fn clear(&self) -> Result<(), QueueError>;

    async fn close(&self, _reason: &str) -> Result<(), QueueError> {
        self.clear().await
    }

    /// Report a request that was filtered out.
    fn log(&mut self, request: &Request, spider: &str);
}

/// Duplicate filter implementations selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DupeFilterKind {
    /// Fingerprints recorded in a table ([`TableDupeFilter`]).
    #[default]
    Table,
    /// Nothing is ever a duplicate ([`NoDupeFilter`]).
    Disabled,
}

impl FromStr for DupeFilterKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
        match name.as_str() {
            "table" | "db" | "sql" | "dbdupefilter" | "tabledupefilter" => Ok(DupeFilterKind::Table),
            "none" | "disabled" | "off" | "nodupefilter" => Ok(DupeFilterKind::Disabled),
            _ => Err(ConfigError::UnknownDupeFilterClass(s.to_string())),
        }
    }
}

/// Records one row per fingerprint check.
///
/// The table is an append-only log of observations, not a set: a fingerprint
/// is inserted on every check, seen or not, so the table grows with duplicate
/// traffic. A fingerprint counts as seen when at least one row with it
/// existed before the current check's insert.
pub struct TableDupeFilter {
    table: TableStore,
    fingerprinter: Arc<dyn Fingerprinter>,
    debug: bool,
    log_dupes: bool,
    reported: u64,
}

impl TableDupeFilter {
    pub fn new(table: TableStore, debug: bool) -> Self {
        Self {
            table,
            fingerprinter: Arc::new(RequestFingerprinter::new()),
            debug,
            log_dupes: true,
            reported: 0,
        }
    }

    /// Bind (creating if needed) the fingerprint table `table`.
    pub async fn open(db: &Database, table: &str, debug: bool) -> Result<Self, QueueError> {
        let table = TableStore::build(db, table, TableSchema::DupeFilter).await?;
        Ok(Self::new(table, debug))
    }

    pub fn with_fingerprinter(mut self, fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    pub fn table(&self) -> &TableStore {
        &self.table
    }

    /// Number of duplicate messages emitted by [`DupeFilter::log`].
    pub fn reported(&self) -> u64 {
        self.reported
    }

    /// Count prior observations of `fingerprint`, then record this one.
    pub async fn seen(&self, fingerprint: &str) -> Result<bool, QueueError> {
        let before = self.table.count_key(fingerprint).await?;
        self.table.push(NewRow::new(fingerprint)).await?;
        Ok(before > 0)
    }
}

#[async_trait]
impl DupeFilter for TableDupeFilter {
    async fn request_seen(&self, request: &Request) -> Result<bool, QueueError> {
        let fingerprint = self.fingerprinter.fingerprint(request);
        self.seen(&fingerprint).await
    }

    async fn clear(&self) -> Result<(), QueueError> {
        Ok(self.table.drop_table().await?)
    }

    fn log(&mut self, request: &Request, spider: &str) {
        if self.debug {
            debug!(spider, %request, "Filtered duplicate request");
            self.reported += 1;
        } else if self.log_dupes {
            debug!(
                spider,
                %request,
                "Filtered duplicate request - no more duplicates will be shown \
                 (see DUPEFILTER_DEBUG to show all duplicates)"
            );
            self.log_dupes = false;
            self.reported += 1;
        }
    }
}

/// Admits every request and stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDupeFilter;

#[async_trait]
impl DupeFilter for NoDupeFilter {
    async fn request_seen(&self, _request: &Request) -> Result<bool, QueueError> {
        Ok(false)
    }

    async fn clear(&self) -> Result<(), QueueError> {
        Ok(())
    }

    fn log(&mut self, _request: &Request, _spider: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn filter(debug: bool) -> TableDupeFilter {
        let db = Database::in_memory().await.unwrap();
        TableDupeFilter::open(&db, "test_dupefilter", debug).await.unwrap()
    }

    struct Fixed;

    impl Fingerprinter for Fixed {
        fn fingerprint(&self, _request: &Request) -> String {
            "xxx".to_string()
        }
    }

    #[test]
    fn kind_names() {
        assert_eq!("table".parse::<DupeFilterKind>().unwrap(), DupeFilterKind::Table);
        assert_eq!("crawlq.DBDupeFilter".parse::<DupeFilterKind>().unwrap(), DupeFilterKind::Table);
        assert_eq!("none".parse::<DupeFilterKind>().unwrap(), DupeFilterKind::Disabled);
        assert!("bloom".parse::<DupeFilterKind>().is_err());
    }

    #[tokio::test]
    async fn repeated_fingerprint_is_seen_and_recorded_every_time() {
        let df = filter(false).await;
        assert!(!df.seen("abc").await.unwrap());
        for _ in 0..4 {
            assert!(df.seen("abc").await.unwrap());
        }
        assert_eq!(df.table().count_key("abc").await.unwrap(), 5);
        assert!(!df.seen("other").await.unwrap());
    }

    #[tokio::test]
    async fn same_request_then_variants() {
        let df = filter(false).await;
        let req = Request::new("https://example.com");
        assert!(!df.request_seen(&req).await.unwrap());
        assert!(df.request_seen(&req).await.unwrap());

        let post = Request::new("https://example.com").with_method("POST");
        assert!(df.request_seen(&req).await.unwrap());
        assert!(!df.request_seen(&post).await.unwrap());

        let other = Request::new("https://example2.com");
        assert!(!df.request_seen(&other).await.unwrap());
    }

    #[tokio::test]
    async fn custom_fingerprinter_is_used() {
        let df = filter(false).await.with_fingerprinter(Arc::new(Fixed));
        assert!(!df.request_seen(&Request::new("https://a.example")).await.unwrap());
        assert!(df.request_seen(&Request::new("https://b.example")).await.unwrap());
        assert_eq!(df.table().count_key("xxx").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn clear_drops_table() {
        let df = filter(false).await;
        df.clear().await.unwrap();
        let err = df.request_seen(&Request::new("https://example.com")).await.unwrap_err();
        assert!(err.to_string().contains("no such table"));
    }

    #[tokio::test]
    async fn close_clears() {
        let df = filter(false).await;
        df.seen("abc").await.unwrap();
        df.close("finished").await.unwrap();
        assert!(df.table().len().await.is_err());
    }

    #[tokio::test]
    async fn quiet_filter_logs_once() {
        let mut df = filter(false).await;
        for _ in 0..5 {
            df.log(&Request::new("http://example"), "test");
        }
        assert_eq!(df.reported(), 1);
    }

    #[tokio::test]
    async fn debug_filter_logs_every_duplicate() {
        let mut df = filter(true).await;
        for _ in 0..5 {
            df.log(&Request::new("http://example"), "test");
        }
        assert_eq!(df.reported(), 5);
    }

    #[tokio::test]
    async fn disabled_filter_admits_everything() {
        let mut df = NoDupeFilter;
        let req = Request::new("https://example.com");
        assert!(!df.request_seen(&req).await.unwrap());
        assert!(!df.request_seen(&req).await.unwrap());
        df.log(&req, "test");
        df.close("finished").await.unwrap();
    }
}
