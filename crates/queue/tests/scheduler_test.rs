/// Integration tests for the scheduler lifecycle: persistence across
/// reconnects, flush behaviour, seeding and metrics.

use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use crawlq_core::config::{SchedulerConfig, SeedConfig};
use crawlq_core::{CodecKind, Request};
use crawlq_queue::{
    DupeFilterKind, MemoryStats, QueueError, QueueKind, Scheduler, SchedulerSettings, SeedSource,
    StatsCollector, DEQUEUED, ENQUEUED,
};
use crawlq_storage::{Database, TableSchema, TableStore};

// ============================================================================
// Test Helpers
// ============================================================================

/// Unique SQLite file in the temp dir, removed on drop.
struct TempDb {
    path: PathBuf,
}

impl TempDb {
    fn new() -> Self {
        let path = std::env::temp_dir().join(format!("crawlq-test-{}.db", Uuid::new_v4()));
        Self { path }
    }

    fn url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.path.display())
    }

    async fn connect(&self) -> Database {
        Database::connect_url(&self.url()).await.unwrap()
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn fifo(persist: bool) -> SchedulerSettings {
    SchedulerSettings {
        persist,
        queue_kind: QueueKind::Fifo,
        ..SchedulerSettings::default()
    }
}

async fn drain(scheduler: &mut Scheduler) -> Vec<String> {
    let mut urls = Vec::new();
    while let Some(req) = scheduler.dequeue().await.unwrap() {
        urls.push(req.url);
    }
    urls
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn persisted_run_resumes_after_reconnect() {
    let tmp = TempDb::new();

    let db = tmp.connect().await;
    let mut first = Scheduler::new(db.clone(), fifo(true)).unwrap();
    assert_eq!(first.open("books").await.unwrap(), 0);
    for url in ["https://example.com/a", "https://example.com/b", "https://example.com/c"] {
        assert!(first.enqueue(Request::new(url)).await.unwrap());
    }
    let popped = first.dequeue().await.unwrap().unwrap();
    assert_eq!(popped.url, "https://example.com/a");
    first.close("shutdown").await.unwrap();
    db.close().await;

    // A fresh pool plays the part of a restarted process.
    let db = tmp.connect().await;
    let mut second = Scheduler::new(db.clone(), fifo(true)).unwrap();
    assert_eq!(second.open("books").await.unwrap(), 2);
    assert_eq!(second.len().await.unwrap(), 2);

    // Fingerprints survived too.
    assert!(!second.enqueue(Request::new("https://example.com/a")).await.unwrap());
    assert!(second.enqueue(Request::new("https://example.com/d")).await.unwrap());

    assert_eq!(
        drain(&mut second).await,
        vec!["https://example.com/b", "https://example.com/c", "https://example.com/d"]
    );
    second.close("finished").await.unwrap();
    db.close().await;
}

#[tokio::test]
async fn close_without_persist_drops_both_tables() {
    let db = Database::in_memory().await.unwrap();
    let mut scheduler = Scheduler::new(db.clone(), fifo(false)).unwrap();
    scheduler.open("books").await.unwrap();
    scheduler.enqueue(Request::new("https://example.com")).await.unwrap();
    scheduler.close("finished").await.unwrap();

    for (table, schema) in [("books_requests", TableSchema::Queue), ("books_dupefilter", TableSchema::DupeFilter)] {
        // Rebuilding yields an empty table: nothing survived the drop.
        let store = TableStore::build(&db, table, schema).await.unwrap();
        assert_eq!(store.total_rows().await.unwrap(), 0, "{table}");
    }
}

#[tokio::test]
async fn persist_keeps_tables_after_close() {
    let db = Database::in_memory().await.unwrap();
    let mut scheduler = Scheduler::new(db.clone(), fifo(true)).unwrap();
    scheduler.open("books").await.unwrap();
    scheduler.enqueue(Request::new("https://example.com")).await.unwrap();
    scheduler.close("finished").await.unwrap();

    let queue = TableStore::build(&db, "books_requests", TableSchema::Queue).await.unwrap();
    assert_eq!(queue.len().await.unwrap(), 1);
    let dupefilter = TableStore::build(&db, "books_dupefilter", TableSchema::DupeFilter)
        .await
        .unwrap();
    assert_eq!(dupefilter.total_rows().await.unwrap(), 1);
}

#[tokio::test]
async fn flush_on_start_discards_previous_run() {
    let db = Database::in_memory().await.unwrap();
    let mut previous = Scheduler::new(db.clone(), fifo(true)).unwrap();
    previous.open("books").await.unwrap();
    previous.enqueue(Request::new("https://example.com")).await.unwrap();
    previous.close("shutdown").await.unwrap();

    let settings = SchedulerSettings {
        flush_on_start: true,
        ..fifo(true)
    };
    let mut scheduler = Scheduler::new(db.clone(), settings).unwrap();
    // The flushed run reports nothing to resume.
    assert_eq!(scheduler.open("books").await.unwrap(), 0);
    assert_eq!(scheduler.len().await.unwrap(), 0);
    assert!(scheduler.enqueue(Request::new("https://example.com")).await.unwrap());

    // Opening again re-binds and flushes once more.
    scheduler.open("books").await.unwrap();
    assert!(!scheduler.has_pending_work().await.unwrap());
}

// ============================================================================
// Admission and metrics
// ============================================================================

#[tokio::test]
async fn stats_track_admitted_and_handed_out_requests() {
    let db = Database::in_memory().await.unwrap();
    let stats = Arc::new(MemoryStats::new());
    let mut scheduler = Scheduler::new(db, fifo(false)).unwrap().with_stats(stats.clone());
    scheduler.open("books").await.unwrap();

    for _ in 0..3 {
        scheduler.enqueue(Request::new("https://example.com/same")).await.unwrap();
    }
    scheduler.enqueue(Request::new("https://example.com/other")).await.unwrap();
    assert_eq!(stats.get_value(ENQUEUED, "books"), Some(2));

    assert_eq!(drain(&mut scheduler).await.len(), 2);
    assert_eq!(stats.get_value(DEQUEUED, "books"), Some(2));
    assert!(scheduler.stats().is_some());
}

#[tokio::test]
async fn runs_are_isolated_by_spider_name() {
    let db = Database::in_memory().await.unwrap();
    let mut books = Scheduler::new(db.clone(), fifo(false)).unwrap();
    let mut news = Scheduler::new(db.clone(), fifo(false)).unwrap();
    books.open("books").await.unwrap();
    news.open("news").await.unwrap();

    assert!(books.enqueue(Request::new("https://example.com")).await.unwrap());
    assert!(news.enqueue(Request::new("https://example.com")).await.unwrap());
    assert_eq!(books.len().await.unwrap(), 1);
    assert_eq!(news.len().await.unwrap(), 1);
}

#[tokio::test]
async fn msgpack_scheduler_round_trips_requests() {
    let db = Database::in_memory().await.unwrap();
    let settings = SchedulerSettings {
        codec: CodecKind::Msgpack,
        dupefilter_kind: DupeFilterKind::Disabled,
        ..SchedulerSettings::default()
    };
    let mut scheduler = Scheduler::new(db, settings).unwrap();
    scheduler.open("books").await.unwrap();

    let req = Request::new("https://example.com/form")
        .with_method("POST")
        .with_body("a=1")
        .with_callback("parse_item")
        .with_priority(3);
    scheduler.enqueue(req.clone()).await.unwrap();
    assert_eq!(scheduler.dequeue().await.unwrap(), Some(req));
}

// ============================================================================
// Configuration
// ============================================================================

#[tokio::test]
async fn negative_idle_timeout_is_a_config_error() {
    let db = Database::in_memory().await.unwrap();
    let config = SchedulerConfig {
        idle_before_close: -1.0,
        ..SchedulerConfig::default()
    };
    assert!(matches!(
        Scheduler::from_config(db, &config),
        Err(QueueError::Config(_))
    ));
}

#[tokio::test]
async fn unknown_queue_class_is_a_config_error() {
    let db = Database::in_memory().await.unwrap();
    let config = SchedulerConfig {
        queue_class: "RedisQueue".into(),
        ..SchedulerConfig::default()
    };
    assert!(matches!(
        Scheduler::from_config(db, &config),
        Err(QueueError::Config(_))
    ));
}

#[tokio::test]
async fn dequeue_on_empty_queue_respects_idle_timeout() {
    let db = Database::in_memory().await.unwrap();
    let settings = SchedulerSettings {
        idle_before_close: 0.3,
        ..fifo(false)
    };
    let mut scheduler = Scheduler::new(db, settings).unwrap();
    scheduler.open("books").await.unwrap();

    let started = std::time::Instant::now();
    assert!(scheduler.dequeue().await.unwrap().is_none());
    let elapsed = started.elapsed().as_secs_f64();
    assert!((0.3..0.4).contains(&elapsed), "{elapsed}");
}

// ============================================================================
// Seeding
// ============================================================================

#[tokio::test]
async fn seed_requests_bypass_the_filter() {
    let db = Database::in_memory().await.unwrap();
    let mut scheduler = Scheduler::new(db.clone(), fifo(false)).unwrap();
    scheduler.open("books").await.unwrap();
    let seeds = SeedSource::open(&db, &SeedConfig::default(), "books").await.unwrap();

    seeds.push_seed(r#"{"url": "https://example.com"}"#).await.unwrap();
    seeds.push_seed(r#"{"url": "https://example.com"}"#).await.unwrap();
    for req in seeds.next_requests().await.unwrap() {
        assert!(scheduler.enqueue(req).await.unwrap());
    }
    assert_eq!(scheduler.len().await.unwrap(), 2);
    assert_eq!(seeds.len().await.unwrap(), 0);
}
