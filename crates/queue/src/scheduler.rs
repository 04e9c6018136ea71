//! Admit/dequeue protocol over one queue and one duplicate filter per run.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crawlq_core::config::{render_table_name, SchedulerConfig};
use crawlq_core::{CodecKind, ConfigError, Fingerprinter, Request, RequestCodec};
use crawlq_storage::Database;

use crate::dupefilter::{DupeFilter, DupeFilterKind, NoDupeFilter, TableDupeFilter};
use crate::error::QueueError;
use crate::queue::{QueueKind, RequestQueue};
use crate::stats::{StatsCollector, DEQUEUED, ENQUEUED};

/// Typed scheduler settings, parsed from [`SchedulerConfig`].
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub persist: bool,
    pub flush_on_start: bool,
    /// Table template; `{spider}` is replaced by the run name.
    pub queue_table: String,
    pub queue_kind: QueueKind,
    pub dupefilter_table: String,
    pub dupefilter_kind: DupeFilterKind,
    pub dupefilter_debug: bool,
    /// Seconds a dequeue waits for work.
    pub idle_before_close: f64,
    pub poll_interval: Duration,
    pub codec: CodecKind,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            persist: false,
            flush_on_start: false,
            queue_table: "{spider}_requests".to_string(),
            queue_kind: QueueKind::Priority,
            dupefilter_table: "{spider}_dupefilter".to_string(),
            dupefilter_kind: DupeFilterKind::Table,
            dupefilter_debug: false,
            idle_before_close: 0.0,
            poll_interval: crawlq_storage::DEFAULT_POLL_INTERVAL,
            codec: CodecKind::Json,
        }
    }
}

impl SchedulerSettings {
    /// Resolve class and serializer names. Unknown names fail here, before
    /// anything touches the store.
    pub fn from_config(config: &SchedulerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            persist: config.persist,
            flush_on_start: config.flush_on_start,
            queue_table: config.queue_table.clone(),
            queue_kind: config.queue_class.parse()?,
            dupefilter_table: config.dupefilter_table.clone(),
            dupefilter_kind: config.dupefilter_class.parse()?,
            dupefilter_debug: config.dupefilter_debug,
            idle_before_close: config.idle_before_close,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            codec: config.serializer.parse()?,
        })
    }
}

struct OpenRun {
    spider: String,
    queue: RequestQueue,
    dupefilter: Box<dyn DupeFilter>,
}

enum SchedulerState {
    Unopened,
    Open(OpenRun),
    Closed,
}

/// Per-run scheduler: `unopened -> open -> closed`.
///
/// One logical owner drives it; operations take `&mut self` and the
/// scheduler adds no locking of its own. Competing processes only meet in
/// the store, through the table's soft-delete claim.
pub struct Scheduler {
    db: Database,
    settings: SchedulerSettings,
    idle_before_close: Duration,
    codec: Arc<dyn RequestCodec>,
    fingerprinter: Option<Arc<dyn Fingerprinter>>,
    stats: Option<Arc<dyn StatsCollector>>,
    state: SchedulerState,
}

impl Scheduler {
    /// Validate settings. A negative, non-finite or out-of-range idle timeout
    /// is rejected.
    pub fn new(db: Database, settings: SchedulerSettings) -> Result<Self, QueueError> {
        let idle = settings.idle_before_close;
        if idle.is_nan() || idle.is_infinite() {
            return Err(ConfigError::invalid(
                "idle_before_close",
                &idle.to_string(),
                "expected a finite number of seconds",
            )
            .into());
        }
        if idle < 0.0 {
            return Err(ConfigError::Negative("idle_before_close".into()).into());
        }
        let idle_before_close = Duration::try_from_secs_f64(idle)
            .map_err(|e| ConfigError::invalid("idle_before_close", &idle.to_string(), e))?;

        Ok(Self {
            db,
            idle_before_close,
            codec: settings.codec.build(),
            settings,
            fingerprinter: None,
            stats: None,
            state: SchedulerState::Unopened,
        })
    }

    pub fn from_config(db: Database, config: &SchedulerConfig) -> Result<Self, QueueError> {
        Self::new(db, SchedulerSettings::from_config(config)?)
    }

    pub fn with_stats(mut self, stats: Arc<dyn StatsCollector>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Replace the serializer chosen by `settings.codec`.
    pub fn with_codec(mut self, codec: Arc<dyn RequestCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_fingerprinter(mut self, fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        self.fingerprinter = Some(fingerprinter);
        self
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn stats(&self) -> Option<&Arc<dyn StatsCollector>> {
        self.stats.as_ref()
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SchedulerState::Open(_))
    }

    /// Run name, while open.
    pub fn spider(&self) -> Option<&str> {
        match &self.state {
            SchedulerState::Open(run) => Some(&run.spider),
            _ => None,
        }
    }

    /// Bind the run-scoped queue and duplicate filter tables.
    ///
    /// Opening an already open scheduler re-binds it, flushing again when
    /// `flush_on_start` is set. Returns the number of requests left pending
    /// by a previous run.
    pub async fn open(&mut self, spider: &str) -> Result<u64, QueueError> {
        let queue_table = render_table_name(&self.settings.queue_table, spider)?;
        let dupefilter_table = render_table_name(&self.settings.dupefilter_table, spider)?;

        let mut run = self.bind(spider, &queue_table, &dupefilter_table).await?;
        if self.settings.flush_on_start {
            run.queue.clear().await?;
            run.dupefilter.clear().await?;
            info!(spider, queue = %queue_table, "Flushed scheduler tables on start");
            run = self.bind(spider, &queue_table, &dupefilter_table).await?;
        }

        let pending = run.queue.len().await?;
        if pending > 0 {
            info!(spider, pending, "Resuming crawl ({pending} requests scheduled)");
        }
        debug!(
            spider,
            queue = %queue_table,
            kind = %self.settings.queue_kind,
            dupefilter = %dupefilter_table,
            "Scheduler opened"
        );

        self.state = SchedulerState::Open(run);
        Ok(pending)
    }

    async fn bind(&self, spider: &str, queue_table: &str, dupefilter_table: &str) -> Result<OpenRun, QueueError> {
        let queue = RequestQueue::open(&self.db, queue_table, self.settings.queue_kind, self.codec.clone())
            .await?
            .with_poll_interval(self.settings.poll_interval);

        let dupefilter: Box<dyn DupeFilter> = match self.settings.dupefilter_kind {
            DupeFilterKind::Table => {
                let mut df = TableDupeFilter::open(&self.db, dupefilter_table, self.settings.dupefilter_debug).await?;
                if let Some(fp) = &self.fingerprinter {
                    df = df.with_fingerprinter(fp.clone());
                }
                Box::new(df)
            }
            DupeFilterKind::Disabled => Box::new(NoDupeFilter),
        };

        Ok(OpenRun {
            spider: spider.to_string(),
            queue,
            dupefilter,
        })
    }

    /// End the run. Tables are dropped unless the scheduler persists.
    pub async fn close(&mut self, reason: &str) -> Result<(), QueueError> {
        let state = std::mem::replace(&mut self.state, SchedulerState::Closed);
        let SchedulerState::Open(run) = state else {
            return Ok(());
        };

        if self.settings.persist {
            info!(spider = %run.spider, reason, "Scheduler closed, tables kept");
            return Ok(());
        }
        run.queue.clear().await?;
        run.dupefilter.close(reason).await?;
        info!(spider = %run.spider, reason, "Scheduler closed, tables flushed");
        Ok(())
    }

    /// Admit `request` unless the duplicate filter has seen it.
    ///
    /// Returns `false` for a filtered duplicate; the request is dropped.
    pub async fn enqueue(&mut self, request: Request) -> Result<bool, QueueError> {
        let run = open_run(&mut self.state)?;
        if !request.dont_filter && run.dupefilter.request_seen(&request).await? {
            run.dupefilter.log(&request, &run.spider);
            return Ok(false);
        }

        run.queue.push(&request).await?;
        if let Some(stats) = &self.stats {
            stats.inc_value(ENQUEUED, 1, &run.spider);
        }
        Ok(true)
    }

    /// Next request, waiting up to the idle timeout for one.
    pub async fn dequeue(&mut self) -> Result<Option<Request>, QueueError> {
        let run = open_run(&mut self.state)?;
        let request = run.queue.pop(self.idle_before_close).await?;
        if request.is_some() {
            if let Some(stats) = &self.stats {
                stats.inc_value(DEQUEUED, 1, &run.spider);
            }
        }
        Ok(request)
    }

    pub async fn has_pending_work(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? > 0)
    }

    /// Pending requests in the queue.
    pub async fn len(&self) -> Result<u64, QueueError> {
        self.run()?.queue.len().await
    }

    /// Drop the queue and duplicate filter tables of the current run.
    pub async fn flush(&mut self) -> Result<(), QueueError> {
        let run = open_run(&mut self.state)?;
        run.queue.clear().await?;
        run.dupefilter.clear().await?;
        Ok(())
    }

    fn run(&self) -> Result<&OpenRun, QueueError> {
        match &self.state {
            SchedulerState::Open(run) => Ok(run),
            _ => Err(QueueError::NotOpen),
        }
    }
}

fn open_run(state: &mut SchedulerState) -> Result<&mut OpenRun, QueueError> {
    match state {
        SchedulerState::Open(run) => Ok(run),
        _ => Err(QueueError::NotOpen),
    }
}
