pub mod dupefilter;
pub mod error;
pub mod queue;
pub mod scheduler;
pub mod seed;
pub mod stats;

pub use dupefilter::{DupeFilter, DupeFilterKind, NoDupeFilter, TableDupeFilter};
pub use error::QueueError;
pub use queue::{priority_score, QueueKind, RequestQueue};
pub use scheduler::{Scheduler, SchedulerSettings};
pub use seed::{request_from_data, IdleOutcome, SeedSource};
pub use stats::{MemoryStats, StatsCollector, DEQUEUED, ENQUEUED};
