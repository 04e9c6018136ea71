//! Metrics sink for scheduler counters.

use std::collections::HashMap;
use std::sync::Mutex;

/// Counter bumped once per admitted request.
pub const ENQUEUED: &str = "scheduler/enqueued/db";
/// Counter bumped once per request handed out.
pub const DEQUEUED: &str = "scheduler/dequeued/db";

/// Receives counter updates tagged by spider (run) name.
pub trait StatsCollector: Send + Sync {
    fn inc_value(&self, key: &str, count: i64, spider: &str);

    fn get_value(&self, key: &str, spider: &str) -> Option<i64>;
}

/// Counters kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryStats {
    values: Mutex<HashMap<(String, String), i64>>,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// All counters of one spider, sorted by key.
    pub fn snapshot(&self, spider: &str) -> Vec<(String, i64)> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<_> = values
            .iter()
            .filter(|((s, _), _)| s == spider)
            .map(|((_, k), v)| (k.clone(), *v))
            .collect();
        out.sort();
        out
    }
}

impl StatsCollector for MemoryStats {
    fn inc_value(&self, key: &str, count: i64, spider: &str) {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        *values
            .entry((spider.to_string(), key.to_string()))
            .or_insert(0) += count;
    }

    fn get_value(&self, key: &str, spider: &str) -> Option<i64> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(&(spider.to_string(), key.to_string())).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_per_spider() {
        let stats = MemoryStats::new();
        stats.inc_value(ENQUEUED, 1, "a");
        stats.inc_value(ENQUEUED, 1, "a");
        stats.inc_value(DEQUEUED, 1, "b");

        assert_eq!(stats.get_value(ENQUEUED, "a"), Some(2));
        assert_eq!(stats.get_value(ENQUEUED, "b"), None);
        assert_eq!(stats.snapshot("b"), vec![(DEQUEUED.to_string(), 1)]);
    }
}
