use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

pub const DEFAULT_DATA_ROOT: &str = "data";
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// When the WAL is fsynced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncPolicy {
    /// After every record.
    EveryRecord,
    /// Once at the end of every flushed batch.
    #[default]
    EveryBatch,
    /// Never; for tests only.
    Never,
}

/// Engine configuration. Each database lives in `<data_root>/<name>/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub data_root: PathBuf,
    pub cache_capacity: usize,
    /// Period of the background page flusher; zero disables it.
    pub flush_interval: Duration,
    pub sync_policy: SyncPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from(DEFAULT_DATA_ROOT),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            sync_policy: SyncPolicy::default(),
        }
    }
}

impl Config {
    pub fn with_data_root(mut self, data_root: impl Into<PathBuf>) -> Self {
        self.data_root = data_root.into();
        self
    }

    pub fn with_cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }

    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    pub fn with_sync_policy(mut self, sync_policy: SyncPolicy) -> Self {
        self.sync_policy = sync_policy;
        self
    }

    pub fn database_dir(&self, name: &str) -> PathBuf {
        self.data_root.join(name)
    }
}
