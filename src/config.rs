//! Backend configuration.

use serde::Deserialize;
use std::path::PathBuf;

/// Which consumer the cache serves. Disk caches behind an HTTP cache run
/// entry operations optimistically; application caches do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    #[default]
    Disk,
    App,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationsMode {
    /// Create may report success before its file exists; a known-doomed
    /// open may fail without waiting.
    Optimistic,
    NonOptimistic,
}

impl CacheType {
    pub fn operations_mode(self) -> OperationsMode {
        match self {
            CacheType::Disk => OperationsMode::Optimistic,
            CacheType::App => OperationsMode::NonOptimistic,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Cache directory. Created on `init` if missing.
    pub path: PathBuf,
    /// Size budget in bytes. Zero or negative picks the default.
    #[serde(default)]
    pub max_size: i64,
    #[serde(default)]
    pub cache_type: CacheType,
    /// Give the backend its own worker pool of this size instead of the
    /// process-wide one.
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl BackendConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_size: 0,
            cache_type: CacheType::Disk,
            worker_threads: None,
        }
    }

    pub fn with_max_size(mut self, max_size: i64) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_cache_type(mut self, cache_type: CacheType) -> Self {
        self.cache_type = cache_type;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// The size actually used at construction: negative values behave like
    /// an unset size.
    pub(crate) fn initial_max_size(&self) -> u64 {
        self.max_size.max(0) as u64
    }
}
