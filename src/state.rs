//! Application state shared by the HTTP handlers.

use bbs_discovery::{ConfigCollector, StateCache};
use prometheus::Registry;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::metrics::CacheMetrics;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests.
pub struct AppState {
    pub registry: Registry,
    pub metrics: CacheMetrics,
    /// Template provider over the process's BBS cache.
    pub collector: ConfigCollector,
    pub config: Arc<Config>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(registry: Registry, metrics: CacheMetrics, cache: StateCache, config: Config) -> Self {
        Self {
            registry,
            metrics,
            collector: ConfigCollector::new(cache),
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }

    pub fn cache(&self) -> &StateCache {
        self.collector.cache()
    }
}
