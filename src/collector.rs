//! Turns the cached desired LRPs into auto-discovery config templates.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, instrument, warn};

use crate::cache::StateCache;
use crate::error::DiscoveryError;
use crate::lrp::DesiredInstance;
use crate::template::{extract, ConfigTemplate};

/// Templates from one collection pass together with what failed.
#[derive(Debug, Default)]
pub struct Collection {
    /// Snapshot generation the templates were built from.
    pub generation: u64,
    pub templates: Vec<ConfigTemplate>,
    pub errors: Vec<DiscoveryError>,
}

/// Config provider reading desired LRPs from a [`StateCache`].
pub struct ConfigCollector {
    cache: StateCache,
    // generation + 1 of the last collected snapshot, 0 before the first pass
    collected: AtomicU64,
}

impl ConfigCollector {
    pub fn new(cache: StateCache) -> Self {
        Self {
            cache,
            collected: AtomicU64::new(0),
        }
    }

    pub fn cache(&self) -> &StateCache {
        &self.cache
    }

    /// Collects templates from every desired LRP; errors are logged and dropped.
    pub fn collect(&self) -> Vec<ConfigTemplate> {
        self.collect_with_errors().templates
    }

    /// Collects templates from every desired LRP of the current snapshot.
    ///
    /// Instances without an auto-discovery payload are skipped. A broken
    /// payload or key is reported and never stops the other instances.
    /// Templates are not deduplicated across instances.
    #[instrument(skip(self))]
    pub fn collect_with_errors(&self) -> Collection {
        let collection = self.peek();
        self.collected
            .store(collection.generation + 1, Ordering::Release);
        collection
    }

    /// Same as [`ConfigCollector::collect_with_errors`] but leaves
    /// [`ConfigCollector::is_up_to_date`] untouched.
    pub fn peek(&self) -> Collection {
        let snapshot = self.cache.snapshot();
        let mut collection = Collection {
            generation: snapshot.generation,
            ..Collection::default()
        };

        for desired in snapshot.desired.iter() {
            collect_instance(desired, &mut collection);
        }

        debug!(
            "Collected {} config template(s) from {} desired LRP(s), {} error(s)",
            collection.templates.len(),
            snapshot.desired.len(),
            collection.errors.len()
        );
        collection
    }

    /// True when the snapshot has not changed since the last collection.
    pub fn is_up_to_date(&self) -> bool {
        let collected = self.collected.load(Ordering::Acquire);
        collected != 0 && collected == self.cache.snapshot().generation + 1
    }
}

fn collect_instance(desired: &DesiredInstance, collection: &mut Collection) {
    if desired.env_ad.is_empty() {
        return;
    }

    match extract(&desired.process_guid, &desired.env_ad) {
        Ok(extraction) => {
            for err in &extraction.errors {
                warn!("Cannot parse endpoint template: {}", err);
            }
            collection.templates.extend(extraction.templates);
            collection.errors.extend(extraction.errors);
        }
        Err(err) => {
            error!("Skipping desired LRP {}: {}", desired.process_guid, err);
            collection.errors.push(err);
        }
    }
}
