//! Prometheus metrics definitions for bbs-discovery.
//!
//! Values are refreshed from the cache status and the latest collection
//! each time `/metrics` is scraped.

use bbs_discovery::{Collection, RefreshStatus, Snapshot};
use prometheus::{Gauge, GaugeVec, Opts, Registry};

/// Collection of Prometheus metrics for the BBS cache and template extraction.
#[derive(Clone)]
pub struct CacheMetrics {
    pub refresh_duration: Gauge,
    pub refresh_success: Gauge,
    pub refresh_failures: Gauge,
    pub consecutive_failures: Gauge,
    pub last_success_timestamp: Gauge,
    pub generation: Gauge,
    pub skipped_records: Gauge,

    pub actual_lrps: Gauge,
    pub desired_lrps: Gauge,
    pub desired_lrps_with_ad: Gauge,

    pub templates: Gauge,
    pub template_errors: GaugeVec,
}

impl CacheMetrics {
    /// Creates and registers all Prometheus metrics with the registry.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let refresh_duration = Gauge::new(
            "bbs_discovery_refresh_duration_seconds",
            "Time spent by the last successful BBS refresh",
        )?;
        let refresh_success = Gauge::new(
            "bbs_discovery_refresh_success",
            "Whether the last BBS refresh was successful (1) or failed (0)",
        )?;
        let refresh_failures = Gauge::new(
            "bbs_discovery_refresh_failures",
            "Number of failed BBS refreshes since start",
        )?;
        let consecutive_failures = Gauge::new(
            "bbs_discovery_refresh_consecutive_failures",
            "Number of BBS refreshes failed in a row",
        )?;
        let last_success_timestamp = Gauge::new(
            "bbs_discovery_last_success_timestamp_seconds",
            "Unix time of the last successful BBS refresh",
        )?;
        let generation = Gauge::new(
            "bbs_discovery_snapshot_generation",
            "Generation of the published snapshot (0 = never refreshed)",
        )?;
        let skipped_records = Gauge::new(
            "bbs_discovery_skipped_records",
            "LRP records dropped by the last refresh because of malformed process GUIDs",
        )?;
        let actual_lrps = Gauge::new(
            "bbs_discovery_actual_lrps",
            "Actual LRPs in the published snapshot",
        )?;
        let desired_lrps = Gauge::new(
            "bbs_discovery_desired_lrps",
            "Desired LRPs in the published snapshot",
        )?;
        let desired_lrps_with_ad = Gauge::new(
            "bbs_discovery_desired_lrps_with_ad",
            "Desired LRPs carrying an auto-discovery payload",
        )?;
        let templates = Gauge::new(
            "bbs_discovery_config_templates",
            "Config templates extracted from the published snapshot",
        )?;
        let template_errors = GaugeVec::new(
            Opts::new(
                "bbs_discovery_template_errors",
                "Template extraction errors in the published snapshot",
            ),
            &["kind"],
        )?;

        registry.register(Box::new(refresh_duration.clone()))?;
        registry.register(Box::new(refresh_success.clone()))?;
        registry.register(Box::new(refresh_failures.clone()))?;
        registry.register(Box::new(consecutive_failures.clone()))?;
        registry.register(Box::new(last_success_timestamp.clone()))?;
        registry.register(Box::new(generation.clone()))?;
        registry.register(Box::new(skipped_records.clone()))?;
        registry.register(Box::new(actual_lrps.clone()))?;
        registry.register(Box::new(desired_lrps.clone()))?;
        registry.register(Box::new(desired_lrps_with_ad.clone()))?;
        registry.register(Box::new(templates.clone()))?;
        registry.register(Box::new(template_errors.clone()))?;

        Ok(Self {
            refresh_duration,
            refresh_success,
            refresh_failures,
            consecutive_failures,
            last_success_timestamp,
            generation,
            skipped_records,
            actual_lrps,
            desired_lrps,
            desired_lrps_with_ad,
            templates,
            template_errors,
        })
    }

    /// Copies the current cache state into the gauges.
    pub fn observe(&self, snapshot: &Snapshot, status: &RefreshStatus, collection: &Collection) {
        if let Some(duration) = status.last_duration {
            self.refresh_duration.set(duration.as_secs_f64());
        }
        let succeeded = status.last_success.is_some() && status.consecutive_failures == 0;
        self.refresh_success.set(if succeeded { 1.0 } else { 0.0 });
        self.refresh_failures.set(status.total_failures as f64);
        self.consecutive_failures
            .set(status.consecutive_failures as f64);
        if let Some(ts) = status.last_success {
            self.last_success_timestamp.set(ts.timestamp() as f64);
        }
        self.generation.set(snapshot.generation as f64);
        self.skipped_records.set(status.skipped_records as f64);

        self.actual_lrps.set(snapshot.actual.len() as f64);
        self.desired_lrps.set(snapshot.desired.len() as f64);
        self.desired_lrps_with_ad.set(
            snapshot
                .desired
                .iter()
                .filter(|d| !d.env_ad.is_empty())
                .count() as f64,
        );

        self.templates.set(collection.templates.len() as f64);
        self.template_errors.reset();
        for err in &collection.errors {
            self.template_errors.with_label_values(&[err.kind()]).inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbs_discovery::DiscoveryError;
    use prometheus::{Encoder, TextEncoder};
    use std::sync::Arc;

    #[test]
    fn registers_and_observes() {
        let registry = Registry::new();
        let metrics = CacheMetrics::new(&registry).expect("metrics register");

        let snapshot = Snapshot {
            generation: 3,
            refreshed_at: None,
            actual: Arc::from(Vec::new()),
            desired: Arc::from(Vec::new()),
        };
        let status = RefreshStatus {
            consecutive_failures: 2,
            total_failures: 5,
            ..RefreshStatus::default()
        };
        let collection = Collection {
            errors: vec![
                DiscoveryError::PayloadParse {
                    owner: "p".into(),
                    message: "eof".into(),
                },
                DiscoveryError::PayloadParse {
                    owner: "q".into(),
                    message: "eof".into(),
                },
            ],
            ..Collection::default()
        };
        metrics.observe(&snapshot, &status, &collection);

        assert_eq!(metrics.generation.get(), 3.0);
        assert_eq!(metrics.refresh_success.get(), 0.0);
        assert_eq!(metrics.refresh_failures.get(), 5.0);
        assert_eq!(
            metrics
                .template_errors
                .with_label_values(&["payload_parse"])
                .get(),
            2.0
        );

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .expect("encodes");
        let text = String::from_utf8(buffer).expect("utf-8");
        assert!(text.contains("bbs_discovery_snapshot_generation 3"));
        assert!(text.contains("bbs_discovery_refresh_failures 5"));
        // gauges must not carry the counter suffix
        assert!(!text.contains("_total"));
    }

    #[test]
    fn double_registration_fails() {
        let registry = Registry::new();
        CacheMetrics::new(&registry).expect("first registration");
        assert!(CacheMetrics::new(&registry).is_err());
    }
}
