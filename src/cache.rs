//! Cache of the BBS actual and desired LRP state.
//!
//! The cache holds one immutable [`Snapshot`] behind an [`ArcSwap`]. A
//! single refresh task replaces it wholesale once per poll interval; readers
//! load the current `Arc` and never wait on the network. A failed cycle
//! leaves the previous snapshot in place.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::client::{
    ActualLrpFilter, BbsHttpClient, ClientSettings, DesiredLrpFilter, RemoteStateClient,
};
use crate::error::DiscoveryError;
use crate::lrp::{ActualInstance, DesiredInstance};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// One complete refresh cycle worth of state.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// 0 for the initial empty snapshot, then +1 per successful refresh.
    pub generation: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub actual: Arc<[ActualInstance]>,
    pub desired: Arc<[DesiredInstance]>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            generation: 0,
            refreshed_at: None,
            actual: Arc::from(Vec::new()),
            desired: Arc::from(Vec::new()),
        }
    }
}

/// Lifecycle of a cache handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Configuring,
    Running,
    Stopped,
}

/// Bookkeeping about refresh attempts, for health reporting.
#[derive(Debug, Clone, Default)]
pub struct RefreshStatus {
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_duration: Option<Duration>,
    pub last_error: Option<String>,
    pub consecutive_failures: u64,
    pub total_failures: u64,
    /// Records dropped by the last successful cycle (bad process GUIDs).
    pub skipped_records: usize,
}

/// Settings for [`CacheRegistry::get_or_configure`].
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub client: ClientSettings,
    pub poll_interval: Duration,
    pub domain: Option<String>,
}

struct Inner {
    client: Arc<dyn RemoteStateClient>,
    poll_interval: Duration,
    domain: Option<String>,
    snapshot: ArcSwap<Snapshot>,
    state: Mutex<CacheState>,
    status: Mutex<RefreshStatus>,
    // Serializes writers; readers never touch it.
    refresh_guard: tokio::sync::Mutex<()>,
}

/// Handle to the LRP state cache. Cheap to clone.
#[derive(Clone)]
pub struct StateCache {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StateCache {
    /// Creates a cache in the `Configuring` state. Nothing is fetched until
    /// [`StateCache::start`] or [`StateCache::refresh_once`] is called.
    pub fn new(client: Arc<dyn RemoteStateClient>, poll_interval: Duration) -> Self {
        Self::with_domain(client, poll_interval, None)
    }

    /// Like [`StateCache::new`] but restricts both queries to one BBS domain.
    pub fn with_domain(
        client: Arc<dyn RemoteStateClient>,
        poll_interval: Duration,
        domain: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                poll_interval,
                domain,
                snapshot: ArcSwap::from_pointee(Snapshot::empty()),
                state: Mutex::new(CacheState::Configuring),
                status: Mutex::new(RefreshStatus::default()),
                refresh_guard: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.inner.poll_interval
    }

    pub fn state(&self) -> CacheState {
        *lock(&self.inner.state)
    }

    pub fn status(&self) -> RefreshStatus {
        lock(&self.inner.status).clone()
    }

    /// Current snapshot; both halves come from the same refresh cycle.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshot.load_full()
    }

    pub fn actual_instances(&self) -> Arc<[ActualInstance]> {
        self.inner.snapshot.load().actual.clone()
    }

    pub fn desired_instances(&self) -> Arc<[DesiredInstance]> {
        self.inner.snapshot.load().desired.clone()
    }

    /// Runs one refresh cycle.
    ///
    /// Both list calls are issued concurrently. If either fails the cycle is
    /// abandoned and the published snapshot is left untouched; the next tick
    /// is the retry.
    #[instrument(skip(self))]
    pub async fn refresh_once(&self) -> Result<Arc<Snapshot>, DiscoveryError> {
        let _writer = self.inner.refresh_guard.lock().await;
        let start = Instant::now();
        lock(&self.inner.status).last_attempt = Some(Utc::now());
        debug!("Starting BBS state refresh");

        let actual_filter = ActualLrpFilter {
            domain: self.inner.domain.clone(),
            ..ActualLrpFilter::default()
        };
        let desired_filter = DesiredLrpFilter {
            domain: self.inner.domain.clone(),
            ..DesiredLrpFilter::default()
        };
        let client = &self.inner.client;
        let (actual, desired) = tokio::join!(
            client.list_actual_lrps(&actual_filter),
            client.list_desired_lrps(&desired_filter)
        );

        let (raw_actual, raw_desired) = match (actual, desired) {
            (Ok(actual), Ok(desired)) => (actual, desired),
            (Err(source), desired) => {
                if let Err(other) = desired {
                    warn!("Listing desired LRPs failed as well: {}", other);
                }
                return Err(self.record_failure(DiscoveryError::RemoteFetch {
                    what: "actual LRPs",
                    source,
                }));
            }
            (Ok(_), Err(source)) => {
                return Err(self.record_failure(DiscoveryError::RemoteFetch {
                    what: "desired LRPs",
                    source,
                }));
            }
        };
        debug!(
            "Fetched {} actual and {} desired LRPs",
            raw_actual.len(),
            raw_desired.len()
        );

        let skipped = AtomicUsize::new(0);
        let actual: Vec<ActualInstance> = project_all(&raw_actual, &skipped);
        let desired: Vec<DesiredInstance> = project_all(&raw_desired, &skipped);
        let skipped = skipped.load(Ordering::Relaxed);

        let snapshot = Arc::new(Snapshot {
            generation: self.inner.snapshot.load().generation + 1,
            refreshed_at: Some(Utc::now()),
            actual: actual.into(),
            desired: desired.into(),
        });
        self.inner.snapshot.store(snapshot.clone());

        {
            let mut status = lock(&self.inner.status);
            status.last_success = snapshot.refreshed_at;
            status.last_duration = Some(start.elapsed());
            status.last_error = None;
            status.consecutive_failures = 0;
            status.skipped_records = skipped;
        }

        info!(
            "BBS state refreshed: generation {}, {} actual, {} desired, {} skipped, {:.2}ms",
            snapshot.generation,
            snapshot.actual.len(),
            snapshot.desired.len(),
            skipped,
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(snapshot)
    }

    fn record_failure(&self, err: DiscoveryError) -> DiscoveryError {
        let mut status = lock(&self.inner.status);
        status.last_error = Some(err.to_string());
        status.consecutive_failures += 1;
        status.total_failures += 1;
        err
    }

    /// Spawns the refresh loop: one eager refresh, then one per poll interval.
    ///
    /// Returns `None` when the loop was already started for this cache.
    /// Cancelling `cancel` stops the loop, abandoning an in-flight cycle.
    pub fn start(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        {
            let mut state = lock(&self.inner.state);
            if *state != CacheState::Configuring {
                return None;
            }
            *state = CacheState::Running;
        }

        let cache = self.clone();
        Some(tokio::spawn(async move { cache.run(cancel).await }))
    }

    async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(self.inner.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(
            "BBS refresh task started with {:?} interval",
            self.inner.poll_interval
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.refresh_once() => {
                    if let Err(e) = result {
                        error!("BBS state refresh failed: {}", e);
                    }
                }
            }
        }

        *lock(&self.inner.state) = CacheState::Stopped;
        info!("BBS refresh task stopped");
    }
}

fn project_all<'a, R, T>(records: &'a [R], skipped: &AtomicUsize) -> Vec<T>
where
    R: Sync,
    T: TryFrom<&'a R, Error = DiscoveryError> + Send,
{
    records
        .par_iter()
        .filter_map(|record| match T::try_from(record) {
            Ok(projected) => Some(projected),
            Err(e) => {
                warn!("Skipping LRP record: {}", e);
                skipped.fetch_add(1, Ordering::Relaxed);
                None
            }
        })
        .collect()
}

/// Get-or-create holder for the process's cache.
///
/// The first successful configure call builds the client and the cache;
/// later calls return the same handle and ignore their settings.
#[derive(Default)]
pub struct CacheRegistry {
    slot: Mutex<Option<StateCache>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<StateCache> {
        lock(&self.slot).clone()
    }

    pub fn get_or_configure(&self, settings: &CacheSettings) -> Result<StateCache, DiscoveryError> {
        self.get_or_configure_with(|| {
            let client = BbsHttpClient::new(&settings.client)
                .map_err(|e| DiscoveryError::Configuration(e.to_string()))?;
            Ok(StateCache::with_domain(
                Arc::new(client),
                settings.poll_interval,
                settings.domain.clone(),
            ))
        })
    }

    pub fn get_or_configure_with<F>(&self, build: F) -> Result<StateCache, DiscoveryError>
    where
        F: FnOnce() -> Result<StateCache, DiscoveryError>,
    {
        let mut slot = lock(&self.slot);
        if let Some(cache) = slot.as_ref() {
            debug!("BBS cache already configured");
            return Ok(cache.clone());
        }

        let cache = build()?;
        *slot = Some(cache.clone());
        Ok(cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{actual_lrp, desired_lrp, process_guid, ScriptedClient};
    use std::sync::atomic::Ordering;

    fn cache_with(client: &Arc<ScriptedClient>) -> StateCache {
        StateCache::new(client.clone(), Duration::from_millis(10))
    }

    fn seeded_client() -> Arc<ScriptedClient> {
        Arc::new(ScriptedClient::with_records(
            vec![actual_lrp(&process_guid(1), "cell-a"), actual_lrp(&process_guid(2), "cell-b")],
            vec![desired_lrp(&process_guid(1), r#"{"web": {}}"#, "")],
        ))
    }

    #[tokio::test]
    async fn empty_before_first_refresh() {
        let cache = cache_with(&seeded_client());

        assert!(cache.actual_instances().is_empty());
        assert!(cache.desired_instances().is_empty());
        assert_eq!(cache.snapshot().generation, 0);
        assert_eq!(cache.state(), CacheState::Configuring);
    }

    #[tokio::test]
    async fn refresh_publishes_projected_records() {
        let client = seeded_client();
        let cache = cache_with(&client);

        let snapshot = cache.refresh_once().await.expect("refresh succeeds");

        assert_eq!(snapshot.generation, 1);
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.actual_instances().len(), 2);
        assert_eq!(cache.actual_instances()[1].cell_id, "cell-b");

        let desired = cache.desired_instances();
        assert_eq!(desired.len(), 1);
        assert_eq!(desired[0].env_ad, r#"{"web": {}}"#);
        assert_eq!(desired[0].app_guid, crate::testing::APP_GUID);

        let status = cache.status();
        assert!(status.last_success.is_some());
        assert_eq!(status.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_snapshot() {
        let client = seeded_client();
        let cache = cache_with(&client);
        let before = cache.refresh_once().await.expect("first refresh succeeds");

        client.set_records(vec![], vec![]);
        client.fail_desired.store(true, Ordering::SeqCst);
        let err = cache.refresh_once().await.expect_err("desired call fails");
        assert!(matches!(err, DiscoveryError::RemoteFetch { what: "desired LRPs", .. }));

        client.fail_desired.store(false, Ordering::SeqCst);
        client.fail_actual.store(true, Ordering::SeqCst);
        let err = cache.refresh_once().await.expect_err("actual call fails");
        assert!(matches!(err, DiscoveryError::RemoteFetch { what: "actual LRPs", .. }));

        let after = cache.snapshot();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.actual.len(), 2);

        let status = cache.status();
        assert_eq!(status.consecutive_failures, 2);
        assert_eq!(status.total_failures, 2);
        assert!(status.last_error.is_some());

        client.fail_actual.store(false, Ordering::SeqCst);
        let recovered = cache.refresh_once().await.expect("refresh succeeds again");
        assert_eq!(recovered.generation, 2);
        assert!(recovered.actual.is_empty());
        assert_eq!(cache.status().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn short_process_guid_skips_only_that_record() {
        let client = Arc::new(ScriptedClient::with_records(
            vec![actual_lrp("too-short", "cell-a"), actual_lrp(&process_guid(1), "cell-b")],
            vec![desired_lrp("also-short", "", ""), desired_lrp(&process_guid(1), "", "")],
        ));
        let cache = cache_with(&client);

        let snapshot = cache.refresh_once().await.expect("refresh succeeds");

        assert_eq!(snapshot.actual.len(), 1);
        assert_eq!(snapshot.actual[0].cell_id, "cell-b");
        assert_eq!(snapshot.desired.len(), 1);
        assert_eq!(cache.status().skipped_records, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn readers_never_observe_torn_snapshots() {
        let client = seeded_client();
        let cache = cache_with(&client);
        let stop = CancellationToken::new();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                let stop = stop.clone();
                tokio::spawn(async move {
                    let mut last_generation = 0;
                    let mut reads = 0u64;
                    while !stop.is_cancelled() {
                        let snapshot = cache.snapshot();
                        assert!(snapshot.generation >= last_generation);
                        last_generation = snapshot.generation;
                        if let (Some(actual), Some(desired)) =
                            (snapshot.actual.first(), snapshot.desired.first())
                        {
                            assert_eq!(actual.cell_id, desired.env_vcap_services);
                        }
                        reads += 1;
                        tokio::task::yield_now().await;
                    }
                    reads
                })
            })
            .collect();

        for tag in 1..=200u64 {
            client.tag.store(tag, Ordering::SeqCst);
            let snapshot = cache.refresh_once().await.expect("refresh succeeds");
            assert_eq!(snapshot.actual[0].cell_id, format!("cell-{tag}"));
        }
        stop.cancel();

        for reader in readers {
            assert!(reader.await.expect("reader did not panic") > 0);
        }
        assert_eq!(cache.snapshot().generation, 200);
    }

    #[tokio::test]
    async fn refresh_loop_runs_eagerly_and_stops_on_cancel() {
        let client = seeded_client();
        let cache = StateCache::new(client.clone(), Duration::from_secs(3600));
        let cancel = CancellationToken::new();

        let handle = cache.start(cancel.clone()).expect("first start spawns the loop");
        assert!(cache.start(cancel.clone()).is_none());
        assert_eq!(cache.state(), CacheState::Running);

        tokio::time::timeout(Duration::from_secs(5), async {
            while cache.snapshot().generation == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("eager refresh happens without waiting for the interval");

        cancel.cancel();
        handle.await.expect("loop exits cleanly");
        assert_eq!(cache.state(), CacheState::Stopped);
        assert_eq!(cache.snapshot().generation, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_loop_ticks_every_interval() {
        let client = seeded_client();
        let cache = StateCache::new(client.clone(), Duration::from_secs(3));
        let cancel = CancellationToken::new();
        let handle = cache.start(cancel.clone()).expect("loop starts");

        client.fail_actual.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(9500)).await;
        // ticks at 0s, 3s, 6s and 9s, all failing
        assert_eq!(cache.status().total_failures, 4);
        assert_eq!(cache.snapshot().generation, 0);

        client.fail_actual.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(cache.snapshot().generation, 1);

        cancel.cancel();
        handle.await.expect("loop exits cleanly");
    }

    #[test]
    fn registry_configures_once() {
        let registry = CacheRegistry::new();
        assert!(registry.get().is_none());

        let settings = CacheSettings {
            client: ClientSettings::new("http://bbs.service.cf.internal:8889"),
            poll_interval: DEFAULT_POLL_INTERVAL,
            domain: None,
        };
        let first = registry.get_or_configure(&settings).expect("valid settings");

        let other = CacheSettings {
            client: ClientSettings::new("http://elsewhere:1"),
            poll_interval: Duration::from_secs(60),
            domain: Some("cf-apps".into()),
        };
        let second = registry.get_or_configure(&other).expect("already configured");

        assert!(Arc::ptr_eq(&first.inner, &second.inner));
        assert_eq!(second.poll_interval(), DEFAULT_POLL_INTERVAL);
        assert!(registry.get().is_some());
    }

    #[test]
    fn registry_reports_bad_endpoint() {
        let registry = CacheRegistry::new();
        let settings = CacheSettings {
            client: ClientSettings::new("::not-a-url::"),
            poll_interval: DEFAULT_POLL_INTERVAL,
            domain: None,
        };

        let err = registry.get_or_configure(&settings).err().expect("malformed endpoint");
        assert!(matches!(err, DiscoveryError::Configuration(_)));
        assert!(registry.get().is_none());
    }
}
