//! Per-entity partition health cache.
//!
//! The cache keeps at most one index per requested entity and refreshes
//! entries whose freshness hint no longer matches the caller's. Refreshes are
//! serialized: [`PartitionHealthCache::request`] only queues work, and a single
//! consumer ([`PartitionHealthCache::run_next`], usually driven by the worker
//! in [`crate::worker`]) performs one fetch at a time.
//!
//! Stale entries stay visible until their replacement is built, so callers
//! never see a previously loaded entity disappear.
//!
//! Lock order is schedule, then entries. The entry list is replaced as a
//! whole on every write; readers clone the `Arc` and never block writers for
//! longer than the swap.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use phealth_error::{HealthError, Result};
use phealth_index::PartitionHealthIndex;
use phealth_types::EntityKey;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::entry::CacheEntry;
use crate::fetcher::PartitionHealthFetcher;
use crate::stats::{CacheStats, StatsCounters};

/// One unit of refresh work: fetch `entity_key` for `hint`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshJob {
    pub entity_key: EntityKey,
    pub hint: String,
}

/// Result of one [`PartitionHealthCache::run_next`] step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The index replaced (or created) the entry, tagged with the hint it was
    /// fetched under. If the caller has since moved on, the entry stays
    /// stale and is refreshed again.
    Applied(EntityKey),
    /// The entry was already fresh for the caller's current hint, so the
    /// response (fetched under an older one) was dropped.
    Superseded(EntityKey),
    /// The entity left the requested key set while the fetch was in flight.
    NoLongerRequested(EntityKey),
}

/// Keys and hint of the most recent `request`.
#[derive(Debug, Clone)]
struct Interest {
    keys: Vec<EntityKey>,
    hint: String,
}

#[derive(Debug, Default)]
struct Schedule {
    interest: Option<Interest>,
    queue: VecDeque<RefreshJob>,
    in_flight: Option<RefreshJob>,
    /// Last failed job per key; at most one per key.
    failed: Vec<RefreshJob>,
}

impl Schedule {
    /// The current interest, if it still includes `entity_key`.
    fn interest_in(&self, entity_key: &EntityKey) -> Option<&Interest> {
        self.interest
            .as_ref()
            .filter(|interest| interest.keys.contains(entity_key))
    }

    fn failed_under(&self, entity_key: &EntityKey, hint: &str) -> bool {
        self.failed
            .iter()
            .any(|job| &job.entity_key == entity_key && job.hint == hint)
    }

    fn record_failure(&mut self, job: RefreshJob) {
        self.failed.retain(|failed| failed.entity_key != job.entity_key);
        self.failed.push(job);
    }

    fn clear_failure(&mut self, entity_key: &EntityKey) {
        self.failed.retain(|failed| &failed.entity_key != entity_key);
    }
}

pub(crate) struct Inner<F> {
    pub(crate) fetcher: F,
    pub(crate) config: CacheConfig,
    entries: RwLock<Arc<Vec<CacheEntry>>>,
    schedule: Mutex<Schedule>,
    pub(crate) wake: Notify,
    stats: StatsCounters,
}

/// Owned, cloneable handle to one cache instance.
pub struct PartitionHealthCache<F> {
    pub(crate) inner: Arc<Inner<F>>,
}

impl<F> Clone for PartitionHealthCache<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F> std::fmt::Debug for PartitionHealthCache<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let schedule = self.inner.schedule.lock();
        f.debug_struct("PartitionHealthCache")
            .field("entries", &self.inner.entries.read().len())
            .field("queued", &schedule.queue.len())
            .field("in_flight", &schedule.in_flight)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl<F: PartitionHealthFetcher> PartitionHealthCache<F> {
    /// Create a cache with default configuration.
    #[must_use]
    pub fn new(fetcher: F) -> Self {
        Self::build(fetcher, CacheConfig::default())
    }

    pub fn with_config(fetcher: F, config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(fetcher, config))
    }

    fn build(fetcher: F, config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                config,
                entries: RwLock::new(Arc::new(Vec::new())),
                schedule: Mutex::new(Schedule::default()),
                wake: Notify::new(),
                stats: StatsCounters::default(),
            }),
        }
    }

    #[must_use]
    pub fn fetcher(&self) -> &F {
        &self.inner.fetcher
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Record the caller's interest and queue a refresh for the first key
    /// that is missing or tagged with a different hint.
    ///
    /// Returns the current entries for `keys`, in request order. Entries with
    /// a stale hint are included; keys never loaded are absent.
    pub fn request(&self, keys: &[EntityKey], hint: &str) -> Vec<CacheEntry> {
        let snapshot = {
            let mut schedule = self.inner.schedule.lock();
            schedule.interest = Some(Interest {
                keys: keys.to_vec(),
                hint: hint.to_owned(),
            });
            let snapshot = self.entries();
            let _ = self.schedule_stale(&mut schedule, &snapshot, true);
            snapshot
        };

        keys.iter()
            .filter_map(|key| {
                snapshot
                    .iter()
                    .find(|entry| &entry.entity_key == key)
                    .cloned()
            })
            .collect()
    }

    /// Re-evaluate the last recorded interest and queue the first stale key
    /// that has not already failed under the current hint. Returns the key
    /// queued, if any.
    ///
    /// Unlike `request`, this never re-queues a key that just failed, so a
    /// persistently broken entity cannot keep the worker busy.
    pub fn schedule_next_stale(&self) -> Option<EntityKey> {
        let mut schedule = self.inner.schedule.lock();
        let snapshot = self.entries();
        self.schedule_stale(&mut schedule, &snapshot, false)
    }

    /// Keys that failed under the current hint are passed over in favour of
    /// later stale keys; with `retry_failed` the first of them is retried
    /// once nothing else is stale.
    fn schedule_stale(
        &self,
        schedule: &mut Schedule,
        entries: &[CacheEntry],
        retry_failed: bool,
    ) -> Option<EntityKey> {
        let interest = schedule.interest.as_ref()?;
        let stale: Vec<&EntityKey> = interest
            .keys
            .iter()
            .filter(|key| {
                !entries
                    .iter()
                    .any(|entry| &entry.entity_key == *key && entry.is_fresh_for(&interest.hint))
            })
            .collect();
        let untried = stale
            .iter()
            .find(|key| !schedule.failed_under(key, &interest.hint));
        let pick = match untried {
            Some(key) => *key,
            None if retry_failed => *stale.first()?,
            None => return None,
        };
        let job = RefreshJob {
            entity_key: pick.clone(),
            hint: interest.hint.clone(),
        };
        let entity_key = job.entity_key.clone();
        self.enqueue(schedule, job).then_some(entity_key)
    }

    /// Queue `job` unless an equivalent one is queued or in flight. A queued
    /// job for the same key with an older hint is retargeted instead.
    fn enqueue(&self, schedule: &mut Schedule, job: RefreshJob) -> bool {
        if schedule.in_flight.as_ref() == Some(&job) {
            return false;
        }
        if let Some(queued) = schedule
            .queue
            .iter_mut()
            .find(|queued| queued.entity_key == job.entity_key)
        {
            if queued.hint == job.hint {
                return false;
            }
            debug!(
                entity = %job.entity_key,
                from = %queued.hint,
                to = %job.hint,
                "retargeted queued partition health refresh"
            );
            queued.hint = job.hint;
            return true;
        }
        if schedule.queue.len() >= self.inner.config.max_pending {
            warn!(
                entity = %job.entity_key,
                max_pending = self.inner.config.max_pending,
                "refresh queue full; dropping request"
            );
            return false;
        }

        debug!(entity = %job.entity_key, hint = %job.hint, "queued partition health refresh");
        schedule.queue.push_back(job);
        self.inner.wake.notify_one();
        true
    }

    /// Perform one refresh: pop the next current job, fetch, build, and
    /// apply.
    ///
    /// Returns `Ok(None)` when nothing is queued or another step is already
    /// in flight. On error the previous entry (if any) is left untouched and
    /// the key is not marked fresh, so a later `request` retries it.
    pub async fn run_next(&self) -> Result<Option<RefreshOutcome>> {
        let Some(job) = self.begin_next() else {
            return Ok(None);
        };
        self.inner.stats.record_started();
        let built = self.fetch_index(&job).await;
        self.finish(job, built).map(Some)
    }

    fn begin_next(&self) -> Option<RefreshJob> {
        let mut schedule = self.inner.schedule.lock();
        if schedule.in_flight.is_some() {
            return None;
        }
        while let Some(mut job) = schedule.queue.pop_front() {
            let Some(interest) = schedule.interest_in(&job.entity_key) else {
                debug!(entity = %job.entity_key, "skipped refresh for key no longer requested");
                self.inner.stats.record_discarded();
                continue;
            };
            job.hint.clone_from(&interest.hint);
            schedule.in_flight = Some(job.clone());
            return Some(job);
        }
        None
    }

    async fn fetch_index(&self, job: &RefreshJob) -> Result<PartitionHealthIndex> {
        let fetch = self.inner.fetcher.fetch(&job.entity_key);
        let payload = match self.inner.config.fetch_timeout() {
            Some(limit) => tokio::time::timeout(limit, fetch).await.map_err(|_| {
                HealthError::FetchTimeout {
                    entity: job.entity_key.to_string(),
                    timeout_ms: self.inner.config.fetch_timeout_ms,
                }
            })??,
            None => fetch.await?,
        };
        PartitionHealthIndex::from_payload(payload)
    }

    fn finish(
        &self,
        job: RefreshJob,
        built: Result<PartitionHealthIndex>,
    ) -> Result<RefreshOutcome> {
        let mut schedule = self.inner.schedule.lock();
        schedule.in_flight = None;

        let index = match built {
            Ok(index) => index,
            Err(err) => {
                self.inner.stats.record_failed();
                warn!(
                    entity = %job.entity_key,
                    hint = %job.hint,
                    error = %err,
                    "partition health refresh failed"
                );
                schedule.record_failure(job);
                return Err(err);
            }
        };

        let Some(interest) = schedule.interest_in(&job.entity_key) else {
            self.inner.stats.record_discarded();
            debug!(entity = %job.entity_key, "discarded response for key no longer requested");
            return Ok(RefreshOutcome::NoLongerRequested(job.entity_key));
        };
        if job.hint != interest.hint {
            // Only a response for the current hint may replace an entry that
            // is already fresh; otherwise the older response still beats
            // having no entry or an even older one.
            if self
                .get(&job.entity_key)
                .is_some_and(|entry| entry.is_fresh_for(&interest.hint))
            {
                self.inner.stats.record_discarded();
                debug!(entity = %job.entity_key, hint = %job.hint, "discarded superseded response");
                return Ok(RefreshOutcome::Superseded(job.entity_key));
            }
            debug!(
                entity = %job.entity_key,
                hint = %job.hint,
                current = %interest.hint,
                "applying response fetched under an older hint"
            );
        }

        schedule.clear_failure(&job.entity_key);
        self.upsert(CacheEntry {
            entity_key: job.entity_key.clone(),
            index: Arc::new(index),
            freshness_hint: job.hint,
        });
        self.inner.stats.record_applied();
        info!(entity = %job.entity_key, "partition health refreshed");
        Ok(RefreshOutcome::Applied(job.entity_key))
    }

    /// Forget a fetch whose future was dropped before completing.
    pub(crate) fn abandon_in_flight(&self) {
        if let Some(job) = self.inner.schedule.lock().in_flight.take() {
            debug!(entity = %job.entity_key, "abandoned in-flight refresh");
        }
    }

    /// Replace the entry for the same key, or append; publishes a new list.
    fn upsert(&self, entry: CacheEntry) {
        let mut entries = self.inner.entries.write();
        let mut next = Vec::clone(&entries);
        match next
            .iter_mut()
            .find(|existing| existing.entity_key == entry.entity_key)
        {
            Some(existing) => *existing = entry,
            None => next.push(entry),
        }
        *entries = Arc::new(next);
    }

    /// The full entry list, including keys no longer requested.
    #[must_use]
    pub fn entries(&self) -> Arc<Vec<CacheEntry>> {
        Arc::clone(&self.inner.entries.read())
    }

    #[must_use]
    pub fn get(&self, entity_key: &EntityKey) -> Option<CacheEntry> {
        self.entries()
            .iter()
            .find(|entry| &entry.entity_key == entity_key)
            .cloned()
    }

    /// Keys waiting for the worker, in queue order.
    #[must_use]
    pub fn pending_keys(&self) -> Vec<EntityKey> {
        self.inner
            .schedule
            .lock()
            .queue
            .iter()
            .map(|job| job.entity_key.clone())
            .collect()
    }

    #[must_use]
    pub fn in_flight(&self) -> Option<RefreshJob> {
        self.inner.schedule.lock().in_flight.clone()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use phealth_types::{Dimension, KeyRange, PartitionHealthPayload, PartitionState, RangePayload};
    use tokio::sync::Semaphore;

    use super::*;
    use crate::fetcher::InMemoryFetcher;

    fn key(name: &str) -> EntityKey {
        EntityKey::new(["warehouse", name])
    }

    fn payload(materialized: &[(&str, &str)]) -> PartitionHealthPayload {
        PartitionHealthPayload {
            dimensions: vec![
                Dimension::with_keys("day", &["d1", "d2", "d3"]).expect("valid dimension"),
            ],
            ranges: RangePayload::OneDimensional(
                materialized
                    .iter()
                    .map(|(start, end)| KeyRange::new(*start, *end))
                    .collect(),
            ),
        }
    }

    fn in_memory() -> PartitionHealthCache<Arc<InMemoryFetcher>> {
        let fetcher = Arc::new(InMemoryFetcher::new());
        fetcher.set(key("a"), payload(&[("d1", "d1")]));
        fetcher.set(key("b"), payload(&[("d1", "d3")]));
        PartitionHealthCache::new(fetcher)
    }

    fn entry_keys(entries: &[CacheEntry]) -> Vec<EntityKey> {
        entries.iter().map(|entry| entry.entity_key.clone()).collect()
    }

    /// Fetcher that blocks every call until a permit is released.
    struct GatedFetcher {
        inner: InMemoryFetcher,
        gate: Semaphore,
        in_progress: AtomicUsize,
        max_in_progress: AtomicUsize,
    }

    impl GatedFetcher {
        fn new() -> Self {
            Self {
                inner: InMemoryFetcher::new(),
                gate: Semaphore::new(0),
                in_progress: AtomicUsize::new(0),
                max_in_progress: AtomicUsize::new(0),
            }
        }

        fn release(&self) {
            self.gate.add_permits(1);
        }
    }

    #[async_trait]
    impl PartitionHealthFetcher for GatedFetcher {
        async fn fetch(&self, entity_key: &EntityKey) -> Result<PartitionHealthPayload> {
            let now = self.in_progress.fetch_add(1, Ordering::SeqCst) + 1;
            let _ = self.max_in_progress.fetch_max(now, Ordering::SeqCst);
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|err| HealthError::internal(err.to_string()))?;
            permit.forget();
            let _ = self.in_progress.fetch_sub(1, Ordering::SeqCst);
            self.inner.fetch(entity_key).await
        }
    }

    /// Spawn one `run_next` and return once its job is in flight.
    async fn start_step(
        cache: &PartitionHealthCache<Arc<GatedFetcher>>,
    ) -> tokio::task::JoinHandle<Result<Option<RefreshOutcome>>> {
        let step = tokio::spawn({
            let cache = cache.clone();
            async move { cache.run_next().await }
        });
        while cache.in_flight().is_none() {
            tokio::task::yield_now().await;
        }
        step
    }

    fn gated() -> (Arc<GatedFetcher>, PartitionHealthCache<Arc<GatedFetcher>>) {
        let fetcher = Arc::new(GatedFetcher::new());
        fetcher.inner.set(key("a"), payload(&[("d1", "d1")]));
        fetcher.inner.set(key("b"), payload(&[("d2", "d2")]));
        let cache = PartitionHealthCache::new(Arc::clone(&fetcher));
        (fetcher, cache)
    }

    #[tokio::test]
    async fn backlog_is_processed_one_key_at_a_time() {
        let cache = in_memory();
        let keys = [key("a"), key("b")];

        let entries = cache.request(&keys, "h1");
        assert!(entries.is_empty(), "case=first_request_empty");
        assert_eq!(cache.pending_keys(), vec![key("a")]);

        assert_eq!(
            cache.run_next().await,
            Ok(Some(RefreshOutcome::Applied(key("a"))))
        );
        assert_eq!(cache.run_next().await, Ok(None), "case=only_a_fetched");

        let entries = cache.request(&keys, "h1");
        assert_eq!(entry_keys(&entries), vec![key("a")], "case=no_b_yet");
        assert_eq!(cache.pending_keys(), vec![key("b")]);
        assert_eq!(
            cache.run_next().await,
            Ok(Some(RefreshOutcome::Applied(key("b"))))
        );

        let entries = cache.request(&keys, "h1");
        assert_eq!(entry_keys(&entries), vec![key("a"), key("b")]);
        assert!(cache.pending_keys().is_empty(), "case=no_fetch_when_fresh");
        assert_eq!(cache.fetcher().calls(), 2);
        assert_eq!(cache.stats().fetches_applied, 2);
    }

    #[tokio::test]
    async fn request_returns_entries_in_request_order() {
        let cache = in_memory();
        let _ = cache.request(&[key("a"), key("b")], "h1");
        let _ = cache.run_next().await;
        let _ = cache.schedule_next_stale();
        let _ = cache.run_next().await;

        let entries = cache.request(&[key("b"), key("a")], "h1");
        assert_eq!(entry_keys(&entries), vec![key("b"), key("a")]);
        let entries = cache.request(&[key("b")], "h1");
        assert_eq!(entry_keys(&entries), vec![key("b")]);
    }

    #[tokio::test]
    async fn stale_entry_served_until_refresh_completes() {
        let cache = in_memory();
        let _ = cache.request(&[key("a")], "h1");
        let _ = cache.run_next().await;

        cache
            .fetcher()
            .set(key("a"), payload(&[("d1", "d3")]));
        let entries = cache.request(&[key("a")], "h2");
        assert_eq!(entries.len(), 1, "case=no_missing_flash");
        assert_eq!(entries[0].freshness_hint, "h1");
        assert_eq!(entries[0].state_for_key(&["d2"]), Ok(PartitionState::Missing));
        assert_eq!(cache.pending_keys(), vec![key("a")]);

        // Repeated requests while pending keep serving the old entry and do
        // not queue duplicates.
        let entries = cache.request(&[key("a")], "h2");
        assert_eq!(entries[0].freshness_hint, "h1");
        assert_eq!(cache.pending_keys().len(), 1);

        let _ = cache.run_next().await;
        let entries = cache.request(&[key("a")], "h2");
        assert_eq!(entries[0].freshness_hint, "h2");
        assert_eq!(entries[0].state_for_key(&["d2"]), Ok(PartitionState::Success));
    }

    #[tokio::test]
    async fn fetch_failure_keeps_prior_entry_and_retries() {
        let cache = in_memory();
        let _ = cache.request(&[key("a")], "h1");
        let _ = cache.run_next().await;

        let _ = cache.fetcher().remove(&key("a"));
        let _ = cache.request(&[key("a")], "h2");
        let err = cache.run_next().await.expect_err("fetch must fail");
        assert!(matches!(err, HealthError::FetchFailure { .. }), "{err}");

        let entry = cache.get(&key("a")).expect("prior entry kept");
        assert_eq!(entry.freshness_hint, "h1");
        assert!(cache.pending_keys().is_empty());
        assert_eq!(cache.stats().fetches_failed, 1);

        cache
            .fetcher()
            .set(key("a"), payload(&[("d2", "d2")]));
        let _ = cache.request(&[key("a")], "h2");
        assert_eq!(cache.pending_keys(), vec![key("a")], "case=retry_queued");
        assert_eq!(
            cache.run_next().await,
            Ok(Some(RefreshOutcome::Applied(key("a"))))
        );
        assert_eq!(cache.get(&key("a")).expect("entry").freshness_hint, "h2");
    }

    #[tokio::test]
    async fn malformed_payload_is_not_cached() {
        let cache = in_memory();
        cache
            .fetcher()
            .set(key("a"), payload(&[("d3", "d1")]));
        let _ = cache.request(&[key("a")], "h1");
        let err = cache.run_next().await.expect_err("decode must fail");
        assert!(matches!(err, HealthError::MalformedRange { .. }), "{err}");
        assert!(cache.get(&key("a")).is_none());
    }

    #[tokio::test]
    async fn response_under_older_hint_is_applied_and_refreshed() {
        let (fetcher, cache) = gated();
        let _ = cache.request(&[key("a")], "h1");

        let step = start_step(&cache).await;
        assert_eq!(
            cache.in_flight(),
            Some(RefreshJob {
                entity_key: key("a"),
                hint: "h1".to_owned(),
            })
        );

        let _ = cache.request(&[key("a")], "h2");
        assert_eq!(cache.pending_keys(), vec![key("a")], "case=newer_hint_queued");
        assert_eq!(cache.run_next().await, Ok(None), "case=single_in_flight");

        fetcher.release();
        let outcome = step.await.expect("step task");
        assert_eq!(outcome, Ok(Some(RefreshOutcome::Applied(key("a")))));
        let entry = cache.get(&key("a")).expect("first load kept");
        assert_eq!(entry.freshness_hint, "h1", "case=tagged_with_fetch_hint");
        assert_eq!(cache.request(&[key("a")], "h2").len(), 1);

        fetcher.release();
        assert_eq!(
            cache.run_next().await,
            Ok(Some(RefreshOutcome::Applied(key("a"))))
        );
        assert_eq!(cache.get(&key("a")).expect("entry").freshness_hint, "h2");
        assert_eq!(fetcher.max_in_progress.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn entity_loads_while_hint_moves_every_round_trip() {
        let (fetcher, cache) = gated();
        for round in 0..5 {
            let _ = cache.request(&[key("a")], &format!("h{round}"));
            let step = start_step(&cache).await;
            let _ = cache.request(&[key("a")], &format!("h{}", round + 1));
            fetcher.release();

            let outcome = step.await.expect("step task");
            assert_eq!(
                outcome,
                Ok(Some(RefreshOutcome::Applied(key("a")))),
                "case=round_{round}"
            );
            let entry = cache.get(&key("a")).expect("entry present");
            assert_eq!(entry.freshness_hint, format!("h{round}"));
        }
        assert_eq!(cache.stats().fetches_applied, 5);
        assert_eq!(cache.stats().responses_discarded, 0);
    }

    #[tokio::test]
    async fn older_response_does_not_replace_fresh_entry() {
        let (fetcher, cache) = gated();
        let _ = cache.request(&[key("a")], "h2");
        fetcher.release();
        assert_eq!(
            cache.run_next().await,
            Ok(Some(RefreshOutcome::Applied(key("a"))))
        );

        // The caller steps back to h1, then returns to h2 while the h1 fetch
        // is still outstanding.
        let _ = cache.request(&[key("a")], "h1");
        let step = start_step(&cache).await;
        let _ = cache.request(&[key("a")], "h2");
        assert!(cache.pending_keys().is_empty(), "case=already_fresh");
        fetcher.release();

        assert_eq!(
            step.await.expect("step task"),
            Ok(Some(RefreshOutcome::Superseded(key("a"))))
        );
        assert_eq!(cache.get(&key("a")).expect("entry").freshness_hint, "h2");
        assert_eq!(cache.stats().responses_discarded, 1);
    }

    #[tokio::test]
    async fn response_after_interest_ends_is_dropped() {
        let (fetcher, cache) = gated();
        let _ = cache.request(&[key("a")], "h1");
        let step = start_step(&cache).await;

        let _ = cache.request(&[key("b")], "h1");
        fetcher.release();
        assert_eq!(
            step.await.expect("step task"),
            Ok(Some(RefreshOutcome::NoLongerRequested(key("a"))))
        );
        assert!(cache.get(&key("a")).is_none());
        assert_eq!(cache.stats().responses_discarded, 1);
    }

    #[tokio::test]
    async fn broken_entity_does_not_block_later_keys() {
        let cache = in_memory();
        cache
            .fetcher()
            .set(key("a"), payload(&[("d3", "d1")]));
        let keys = [key("a"), key("b")];

        let _ = cache.request(&keys, "h1");
        assert!(cache.run_next().await.is_err(), "case=a_fails");

        let _ = cache.request(&keys, "h1");
        assert_eq!(cache.pending_keys(), vec![key("b")], "case=failed_key_passed_over");
        assert_eq!(
            cache.run_next().await,
            Ok(Some(RefreshOutcome::Applied(key("b"))))
        );
        assert_eq!(cache.schedule_next_stale(), None, "case=worker_does_not_spin");

        // With nothing else stale, a request retries the failed key.
        let entries = cache.request(&keys, "h1");
        assert_eq!(entry_keys(&entries), vec![key("b")]);
        assert_eq!(cache.pending_keys(), vec![key("a")], "case=retry_on_request");

        cache
            .fetcher()
            .set(key("a"), payload(&[("d1", "d3")]));
        assert_eq!(
            cache.run_next().await,
            Ok(Some(RefreshOutcome::Applied(key("a"))))
        );
        assert_eq!(entry_keys(&cache.request(&keys, "h1")), keys.to_vec());
    }

    #[tokio::test]
    async fn queued_job_retargeted_to_newest_hint() {
        let cache = in_memory();
        let _ = cache.request(&[key("a")], "h1");
        let _ = cache.request(&[key("a")], "h2");
        let _ = cache.request(&[key("a")], "h3");
        assert_eq!(cache.pending_keys(), vec![key("a")]);

        assert_eq!(
            cache.run_next().await,
            Ok(Some(RefreshOutcome::Applied(key("a"))))
        );
        assert_eq!(cache.get(&key("a")).expect("entry").freshness_hint, "h3");
        assert_eq!(cache.fetcher().calls(), 1);
    }

    #[tokio::test]
    async fn queued_job_for_dropped_key_is_skipped_without_fetching() {
        let cache = in_memory();
        let _ = cache.request(&[key("a")], "h1");
        let _ = cache.request(&[key("b")], "h1");
        assert_eq!(cache.pending_keys(), vec![key("a"), key("b")]);

        assert_eq!(
            cache.run_next().await,
            Ok(Some(RefreshOutcome::Applied(key("b"))))
        );
        assert_eq!(cache.fetcher().calls(), 1);
        assert_eq!(cache.stats().responses_discarded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_timeout_reported() {
        struct Hang;

        #[async_trait]
        impl PartitionHealthFetcher for Hang {
            async fn fetch(&self, _entity_key: &EntityKey) -> Result<PartitionHealthPayload> {
                std::future::pending().await
            }
        }

        let config = CacheConfig::default().with_fetch_timeout(Some(Duration::from_millis(50)));
        let cache = PartitionHealthCache::with_config(Hang, config).expect("valid config");
        let _ = cache.request(&[key("a")], "h1");
        let err = cache.run_next().await.expect_err("must time out");
        assert_eq!(
            err,
            HealthError::FetchTimeout {
                entity: "warehouse/a".to_owned(),
                timeout_ms: 50,
            }
        );
        assert!(cache.in_flight().is_none());
    }

    #[test]
    fn full_queue_drops_new_keys() {
        let config = CacheConfig::default().with_max_pending(1);
        let cache = PartitionHealthCache::with_config(InMemoryFetcher::new(), config)
            .expect("valid config");
        let _ = cache.request(&[key("a")], "h1");
        let _ = cache.request(&[key("b")], "h1");
        assert_eq!(cache.pending_keys(), vec![key("a")]);
    }

    #[test]
    fn independent_instances_do_not_share_state() {
        let first = in_memory();
        let second = in_memory();
        let _ = first.request(&[key("a")], "h1");
        assert_eq!(first.pending_keys().len(), 1);
        assert!(second.pending_keys().is_empty());
    }
}
