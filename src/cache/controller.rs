//! Cache controller: the in-memory key store, seeding, pause handling and
//! fetch scheduling.
//!
//! Every key moves through `Seeded -> Validating -> Fresh | Failed`. At most
//! one fetch per key is in flight; anyone asking for a key that is being
//! fetched attaches to the same shared result. Fetches run as spawned tasks,
//! so a subscriber going away never cancels one and the store is always
//! updated with the outcome.

use crate::cache::entry::{CacheEntry, EntryState, EntryView};
use crate::cache::fetcher::{FetchResult, Fetcher};
use crate::cache::key::{CacheKey, ResourceKind};
use crate::cache::triggers::Trigger;
use crate::error::TrawlError;
use crate::metrics::SharedMetrics;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default deduplication interval after a fetch start
pub const DEFAULT_DEDUP_INTERVAL: Duration = Duration::from_secs(5);

/// Revalidation policy of the controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Mount and automatic triggers skip keys fetched more recently than this
    pub dedup_interval: Duration,
    pub revalidate_on_focus: bool,
    pub revalidate_on_reconnect: bool,
    /// Periodic refresh of subscribed keys, off when `None`
    pub refresh_interval: Option<Duration>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            dedup_interval: DEFAULT_DEDUP_INTERVAL,
            revalidate_on_focus: false,
            revalidate_on_reconnect: false,
            refresh_interval: None,
        }
    }
}

type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

struct InFlight {
    id: u64,
    fetch: SharedFetch,
}

struct Slot {
    entry: CacheEntry,
    tx: watch::Sender<EntryView>,
}

impl Slot {
    fn new(entry: CacheEntry) -> Self {
        let (tx, _rx) = watch::channel(entry.view());
        Self { entry, tx }
    }

    fn publish(&self) {
        self.tx.send_replace(self.entry.view());
    }

    fn has_subscribers(&self) -> bool {
        self.tx.receiver_count() > 0
    }
}

#[derive(Default)]
struct Store {
    slots: HashMap<CacheKey, Slot>,
    inflight: HashMap<CacheKey, InFlight>,
    next_fetch_id: u64,
}

struct Inner {
    store: Mutex<Store>,
    fetcher: Arc<dyn Fetcher>,
    config: ControllerConfig,
    paused: AtomicBool,
    metrics: SharedMetrics,
}

/// Handle on a fetch that was started or joined
pub struct PendingFetch {
    key: CacheKey,
    fetch: SharedFetch,
}

impl PendingFetch {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Wait for the fetch to settle. The store is updated before this resolves.
    pub async fn wait(self) -> FetchResult {
        self.fetch.await
    }
}

/// A consumer's view of one key. Dropping it unsubscribes.
pub struct Subscription {
    key: CacheKey,
    rx: watch::Receiver<EntryView>,
}

impl Subscription {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn current(&self) -> EntryView {
        self.rx.borrow().clone()
    }

    /// Wait for the next change. `None` once the entry has been cleared.
    pub async fn changed(&mut self) -> Option<EntryView> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until no fetch is in flight for the key.
    pub async fn settled(&mut self) -> EntryView {
        let settled = self
            .rx
            .wait_for(|view| !view.is_validating())
            .await
            .map(|view| view.clone());
        settled.unwrap_or_else(|_| self.current())
    }
}

#[derive(Clone)]
pub struct CacheController {
    inner: Arc<Inner>,
}

impl CacheController {
    /// Create a controller. It starts paused until [`mark_first_commit`].
    ///
    /// [`mark_first_commit`]: CacheController::mark_first_commit
    pub fn new(fetcher: Arc<dyn Fetcher>, config: ControllerConfig, metrics: SharedMetrics) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: Mutex::new(Store::default()),
                fetcher,
                config,
                paused: AtomicBool::new(true),
                metrics,
            }),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Lift the pause after the first render commit. Only the first call has
    /// an effect; no fetch is started by it.
    pub fn mark_first_commit(&self) -> bool {
        let was_paused = self.inner.paused.swap(false, Ordering::SeqCst);
        if was_paused {
            info!("First commit observed, revalidation unpaused");
        }
        was_paused
    }

    /// Install a server-rendered value. Keys that already have an entry are left alone.
    pub async fn seed(&self, key: CacheKey, value: Value) -> bool {
        let mut store = self.inner.store.lock().await;
        let seeded = Self::seed_locked(&mut store, key, value);
        self.inner.metrics.set_cache_entries(store.slots.len());
        seeded
    }

    pub async fn seed_many<I>(&self, seeds: I) -> usize
    where
        I: IntoIterator<Item = (CacheKey, Value)>,
    {
        let mut store = self.inner.store.lock().await;
        let mut count = 0;
        for (key, value) in seeds {
            if Self::seed_locked(&mut store, key, value) {
                count += 1;
            }
        }
        self.inner.metrics.set_cache_entries(store.slots.len());
        info!(seeded = count, "Cache seeded with server data");
        count
    }

    fn seed_locked(store: &mut Store, key: CacheKey, value: Value) -> bool {
        if store.slots.contains_key(&key) {
            debug!(cache_key = %key, "Seed ignored, key already cached");
            return false;
        }
        store.slots.insert(key, Slot::new(CacheEntry::seeded(value)));
        true
    }

    /// Subscribe to a key, fetching it if the entry needs it.
    pub async fn subscribe(&self, key: CacheKey) -> Subscription {
        let mut store = self.inner.store.lock().await;
        let metrics = &self.inner.metrics;

        let (mut rx, needs_fetch) = if let Some(slot) = store.slots.get(&key) {
            let rx = slot.tx.subscribe();
            let needs_fetch = match slot.entry.state() {
                EntryState::Seeded => {
                    metrics.record_read("seeded");
                    false
                }
                EntryState::Validating => {
                    metrics.record_read("hit");
                    metrics.record_dedup();
                    false
                }
                EntryState::Fresh | EntryState::Failed => {
                    metrics.record_read("hit");
                    !self.is_paused()
                        && !slot
                            .entry
                            .within_dedup_window(Instant::now(), self.inner.config.dedup_interval)
                }
            };
            (rx, needs_fetch)
        } else {
            metrics.record_read("miss");
            let slot = Slot::new(CacheEntry::loading());
            let rx = slot.tx.subscribe();
            store.slots.insert(key.clone(), slot);
            (rx, true)
        };

        if needs_fetch {
            Inner::start_fetch(&self.inner, &mut store, &key, Trigger::Mount);
        }
        // The subscriber starts from the state it was handed
        drop(rx.borrow_and_update());
        metrics.set_cache_entries(store.slots.len());

        Subscription { key, rx }
    }

    /// Current view of a key without subscribing or fetching.
    pub async fn read(&self, key: &CacheKey) -> Option<EntryView> {
        let store = self.inner.store.lock().await;
        store.slots.get(key).map(|slot| slot.entry.view())
    }

    /// Read-through: subscribe, wait for any fetch, return the value or error.
    pub async fn get(&self, key: CacheKey) -> FetchResult {
        let mut subscription = self.subscribe(key).await;
        subscription.settled().await.into_result()
    }

    /// The fetch currently in flight for `key`, if any.
    pub async fn pending(&self, key: &CacheKey) -> Option<PendingFetch> {
        let store = self.inner.store.lock().await;
        store.inflight.get(key).map(|inflight| PendingFetch {
            key: key.clone(),
            fetch: inflight.fetch.clone(),
        })
    }

    /// Force the next read of `key` to be fresh.
    ///
    /// Unknown keys and a paused controller make this a no-op. A fetch that is
    /// already in flight is joined instead of duplicated.
    pub async fn invalidate(&self, key: &CacheKey) -> Option<PendingFetch> {
        let mut store = self.inner.store.lock().await;

        if !store.slots.contains_key(key) {
            debug!(cache_key = %key, "Invalidate ignored, key not cached");
            return None;
        }
        if self.is_paused() {
            debug!(cache_key = %key, "Invalidate ignored, revalidation paused");
            return None;
        }

        let fetch = Inner::start_fetch(&self.inner, &mut store, key, Trigger::Invalidate);
        Some(PendingFetch {
            key: key.clone(),
            fetch,
        })
    }

    /// Invalidate the list, detail and filtered keys of a resource kind.
    pub async fn invalidate_resource(&self, kind: ResourceKind) -> Vec<PendingFetch> {
        let mut store = self.inner.store.lock().await;
        if self.is_paused() {
            debug!(resource = kind.name(), "Invalidate ignored, revalidation paused");
            return Vec::new();
        }

        let keys: Vec<CacheKey> = store
            .slots
            .keys()
            .filter(|key| key.belongs_to(kind))
            .cloned()
            .collect();

        let pending: Vec<PendingFetch> = keys
            .into_iter()
            .map(|key| {
                let fetch = Inner::start_fetch(&self.inner, &mut store, &key, Trigger::Invalidate);
                PendingFetch { key, fetch }
            })
            .collect();

        debug!(
            resource = kind.name(),
            keys = pending.len(),
            "Invalidated resource keys"
        );
        pending
    }

    /// Window regained focus.
    pub async fn on_focus(&self) -> usize {
        if !self.inner.config.revalidate_on_focus {
            return 0;
        }
        self.revalidate_subscribed(Trigger::Focus).await
    }

    /// Network came back.
    pub async fn on_reconnect(&self) -> usize {
        if !self.inner.config.revalidate_on_reconnect {
            return 0;
        }
        self.revalidate_subscribed(Trigger::Reconnect).await
    }

    /// One tick of the periodic refresh.
    pub async fn refresh_tick(&self) -> usize {
        if self.inner.config.refresh_interval.is_none() {
            return 0;
        }
        self.revalidate_subscribed(Trigger::Interval).await
    }

    async fn revalidate_subscribed(&self, trigger: Trigger) -> usize {
        if self.is_paused() {
            debug!(trigger = trigger.as_str(), "Trigger ignored, revalidation paused");
            return 0;
        }

        let mut store = self.inner.store.lock().await;
        let now = Instant::now();
        let window = self.inner.config.dedup_interval;

        let due: Vec<CacheKey> = store
            .slots
            .iter()
            .filter(|(_, slot)| {
                slot.has_subscribers()
                    && !slot.entry.is_validating()
                    && !slot.entry.within_dedup_window(now, window)
                    && !slot.entry.error().map_or(false, TrawlError::is_terminal)
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in &due {
            Inner::start_fetch(&self.inner, &mut store, key, trigger);
        }

        if !due.is_empty() {
            info!(
                trigger = trigger.as_str(),
                keys = due.len(),
                "Revalidating subscribed keys"
            );
        }
        due.len()
    }

    /// Drop every entry (session teardown). Subscribers see their channel
    /// close; in-flight fetches finish but their results are discarded.
    pub async fn clear(&self) -> usize {
        let mut store = self.inner.store.lock().await;
        let count = store.slots.len();
        store.slots.clear();
        store.inflight.clear();
        self.inner.metrics.set_cache_entries(0);
        info!(entries = count, "Cache cleared");
        count
    }

    pub async fn keys(&self) -> Vec<CacheKey> {
        let store = self.inner.store.lock().await;
        let mut keys: Vec<CacheKey> = store.slots.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Inner {
    /// Start a fetch for `key`, or join the one in flight. Caller holds the store lock.
    fn start_fetch(
        inner: &Arc<Inner>,
        store: &mut Store,
        key: &CacheKey,
        trigger: Trigger,
    ) -> SharedFetch {
        if let Some(inflight) = store.inflight.get(key) {
            inner.metrics.record_dedup();
            debug!(
                cache_key = %key,
                trigger = trigger.as_str(),
                "Joining in-flight fetch"
            );
            return inflight.fetch.clone();
        }

        if let Some(slot) = store.slots.get_mut(key) {
            slot.entry.begin_validation(Instant::now());
            slot.publish();
        }

        store.next_fetch_id += 1;
        let id = store.next_fetch_id;

        inner.metrics.record_revalidation(trigger.as_str());
        debug!(
            cache_key = %key,
            trigger = trigger.as_str(),
            fetch_id = id,
            "Starting fetch"
        );

        let task = tokio::spawn(Inner::run_fetch(inner.clone(), key.clone(), id));
        let task_key = key.clone();
        let fetch = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(TrawlError::Internal(format!(
                    "fetch task for {} did not complete: {}",
                    task_key, e
                ))),
            }
        }
        .boxed()
        .shared();

        store.inflight.insert(
            key.clone(),
            InFlight {
                id,
                fetch: fetch.clone(),
            },
        );
        fetch
    }

    async fn run_fetch(self: Arc<Self>, key: CacheKey, id: u64) -> FetchResult {
        let start = Instant::now();

        let result = match AssertUnwindSafe(self.fetcher.fetch(&key))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => Err(TrawlError::Internal(format!("fetcher panicked for {}", key))),
        };

        let elapsed = start.elapsed();
        let status = if result.is_ok() { "success" } else { "error" };
        self.metrics.record_fetch(status, elapsed.as_secs_f64());

        match &result {
            Ok(_) => debug!(
                cache_key = %key,
                elapsed_ms = elapsed.as_millis() as u64,
                "Fetch succeeded"
            ),
            Err(e) => warn!(
                cache_key = %key,
                error = %e,
                elapsed_ms = elapsed.as_millis() as u64,
                "Fetch failed, keeping previous value"
            ),
        }

        let mut store = self.store.lock().await;
        let current = store
            .inflight
            .get(&key)
            .map_or(false, |inflight| inflight.id == id);
        if !current {
            debug!(cache_key = %key, fetch_id = id, "Discarding result of superseded fetch");
            return result;
        }

        store.inflight.remove(&key);
        if let Some(slot) = store.slots.get_mut(&key) {
            slot.entry.settle(result.clone());
            slot.publish();
        }

        result
    }
}
