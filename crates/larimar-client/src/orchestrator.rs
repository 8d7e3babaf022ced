//! Subscription orchestration: the EOSE manager.
//!
//! Consumers declare *query states*: application-level descriptions of a
//! data need, like "the thread rooted at event X". Many consumers may want
//! overlapping data; the manager deduplicates query states into keys and
//! guarantees at most one live relay subscription per key. For each key it
//! looks up the cached since-checkpoints, asks the [`FilterAssembler`] for
//! filters, and pushes the result through the subscription controller.
//! Teardown is driven purely by absence from the latest query-state
//! snapshot; there is no reference counting to get wrong.
//!
//! Recomputation is debounced through the [`Bundler`], so bursts of
//! watch/unwatch churn cost one pass per sampling window.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use larimar_core::event::Event;
use larimar_core::filter::{Filter, RelayBasedFilter};
use larimar_core::relay_url::NormalizedRelayUrl;

use crate::bundler::{Bundler, BundlerConfig};
use crate::client::RelayClient;
use crate::eose::{EoseCache, EoseCacheConfig};
use crate::subscription::SubscriptionListener;

/// Current unix time in seconds.
pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Maps query states to deduplication keys and builds their filters.
///
/// Implementations batching several keys into shared filters must keep the
/// member order sorted: the filter encoding is compared textually, and a
/// reordered filter would re-REQ for no reason.
pub trait FilterAssembler: Send + Sync + 'static {
    /// Application-defined description of "what a consumer wants".
    type QueryState: Clone + Send + Sync + 'static;
    /// Deduplication key: equal keys always share one subscription.
    type Key: Hash + Eq + Ord + Clone + Debug + Send + Sync + 'static;

    fn extract_key(&self, state: &Self::QueryState) -> Self::Key;

    /// Build the filters for one key, given the cached per-relay
    /// since-checkpoints. `None` means the key currently needs no
    /// subscription (e.g. its target is already fully resolved locally).
    fn assemble(
        &self,
        key: &Self::Key,
        states: &[Self::QueryState],
        since: Option<&HashMap<NormalizedRelayUrl, u64>>,
    ) -> Option<Vec<RelayBasedFilter>>;
}

/// Where received events go (the local cache, in production).
pub trait EventConsumer: Send + Sync {
    fn consume_event(&self, event: Event, relay: &NormalizedRelayUrl);
}

/// Handle for a registered query state; pass back to
/// [`EoseManager::unwatch`] when the consumer goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchHandle(u64);

/// Configuration for the orchestration manager.
#[derive(Debug, Clone, Default)]
pub struct EoseManagerConfig {
    pub bundler: BundlerConfig,
    pub eose: EoseCacheConfig,
}

/// The orchestration brain: dedups query states into the minimal set of
/// relay subscriptions and keeps their since-windows narrow.
pub struct EoseManager<A: FilterAssembler> {
    client: Arc<RelayClient>,
    assembler: A,
    consumer: Arc<dyn EventConsumer>,
    eose: EoseCache<A::Key>,
    bundler: Bundler,
    states: Mutex<HashMap<u64, A::QueryState>>,
    next_handle: AtomicU64,
    subs_by_key: Mutex<HashMap<A::Key, String>>,
    keys_by_sub: Mutex<HashMap<String, A::Key>>,
    /// Needed to hand `Arc<Self>` out as a subscription listener.
    self_ref: Mutex<Weak<Self>>,
}

impl<A: FilterAssembler> EoseManager<A> {
    pub fn new(
        client: Arc<RelayClient>,
        assembler: A,
        consumer: Arc<dyn EventConsumer>,
        config: EoseManagerConfig,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            client,
            assembler,
            consumer,
            eose: EoseCache::new(config.eose),
            bundler: Bundler::new(config.bundler),
            states: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(0),
            subs_by_key: Mutex::new(HashMap::new()),
            keys_by_sub: Mutex::new(HashMap::new()),
            self_ref: Mutex::new(Weak::new()),
        });
        *manager.self_ref.lock() = Arc::downgrade(&manager);
        manager
    }

    /// Register a consumer's data need. Triggers a debounced
    /// recomputation pass.
    pub fn watch(&self, state: A::QueryState) -> WatchHandle {
        let handle = WatchHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.states.lock().insert(handle.0, state);
        self.invalidate_filters(false);
        handle
    }

    /// Remove a registered data need. When the last query state for a key
    /// disappears, the next pass closes its subscription.
    pub fn unwatch(&self, handle: WatchHandle) {
        if self.states.lock().remove(&handle.0).is_some() {
            self.invalidate_filters(false);
        }
    }

    /// Request recomputation of all active subscriptions, coalesced
    /// through the bundler.
    pub fn invalidate_filters(&self, ignore_if_busy: bool) {
        let Some(manager) = self.self_ref.lock().upgrade() else {
            return;
        };
        self.bundler.invalidate(ignore_if_busy, move || async move {
            manager.update_subscriptions();
        });
    }

    /// One full recomputation pass over the current query-state snapshot.
    ///
    /// Idempotent: calling repeatedly with the same snapshot changes
    /// nothing on the wire (the controller diffs filters).
    pub fn update_subscriptions(&self) {
        let snapshot: Vec<A::QueryState> = self.states.lock().values().cloned().collect();

        // BTreeMap for deterministic pass order.
        let mut by_key: BTreeMap<A::Key, Vec<A::QueryState>> = BTreeMap::new();
        for state in snapshot {
            by_key
                .entry(self.assembler.extract_key(&state))
                .or_default()
                .push(state);
        }

        for (key, states) in &by_key {
            let since = self.eose.since(key);
            match self.assembler.assemble(key, states, since.as_ref()) {
                Some(filters) if !filters.is_empty() => {
                    let Some(sub_id) = self.find_or_create_sub_for(key) else {
                        continue;
                    };
                    let mut by_relay: HashMap<NormalizedRelayUrl, Vec<Filter>> = HashMap::new();
                    for based in filters {
                        by_relay.entry(based.relay).or_default().push(based.filter);
                    }
                    self.client.update_filters(&sub_id, by_relay);
                }
                // Key needs no subscription right now.
                _ => self.drop_subscription_for(key),
            }
        }

        // Teardown purely by absence from the snapshot.
        let stale: Vec<A::Key> = self
            .subs_by_key
            .lock()
            .keys()
            .filter(|key| !by_key.contains_key(key))
            .cloned()
            .collect();
        for key in stale {
            self.drop_subscription_for(&key);
        }
    }

    /// Idempotent subscription allocation per key.
    ///
    /// Checks the recorded id still exists in the controller before
    /// reusing it: an id can go stale (relay-side limits, external
    /// dismissal) and is then transparently re-created.
    fn find_or_create_sub_for(&self, key: &A::Key) -> Option<String> {
        let manager = self.self_ref.lock().upgrade()?;
        let mut subs = self.subs_by_key.lock();

        if let Some(id) = subs.get(key) {
            if self.client.has_subscription(id) {
                return Some(id.clone());
            }
            let stale = id.clone();
            self.keys_by_sub.lock().remove(&stale);
            subs.remove(key);
        }

        let listener: Arc<dyn SubscriptionListener> = manager;
        let sub = self.client.request_new_subscription(listener);
        subs.insert(key.clone(), sub.id.clone());
        self.keys_by_sub.lock().insert(sub.id.clone(), key.clone());
        tracing::debug!(?key, sub_id = %sub.id, "opened subscription");
        Some(sub.id)
    }

    fn drop_subscription_for(&self, key: &A::Key) {
        let removed = self.subs_by_key.lock().remove(key);
        if let Some(sub_id) = removed {
            self.keys_by_sub.lock().remove(&sub_id);
            self.client.dismiss_subscription(&sub_id);
            tracing::debug!(?key, sub_id = %sub_id, "closed subscription");
        }
    }

    fn key_for_sub(&self, subscription_id: &str) -> Option<A::Key> {
        self.keys_by_sub.lock().get(subscription_id).cloned()
    }

    /// Cached since-checkpoints for a key (test and introspection surface).
    pub fn since(&self, key: &A::Key) -> Option<HashMap<NormalizedRelayUrl, u64>> {
        self.eose.since(key)
    }

    /// Number of live subscriptions this manager owns.
    pub fn active_subscription_count(&self) -> usize {
        self.subs_by_key.lock().len()
    }

    /// Close everything and forget all query states.
    pub fn destroy(&self) {
        self.states.lock().clear();
        let keys: Vec<A::Key> = self.subs_by_key.lock().keys().cloned().collect();
        for key in keys {
            self.drop_subscription_for(&key);
        }
    }
}

impl<A: FilterAssembler> SubscriptionListener for EoseManager<A> {
    fn on_event(&self, relay: &NormalizedRelayUrl, subscription_id: &str, event: Event) {
        // Live arrivals narrow the replay window even when the
        // subscription never formally closes.
        if let Some(key) = self.key_for_sub(subscription_id) {
            self.eose.new_eose(&key, relay, event.created_at);
        }
        self.consumer.consume_event(event, relay);
    }

    fn on_eose(&self, relay: &NormalizedRelayUrl, subscription_id: &str) {
        if let Some(key) = self.key_for_sub(subscription_id) {
            self.eose.new_eose(&key, relay, now_secs());
            // Relays rotate filters under limits; recompute so the next
            // REQ window starts from the new checkpoint.
            self.invalidate_filters(true);
        }
    }
}
