//! The relay client: connection pool plus subscription controller.
//!
//! `RelayClient` is an explicitly constructed context object (created once
//! at process start, shut down on exit), not ambient global state. It owns
//! one [`RelayConnection`] per relay and the subscription registry, and is
//! the routing point between inbound frames and subscription listeners.
//!
//! Cross-relay coordination (deduplicating overlapping consumer intents)
//! lives above this layer, in the orchestration manager.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use larimar_core::error::Result as CoreResult;
use larimar_core::event::Event;
use larimar_core::filter::Filter;
use larimar_core::message::{ClientMessage, RelayMessage};
use larimar_core::relay_url::{NormalizedRelayUrl, RelayUrlNormalizer};

use crate::connection::{ConnectionConfig, ConnectionEvents, ConnectionState, RelayConnection};
use crate::error::Result;
use crate::signer::{EventDraft, Signer};
use crate::subscription::{
    ClientObserver, Subscription, SubscriptionEntry, SubscriptionListener, plan_filter_commands,
};

/// Configuration for the relay client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connection: ConnectionConfig,
    /// Capacity of the relay URL memoization cache.
    pub normalizer_capacity: usize,
    /// When true (the default), installing filters for a relay also opens
    /// its connection if the backoff window allows. Applications that
    /// drive connection lifecycles themselves can turn this off.
    pub auto_connect: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            normalizer_capacity: RelayUrlNormalizer::DEFAULT_CAPACITY,
            auto_connect: true,
        }
    }
}

/// Connection pool and subscription controller.
pub struct RelayClient {
    config: ClientConfig,
    normalizer: RelayUrlNormalizer,
    connections: RwLock<HashMap<NormalizedRelayUrl, Arc<RelayConnection>>>,
    subscriptions: RwLock<HashMap<String, SubscriptionEntry>>,
    observers: RwLock<Vec<Arc<dyn ClientObserver>>>,
    /// Random per-client prefix keeping subscription ids opaque across runs.
    sub_prefix: String,
    next_sub: AtomicU64,
}

impl RelayClient {
    pub fn new(config: ClientConfig) -> Arc<Self> {
        let normalizer = RelayUrlNormalizer::new(config.normalizer_capacity);
        Arc::new(Self {
            config,
            normalizer,
            connections: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            observers: RwLock::new(Vec::new()),
            sub_prefix: format!("{:04x}", rand::random::<u16>()),
            next_sub: AtomicU64::new(0),
        })
    }

    /// Normalize a raw relay address through the memoizing cache.
    ///
    /// A failure means "skip this relay", never a fatal condition.
    pub fn normalize_url(&self, raw: &str) -> CoreResult<NormalizedRelayUrl> {
        self.normalizer.normalize(raw)
    }

    /// Register a relay, creating its (still disconnected) connection.
    pub fn add_relay(self: &Arc<Self>, raw: &str) -> CoreResult<NormalizedRelayUrl> {
        let url = self.normalizer.normalize(raw)?;
        self.get_or_create_connection(&url);
        Ok(url)
    }

    /// Open the connection for a relay, respecting its backoff window
    /// unless `ignore_backoff` is set.
    pub fn connect_relay(self: &Arc<Self>, url: &NormalizedRelayUrl, ignore_backoff: bool) {
        self.get_or_create_connection(url)
            .connect_and_sync_if_disconnected(ignore_backoff);
    }

    /// Open every known relay connection that is disconnected.
    pub fn connect_all(self: &Arc<Self>) {
        let connections: Vec<_> = self.connections.read().values().cloned().collect();
        for conn in connections {
            conn.connect_and_sync_if_disconnected(false);
        }
    }

    pub fn relay_state(&self, url: &NormalizedRelayUrl) -> Option<ConnectionState> {
        self.connections.read().get(url).map(|c| c.state())
    }

    pub fn known_relays(&self) -> Vec<NormalizedRelayUrl> {
        let mut relays: Vec<_> = self.connections.read().keys().cloned().collect();
        relays.sort();
        relays
    }

    pub fn add_observer(&self, observer: Arc<dyn ClientObserver>) {
        self.observers.write().push(observer);
    }

    fn get_or_create_connection(self: &Arc<Self>, url: &NormalizedRelayUrl) -> Arc<RelayConnection> {
        if let Some(conn) = self.connections.read().get(url) {
            return Arc::clone(conn);
        }
        let mut connections = self.connections.write();
        // Raced with another creator between the locks.
        if let Some(conn) = connections.get(url) {
            return Arc::clone(conn);
        }
        let events: Arc<dyn ConnectionEvents> = Arc::clone(self) as _;
        let conn = RelayConnection::new(url.clone(), self.config.connection.clone(), events);
        connections.insert(url.clone(), Arc::clone(&conn));
        conn
    }

    /// Queue an event publish to every known relay. Returns how many
    /// connections accepted the command.
    pub fn publish(&self, event: Event) -> usize {
        let msg = ClientMessage::Event { event };
        self.connections
            .read()
            .values()
            .filter(|conn| conn.send_if_connected(&msg))
            .count()
    }

    /// Sign a draft through the external signer capability, then publish.
    ///
    /// Signer failures propagate to the caller; nothing is sent on error.
    pub async fn sign_and_publish(&self, signer: &dyn Signer, draft: EventDraft) -> Result<Event> {
        let event = signer.sign(draft).await?;
        self.publish(event.clone());
        Ok(event)
    }

    // =========================================================================
    // Subscription controller
    // =========================================================================

    /// Allocate a subscription id and register its listener.
    ///
    /// No network command is sent until filters are installed.
    pub fn request_new_subscription(&self, listener: Arc<dyn SubscriptionListener>) -> Subscription {
        let id = format!(
            "{}{}",
            self.sub_prefix,
            self.next_sub.fetch_add(1, Ordering::Relaxed)
        );
        self.subscriptions.write().insert(
            id.clone(),
            SubscriptionEntry {
                listener,
                filters: HashMap::new(),
            },
        );
        Subscription { id }
    }

    /// Diff-apply a new per-relay filter set for a subscription.
    ///
    /// Opens `REQ`s where filters appeared or changed, `CLOSE`s where they
    /// vanished, and leaves identical relays untouched.
    pub fn update_filters(
        self: &Arc<Self>,
        subscription_id: &str,
        filters_by_relay: HashMap<NormalizedRelayUrl, Vec<Filter>>,
    ) {
        let commands = {
            let mut subscriptions = self.subscriptions.write();
            let Some(entry) = subscriptions.get_mut(subscription_id) else {
                tracing::debug!(subscription_id, "update_filters for unknown subscription");
                return;
            };
            let commands = plan_filter_commands(subscription_id, &entry.filters, &filters_by_relay);
            entry.filters = filters_by_relay
                .into_iter()
                .filter(|(_, f)| !f.is_empty())
                .collect();
            commands
        };

        for (relay, msg) in commands {
            let conn = self.get_or_create_connection(&relay);
            if self.config.auto_connect {
                conn.connect_and_sync_if_disconnected(false);
            }
            conn.send_if_connected(&msg);
        }
    }

    /// Close a subscription everywhere and deregister it.
    ///
    /// Fire-and-forget: safe to call repeatedly or for unknown ids.
    pub fn dismiss_subscription(&self, subscription_id: &str) {
        let Some(entry) = self.subscriptions.write().remove(subscription_id) else {
            return;
        };
        let close = ClientMessage::Close {
            subscription_id: subscription_id.to_string(),
        };
        let connections = self.connections.read();
        for relay in entry.filters.keys() {
            if let Some(conn) = connections.get(relay) {
                conn.send_if_connected(&close);
            }
        }
    }

    pub fn has_subscription(&self, subscription_id: &str) -> bool {
        self.subscriptions.read().contains_key(subscription_id)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// The filters currently installed for a subscription, by relay.
    pub fn subscription_filters(
        &self,
        subscription_id: &str,
    ) -> Option<HashMap<NormalizedRelayUrl, Vec<Filter>>> {
        self.subscriptions
            .read()
            .get(subscription_id)
            .map(|e| e.filters.clone())
    }

    /// Route one inbound frame.
    ///
    /// Called by connections; public so tests and alternative transports
    /// can inject frames without a socket. Frames for unknown subscription
    /// ids are dropped silently (already closed or stale).
    pub fn handle_incoming(&self, relay: &NormalizedRelayUrl, frame: RelayMessage) {
        match frame {
            RelayMessage::Event {
                subscription_id,
                event,
            } => match self.listener_for(&subscription_id) {
                Some(listener) => listener.on_event(relay, &subscription_id, event),
                None => self.drop_stale(relay, &subscription_id),
            },
            RelayMessage::Eose { subscription_id } => match self.listener_for(&subscription_id) {
                Some(listener) => listener.on_eose(relay, &subscription_id),
                None => self.drop_stale(relay, &subscription_id),
            },
            RelayMessage::Closed {
                subscription_id,
                message,
            } => {
                if let Some(listener) = self.listener_for(&subscription_id) {
                    listener.on_closed(relay, &subscription_id, &message);
                }
            }
            RelayMessage::Ok {
                event_id,
                accepted,
                message,
            } => {
                for observer in self.observers.read().iter() {
                    observer.on_send_response(relay, &event_id, accepted, &message);
                }
            }
            RelayMessage::Notice { message } => {
                tracing::debug!(relay = %relay, message = %message, "relay notice");
                for observer in self.observers.read().iter() {
                    observer.on_notice(relay, &message);
                }
            }
        }
    }

    fn listener_for(&self, subscription_id: &str) -> Option<Arc<dyn SubscriptionListener>> {
        self.subscriptions
            .read()
            .get(subscription_id)
            .map(|e| Arc::clone(&e.listener))
    }

    fn drop_stale(&self, relay: &NormalizedRelayUrl, subscription_id: &str) {
        metrics::counter!("subscription_frames_stale_total").increment(1);
        tracing::debug!(relay = %relay, subscription_id, "frame for unknown subscription");
    }

    /// Re-issue every subscription's filters for a relay that came back.
    fn resync_relay(&self, relay: &NormalizedRelayUrl) {
        let reqs: Vec<ClientMessage> = self
            .subscriptions
            .read()
            .iter()
            .filter_map(|(id, entry)| {
                entry.filters.get(relay).map(|filters| ClientMessage::Req {
                    subscription_id: id.clone(),
                    filters: filters.clone(),
                })
            })
            .collect();
        if reqs.is_empty() {
            return;
        }
        tracing::debug!(relay = %relay, count = reqs.len(), "resyncing subscriptions");
        let conn = self.connections.read().get(relay).cloned();
        if let Some(conn) = conn {
            for msg in &reqs {
                conn.send_if_connected(msg);
            }
        }
    }

    /// Tear down: close sockets and drop all registrations.
    pub fn shutdown(&self) {
        let connections: Vec<_> = {
            let mut map = self.connections.write();
            map.drain().map(|(_, c)| c).collect()
        };
        for conn in connections {
            conn.disconnect();
        }
        self.subscriptions.write().clear();
        self.observers.write().clear();
    }
}

impl ConnectionEvents for RelayClient {
    fn on_frame(&self, relay: &NormalizedRelayUrl, frame: RelayMessage) {
        self.handle_incoming(relay, frame);
    }

    fn on_state(&self, relay: &NormalizedRelayUrl, state: ConnectionState) {
        if state == ConnectionState::Ready {
            self.resync_relay(relay);
        }
        for observer in self.observers.read().iter() {
            observer.on_relay_state(relay, state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn offline_client() -> Arc<RelayClient> {
        RelayClient::new(ClientConfig {
            auto_connect: false,
            ..Default::default()
        })
    }

    fn relay(n: u8) -> NormalizedRelayUrl {
        NormalizedRelayUrl::parse(&format!("wss://relay{n}.example.com")).unwrap()
    }

    fn test_event(created_at: u64) -> Event {
        let mut event = Event {
            id: String::new(),
            pubkey: hex::encode([1u8; 32]),
            created_at,
            kind: 1,
            tags: vec![],
            content: "hi".to_string(),
            sig: hex::encode([0u8; 64]),
        };
        event.id = event.compute_id();
        event
    }

    #[derive(Default)]
    struct RecordingListener {
        events: Mutex<Vec<(NormalizedRelayUrl, String)>>,
        eoses: Mutex<Vec<(NormalizedRelayUrl, String)>>,
    }

    impl SubscriptionListener for RecordingListener {
        fn on_event(&self, relay: &NormalizedRelayUrl, subscription_id: &str, event: Event) {
            self.events
                .lock()
                .push((relay.clone(), format!("{subscription_id}:{}", event.id)));
        }
        fn on_eose(&self, relay: &NormalizedRelayUrl, subscription_id: &str) {
            self.eoses
                .lock()
                .push((relay.clone(), subscription_id.to_string()));
        }
    }

    #[tokio::test]
    async fn test_subscription_ids_are_unique() {
        let client = offline_client();
        let listener = Arc::new(RecordingListener::default());
        let a = client.request_new_subscription(listener.clone());
        let b = client.request_new_subscription(listener);
        assert_ne!(a.id, b.id);
        assert_eq!(client.subscription_count(), 2);
    }

    #[tokio::test]
    async fn test_update_filters_records_state() {
        let client = offline_client();
        let listener = Arc::new(RecordingListener::default());
        let sub = client.request_new_subscription(listener);

        let filters = HashMap::from([(relay(1), vec![Filter::new().kinds([1])])]);
        client.update_filters(&sub.id, filters.clone());
        assert_eq!(client.subscription_filters(&sub.id), Some(filters));

        // Empty filter set dismisses the relay.
        client.update_filters(&sub.id, HashMap::new());
        assert_eq!(client.subscription_filters(&sub.id), Some(HashMap::new()));
    }

    #[tokio::test]
    async fn test_routing_by_subscription_id() {
        let client = offline_client();
        let listener = Arc::new(RecordingListener::default());
        let sub = client.request_new_subscription(listener.clone());

        let event = test_event(100);
        client.handle_incoming(
            &relay(1),
            RelayMessage::Event {
                subscription_id: sub.id.clone(),
                event: event.clone(),
            },
        );
        client.handle_incoming(
            &relay(1),
            RelayMessage::Eose {
                subscription_id: sub.id.clone(),
            },
        );
        // Unknown ids are dropped silently.
        client.handle_incoming(
            &relay(1),
            RelayMessage::Eose {
                subscription_id: "stale".to_string(),
            },
        );

        assert_eq!(listener.events.lock().len(), 1);
        assert_eq!(listener.eoses.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_dismiss_is_idempotent() {
        let client = offline_client();
        let listener = Arc::new(RecordingListener::default());
        let sub = client.request_new_subscription(listener);

        client.dismiss_subscription(&sub.id);
        assert!(!client.has_subscription(&sub.id));
        // Second dismissal and unknown ids are no-ops.
        client.dismiss_subscription(&sub.id);
        client.dismiss_subscription("nope");
    }

    #[tokio::test]
    async fn test_add_relay_normalizes() {
        let client = offline_client();
        let url = client.add_relay("https://Relay1.Example.COM/").unwrap();
        assert_eq!(url, relay(1));
        assert_eq!(client.known_relays(), vec![relay(1)]);
        assert_eq!(
            client.relay_state(&url),
            Some(ConnectionState::Disconnected)
        );
    }
}
