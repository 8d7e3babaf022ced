//! Subscription registry types and filter diffing.
//!
//! A subscription is one logical query that may span several relays. The
//! registry maps opaque subscription ids to their listener and the filter
//! set currently installed per relay. Applying a new filter set is a diff:
//! relays gaining or changing filters get a `REQ`, relays losing all their
//! filters get a `CLOSE`, unchanged relays get nothing. Filter encoding is
//! deterministic (sorted lists, fixed field order), so equality here means
//! the relay would see an identical query.

use std::collections::HashMap;
use std::sync::Arc;

use larimar_core::event::Event;
use larimar_core::filter::Filter;
use larimar_core::message::ClientMessage;
use larimar_core::relay_url::NormalizedRelayUrl;

use crate::connection::ConnectionState;

/// Handle for an open subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: String,
}

/// Receives the frames routed to one subscription.
pub trait SubscriptionListener: Send + Sync {
    fn on_event(&self, relay: &NormalizedRelayUrl, subscription_id: &str, event: Event);
    /// The relay has sent all stored events for this subscription.
    fn on_eose(&self, relay: &NormalizedRelayUrl, subscription_id: &str);
    /// The relay closed the subscription on its side.
    fn on_closed(&self, _relay: &NormalizedRelayUrl, _subscription_id: &str, _message: &str) {}
}

/// Client-level notifications not tied to one subscription.
pub trait ClientObserver: Send + Sync {
    /// Result of a published event (`OK` frame).
    fn on_send_response(
        &self,
        _relay: &NormalizedRelayUrl,
        _event_id: &str,
        _accepted: bool,
        _message: &str,
    ) {
    }
    /// Human-readable relay notice.
    fn on_notice(&self, _relay: &NormalizedRelayUrl, _message: &str) {}
    fn on_relay_state(&self, _relay: &NormalizedRelayUrl, _state: ConnectionState) {}
}

pub(crate) struct SubscriptionEntry {
    pub listener: Arc<dyn SubscriptionListener>,
    /// Filters currently installed, by relay. Relays with no entry have no
    /// open query for this subscription.
    pub filters: HashMap<NormalizedRelayUrl, Vec<Filter>>,
}

/// Compute the commands that move a subscription from `old` to `new`.
///
/// Pure so the diff logic is testable without a transport. Output is
/// sorted by relay for deterministic application order.
pub(crate) fn plan_filter_commands(
    subscription_id: &str,
    old: &HashMap<NormalizedRelayUrl, Vec<Filter>>,
    new: &HashMap<NormalizedRelayUrl, Vec<Filter>>,
) -> Vec<(NormalizedRelayUrl, ClientMessage)> {
    let mut commands = Vec::new();

    for (relay, filters) in new {
        if filters.is_empty() {
            continue;
        }
        if old.get(relay) != Some(filters) {
            commands.push((
                relay.clone(),
                ClientMessage::Req {
                    subscription_id: subscription_id.to_string(),
                    filters: filters.clone(),
                },
            ));
        }
    }

    for relay in old.keys() {
        let dismissed = new.get(relay).is_none_or(|f| f.is_empty());
        if dismissed {
            commands.push((
                relay.clone(),
                ClientMessage::Close {
                    subscription_id: subscription_id.to_string(),
                },
            ));
        }
    }

    commands.sort_by(|a, b| a.0.cmp(&b.0));
    commands
}
