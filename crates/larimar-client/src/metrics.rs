//! Metric registration for the client layer.
//!
//! This crate records through the `metrics` facade only; the embedding
//! application decides whether to install a recorder and exporter.
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component name (`relay_`, `subscription_`, `cache_`,
//!   `chatroom_`)
//! - Suffix: unit or type (`_total`)
//! - Labels: avoided, to keep cardinality flat

use metrics::describe_counter;

/// Register descriptions for every metric this crate records.
///
/// Optional; call once after installing a recorder.
pub fn describe_metrics() {
    describe_counter!(
        "relay_connects_total",
        "Relay websocket sessions established"
    );
    describe_counter!(
        "relay_disconnects_total",
        "Relay websocket sessions ended by close or failure"
    );
    describe_counter!(
        "relay_frames_dropped_total",
        "Inbound frames dropped because they failed to decode"
    );
    describe_counter!(
        "subscription_frames_stale_total",
        "Frames routed to an unknown (closed or stale) subscription id"
    );
    describe_counter!(
        "cache_events_consumed_total",
        "Events newly ingested into the local cache"
    );
    describe_counter!(
        "cache_events_duplicate_total",
        "Ingestion attempts that were duplicates or stale payloads"
    );
    describe_counter!(
        "cache_events_tombstoned_total",
        "Ingestion attempts suppressed by a deletion tombstone"
    );
    describe_counter!(
        "chatroom_messages_pruned_total",
        "Chat messages evicted by room pruning"
    );
}
