//! Relay subscription orchestration and in-memory event cache.
//!
//! This crate is the systems core of a client for a decentralized
//! event-broadcast protocol: it keeps many concurrent per-relay streaming
//! subscriptions alive without duplicating work across consumers, tracks
//! per-relay sync checkpoints so reconnects request only the delta, and
//! maintains the shared object graph every screen reads from.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   watch/unwatch    ┌───────────────────┐
//! │  UI consumers    │ ─────────────────▶ │    EoseManager    │  dedup keys,
//! └──────────────────┘                    │  (orchestrator)   │  since-filters
//!                                         └─────────┬─────────┘
//!                                                   │ update_filters
//!                                         ┌─────────▼─────────┐
//!                                         │    RelayClient    │  REQ/CLOSE diff,
//!                                         │  (subscriptions)  │  frame routing
//!                                         └─────────┬─────────┘
//!                                                   │ one socket per relay
//!                                         ┌─────────▼─────────┐
//!                                         │  RelayConnection  │  backoff,
//!                                         └─────────┬─────────┘  framing
//!                                                   │ events
//!                                         ┌─────────▼─────────┐
//!                                         │    LocalCache     │  notes, authors,
//!                                         └───────────────────┘  chatrooms
//! ```
//!
//! Every component is an explicitly constructed object with a defined
//! teardown; there is no ambient global state.

pub mod backoff;
pub mod bundler;
pub mod cache;
pub mod client;
pub mod connection;
pub mod eose;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod signer;
pub mod subscription;

// Re-export commonly used types at crate root
pub use backoff::{BackoffConfig, ReconnectBackoff};
pub use bundler::{Bundler, BundlerConfig};
pub use cache::chatroom::{Chatroom, ChatroomKey, RoomUpdate};
pub use cache::note::{Author, Note};
pub use cache::{CacheConfig, CacheUpdate, ConsumeResult, LocalCache};
pub use client::{ClientConfig, RelayClient};
pub use connection::{
    ConnectionConfig, ConnectionEvents, ConnectionState, RelayConnection, TransportErrorKind,
};
pub use eose::{EoseCache, EoseCacheConfig};
pub use error::{Error, Result};
pub use orchestrator::{
    EoseManager, EoseManagerConfig, EventConsumer, FilterAssembler, WatchHandle,
};
pub use signer::{EventDraft, Signer};
pub use subscription::{ClientObserver, Subscription, SubscriptionListener};
