//! Protocol data model for the Larimar client.
//!
//! This crate owns the pure data layer: events, logical addresses, filters,
//! wire frames, and relay URL normalization. It performs no I/O and knows
//! nothing about connections or caches; the `larimar-client` crate builds
//! the transport and orchestration layers on top of it.
//!
//! # Modules
//!
//! - [`event`] - signed event records, identity verification, kind classes
//! - [`address`] - (kind, author, d-tag) identity for replaceable events
//! - [`filter`] - relay queries with a deterministic JSON encoding
//! - [`message`] - closed sum types for outbound commands and inbound frames
//! - [`relay_url`] - canonical relay URL keys and the memoizing normalizer

pub mod address;
pub mod error;
pub mod event;
pub mod filter;
pub mod message;
pub mod relay_url;

// Re-export commonly used types at crate root
pub use address::Address;
pub use error::{Error, Result};
pub use event::Event;
pub use filter::{Filter, RelayBasedFilter};
pub use message::{ClientMessage, RelayMessage};
pub use relay_url::{NormalizedRelayUrl, RelayUrlNormalizer};
