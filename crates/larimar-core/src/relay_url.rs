//! Relay URL normalization and validation.
//!
//! User-supplied relay addresses arrive in every imaginable shape: trailing
//! slashes, uppercase hosts, `https://` pasted from a browser, missing
//! scheme separators, or several URLs concatenated together. This module
//! canonicalizes them into a single comparable key type so the rest of the
//! system never compares raw strings.
//!
//! # Normalization Rules
//!
//! In priority order:
//!
//! 1. Reject empty, oversized, or control/whitespace-containing input.
//! 2. Accept well-formed `wss://` / `ws://` URLs (scheme and host
//!    lowercased, default port and trailing slashes dropped).
//! 3. Rewrite common scheme typos (`https://`, `http://`, `wss//`,
//!    `wss:/`, case variants) to the websocket scheme.
//! 4. Reject input containing two scheme markers (likely concatenated
//!    URLs).
//! 5. Default bare hostnames to `wss://`, unless the host matches a
//!    loopback/onion/local-network heuristic, in which case `ws://`.
//!
//! Normalization is idempotent. [`RelayUrlNormalizer`] memoizes both
//! successes and failures in a bounded map so repeated junk input from
//! spammy sources costs O(1) after the first rejection.

use std::fmt;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use url::Url;

use crate::error::{Error, Result};

/// Maximum accepted input length, in bytes.
const MAX_URL_LEN: usize = 512;

/// A validated, canonical relay URL.
///
/// Immutable, comparable, and totally ordered for deterministic iteration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedRelayUrl(String);

impl NormalizedRelayUrl {
    /// Normalize a raw address without memoization.
    ///
    /// Prefer [`RelayUrlNormalizer::normalize`] on hot paths.
    pub fn parse(raw: &str) -> Result<Self> {
        normalize(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for `wss://` URLs.
    pub fn is_secure(&self) -> bool {
        self.0.starts_with("wss://")
    }

    /// True when the host matches the loopback/onion/local-network
    /// heuristic.
    pub fn is_local(&self) -> bool {
        host_of(&self.0).is_some_and(is_local_host)
    }
}

impl fmt::Display for NormalizedRelayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedRelayUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Extract the host:port portion of a websocket URL.
fn host_of(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("wss://")
        .or_else(|| url.strip_prefix("ws://"))?;
    rest.split('/').next()
}

/// Loopback, private-range, mDNS, and onion hosts.
///
/// Used to pick the insecure default scheme for bare hostnames; these
/// endpoints do not terminate TLS.
fn is_local_host(host: &str) -> bool {
    // Strip the port, minding IPv6 brackets.
    let bare = if let Some(end) = host.rfind(']') {
        &host[..=end]
    } else {
        host.split(':').next().unwrap_or(host)
    };

    if bare == "localhost" || bare == "0.0.0.0" {
        return true;
    }
    if bare.starts_with("127.")
        || bare.starts_with("10.")
        || bare.starts_with("192.168.")
        || bare.starts_with("169.254.")
    {
        return true;
    }
    // 172.16.0.0 - 172.31.255.255
    if bare.starts_with("172.") {
        if let Some(second) = bare.split('.').nth(1) {
            if let Ok(n) = second.parse::<u8>() {
                if (16..=31).contains(&n) {
                    return true;
                }
            }
        }
    }
    // CGNAT / shared address space (100.64.0.0/10)
    if bare.starts_with("100.") {
        if let Some(second) = bare.split('.').nth(1) {
            if let Ok(n) = second.parse::<u8>() {
                if (64..=127).contains(&n) {
                    return true;
                }
            }
        }
    }
    if bare.ends_with(".onion") || bare.ends_with(".local") {
        return true;
    }
    if bare.starts_with("[::1]")
        || bare.starts_with("[fe80:")
        || bare.starts_with("[fc")
        || bare.starts_with("[fd")
    {
        return true;
    }
    false
}

/// Rewrite the scheme portion into `wss://` / `ws://`, or reject.
///
/// Returns the rewritten string, or an error message for unusable input.
fn fix_scheme(input: &str) -> std::result::Result<String, String> {
    let lower = input.to_ascii_lowercase();

    for (prefix, replacement) in [
        ("wss://", "wss://"),
        ("ws://", "ws://"),
        ("https://", "wss://"),
        ("http://", "ws://"),
        ("wss//", "wss://"),
        ("ws//", "ws://"),
    ] {
        if lower.starts_with(prefix) {
            return Ok(format!("{replacement}{}", &input[prefix.len()..]));
        }
    }
    // Single-slash typo: "wss:/host" (but not "wss://", handled above).
    for (prefix, replacement) in [("wss:/", "wss://"), ("ws:/", "ws://")] {
        if lower.starts_with(prefix) {
            return Ok(format!("{replacement}{}", &input[prefix.len()..]));
        }
    }

    if lower.contains("://") {
        return Err(format!("unsupported scheme in '{input}'"));
    }

    // Bare hostname: pick a default scheme by locality.
    let host = input.split('/').next().unwrap_or(input);
    if is_local_host(host) {
        Ok(format!("ws://{input}"))
    } else {
        Ok(format!("wss://{input}"))
    }
}

/// Pure normalization, uncached.
fn normalize(raw: &str) -> Result<NormalizedRelayUrl> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Err(Error::InvalidRelayUrl("empty input".to_string()));
    }
    if trimmed.len() > MAX_URL_LEN {
        return Err(Error::InvalidRelayUrl(format!(
            "input exceeds {MAX_URL_LEN} bytes"
        )));
    }
    if trimmed
        .chars()
        .any(|c| c.is_control() || c.is_whitespace())
    {
        return Err(Error::InvalidRelayUrl(
            "control or whitespace character in input".to_string(),
        ));
    }
    // Two scheme markers almost always mean two concatenated URLs.
    if trimmed.matches("://").count() > 1 {
        return Err(Error::InvalidRelayUrl(
            "multiple scheme markers (concatenated URLs?)".to_string(),
        ));
    }

    let rewritten = fix_scheme(trimmed).map_err(Error::InvalidRelayUrl)?;

    let parsed =
        Url::parse(&rewritten).map_err(|e| Error::InvalidRelayUrl(format!("{e}: '{raw}'")))?;
    if parsed.host_str().is_none() {
        return Err(Error::InvalidRelayUrl(format!("missing host in '{raw}'")));
    }

    // The url crate lowercases scheme and host and drops default ports;
    // trailing slashes are ours to strip.
    let mut canonical = parsed.to_string();
    while canonical.ends_with('/') {
        canonical.pop();
    }

    Ok(NormalizedRelayUrl(canonical))
}

/// Memoizing normalizer.
///
/// Caches both successes and failures: hostile or buggy peers tend to
/// repeat the same malformed address many times, and normalization involves
/// string parsing worth skipping. The cache is bounded LRU, so an attacker
/// feeding unique junk only evicts other junk.
pub struct RelayUrlNormalizer {
    cache: Mutex<LruCache<String, std::result::Result<NormalizedRelayUrl, String>>>,
}

impl RelayUrlNormalizer {
    /// Default memoization capacity.
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is non-zero");
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Normalize with memoization of both outcomes.
    pub fn normalize(&self, raw: &str) -> Result<NormalizedRelayUrl> {
        let mut cache = self.cache.lock();
        if let Some(cached) = cache.get(raw) {
            return match cached {
                Ok(url) => Ok(url.clone()),
                Err(reason) => Err(Error::InvalidRelayUrl(reason.clone())),
            };
        }

        let outcome = normalize(raw);
        let cached = match &outcome {
            Ok(url) => Ok(url.clone()),
            Err(e) => Err(e.to_string()),
        };
        cache.put(raw.to_string(), cached);
        outcome
    }

    /// Number of memoized entries (successes and failures).
    pub fn cached_entries(&self) -> usize {
        self.cache.lock().len()
    }
}

impl Default for RelayUrlNormalizer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
