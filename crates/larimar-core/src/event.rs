//! Signed event records.
//!
//! An event's identity is its `id`: the lowercase hex SHA-256 of the
//! canonical serialization `[0, pubkey, created_at, kind, tags, content]`.
//! Events are immutable once created; the cache layer builds mutable
//! aggregates around them.
//!
//! Signature verification is the signer collaborator's concern and is not
//! performed here; this module only validates structure and identity.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::address::Address;
use crate::error::{Error, Result};

/// Profile metadata (replaceable).
pub const KIND_METADATA: u16 = 0;
/// Short text note.
pub const KIND_TEXT_NOTE: u16 = 1;
/// Contact list (replaceable).
pub const KIND_CONTACTS: u16 = 3;
/// Legacy encrypted direct message.
pub const KIND_ENCRYPTED_DM: u16 = 4;
/// Deletion request.
pub const KIND_DELETION: u16 = 5;
/// Chat message.
pub const KIND_CHAT_MESSAGE: u16 = 14;
/// Relay list (replaceable).
pub const KIND_RELAY_LIST: u16 = 10002;

/// An immutable signed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Lowercase hex SHA-256 of the canonical serialization.
    pub id: String,
    /// Author public key, lowercase hex.
    pub pubkey: String,
    /// Unix seconds.
    pub created_at: u64,
    pub kind: u16,
    /// Ordered list of tags; each tag is a list of strings whose first
    /// element is the tag name.
    pub tags: Vec<Vec<String>>,
    pub content: String,
    /// Schnorr signature over the id, lowercase hex.
    pub sig: String,
}

fn is_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}

impl Event {
    /// Compute the id this event's content hashes to.
    pub fn compute_id(&self) -> String {
        let canonical = serde_json::json!([
            0,
            self.pubkey,
            self.created_at,
            self.kind,
            self.tags,
            self.content,
        ]);
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Check that the claimed id matches the content hash.
    pub fn verify_id(&self) -> bool {
        self.compute_id() == self.id
    }

    /// Validate field shapes: 64-hex id and pubkey, 128-hex signature.
    ///
    /// Network input must pass this before entering any shared structure.
    pub fn validate_shape(&self) -> Result<()> {
        if !is_hex(&self.id, 64) {
            return Err(Error::InvalidEvent(format!("bad id '{}'", self.id)));
        }
        if !is_hex(&self.pubkey, 64) {
            return Err(Error::InvalidEvent(format!("bad pubkey '{}'", self.pubkey)));
        }
        if !is_hex(&self.sig, 128) {
            return Err(Error::InvalidEvent("bad signature".to_string()));
        }
        Ok(())
    }

    /// Replaceable kinds: a newer event at the same address supersedes.
    pub fn is_replaceable(&self) -> bool {
        self.kind == KIND_METADATA
            || self.kind == KIND_CONTACTS
            || (10_000..20_000).contains(&self.kind)
    }

    /// Ephemeral kinds: relays do not store these.
    pub fn is_ephemeral(&self) -> bool {
        (20_000..30_000).contains(&self.kind)
    }

    /// Addressable (parameterized replaceable) kinds: identity includes the
    /// `d` tag.
    pub fn is_addressable(&self) -> bool {
        (30_000..40_000).contains(&self.kind)
    }

    /// The logical address for replaceable/addressable kinds, `None` for
    /// regular events whose identity is the content hash alone.
    pub fn address(&self) -> Option<Address> {
        if self.is_addressable() {
            Some(Address::new(self.kind, self.pubkey.clone(), self.d_tag()))
        } else if self.is_replaceable() {
            Some(Address::new(self.kind, self.pubkey.clone(), ""))
        } else {
            None
        }
    }

    /// First value of the named tag, if present.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().map(String::as_str) == Some(name))
            .and_then(|t| t.get(1))
            .map(String::as_str)
    }

    /// All values of the named tag, in tag order.
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.tags
            .iter()
            .filter(move |t| t.first().map(String::as_str) == Some(name))
            .filter_map(|t| t.get(1))
            .map(String::as_str)
    }

    /// The `d` tag value, or empty.
    pub fn d_tag(&self) -> &str {
        self.tag_value("d").unwrap_or("")
    }

    /// The `subject` tag value, if any.
    pub fn subject(&self) -> Option<&str> {
        self.tag_value("subject")
    }

    /// Event ids this event references (`e` tags).
    pub fn referenced_event_ids(&self) -> impl Iterator<Item = &str> {
        self.tag_values("e").filter(|v| is_hex(v, 64))
    }

    /// Addresses this event references (`a` tags).
    pub fn referenced_addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.tag_values("a").filter_map(|v| Address::parse(v).ok())
    }

    /// Public keys this event references (`p` tags).
    pub fn referenced_pubkeys(&self) -> impl Iterator<Item = &str> {
        self.tag_values("p").filter(|v| is_hex(v, 64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn test_pubkey(n: u8) -> String {
        hex::encode([n; 32])
    }

    fn test_event(kind: u16, tags: Vec<Vec<String>>) -> Event {
        let mut event = Event {
            id: String::new(),
            pubkey: test_pubkey(1),
            created_at: 1_700_000_000,
            kind,
            tags,
            content: "hello".to_string(),
            sig: hex::encode([0u8; 64]),
        };
        event.id = event.compute_id();
        event
    }

    #[test]
    fn test_verify_id() {
        let event = test_event(1, vec![]);
        assert!(event.verify_id());

        let mut tampered = event.clone();
        tampered.content = "tampered".to_string();
        assert!(!tampered.verify_id());
    }

    #[test]
    fn test_validate_shape() {
        let event = test_event(1, vec![]);
        assert!(event.validate_shape().is_ok());

        let mut bad = event.clone();
        bad.id = "nothex".to_string();
        assert!(bad.validate_shape().is_err());

        let mut bad = event;
        bad.pubkey.truncate(10);
        assert!(bad.validate_shape().is_err());
    }

    #[test]
    fn test_kind_classes() {
        assert!(test_event(0, vec![]).is_replaceable());
        assert!(test_event(3, vec![]).is_replaceable());
        assert!(test_event(10002, vec![]).is_replaceable());
        assert!(!test_event(1, vec![]).is_replaceable());

        assert!(test_event(22242, vec![]).is_ephemeral());
        assert!(!test_event(1, vec![]).is_ephemeral());

        assert!(test_event(30023, vec![]).is_addressable());
        assert!(!test_event(10002, vec![]).is_addressable());
    }

    #[test]
    fn test_address() {
        let article = test_event(
            30023,
            vec![vec!["d".to_string(), "post-1".to_string()]],
        );
        let addr = article.address().unwrap();
        assert_eq!(addr.kind, 30023);
        assert_eq!(addr.d_tag, "post-1");

        let profile = test_event(0, vec![]);
        assert_eq!(profile.address().unwrap().d_tag, "");

        assert!(test_event(1, vec![]).address().is_none());
    }

    #[test]
    fn test_tag_accessors() {
        let peer = test_pubkey(2);
        let root = hex::encode([3u8; 32]);
        let event = test_event(
            14,
            vec![
                vec!["p".to_string(), peer.clone()],
                vec!["e".to_string(), root.clone()],
                vec!["e".to_string(), "nothex".to_string()],
                vec!["subject".to_string(), "lunch".to_string()],
            ],
        );
        assert_eq!(event.subject(), Some("lunch"));
        assert_eq!(
            event.referenced_pubkeys().collect::<Vec<_>>(),
            vec![peer.as_str()]
        );
        // Malformed e tag value is skipped.
        assert_eq!(
            event.referenced_event_ids().collect::<Vec<_>>(),
            vec![root.as_str()]
        );
    }
}
