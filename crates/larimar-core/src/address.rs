//! Logical identity for replaceable and addressable events.
//!
//! A replaceable event's identity is not its content hash but the
//! `(kind, author, d-tag)` triple: a newer payload at the same address
//! supersedes the older one. The triple round-trips through the standard
//! `"kind:pubkey:d-tag"` tag encoding.

use std::fmt;

use crate::error::{Error, Result};

/// `(kind, author, d-tag)` identity for replaceable/addressable events.
///
/// For replaceable kinds without a `d` tag the `d_tag` field is empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    pub kind: u16,
    pub pubkey: String,
    pub d_tag: String,
}

impl Address {
    pub fn new(kind: u16, pubkey: impl Into<String>, d_tag: impl Into<String>) -> Self {
        Self {
            kind,
            pubkey: pubkey.into(),
            d_tag: d_tag.into(),
        }
    }

    /// Parse the `"kind:pubkey:d-tag"` tag encoding.
    ///
    /// The `d` component may itself contain colons, so only the first two
    /// separators split fields.
    pub fn parse(value: &str) -> Result<Self> {
        let mut parts = value.splitn(3, ':');
        let kind = parts
            .next()
            .and_then(|k| k.parse::<u16>().ok())
            .ok_or_else(|| Error::InvalidAddress(format!("bad kind in '{value}'")))?;
        let pubkey = parts
            .next()
            .ok_or_else(|| Error::InvalidAddress(format!("missing pubkey in '{value}'")))?;
        if pubkey.len() != 64 || !pubkey.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidAddress(format!("bad pubkey in '{value}'")));
        }
        let d_tag = parts.next().unwrap_or("");
        Ok(Self::new(kind, pubkey, d_tag))
    }

    /// The `"kind:pubkey:d-tag"` form used in `a` tags and filters.
    pub fn to_tag_value(&self) -> String {
        format!("{}:{}:{}", self.kind, self.pubkey, self.d_tag)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.pubkey, self.d_tag)
    }
}
