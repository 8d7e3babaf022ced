//! External signer capability.
//!
//! Key custody lives outside this crate: the client only needs "sign this
//! draft" and "encrypt/decrypt for this peer" as async operations that may
//! suspend but never block a worker. Failures are explicit errors returned
//! to whichever caller requested the private data; nothing in the cache is
//! half-applied on a failed decryption.

use async_trait::async_trait;

use larimar_core::event::Event;

use crate::error::Result;

/// An unsigned event, everything but the identity and signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub kind: u16,
    pub created_at: u64,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl EventDraft {
    pub fn new(kind: u16, created_at: u64, content: impl Into<String>) -> Self {
        Self {
            kind,
            created_at,
            tags: Vec::new(),
            content: content.into(),
        }
    }

    pub fn tag(mut self, values: Vec<String>) -> Self {
        self.tags.push(values);
        self
    }
}

/// Asynchronous signing and conversation-key crypto, implemented outside
/// this crate (hardware signer, remote signer, in-memory test keys, ...).
#[async_trait]
pub trait Signer: Send + Sync {
    /// The identity this signer signs as, lowercase hex.
    async fn public_key(&self) -> Result<String>;

    /// Produce the signed event for a draft.
    async fn sign(&self, draft: EventDraft) -> Result<Event>;

    /// Encrypt a payload for a peer.
    async fn encrypt(&self, peer_pubkey: &str, plaintext: &str) -> Result<String>;

    /// Decrypt a payload from a peer. Errors propagate to the caller that
    /// requested the private data.
    async fn decrypt(&self, peer_pubkey: &str, ciphertext: &str) -> Result<String>;
}
