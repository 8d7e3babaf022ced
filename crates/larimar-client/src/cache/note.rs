//! Note and author aggregates.
//!
//! A [`Note`] is the mutable wrapper around zero-or-one immutable event.
//! It exists as soon as anything references its id (possibly before the
//! event itself arrives) and is "filled in" later. The cache exclusively
//! owns notes; everything else holds ids and looks them up.
//!
//! Each aggregate carries a watch channel observers subscribe to; the
//! version number bumps on every mutation.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use larimar_core::event::Event;
use larimar_core::relay_url::NormalizedRelayUrl;

/// Mutable aggregate around one event id.
pub struct Note {
    id: String,
    state: Mutex<NoteState>,
    version: watch::Sender<u64>,
}

#[derive(Default)]
struct NoteState {
    event: Option<Arc<Event>>,
    /// Relays this event has been observed on (delivery or OK-confirmed).
    seen_on: BTreeSet<NormalizedRelayUrl>,
}

impl Note {
    pub(crate) fn new(id: impl Into<String>) -> Arc<Self> {
        let (version, _) = watch::channel(0);
        Arc::new(Self {
            id: id.into(),
            state: Mutex::new(NoteState::default()),
            version,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn event(&self) -> Option<Arc<Event>> {
        self.state.lock().event.clone()
    }

    pub fn has_event(&self) -> bool {
        self.state.lock().event.is_some()
    }

    pub fn created_at(&self) -> Option<u64> {
        self.state.lock().event.as_ref().map(|e| e.created_at)
    }

    /// Fill the note with its event the first time it arrives.
    ///
    /// Returns false if an event is already present.
    pub(crate) fn fill(&self, event: Arc<Event>) -> bool {
        {
            let mut state = self.state.lock();
            if state.event.is_some() {
                return false;
            }
            state.event = Some(event);
        }
        self.bump();
        true
    }

    /// Swap the event unconditionally (replaceable-kind supersession).
    pub(crate) fn replace(&self, event: Arc<Event>) {
        self.state.lock().event = Some(event);
        self.bump();
    }

    /// Record that a relay served (or accepted) this event.
    ///
    /// Returns true when the relay was newly added.
    pub fn add_seen_on(&self, relay: &NormalizedRelayUrl) -> bool {
        let added = self.state.lock().seen_on.insert(relay.clone());
        if added {
            self.bump();
        }
        added
    }

    pub fn was_seen_on(&self, relay: &NormalizedRelayUrl) -> bool {
        self.state.lock().seen_on.contains(relay)
    }

    pub fn seen_on(&self) -> Vec<NormalizedRelayUrl> {
        self.state.lock().seen_on.iter().cloned().collect()
    }

    /// Reactive change stream: the value bumps on every mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

/// Mutable aggregate around one author public key.
pub struct Author {
    pubkey: String,
    state: Mutex<AuthorState>,
    version: watch::Sender<u64>,
}

#[derive(Default)]
struct AuthorState {
    /// Latest profile metadata event (latest-wins by timestamp).
    metadata: Option<Arc<Event>>,
    /// Ids of notes by this author. Non-owning: the cache owns the notes.
    notes: BTreeSet<String>,
}

impl Author {
    pub(crate) fn new(pubkey: impl Into<String>) -> Arc<Self> {
        let (version, _) = watch::channel(0);
        Arc::new(Self {
            pubkey: pubkey.into(),
            state: Mutex::new(AuthorState::default()),
            version,
        })
    }

    pub fn pubkey(&self) -> &str {
        &self.pubkey
    }

    pub fn metadata(&self) -> Option<Arc<Event>> {
        self.state.lock().metadata.clone()
    }

    /// Install newer profile metadata; older payloads are ignored.
    pub(crate) fn update_metadata(&self, event: Arc<Event>) -> bool {
        {
            let mut state = self.state.lock();
            if let Some(current) = &state.metadata {
                if event.created_at <= current.created_at {
                    return false;
                }
            }
            state.metadata = Some(event);
        }
        self.bump();
        true
    }

    pub(crate) fn add_note(&self, id: &str) {
        if self.state.lock().notes.insert(id.to_string()) {
            self.bump();
        }
    }

    pub(crate) fn remove_note(&self, id: &str) {
        if self.state.lock().notes.remove(id) {
            self.bump();
        }
    }

    pub fn note_ids(&self) -> Vec<String> {
        self.state.lock().notes.iter().cloned().collect()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}
