//! Conversation aggregates.
//!
//! A chatroom is keyed by its participant set and holds the notes forming
//! one conversation. Mutations are serialized per room (single writer at a
//! time); unrelated rooms never contend. After every mutation three
//! invariants hold: the message set has no duplicates, `newest_message` is
//! the max-by-timestamp member, and the room subject tracks the most
//! recent message that carries one.
//!
//! Pruning bounds memory for large rooms and emits one batched removed-set
//! notification instead of a storm of per-item events.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use larimar_core::event::{Event, KIND_CHAT_MESSAGE, KIND_ENCRYPTED_DM};

use super::note::Note;

/// Active rooms keep this many recent messages through a prune.
pub const RECENT_ROOM_KEEP: usize = 100;
/// A room whose newest message is older than this is stale: pruning keeps
/// only the single latest message.
pub const RECENT_ROOM_WINDOW_SECS: u64 = 7 * 86_400;

/// True for the chat message kinds that pruning may evict. Anything else
/// in a room is permanent content and survives every prune.
pub fn is_chat_kind(kind: u16) -> bool {
    kind == KIND_ENCRYPTED_DM || kind == KIND_CHAT_MESSAGE
}

/// Identity of a conversation: the set of participant public keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatroomKey(Vec<String>);

impl ChatroomKey {
    pub fn new(participants: impl IntoIterator<Item = String>) -> Self {
        let mut participants: Vec<String> = participants.into_iter().collect();
        participants.sort();
        participants.dedup();
        Self(participants)
    }

    /// The author plus every `p`-tagged peer.
    pub fn from_event(event: &Event) -> Self {
        let mut participants: Vec<String> =
            event.referenced_pubkeys().map(str::to_string).collect();
        participants.push(event.pubkey.clone());
        Self::new(participants)
    }

    pub fn participants(&self) -> &[String] {
        &self.0
    }
}

/// One change-stream entry per mutation; pruning batches instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomUpdate {
    MessageAdded(String),
    MessageRemoved(String),
    MessagesPruned(Vec<String>),
}

struct RoomState {
    messages: HashMap<String, Arc<Note>>,
    newest: Option<Arc<Note>>,
    subject: Option<String>,
    /// Timestamp of the message the subject came from.
    subject_time: u64,
}

/// A mutable conversation aggregate.
pub struct Chatroom {
    key: ChatroomKey,
    state: Mutex<RoomState>,
    updates_tx: broadcast::Sender<RoomUpdate>,
}

impl Chatroom {
    pub(crate) fn new(key: ChatroomKey) -> Arc<Self> {
        let (updates_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            key,
            state: Mutex::new(RoomState {
                messages: HashMap::new(),
                newest: None,
                subject: None,
                subject_time: 0,
            }),
            updates_tx,
        })
    }

    pub fn key(&self) -> &ChatroomKey {
        &self.key
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomUpdate> {
        self.updates_tx.subscribe()
    }

    /// Add a message. Returns false for duplicates or unfilled notes.
    pub fn add_message_sync(&self, note: Arc<Note>) -> bool {
        let Some(event) = note.event() else {
            return false;
        };
        {
            let mut state = self.state.lock();
            if state.messages.contains_key(note.id()) {
                return false;
            }
            state.messages.insert(note.id().to_string(), note.clone());

            if newer_than(&event, state.newest.as_deref()) {
                state.newest = Some(note.clone());
            }
            if let Some(subject) = event.subject() {
                if event.created_at >= state.subject_time {
                    state.subject = Some(subject.to_string());
                    state.subject_time = event.created_at;
                }
            }
        }
        let _ = self
            .updates_tx
            .send(RoomUpdate::MessageAdded(note.id().to_string()));
        true
    }

    /// Remove a message, recomputing the newest pointer and subject when
    /// the removed message was their source.
    pub fn remove_message_sync(&self, id: &str) -> bool {
        let removed = {
            let mut state = self.state.lock();
            let removed = state.messages.remove(id).is_some();
            if removed {
                let was_newest = state.newest.as_ref().is_some_and(|n| n.id() == id);
                if was_newest {
                    recompute_newest(&mut state);
                }
                recompute_subject(&mut state);
            }
            removed
        };
        if removed {
            let _ = self
                .updates_tx
                .send(RoomUpdate::MessageRemoved(id.to_string()));
        }
        removed
    }

    pub fn newest_message(&self) -> Option<Arc<Note>> {
        self.state.lock().newest.clone()
    }

    pub fn subject(&self) -> Option<String> {
        self.state.lock().subject.clone()
    }

    pub fn message_count(&self) -> usize {
        self.state.lock().messages.len()
    }

    pub fn message_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().messages.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().messages.contains_key(id)
    }

    /// Reduce memory for a large room.
    ///
    /// A room whose newest message is within the last 7 days keeps the
    /// latest [`RECENT_ROOM_KEEP`] messages plus anything an active
    /// observer pins plus all permanent (non-chat-kind) content. A stale
    /// room keeps only its single latest message.
    ///
    /// Emits one batched [`RoomUpdate::MessagesPruned`] and returns the
    /// removed notes so the owning cache can release them.
    pub fn prune(&self, observed: &HashSet<String>, now: u64) -> Vec<Arc<Note>> {
        let removed: Vec<Arc<Note>> = {
            let mut state = self.state.lock();
            let newest_time = state
                .newest
                .as_ref()
                .and_then(|n| n.created_at())
                .unwrap_or(0);

            // Newest first, ties broken by id for determinism.
            let mut by_recency: Vec<(u64, String)> = state
                .messages
                .values()
                .map(|n| (n.created_at().unwrap_or(0), n.id().to_string()))
                .collect();
            by_recency.sort_by(|a, b| b.cmp(a));

            let active = now.saturating_sub(newest_time) <= RECENT_ROOM_WINDOW_SECS;
            let keep: HashSet<String> = if active {
                let mut keep: HashSet<String> = by_recency
                    .iter()
                    .take(RECENT_ROOM_KEEP)
                    .map(|(_, id)| id.clone())
                    .collect();
                for note in state.messages.values() {
                    let permanent = note
                        .event()
                        .is_some_and(|e| !is_chat_kind(e.kind));
                    if permanent || observed.contains(note.id()) {
                        keep.insert(note.id().to_string());
                    }
                }
                keep
            } else {
                by_recency
                    .first()
                    .map(|(_, id)| id.clone())
                    .into_iter()
                    .collect()
            };

            let doomed: Vec<String> = state
                .messages
                .keys()
                .filter(|id| !keep.contains(*id))
                .cloned()
                .collect();
            let removed: Vec<Arc<Note>> = doomed
                .iter()
                .filter_map(|id| state.messages.remove(id))
                .collect();

            if !removed.is_empty() {
                recompute_newest(&mut state);
                recompute_subject(&mut state);
            }
            removed
        };

        if !removed.is_empty() {
            metrics::counter!("chatroom_messages_pruned_total").increment(removed.len() as u64);
            let ids = removed.iter().map(|n| n.id().to_string()).collect();
            let _ = self.updates_tx.send(RoomUpdate::MessagesPruned(ids));
        }
        removed
    }
}

fn newer_than(event: &Event, newest: Option<&Note>) -> bool {
    match newest.and_then(|n| n.created_at()) {
        Some(current) => event.created_at > current,
        None => true,
    }
}

fn recompute_newest(state: &mut RoomState) {
    state.newest = state
        .messages
        .values()
        .max_by_key(|n| (n.created_at().unwrap_or(0), n.id().to_string()))
        .cloned();
}

fn recompute_subject(state: &mut RoomState) {
    let source = state
        .messages
        .values()
        .filter_map(|n| n.event())
        .filter(|e| e.subject().is_some())
        .max_by_key(|e| (e.created_at, e.id.clone()));
    match source {
        Some(event) => {
            state.subject_time = event.created_at;
            state.subject = event.subject().map(str::to_string);
        }
        None => {
            state.subject = None;
            state.subject_time = 0;
        }
    }
}
