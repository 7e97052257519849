//! Ephemeral channel: lobby chat and typing markers.
//!
//! Chat is append-only. On entry the client loads the most recent messages
//! as a batch, then applies additions from the change feed one at a time.
//! Only those later additions from someone else produce a notification, so
//! entering a busy lobby doesn't fire a burst of sounds.
//!
//! Typing markers are one document per identity. Readers drop markers
//! older than the stale window, so a client that vanished mid-sentence
//! stops "typing" on its own.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use lobbysync_protocol::{ChatMessage, Identity, TypingRecord};

use crate::LobbyError;

/// Trims `text` and caps it at `max_chars` characters.
///
/// # Errors
/// [`LobbyError::InvalidInput`] if nothing is left after trimming.
pub fn prepare_chat_text(text: &str, max_chars: usize) -> Result<String, LobbyError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(LobbyError::InvalidInput("empty chat message".into()));
    }
    Ok(trimmed.chars().take(max_chars).collect())
}

// ---------------------------------------------------------------------------
// ChatFeed
// ---------------------------------------------------------------------------

/// The recent chat history of one lobby, kept in store order.
///
/// Only keys of retained messages are remembered. A redelivered message
/// older than everything trimmed so far is recognised by its key, since
/// store ids sort in insertion order.
#[derive(Debug)]
pub struct ChatFeed {
    limit: usize,
    loaded: bool,
    messages: VecDeque<(String, ChatMessage)>,
    seen: HashSet<String>,
    /// Highest key trimmed from the history.
    trimmed_up_to: Option<String>,
}

impl ChatFeed {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            loaded: false,
            messages: VecDeque::new(),
            seen: HashSet::new(),
            trimmed_up_to: None,
        }
    }

    /// Loads the initial snapshot (any order) and returns the retained
    /// history, oldest first. Messages already applied from the feed are
    /// merged, not duplicated.
    pub fn load(&mut self, docs: Vec<(String, ChatMessage)>) -> Vec<ChatMessage> {
        for (key, message) in docs {
            if !self.is_trimmed(&key) && self.seen.insert(key.clone()) {
                self.messages.push_back((key, message));
            }
        }
        self.messages
            .make_contiguous()
            .sort_by(|(ka, a), (kb, b)| a.timestamp.cmp(&b.timestamp).then_with(|| ka.cmp(kb)));
        self.trim();
        self.loaded = true;
        self.history()
    }

    /// Applies one message from the change feed.
    ///
    /// Returns `None` for a duplicate delivery. Otherwise returns the
    /// message and whether it should notify `me`.
    pub fn apply(&mut self, key: String, message: ChatMessage, me: &Identity) -> Option<(ChatMessage, bool)> {
        if self.is_trimmed(&key) || !self.seen.insert(key.clone()) {
            return None;
        }
        let notify = self.loaded && &message.identity != me;
        self.messages.push_back((key, message.clone()));
        self.trim();
        Some((message, notify))
    }

    /// Retained messages, oldest first.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(|(_, m)| m.clone()).collect()
    }

    fn is_trimmed(&self, key: &str) -> bool {
        self.trimmed_up_to.as_deref().is_some_and(|up_to| key <= up_to)
    }

    fn trim(&mut self) {
        while self.messages.len() > self.limit {
            let Some((key, _)) = self.messages.pop_front() else {
                break;
            };
            self.seen.remove(&key);
            if self.trimmed_up_to.as_ref().is_none_or(|up_to| key > *up_to) {
                self.trimmed_up_to = Some(key);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TypingBoard
// ---------------------------------------------------------------------------

/// Typing markers of one lobby.
#[derive(Debug, Default)]
pub struct TypingBoard {
    records: HashMap<Identity, TypingRecord>,
}

impl TypingBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, identity: Identity, record: TypingRecord) {
        self.records.insert(identity, record);
    }

    pub fn remove(&mut self, identity: &Identity) {
        self.records.remove(identity);
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Names of everyone but `me` with a fresh typing marker, sorted.
    pub fn active(&self, now: u64, me: &Identity, stale_after: Duration) -> Vec<String> {
        let stale_ms = stale_after.as_millis() as u64;
        let mut names: Vec<String> = self
            .records
            .iter()
            .filter(|(id, r)| *id != me && r.is_typing && now.saturating_sub(r.timestamp) <= stale_ms)
            .map(|(_, r)| r.name.clone())
            .collect();
        names.sort();
        names
    }
}
