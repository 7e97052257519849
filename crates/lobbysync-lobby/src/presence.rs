//! Presence: heartbeat records and per-observer liveness.
//!
//! Each client refreshes its own record on a fixed period. Everyone else
//! decides liveness locally from the record's age; there is no central
//! authority and presence is never used for authorization.

use std::collections::HashMap;
use std::time::Duration;

use lobbysync_protocol::{Identity, Lobby, PresenceRecord};
use serde::{Deserialize, Serialize};

/// Liveness of one player as seen by one observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Liveness {
    Online,
    Offline,
    /// No record has been seen for this player yet.
    Unknown,
}

/// Classifies `subject` from the observer's point of view.
///
/// Self is always online. A record older than `stale_after`, or one marked
/// offline, is offline.
pub fn classify(
    record: Option<&PresenceRecord>,
    now: u64,
    observer: &Identity,
    subject: &Identity,
    stale_after: Duration,
) -> Liveness {
    if observer == subject {
        return Liveness::Online;
    }
    match record {
        None => Liveness::Unknown,
        Some(r) if !r.is_online => Liveness::Offline,
        Some(r) if now.saturating_sub(r.last_seen) > stale_after.as_millis() as u64 => {
            Liveness::Offline
        }
        Some(_) => Liveness::Online,
    }
}

/// The presence records of one lobby, as last seen on the change feed.
#[derive(Debug, Default)]
pub struct PresenceBoard {
    records: HashMap<Identity, PresenceRecord>,
}

impl PresenceBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, identity: Identity, record: PresenceRecord) {
        self.records.insert(identity, record);
    }

    pub fn remove(&mut self, identity: &Identity) {
        self.records.remove(identity);
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn get(&self, identity: &Identity) -> Option<&PresenceRecord> {
        self.records.get(identity)
    }

    /// Liveness of every player in `lobby`, in lobby order.
    pub fn liveness(
        &self,
        lobby: &Lobby,
        now: u64,
        observer: &Identity,
        stale_after: Duration,
    ) -> Vec<(Identity, Liveness)> {
        lobby
            .players
            .iter()
            .map(|p| {
                let state = classify(self.get(&p.identity), now, observer, &p.identity, stale_after);
                (p.identity.clone(), state)
            })
            .collect()
    }
}
