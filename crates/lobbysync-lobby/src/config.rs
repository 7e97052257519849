//! Lobby configuration and client-side phase machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::RetryPolicy;

// ---------------------------------------------------------------------------
// LobbyConfig
// ---------------------------------------------------------------------------

/// Timings and limits for a lobby client.
///
/// Every client in a lobby should use the same values; presence staleness
/// in particular is judged by the observer, so mismatched configs show
/// each other offline at different times.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    /// How often the presence record is refreshed.
    pub heartbeat_interval: Duration,

    /// Random delay (0–max) added to the first heartbeat after the
    /// immediate one.
    pub heartbeat_jitter: Duration,

    /// A presence record older than this is classified offline.
    pub presence_stale_after: Duration,

    /// At most one "typing" write per interval while typing.
    pub typing_throttle: Duration,

    /// The typing marker is removed after this long without a keystroke.
    pub typing_idle: Duration,

    /// Readers ignore typing markers older than this.
    pub typing_stale_after: Duration,

    /// Countdown length in ticks once the host starts.
    pub countdown_ticks: u32,

    /// Duration of one countdown tick.
    pub countdown_interval: Duration,

    /// How many recent chat messages are loaded on entry.
    pub chat_history: usize,

    /// Longer chat messages are truncated to this many characters.
    pub chat_max_len: usize,

    /// Quiet period before a scheduled settings change is written.
    pub settings_debounce: Duration,

    /// Fresh codes tried before `create_lobby` gives up on collisions.
    pub max_code_attempts: u32,

    /// Backoff for transient store failures.
    pub retry: RetryPolicy,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_jitter: Duration::from_millis(500),
            presence_stale_after: Duration::from_secs(25),
            typing_throttle: Duration::from_secs(2),
            typing_idle: Duration::from_secs(3),
            typing_stale_after: Duration::from_secs(10),
            countdown_ticks: 5,
            countdown_interval: Duration::from_secs(1),
            chat_history: 50,
            chat_max_len: 500,
            settings_debounce: Duration::from_millis(500),
            max_code_attempts: 10,
            retry: RetryPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// LobbyPhase
// ---------------------------------------------------------------------------

/// Where this client stands with respect to one lobby.
///
/// ```text
/// NoLobby → Waiting → Started → Closed | Kicked | Left
///              └──────────────→ Closed | Kicked | Left
/// ```
///
/// - **NoLobby**: not a member of anything.
/// - **Waiting**: member of a lobby accepting joins.
/// - **Started**: the host started; the countdown and handoff run locally.
/// - **Closed**: the lobby document disappeared (host left, last player
///   left).
/// - **Kicked**: the host removed this client.
/// - **Left**: this client removed itself.
///
/// A member rejoining a started lobby goes straight from `NoLobby` to
/// `Started`. Every terminal phase returns to `NoLobby` on the next join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LobbyPhase {
    #[default]
    NoLobby,
    Waiting,
    Started,
    Closed,
    Kicked,
    Left,
}

impl LobbyPhase {
    /// `true` while this client holds a membership.
    pub fn is_member(self) -> bool {
        matches!(self, Self::Waiting | Self::Started)
    }

    /// `true` once the membership has ended.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Kicked | Self::Left)
    }

    /// Returns `true` if moving to `target` is a valid transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        match (self, target) {
            (Self::NoLobby, Self::Waiting | Self::Started) => true,
            (Self::Waiting, Self::Started) => true,
            (Self::Waiting | Self::Started, t) => t.is_terminal(),
            (from, Self::NoLobby) => from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for LobbyPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoLobby => write!(f, "NoLobby"),
            Self::Waiting => write!(f, "Waiting"),
            Self::Started => write!(f, "Started"),
            Self::Closed => write!(f, "Closed"),
            Self::Kicked => write!(f, "Kicked"),
            Self::Left => write!(f, "Left"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_protocol_timings() {
        let cfg = LobbyConfig::default();
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(cfg.presence_stale_after, Duration::from_secs(25));
        assert_eq!(cfg.countdown_ticks, 5);
        assert_eq!(cfg.chat_history, 50);
        assert_eq!(cfg.settings_debounce, Duration::from_millis(500));
    }

    #[test]
    fn test_config_deserializes_partial_overrides() {
        let cfg: LobbyConfig = serde_json::from_str(r#"{"countdown_ticks":3}"#).unwrap();
        assert_eq!(cfg.countdown_ticks, 3);
        assert_eq!(cfg.chat_history, 50);
    }

    #[test]
    fn test_phase_forward_transitions() {
        assert!(LobbyPhase::NoLobby.can_transition_to(LobbyPhase::Waiting));
        assert!(LobbyPhase::Waiting.can_transition_to(LobbyPhase::Started));
        assert!(LobbyPhase::Started.can_transition_to(LobbyPhase::Kicked));
        assert!(LobbyPhase::Waiting.can_transition_to(LobbyPhase::Closed));
        assert!(LobbyPhase::Left.can_transition_to(LobbyPhase::NoLobby));
    }

    #[test]
    fn test_phase_rejects_backward_transitions() {
        assert!(!LobbyPhase::Started.can_transition_to(LobbyPhase::Waiting));
        assert!(!LobbyPhase::Kicked.can_transition_to(LobbyPhase::Waiting));
        assert!(!LobbyPhase::NoLobby.can_transition_to(LobbyPhase::Left));
        assert!(!LobbyPhase::Waiting.can_transition_to(LobbyPhase::NoLobby));
    }

    #[test]
    fn test_member_and_terminal_are_disjoint() {
        for phase in [
            LobbyPhase::NoLobby,
            LobbyPhase::Waiting,
            LobbyPhase::Started,
            LobbyPhase::Closed,
            LobbyPhase::Kicked,
            LobbyPhase::Left,
        ] {
            assert!(!(phase.is_member() && phase.is_terminal()), "{phase}");
        }
    }
}
