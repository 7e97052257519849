//! The documents stored for each lobby.
//!
//! ```text
//! lobbies/{code}                      Lobby
//! lobbies/{code}/presence/{identity}  PresenceRecord
//! lobbies/{code}/messages/{auto-id}   ChatMessage
//! lobbies/{code}/typing/{identity}    TypingRecord
//! ```
//!
//! Every struct is `deny_unknown_fields`: a document that doesn't match the
//! expected shape fails to decode at the store boundary instead of flowing
//! through the controller as a loose map.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Identity, LobbyCode, Profile};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle of the shared lobby document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LobbyStatus {
    /// Accepting joins, settings may change.
    #[default]
    Waiting,
    /// The host started the session. Only existing members may rejoin.
    Started,
}

/// The game mode the quiz subsystem will run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameMode {
    #[default]
    Classic,
    TimeAttack,
    Coop,
    Survival,
}

impl GameMode {
    /// The wire spelling, e.g. `"time-attack"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::TimeAttack => "time-attack",
            Self::Coop => "coop",
            Self::Survival => "survival",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How question timers behave during the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerMode {
    /// Per-question default timer of the quiz.
    #[default]
    Standard,
    /// Host-chosen duration in seconds (see [`QuizConfig::custom_duration`]).
    Custom,
    /// No timer.
    Off,
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Which quiz the host picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSelector {
    pub id: String,
    pub title: String,
    pub total_questions: u32,
}

/// Host-tunable session knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    pub timer_mode: TimerMode,
    pub custom_duration: Option<u32>,
    pub lives: Option<u32>,
}

/// Everything the host picks for a session: what to play and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySettings {
    pub mode: GameMode,
    pub quiz: QuizSelector,
    #[serde(default)]
    pub session: SessionSettings,
}

impl LobbySettings {
    /// The config these settings produce with the given `seed`.
    pub fn quiz_config(&self, seed: u64) -> QuizConfig {
        QuizConfig::new(&self.quiz, self.mode, &self.session, seed)
    }
}

// ---------------------------------------------------------------------------
// QuizConfig
// ---------------------------------------------------------------------------

/// Snapshot of the session parameters shared by every client.
///
/// Immutable once assigned: the host replaces the whole value (with a fresh
/// `seed`) rather than editing fields. The seed lets every client derive the
/// same question order without further coordination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QuizConfig {
    pub id: String,
    pub title: String,
    pub total_questions: u32,
    pub seed: u64,
    pub timer_mode: TimerMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lives: Option<u32>,
}

impl QuizConfig {
    /// Assembles a config, dropping settings that don't apply.
    ///
    /// `custom_duration` is kept only for [`TimerMode::Custom`]; `lives`
    /// only for [`GameMode::Survival`].
    pub fn new(
        quiz: &QuizSelector,
        mode: GameMode,
        settings: &SessionSettings,
        seed: u64,
    ) -> Self {
        Self {
            id: quiz.id.clone(),
            title: quiz.title.clone(),
            total_questions: quiz.total_questions,
            seed,
            timer_mode: settings.timer_mode,
            custom_duration: match settings.timer_mode {
                TimerMode::Custom => settings.custom_duration,
                _ => None,
            },
            lives: match mode {
                GameMode::Survival => settings.lives,
                _ => None,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// One entry of [`Lobby::players`].
///
/// Players are embedded in the lobby document, never stored separately, and
/// the array is only ever replaced as a whole inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Player {
    pub identity: Identity,
    pub display_name: String,
    pub avatar: String,
    pub ready: bool,
    pub score: u32,
    pub progress: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eliminated: Option<bool>,
}

impl Player {
    /// A fresh entry for `profile` with zeroed score and progress.
    pub fn from_profile(profile: &Profile, ready: bool) -> Self {
        Self {
            identity: profile.identity.clone(),
            display_name: profile.display_name.clone(),
            avatar: profile.avatar.clone(),
            ready,
            score: 0,
            progress: 0,
            eliminated: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Lobby
// ---------------------------------------------------------------------------

/// The root document, keyed by its [`LobbyCode`].
///
/// Invariants maintained by the controller's transactions:
/// - `players` has no duplicate identities.
/// - `host_id` is in `players` for as long as the lobby exists and is
///   waiting; removing the host deletes the document.
/// - The host's `ready` flag is always `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Lobby {
    pub code: LobbyCode,
    pub host_id: Identity,
    pub status: LobbyStatus,
    pub mode: GameMode,
    pub players: Vec<Player>,
    pub quiz_config: QuizConfig,
    pub created_at: u64,
}

impl Lobby {
    /// A waiting lobby with `host` as the sole (ready) player.
    pub fn new(
        code: LobbyCode,
        host: &Profile,
        mode: GameMode,
        quiz_config: QuizConfig,
        created_at: u64,
    ) -> Self {
        Self {
            code,
            host_id: host.identity.clone(),
            status: LobbyStatus::Waiting,
            mode,
            players: vec![Player::from_profile(host, true)],
            quiz_config,
            created_at,
        }
    }

    pub fn is_member(&self, identity: &Identity) -> bool {
        self.players.iter().any(|p| &p.identity == identity)
    }

    pub fn player(&self, identity: &Identity) -> Option<&Player> {
        self.players.iter().find(|p| &p.identity == identity)
    }

    pub fn is_host(&self, identity: &Identity) -> bool {
        &self.host_id == identity
    }

    pub fn is_waiting(&self) -> bool {
        self.status == LobbyStatus::Waiting
    }

    /// Number of players counted as ready (the host always is).
    pub fn ready_count(&self) -> usize {
        self.players
            .iter()
            .filter(|p| p.ready || self.is_host(&p.identity))
            .count()
    }

    /// `true` when every player, host included, is ready.
    pub fn all_ready(&self) -> bool {
        self.ready_count() == self.players.len()
    }
}

// ---------------------------------------------------------------------------
// Subcollections
// ---------------------------------------------------------------------------

/// Heartbeat record, one per identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PresenceRecord {
    pub last_seen: u64,
    pub is_online: bool,
    pub name: String,
}

/// An append-only chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChatMessage {
    pub identity: Identity,
    pub name: String,
    pub avatar: String,
    pub text: String,
    pub timestamp: u64,
}

/// "X is typing" marker, one per identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TypingRecord {
    pub name: String,
    pub is_typing: bool,
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> Profile {
        Profile::new("host", "Host", "fox")
    }

    fn quiz() -> QuizSelector {
        QuizSelector {
            id: "quiz-1".into(),
            title: "Capitals".into(),
            total_questions: 10,
        }
    }

    fn lobby() -> Lobby {
        let config = QuizConfig::new(&quiz(), GameMode::Classic, &SessionSettings::default(), 7);
        Lobby::new(LobbyCode::parse("123456").unwrap(), &host(), GameMode::Classic, config, 1)
    }

    #[test]
    fn test_new_lobby_has_host_as_ready_sole_player() {
        let lobby = lobby();
        assert_eq!(lobby.players.len(), 1);
        assert!(lobby.is_host(&Identity::new("host")));
        assert!(lobby.players[0].ready);
        assert!(lobby.is_waiting());
        assert!(lobby.all_ready());
    }

    #[test]
    fn test_ready_count_treats_host_as_ready() {
        let mut lobby = lobby();
        lobby.players[0].ready = false;
        lobby.players.push(Player::from_profile(&Profile::new("b", "B", ""), false));
        assert_eq!(lobby.ready_count(), 1);
        assert!(!lobby.all_ready());
    }

    #[test]
    fn test_quiz_config_drops_inapplicable_settings() {
        let settings = SessionSettings {
            timer_mode: TimerMode::Standard,
            custom_duration: Some(30),
            lives: Some(3),
        };
        let config = QuizConfig::new(&quiz(), GameMode::Classic, &settings, 1);
        assert_eq!(config.custom_duration, None);
        assert_eq!(config.lives, None);

        let settings = SessionSettings {
            timer_mode: TimerMode::Custom,
            ..settings
        };
        let config = QuizConfig::new(&quiz(), GameMode::Survival, &settings, 1);
        assert_eq!(config.custom_duration, Some(30));
        assert_eq!(config.lives, Some(3));
    }

    #[test]
    fn test_lobby_wire_format_uses_camel_case_and_enum_spellings() {
        let mut lobby = lobby();
        lobby.mode = GameMode::TimeAttack;
        let json = serde_json::to_value(&lobby).unwrap();
        assert_eq!(json["hostId"], "host");
        assert_eq!(json["status"], "waiting");
        assert_eq!(json["mode"], "time-attack");
        assert_eq!(json["quizConfig"]["totalQuestions"], 10);
        assert_eq!(json["players"][0]["displayName"], "Host");
        assert!(json["players"][0].get("eliminated").is_none());
    }

    #[test]
    fn test_lobby_rejects_unknown_fields() {
        let mut json = serde_json::to_value(lobby()).unwrap();
        json["isPublic"] = serde_json::Value::Bool(true);
        assert!(serde_json::from_value::<Lobby>(json).is_err());
    }

    #[test]
    fn test_lobby_rejects_missing_required_fields() {
        let mut json = serde_json::to_value(lobby()).unwrap();
        json.as_object_mut().unwrap().remove("hostId");
        assert!(serde_json::from_value::<Lobby>(json).is_err());
    }

    #[test]
    fn test_lobby_rejects_malformed_code() {
        let mut json = serde_json::to_value(lobby()).unwrap();
        json["code"] = serde_json::Value::String("12".into());
        assert!(serde_json::from_value::<Lobby>(json).is_err());
    }
}
