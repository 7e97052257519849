//! Error types for the lobby layer.

use lobbysync_protocol::{LobbyCode, ProtocolError};
use lobbysync_session::SessionError;
use lobbysync_store::StoreError;

/// Errors that can occur during lobby operations.
///
/// The first group are *terminal*: retrying cannot change the outcome, so
/// they go straight to the caller. Store errors that are transient are
/// retried with backoff and only surface as [`LobbyError::Connectivity`]
/// once the retry budget is spent.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// Malformed caller input, rejected before touching the store.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Nobody is signed in.
    #[error("not signed in")]
    NotLoggedIn,

    /// The lobby does not exist.
    #[error("lobby {0} not found")]
    NotFound(LobbyCode),

    /// The caller lacks the authority for this operation (not the host,
    /// or removing someone other than themselves).
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// The lobby has started and the caller isn't a member, or the
    /// operation is only valid while waiting.
    #[error("lobby {0} has already started")]
    AlreadyStarted(LobbyCode),

    /// The host tried to start before everyone was ready.
    #[error("{ready} of {total} players ready")]
    PlayersNotReady { ready: usize, total: usize },

    /// The store stayed unreachable for the whole retry budget.
    #[error("connection problem after {attempts} attempts: {source}")]
    Connectivity {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    /// Every generated code was already taken.
    #[error("no free lobby code after {0} attempts")]
    CodesExhausted(u32),

    /// The operation needs a lobby and the client isn't in one.
    #[error("not in a lobby")]
    NoLobby,

    /// The lobby session task has stopped.
    #[error("lobby session {0} is unavailable")]
    Unavailable(LobbyCode),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl LobbyError {
    /// `true` for store failures worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_transient())
    }

    /// `true` for logical failures that must reach the user unchanged.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::NotLoggedIn
                | Self::NotFound(_)
                | Self::Unauthorized(_)
                | Self::AlreadyStarted(_)
                | Self::PlayersNotReady { .. }
        )
    }

    /// A message fit to show a player.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidInput(msg) => format!("Please check your input: {msg}."),
            Self::NotLoggedIn => "Please sign in to play with others.".into(),
            Self::NotFound(code) => format!("Lobby {code} doesn't exist."),
            Self::Unauthorized(_) => "Only the host can do that.".into(),
            Self::AlreadyStarted(_) => "This game has already started.".into(),
            Self::PlayersNotReady { ready, total } => {
                format!("Waiting for players: {ready}/{total} ready.")
            }
            Self::Connectivity { .. } | Self::Store(_) => {
                "Connection problem. Please try again.".into()
            }
            Self::CodesExhausted(_) => "Couldn't create a lobby. Please try again.".into(),
            Self::NoLobby | Self::Unavailable(_) => "You're not in a lobby.".into(),
            Self::Protocol(_) | Self::Session(_) => "Something went wrong.".into(),
        }
    }
}
