//! Unified error type for Lobbysync.

use lobbysync_lobby::LobbyError;
use lobbysync_protocol::ProtocolError;
use lobbysync_session::SessionError;
use lobbysync_store::StoreError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `lobbysync` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
#[derive(Debug, thiserror::Error)]
pub enum LobbySyncError {
    /// Encoding, decoding, or code validation failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The document store rejected or failed an operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Local persistence or identity failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A lobby operation failed.
    #[error(transparent)]
    Lobby(#[from] LobbyError),
}

impl LobbySyncError {
    /// A message fit to show a player.
    pub fn user_message(&self) -> String {
        match self {
            Self::Lobby(e) => e.user_message(),
            Self::Store(e) if e.is_transient() => "Connection problem. Please try again.".into(),
            _ => "Something went wrong.".into(),
        }
    }
}
