//! Error types for the session layer.

use lobbysync_protocol::ProtocolError;

/// Errors that can occur while resolving identity or touching local
/// persistence.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Reading or writing the local persistence file failed.
    #[error("local persistence failed: {0}")]
    Persistence(#[from] std::io::Error),

    /// The local persistence file held something that isn't a key/value
    /// map, or a stored code failed validation.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The in-process store's lock was poisoned by a panicking thread.
    #[error("local store lock poisoned")]
    Poisoned,
}
