//! Error types for the protocol layer.
//!
//! Each crate in Lobbysync defines its own error enum. When you see a
//! `ProtocolError`, the problem is in validating or (de)serializing a
//! document, not in the store or in the lobby rules.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a document into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a document).
    ///
    /// Common causes: a document written by an incompatible client,
    /// unknown or missing fields, or a truncated write.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A lobby code did not match `^\d{6}$`.
    ///
    /// Raised before the code is ever used to address the store.
    #[error("invalid lobby code: {0:?}")]
    InvalidCode(String),

    /// A document passed deserialization but violates a model rule.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}
