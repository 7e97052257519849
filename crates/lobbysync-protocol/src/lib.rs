//! Shared document model for Lobbysync.
//!
//! This crate defines the "language" every client speaks when it reads or
//! writes the shared lobby documents:
//!
//! - **Types** ([`LobbyCode`], [`Identity`], [`Profile`]): the keys and
//!   actors that address the store.
//! - **Documents** ([`Lobby`], [`Player`], [`QuizConfig`],
//!   [`PresenceRecord`], [`ChatMessage`], [`TypingRecord`]): the
//!   structures that live in the document store.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those documents are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong at that boundary.
//!
//! # Architecture
//!
//! ```text
//! Store (bytes) → Protocol (typed documents) → Lobby controller
//! ```
//!
//! Nothing here performs I/O. Validation happens at the edges: a
//! [`LobbyCode`] can only be constructed from a string that matches
//! `^\d{6}$`, and every document rejects unknown fields when decoded.

mod codec;
mod documents;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use documents::{
    ChatMessage, GameMode, Lobby, LobbySettings, LobbyStatus, Player, PresenceRecord,
    QuizConfig, QuizSelector, SessionSettings, TimerMode, TypingRecord,
};
pub use error::ProtocolError;
pub use types::{now_millis, Identity, LobbyCode, Profile};
