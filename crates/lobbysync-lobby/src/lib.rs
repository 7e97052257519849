//! Lobby layer for Lobbysync.
//!
//! Each lobby membership runs as an isolated Tokio task (actor model) that
//! owns the change feed, the presence heartbeat, and the start countdown.
//! Shared state lives only in the document store and every mutation of
//! the lobby document is a store transaction.
//!
//! # Key types
//!
//! - [`LobbyController`]: create/join/leave, host operations, resume
//! - [`LobbyHandle`]: commands to a running session actor
//! - [`LobbyEvent`]: what the session reports to the UI
//! - [`LobbyPhase`]: client-side lifecycle state machine
//! - [`LobbyConfig`]: heartbeat, countdown, chat and retry settings
//! - [`QuizSink`]: receives the session handoff

mod chat;
mod config;
mod controller;
mod error;
mod handoff;
pub mod paths;
mod presence;
mod retry;
mod session;
mod txn;

pub use chat::{prepare_chat_text, ChatFeed, TypingBoard};
pub use config::{LobbyConfig, LobbyPhase};
pub use controller::LobbyController;
pub use error::LobbyError;
pub use handoff::{ChannelSink, Handoff, QuizSink, SessionParams};
pub use presence::{classify, Liveness, PresenceBoard};
pub use retry::RetryPolicy;
pub use session::{LobbyEvent, LobbyHandle};
