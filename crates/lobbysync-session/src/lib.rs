//! Client-side session plumbing for Lobbysync.
//!
//! This crate handles everything about "who am I and where was I":
//!
//! 1. **Identity**: resolving the acting user ([`IdentityProvider`] trait,
//!    [`WatchIdentity`])
//! 2. **Local persistence**: a restart-surviving key/value slot
//!    ([`LocalStore`], [`MemoryLocalStore`], [`FileLocalStore`])
//! 3. **Reconnection**: remembering the last lobby and one-shot invites
//!    ([`ReconnectManager`], [`InviteLocator`], [`UrlLocator`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Lobby layer (above)  ← asks who is acting, records membership
//!     ↕
//! Session layer (this crate)  ← identity + local memory of the last lobby
//!     ↕
//! Protocol layer (below)  ← provides Profile, LobbyCode
//! ```

mod error;
mod identity;
mod reconnect;
mod storage;

pub use error::SessionError;
pub use identity::{IdentityProvider, WatchIdentity};
pub use reconnect::{InviteLocator, ReconnectManager, ResumeSource, ResumeTarget, UrlLocator};
pub use storage::{FileLocalStore, LocalStore, MemoryLocalStore, LAST_LOBBY_KEY, PENDING_INVITE_KEY};
