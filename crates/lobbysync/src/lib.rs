//! # Lobbysync
//!
//! Multiplayer lobbies over a shared document store.
//!
//! Clients form lobbies addressed by a 6-digit code, agree on quiz and
//! game settings, gate the start on readiness, and count down into a
//! synchronized session. All coordination happens through store
//! transactions and change feeds; there is no lobby server.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lobbysync::prelude::*;
//!
//! # async fn run() -> Result<(), LobbySyncError> {
//! lobbysync::init_tracing();
//!
//! let store = MemoryStore::new();
//! let identity = WatchIdentity::signed_in(Profile::new("uid-1", "Ana", "owl"));
//! let mut host = LobbyClient::<MemoryStore, WatchIdentity>::builder().build(store, identity, |_: SessionParams| {})?;
//!
//! let quiz = QuizSelector { id: "capitals".into(), title: "Capitals".into(), total_questions: 10 };
//! let code = host.create_lobby(GameMode::Classic, &quiz, SessionSettings::default()).await?;
//! # let _ = code;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;

use std::sync::Once;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use client::{LobbyClient, LobbyClientBuilder};
pub use error::LobbySyncError;

pub use lobbysync_lobby as lobby;
pub use lobbysync_protocol as protocol;
pub use lobbysync_session as session;
pub use lobbysync_store as store;
pub use lobbysync_tick as tick;

static TRACING: Once = Once::new();

/// Installs a `tracing` subscriber filtered by `RUST_LOG` (default
/// `info`). Later calls are no-ops, as is calling it when the application
/// already installed its own subscriber.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init();
    });
}

pub mod prelude {
    pub use crate::{init_tracing, LobbyClient, LobbyClientBuilder, LobbySyncError};

    pub use lobbysync_lobby::{
        ChannelSink, Liveness, LobbyConfig, LobbyController, LobbyError, LobbyEvent, LobbyHandle,
        LobbyPhase, QuizSink, RetryPolicy, SessionParams,
    };
    pub use lobbysync_protocol::{
        ChatMessage, GameMode, Identity, Lobby, LobbyCode, LobbySettings, LobbyStatus, Player,
        Profile, QuizSelector, SessionSettings, TimerMode,
    };
    pub use lobbysync_session::{
        FileLocalStore, IdentityProvider, InviteLocator, MemoryLocalStore, ReconnectManager,
        UrlLocator, WatchIdentity,
    };
    pub use lobbysync_store::{DocumentStore, MemoryStore, StoreError};
}
