//! `LobbyClient` builder and startup path.
//!
//! Ties the layers together for an application: a document store, an
//! identity provider, the local reconnection slot and the quiz sink.

use std::ops::{Deref, DerefMut};
use std::path::PathBuf;

use lobbysync_lobby::{LobbyConfig, LobbyController, QuizSink};
use lobbysync_protocol::LobbyCode;
use lobbysync_session::{
    FileLocalStore, IdentityProvider, InviteLocator, MemoryLocalStore, ReconnectManager,
};
use lobbysync_store::DocumentStore;

use crate::LobbySyncError;

/// Where the reconnection slot lives.
#[derive(Debug, Clone, Default)]
enum LocalSlot {
    /// Lost on restart.
    #[default]
    Memory,
    /// A JSON file that survives restarts.
    File(PathBuf),
}

/// Builder for a [`LobbyClient`].
///
/// # Example
///
/// ```rust,no_run
/// use lobbysync::prelude::*;
///
/// # async fn run() -> Result<(), LobbySyncError> {
/// let identity = WatchIdentity::signed_in(Profile::new("uid-1", "Ana", "owl"));
/// let mut client = LobbyClient::<MemoryStore, WatchIdentity>::builder()
///     .persist_to("lobbysync.json")
///     .build(MemoryStore::new(), identity, |params: SessionParams| {
///         println!("starting quiz {}", params.selector);
///     })?;
/// client.start(None::<&UrlLocator>).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct LobbyClientBuilder {
    config: LobbyConfig,
    slot: LocalSlot,
}

impl LobbyClientBuilder {
    /// Creates a builder with default timings and an in-memory slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the lobby configuration.
    pub fn config(mut self, config: LobbyConfig) -> Self {
        self.config = config;
        self
    }

    /// Persists the reconnection slot to `path`.
    pub fn persist_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.slot = LocalSlot::File(path.into());
        self
    }

    /// Keeps the reconnection slot in memory only.
    pub fn in_memory(mut self) -> Self {
        self.slot = LocalSlot::Memory;
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    /// [`LobbySyncError::Session`] if the slot file exists but can't be
    /// read.
    pub fn build<S, I>(
        self,
        store: S,
        identity: I,
        sink: impl QuizSink,
    ) -> Result<LobbyClient<S, I>, LobbySyncError>
    where
        S: DocumentStore + Clone,
        I: IdentityProvider,
    {
        let reconnect = match &self.slot {
            LocalSlot::Memory => ReconnectManager::new(MemoryLocalStore::new()),
            LocalSlot::File(path) => ReconnectManager::new(FileLocalStore::open(path)?),
        };
        tracing::debug!(slot = ?self.slot, "lobby client built");
        Ok(LobbyClient {
            controller: LobbyController::new(store, identity, reconnect, sink, self.config),
        })
    }
}

/// A lobby client: a [`LobbyController`] plus the startup path.
///
/// Derefs to the controller for every lobby operation.
pub struct LobbyClient<S, I> {
    controller: LobbyController<S, I>,
}

impl<S, I> LobbyClient<S, I>
where
    S: DocumentStore + Clone,
    I: IdentityProvider,
{
    pub fn builder() -> LobbyClientBuilder {
        LobbyClientBuilder::new()
    }

    /// Startup: captures an invite from `locator` (if any), waits for the
    /// identity provider, then tries the remembered lobby and the invite
    /// once each.
    pub async fn start(
        &mut self,
        locator: Option<&impl InviteLocator>,
    ) -> Result<Option<LobbyCode>, LobbySyncError> {
        if let Some(locator) = locator {
            if let Some(code) = self.controller.capture_invite(locator) {
                tracing::info!(%code, "invite captured");
            }
        }
        Ok(self.controller.resume().await?)
    }

    pub fn into_controller(self) -> LobbyController<S, I> {
        self.controller
    }
}

impl<S, I> Deref for LobbyClient<S, I> {
    type Target = LobbyController<S, I>;

    fn deref(&self) -> &Self::Target {
        &self.controller
    }
}

impl<S, I> DerefMut for LobbyClient<S, I> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.controller
    }
}
