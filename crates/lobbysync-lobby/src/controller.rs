//! Lobby controller: the client's entry point for lobby operations.
//!
//! One controller per client process. It tracks at most one membership at
//! a time and routes operations on it to that membership's session actor.
//! Operations that don't need a membership (create, join, removing someone
//! from a lobby this client isn't watching) run their transactions
//! directly.

use std::sync::Arc;

use lobbysync_protocol::{
    Codec, GameMode, Identity, JsonCodec, Lobby, LobbyCode, LobbySettings, Profile, QuizSelector,
    SessionSettings,
};
use lobbysync_session::{IdentityProvider, InviteLocator, ReconnectManager, ResumeSource};
use lobbysync_store::DocumentStore;
use lobbysync_tick::DelayedTask;
use tokio::sync::mpsc;

use crate::chat::prepare_chat_text;
use crate::handoff::QuizSink;
use crate::session::{self, LobbyEvent, LobbyHandle, SessionContext};
use crate::{paths, txn, LobbyConfig, LobbyError, LobbyPhase};

/// The lobby this client is in.
struct Membership {
    code: LobbyCode,
    /// Identity the membership was entered as.
    identity: Identity,
    handle: LobbyHandle,
}

/// Drives lobby membership for one client.
///
/// Holds no locks: multi-step mutations happen inside store transactions,
/// and everything tied to the current lobby is serialized by its session
/// actor. After every await that crosses an async boundary, operations
/// re-check that the identity they started with is still the one acting
/// and abort quietly if not.
pub struct LobbyController<S, I> {
    ctx: SessionContext<S>,
    identity: Arc<I>,
    active: Option<Membership>,
    events: Option<mpsc::UnboundedReceiver<LobbyEvent>>,
    pending_settings: Option<DelayedTask>,
}

impl<S, I> LobbyController<S, I>
where
    S: DocumentStore + Clone,
    I: IdentityProvider,
{
    pub fn new(
        store: S,
        identity: I,
        reconnect: ReconnectManager,
        sink: impl QuizSink,
        config: LobbyConfig,
    ) -> Self {
        Self {
            ctx: SessionContext {
                store,
                reconnect,
                sink: Arc::new(sink),
                config: Arc::new(config),
            },
            identity: Arc::new(identity),
            active: None,
            events: None,
            pending_settings: None,
        }
    }

    pub fn config(&self) -> &LobbyConfig {
        &self.ctx.config
    }

    pub fn reconnect(&self) -> &ReconnectManager {
        &self.ctx.reconnect
    }

    /// Phase of the tracked membership. A terminal phase (`Kicked`,
    /// `Closed`, `Left`) is reported until the next operation clears it.
    pub fn phase(&self) -> LobbyPhase {
        self.active
            .as_ref()
            .map_or(LobbyPhase::NoLobby, |m| m.handle.phase())
    }

    /// Code of the tracked lobby, if any.
    pub fn current_code(&self) -> Option<&LobbyCode> {
        self.active.as_ref().map(|m| &m.code)
    }

    /// Takes the event stream of the current membership. Each create or
    /// join produces a fresh stream.
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<LobbyEvent>> {
        self.events.take()
    }

    // -- membership --------------------------------------------------------

    /// Creates a lobby hosted by the signed-in user and enters it.
    ///
    /// Leaves the current lobby and deletes any lobby this user still
    /// hosts first. Returns `Ok(None)` if the acting identity changed while
    /// the lobby was being created.
    ///
    /// # Errors
    /// [`LobbyError::NotLoggedIn`] without a user,
    /// [`LobbyError::CodesExhausted`] if every drawn code was taken.
    pub async fn create_lobby(
        &mut self,
        mode: GameMode,
        quiz: &QuizSelector,
        session: SessionSettings,
    ) -> Result<Option<LobbyCode>, LobbyError> {
        let profile = self.ready_profile().await?;
        let me = profile.identity.clone();

        self.leave_current().await;
        self.teardown_owned(&me).await;
        if !self.still_acting_as(&me) {
            tracing::info!(identity = %me, "identity changed, create aborted");
            return Ok(None);
        }

        let settings = LobbySettings {
            mode,
            quiz: quiz.clone(),
            session,
        };
        let quiz_config = settings.quiz_config(rand::random());
        let attempts = self.ctx.config.max_code_attempts.max(1);

        for attempt in 1..=attempts {
            let code = LobbyCode::generate();
            let lobby = Lobby::new(
                code.clone(),
                &profile,
                mode,
                quiz_config.clone(),
                self.ctx.store.server_time(),
            );
            let (store, code_ref, lobby_ref) = (&self.ctx.store, &code, &lobby);
            let created = self
                .ctx
                .config
                .retry
                .run("create_lobby", move || {
                    txn::transact_lobby(store, code_ref, move |current| {
                        txn::create_if_absent(current, lobby_ref)
                    })
                })
                .await?;
            if !created {
                tracing::debug!(%code, attempt, "lobby code taken, drawing another");
                continue;
            }

            if !self.still_acting_as(&me) {
                tracing::info!(%code, identity = %me, "identity changed, discarding new lobby");
                txn::remove_player(&self.ctx.store, &self.ctx.config.retry, &code, &me, &me)
                    .await?;
                return Ok(None);
            }

            tracing::info!(%code, host = %me, %mode, quiz = %quiz.id, "lobby created");
            self.enter(code.clone(), profile);
            return Ok(Some(code));
        }

        tracing::warn!(attempts, "no free lobby code");
        Err(LobbyError::CodesExhausted(attempts))
    }

    /// Joins the lobby `raw_code` as the signed-in user.
    ///
    /// Idempotent while already in that lobby. Leaves any other lobby
    /// first. Returns `Ok(false)` if the acting identity changed mid-way.
    ///
    /// # Errors
    /// [`LobbyError::InvalidInput`] for anything but six digits (checked
    /// before touching the store), [`LobbyError::NotFound`],
    /// [`LobbyError::AlreadyStarted`] for a non-member of a started lobby.
    pub async fn join_lobby(&mut self, raw_code: &str) -> Result<bool, LobbyError> {
        let code =
            LobbyCode::parse(raw_code).map_err(|e| LobbyError::InvalidInput(e.to_string()))?;
        let profile = self.ready_profile().await?;
        let me = profile.identity.clone();

        if self
            .live_membership()
            .is_some_and(|m| m.code == code && m.identity == me)
        {
            tracing::debug!(%code, identity = %me, "already in lobby");
            return Ok(true);
        }

        self.leave_current().await;
        if !self.still_acting_as(&me) {
            tracing::info!(%code, identity = %me, "identity changed, join aborted");
            return Ok(false);
        }

        let (store, code_ref, profile_ref) = (&self.ctx.store, &code, &profile);
        let outcome = self
            .ctx
            .config
            .retry
            .run("join_lobby", move || {
                txn::transact_lobby(store, code_ref, move |current| {
                    txn::join(current, code_ref, profile_ref)
                })
            })
            .await?;

        // Render from the committed state, not from what was written.
        if txn::read_lobby(&self.ctx.store, &code).await?.is_none() {
            return Err(LobbyError::NotFound(code));
        }
        if !self.still_acting_as(&me) {
            tracing::info!(%code, identity = %me, "identity changed, join aborted");
            return Ok(false);
        }

        tracing::info!(%code, identity = %me, ?outcome, "joined lobby");
        self.enter(code, profile);
        Ok(true)
    }

    /// Removes `target` from lobby `code` on behalf of the signed-in user.
    ///
    /// Allowed for the target themself or the host. Removing the host
    /// deletes the lobby.
    pub async fn remove_player(
        &mut self,
        code: &LobbyCode,
        target: &Identity,
    ) -> Result<bool, LobbyError> {
        let tracked = self
            .live_membership()
            .filter(|m| &m.code == code)
            .map(|m| (m.identity.clone(), m.handle.clone()));
        if let Some((member, handle)) = tracked {
            if self.still_acting_as(&member) {
                let removed = handle.remove(member, target.clone()).await?;
                self.prune();
                return Ok(removed);
            }
        }

        let profile = self.ready_profile().await?;
        let removal = txn::remove_player(
            &self.ctx.store,
            &self.ctx.config.retry,
            code,
            &profile.identity,
            target,
        )
        .await?;
        Ok(removal.removed())
    }

    /// Leaves the tracked lobby. `Ok(false)` if there was nothing to
    /// leave.
    pub async fn leave(&mut self) -> Result<bool, LobbyError> {
        self.pending_settings = None;
        let Ok(handle) = self.handle() else {
            return Ok(false);
        };
        let removed = handle.leave().await?;
        self.active = None;
        Ok(removed)
    }

    /// Host only: removes another player from the tracked lobby.
    pub async fn kick(&mut self, target: &Identity) -> Result<bool, LobbyError> {
        let Some((handle, me)) = self.acting_handle("kick")? else {
            return Ok(false);
        };
        handle.remove(me, target.clone()).await
    }

    /// The lobby view was closed. Ignored once the handoff has begun;
    /// otherwise the same as [`leave`](Self::leave).
    pub async fn close_view(&mut self) -> Result<bool, LobbyError> {
        let Ok(handle) = self.handle() else {
            return Ok(false);
        };
        let left = handle.close_view().await?;
        self.prune();
        Ok(left)
    }

    // -- lobby state -------------------------------------------------------

    /// Flips the caller's ready flag.
    ///
    /// `Ok(None)` if there was nothing to flip, including when the lobby
    /// was deleted or this client removed from it.
    pub async fn toggle_ready(&mut self) -> Result<Option<bool>, LobbyError> {
        if self.membership_ended() {
            self.prune();
            tracing::debug!("membership ended, nothing to toggle");
            return Ok(None);
        }
        let Some((handle, me)) = self.acting_handle("toggle_ready")? else {
            return Ok(None);
        };
        match handle.toggle_ready(me).await {
            Err(LobbyError::Unavailable(code)) => {
                tracing::debug!(%code, "session stopped, nothing to toggle");
                self.prune();
                Ok(None)
            }
            result => result,
        }
    }

    /// Host only: replaces mode and quiz config while waiting. Supersedes
    /// any scheduled update.
    pub async fn update_settings(&mut self, settings: LobbySettings) -> Result<(), LobbyError> {
        self.pending_settings = None;
        let Some((handle, me)) = self.acting_handle("update_settings")? else {
            return Ok(());
        };
        handle.update_settings(me, settings).await
    }

    /// Debounced [`update_settings`](Self::update_settings).
    ///
    /// The write happens after the configured quiet period, unless a newer
    /// schedule replaces it. It is dropped if by then a different identity
    /// is acting or the membership has ended.
    pub fn schedule_settings(&mut self, settings: LobbySettings) -> Result<(), LobbyError> {
        let (code, identity, handle) = {
            let m = self.live_membership().ok_or(LobbyError::NoLobby)?;
            (m.code.clone(), m.identity.clone(), m.handle.clone())
        };
        let provider = Arc::clone(&self.identity);

        self.pending_settings = Some(DelayedTask::spawn(
            self.ctx.config.settings_debounce,
            async move {
                let acting = provider.current().map(|p| p.identity);
                if acting.as_ref() != Some(&identity) || handle.phase().is_terminal() {
                    tracing::debug!(%code, "context changed, scheduled settings dropped");
                    return;
                }
                if let Err(e) = handle.update_settings(identity, settings).await {
                    tracing::warn!(%code, error = %e, "scheduled settings update failed");
                }
            },
        ));
        Ok(())
    }

    /// Host only: starts the game once everyone is ready.
    pub async fn start_game(&mut self) -> Result<(), LobbyError> {
        let Some((handle, me)) = self.acting_handle("start_game")? else {
            return Ok(());
        };
        handle.start(me).await
    }

    /// Last lobby document seen by the session.
    pub async fn snapshot(&mut self) -> Result<Option<Lobby>, LobbyError> {
        self.handle()?.snapshot().await
    }

    // -- chat --------------------------------------------------------------

    /// Posts a chat message. Text is trimmed and capped.
    ///
    /// # Errors
    /// [`LobbyError::InvalidInput`] for empty text.
    pub async fn send_chat(&mut self, text: &str) -> Result<(), LobbyError> {
        let text = prepare_chat_text(text, self.ctx.config.chat_max_len)?;
        let Some((handle, me)) = self.acting_handle("send_chat")? else {
            return Ok(());
        };
        handle.send_chat(me, text).await
    }

    pub async fn set_typing(&mut self, typing: bool) -> Result<(), LobbyError> {
        let Some((handle, me)) = self.acting_handle("set_typing")? else {
            return Ok(());
        };
        handle.set_typing(me, typing).await
    }

    // -- reconnection ------------------------------------------------------

    /// Moves an invite from `locator` into the pending slot.
    pub fn capture_invite(&self, locator: &impl InviteLocator) -> Option<LobbyCode> {
        self.ctx.reconnect.capture_invite(locator)
    }

    /// Startup path: rejoins the remembered lobby, then the pending
    /// invite. Each is tried once; a failed reconnection clears the slot.
    pub async fn resume(&mut self) -> Result<Option<LobbyCode>, LobbyError> {
        self.ready_profile().await?;

        for target in self.ctx.reconnect.startup_targets() {
            let code = target.code;
            match self.join_lobby(code.as_str()).await {
                Ok(true) => {
                    tracing::info!(%code, source = ?target.source, "resumed lobby");
                    return Ok(Some(code));
                }
                Ok(false) => return Ok(None),
                Err(e) => {
                    tracing::warn!(%code, source = ?target.source, error = %e, "resume failed");
                    if target.source == ResumeSource::Reconnect {
                        self.ctx.reconnect.forget();
                    }
                }
            }
        }
        Ok(None)
    }

    // -- helpers -----------------------------------------------------------

    /// The acting user once the provider has settled.
    async fn ready_profile(&self) -> Result<Profile, LobbyError> {
        self.identity.wait_until_ready().await;
        self.identity.current().ok_or(LobbyError::NotLoggedIn)
    }

    fn still_acting_as(&self, identity: &Identity) -> bool {
        self.identity
            .current()
            .is_some_and(|p| &p.identity == identity)
    }

    fn membership_ended(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|m| m.handle.phase().is_terminal() || m.handle.is_closed())
    }

    /// Forgets a membership whose session has ended.
    fn prune(&mut self) {
        if self.membership_ended() {
            if let Some(m) = self.active.take() {
                tracing::debug!(code = %m.code, phase = %m.handle.phase(), "membership ended");
            }
            self.pending_settings = None;
        }
    }

    fn live_membership(&mut self) -> Option<&Membership> {
        self.prune();
        self.active.as_ref()
    }

    fn handle(&mut self) -> Result<LobbyHandle, LobbyError> {
        self.live_membership()
            .map(|m| m.handle.clone())
            .ok_or(LobbyError::NoLobby)
    }

    /// Handle of the tracked membership plus the identity it belongs to,
    /// or `Ok(None)` if a different identity (or nobody) is acting now.
    fn acting_handle(
        &mut self,
        op: &'static str,
    ) -> Result<Option<(LobbyHandle, Identity)>, LobbyError> {
        let (code, member, handle) = {
            let m = self.live_membership().ok_or(LobbyError::NoLobby)?;
            (m.code.clone(), m.identity.clone(), m.handle.clone())
        };
        if !self.still_acting_as(&member) {
            tracing::info!(%code, identity = %member, op, "identity changed, operation ignored");
            return Ok(None);
        }
        Ok(Some((handle, member)))
    }

    fn enter(&mut self, code: LobbyCode, profile: Profile) {
        if let Err(e) = self.ctx.reconnect.remember(&code) {
            tracing::warn!(%code, error = %e, "could not remember lobby for reconnection");
        }
        let identity = profile.identity.clone();
        let (handle, events) = session::spawn(self.ctx.clone(), code.clone(), profile);
        self.active = Some(Membership {
            code,
            identity,
            handle,
        });
        self.events = Some(events);
        self.pending_settings = None;
    }

    /// Best-effort leave of the tracked lobby before entering another.
    async fn leave_current(&mut self) {
        self.pending_settings = None;
        let Some(m) = self.active.take() else {
            return;
        };
        if m.handle.phase().is_terminal() || m.handle.is_closed() {
            return;
        }
        if let Err(e) = m.handle.leave().await {
            tracing::warn!(code = %m.code, error = %e, "leaving previous lobby failed");
        }
    }

    /// Best-effort delete of lobbies `host` still owns.
    async fn teardown_owned(&self, host: &Identity) {
        let docs = match self.ctx.store.query(paths::LOBBIES).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(error = %e, "could not list lobbies for cleanup");
                return;
            }
        };
        for doc in docs {
            let Ok(lobby) = JsonCodec.decode::<Lobby>(&doc.data) else {
                continue;
            };
            if !lobby.is_host(host) {
                continue;
            }
            match txn::remove_player(&self.ctx.store, &self.ctx.config.retry, &lobby.code, host, host)
                .await
            {
                Ok(_) => tracing::info!(code = %lobby.code, "removed stale hosted lobby"),
                Err(e) => tracing::warn!(code = %lobby.code, error = %e, "stale lobby cleanup failed"),
            }
        }
    }
}
