//! Lobby session actor: one Tokio task per lobby membership.
//!
//! The actor owns everything tied to being *in* a lobby: the change-feed
//! subscription, the presence heartbeat, the start countdown, the typing
//! marker and the handoff guard. All operations on the lobby go through its
//! command channel, so at most one of them runs at a time for this client
//! and the `starting`/`transitioning` guards need no locks.
//!
//! ```text
//! LobbyController ──LobbyHandle──► LobbySession task ──LobbyEvent──► UI
//!                                   ▲        │
//!                        change feed│        │transactions, heartbeats
//!                                   └─ store ◄┘
//! ```

use std::sync::Arc;

use lobbysync_protocol::{
    ChatMessage, Codec, Identity, JsonCodec, Lobby, LobbyCode, LobbySettings, PresenceRecord,
    Profile, TypingRecord,
};
use lobbysync_session::ReconnectManager;
use lobbysync_store::{Change, ChangeEvent, DocumentStore, Watch};
use lobbysync_tick::{Countdown, CountdownStep, DelayedTask, Throttle, TickConfig, TickScheduler};
use tokio::sync::{mpsc, oneshot, watch};

use crate::chat::{ChatFeed, TypingBoard};
use crate::handoff::{Handoff, QuizSink, SessionParams};
use crate::paths::{self, DocKind};
use crate::presence::{Liveness, PresenceBoard};
use crate::txn::{self, StartOutcome};
use crate::{LobbyConfig, LobbyError, LobbyPhase};

const COMMAND_BUFFER: usize = 32;

/// What the session tells the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyEvent {
    /// The authoritative lobby document changed.
    Updated(Lobby),
    /// Liveness of the players, in lobby order.
    PresenceChanged(Vec<(Identity, Liveness)>),
    /// A new chat message. `notify` is set for messages from others that
    /// arrived after the history loaded.
    Chat { message: ChatMessage, notify: bool },
    /// The recent history, oldest first.
    ChatHistory(Vec<ChatMessage>),
    /// Names of the other players currently typing.
    Typing(Vec<String>),
    /// Seconds left before the handoff.
    Countdown(u32),
    /// The session began with these parameters.
    HandedOff(SessionParams),
    /// The host removed this client.
    Kicked,
    /// The lobby was deleted.
    Closed,
    /// This client left.
    Left,
}

/// Shared dependencies of every session task.
pub(crate) struct SessionContext<S> {
    pub store: S,
    pub reconnect: ReconnectManager,
    pub sink: Arc<dyn QuizSink>,
    pub config: Arc<LobbyConfig>,
}

impl<S: Clone> Clone for SessionContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            reconnect: self.reconnect.clone(),
            sink: Arc::clone(&self.sink),
            config: Arc::clone(&self.config),
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, LobbyError>>;

/// Commands sent to a session actor.
///
/// `actor` is the identity acting when the command was issued. Commands
/// whose actor isn't the membership's identity are dropped as no-ops.
pub(crate) enum SessionCommand {
    ToggleReady { actor: Identity, reply: Reply<Option<bool>> },
    UpdateSettings { actor: Identity, settings: LobbySettings, reply: Reply<()> },
    Start { actor: Identity, reply: Reply<()> },
    /// Kick another player, or leave if the target is self.
    Remove { actor: Identity, target: Identity, reply: Reply<bool> },
    Leave { reply: Reply<bool> },
    /// The lobby view was closed; ignored once the handoff began.
    CloseView { reply: Reply<bool> },
    SendChat { actor: Identity, text: String, reply: Reply<()> },
    SetTyping { actor: Identity, typing: bool },
    Snapshot { reply: oneshot::Sender<Option<Lobby>> },
}

// ---------------------------------------------------------------------------
// LobbyHandle
// ---------------------------------------------------------------------------

/// Handle to a running session actor.
///
/// Cheap to clone. Every method fails with [`LobbyError::Unavailable`] once
/// the actor has stopped (after leaving, being kicked, or the lobby
/// closing). Methods that change the lobby take the identity acting right
/// now; if it is not [`identity`](Self::identity) the actor ignores the
/// call and returns the no-op result.
#[derive(Clone)]
pub struct LobbyHandle {
    code: LobbyCode,
    identity: Identity,
    sender: mpsc::Sender<SessionCommand>,
    phase: watch::Receiver<LobbyPhase>,
}

impl LobbyHandle {
    pub fn code(&self) -> &LobbyCode {
        &self.code
    }

    /// The identity this membership acts as.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn phase(&self) -> LobbyPhase {
        *self.phase.borrow()
    }

    /// `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| LobbyError::Unavailable(self.code.clone()))?;
        reply_rx
            .await
            .map_err(|_| LobbyError::Unavailable(self.code.clone()))
    }

    /// Flips this client's ready flag. Returns the new value, or `None` if
    /// there was nothing to flip.
    pub async fn toggle_ready(&self, actor: Identity) -> Result<Option<bool>, LobbyError> {
        self.request(|reply| SessionCommand::ToggleReady { actor, reply })
            .await?
    }

    pub async fn update_settings(
        &self,
        actor: Identity,
        settings: LobbySettings,
    ) -> Result<(), LobbyError> {
        self.request(|reply| SessionCommand::UpdateSettings { actor, settings, reply })
            .await?
    }

    pub async fn start(&self, actor: Identity) -> Result<(), LobbyError> {
        self.request(|reply| SessionCommand::Start { actor, reply }).await?
    }

    pub async fn remove(&self, actor: Identity, target: Identity) -> Result<bool, LobbyError> {
        self.request(|reply| SessionCommand::Remove { actor, target, reply })
            .await?
    }

    pub async fn leave(&self) -> Result<bool, LobbyError> {
        self.request(|reply| SessionCommand::Leave { reply }).await?
    }

    pub async fn close_view(&self) -> Result<bool, LobbyError> {
        self.request(|reply| SessionCommand::CloseView { reply }).await?
    }

    /// Sends already-validated chat text.
    pub async fn send_chat(&self, actor: Identity, text: String) -> Result<(), LobbyError> {
        self.request(|reply| SessionCommand::SendChat { actor, text, reply })
            .await?
    }

    pub async fn set_typing(&self, actor: Identity, typing: bool) -> Result<(), LobbyError> {
        self.sender
            .send(SessionCommand::SetTyping { actor, typing })
            .await
            .map_err(|_| LobbyError::Unavailable(self.code.clone()))
    }

    /// The last lobby document the actor saw.
    pub async fn snapshot(&self) -> Result<Option<Lobby>, LobbyError> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Left,
    Kicked,
    Closed,
    /// The handle was dropped or the feed ended; nothing is cleaned up.
    Detached,
}

/// Spawns the actor for `profile`'s membership in `code`.
///
/// The change feed is subscribed before the task starts, so nothing
/// committed after the caller's join is missed.
pub(crate) fn spawn<S>(
    ctx: SessionContext<S>,
    code: LobbyCode,
    profile: Profile,
) -> (LobbyHandle, mpsc::UnboundedReceiver<LobbyEvent>)
where
    S: DocumentStore + Clone,
{
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (phase_tx, phase_rx) = watch::channel(LobbyPhase::NoLobby);

    let feed = ctx.store.watch(&paths::lobby(&code));
    let heartbeat = TickScheduler::new(TickConfig {
        initial_jitter: ctx.config.heartbeat_jitter,
        ..TickConfig::every(ctx.config.heartbeat_interval)
    });

    let handle = LobbyHandle {
        code: code.clone(),
        identity: profile.identity.clone(),
        sender: cmd_tx,
        phase: phase_rx,
    };

    let session = LobbySession {
        chat: ChatFeed::new(ctx.config.chat_history),
        typing_throttle: Throttle::new(ctx.config.typing_throttle),
        ctx,
        code,
        profile,
        lobby: None,
        phase: phase_tx,
        commands: cmd_rx,
        feed,
        events: event_tx,
        heartbeat,
        countdown: None,
        presence: PresenceBoard::new(),
        presence_shown: Vec::new(),
        typing: TypingBoard::new(),
        typing_shown: Vec::new(),
        typing_idle: None,
        starting: false,
        handoff: Handoff::default(),
        exit: None,
    };
    tokio::spawn(session.run());

    (handle, event_rx)
}

struct LobbySession<S> {
    ctx: SessionContext<S>,
    code: LobbyCode,
    profile: Profile,
    /// Last authoritative document.
    lobby: Option<Lobby>,
    phase: watch::Sender<LobbyPhase>,
    commands: mpsc::Receiver<SessionCommand>,
    feed: Watch,
    events: mpsc::UnboundedSender<LobbyEvent>,
    heartbeat: TickScheduler,
    countdown: Option<Countdown>,
    presence: PresenceBoard,
    presence_shown: Vec<(Identity, Liveness)>,
    chat: ChatFeed,
    typing: TypingBoard,
    typing_shown: Vec<String>,
    typing_throttle: Throttle,
    typing_idle: Option<DelayedTask>,
    /// A start has been submitted successfully.
    starting: bool,
    handoff: Handoff,
    exit: Option<Exit>,
}

/// Next countdown step, or pending forever without a countdown.
async fn next_step(countdown: &mut Option<Countdown>) -> CountdownStep {
    match countdown {
        Some(c) => c.wait_for_step().await,
        None => std::future::pending().await,
    }
}

impl<S> LobbySession<S>
where
    S: DocumentStore + Clone,
{
    async fn run(mut self) {
        tracing::info!(
            code = %self.code,
            identity = %self.profile.identity,
            "lobby session started"
        );
        self.enter().await;

        let exit = loop {
            if let Some(exit) = self.exit {
                break exit;
            }
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => self.exit = Some(Exit::Detached),
                },
                change = self.feed.next() => match change {
                    Some(change) => self.handle_change(change).await,
                    None => {
                        tracing::warn!(code = %self.code, "change feed ended");
                        self.exit = Some(Exit::Detached);
                    }
                },
                _ = self.heartbeat.wait_for_tick() => self.beat().await,
                step = next_step(&mut self.countdown) => self.handle_step(step),
            }
        };

        tracing::info!(code = %self.code, ?exit, "lobby session stopped");
    }

    /// Initial read: lobby document, first heartbeat, then the
    /// subcollections.
    async fn enter(&mut self) {
        match txn::read_lobby(&self.ctx.store, &self.code).await {
            Ok(Some(lobby)) => self.on_lobby(lobby).await,
            Ok(None) => self.depart(Exit::Closed).await,
            Err(e) => tracing::warn!(code = %self.code, error = %e, "initial lobby read failed"),
        }
        if self.exit.is_some() {
            return;
        }
        self.beat().await;
        self.load_subcollections().await;
    }

    // -- commands ----------------------------------------------------------

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::ToggleReady { actor, reply } => {
                let result = if self.acting_as(&actor, "toggle_ready") {
                    self.toggle_ready().await
                } else {
                    Ok(None)
                };
                let _ = reply.send(result);
            }
            SessionCommand::UpdateSettings { actor, settings, reply } => {
                let result = if self.acting_as(&actor, "update_settings") {
                    self.update_settings(&settings).await
                } else {
                    Ok(())
                };
                let _ = reply.send(result);
            }
            SessionCommand::Start { actor, reply } => {
                let result = if self.acting_as(&actor, "start_game") {
                    self.start().await
                } else {
                    Ok(())
                };
                let _ = reply.send(result);
            }
            SessionCommand::Remove { actor, target, reply } => {
                let result = if !self.acting_as(&actor, "remove_player") {
                    Ok(false)
                } else if target == self.profile.identity {
                    self.leave().await
                } else {
                    self.kick(&target).await
                };
                let _ = reply.send(result);
            }
            SessionCommand::Leave { reply } => {
                let _ = reply.send(self.leave().await);
            }
            SessionCommand::CloseView { reply } => {
                let result = if self.handoff.is_transitioning() {
                    tracing::debug!(code = %self.code, "view closed during handoff, staying");
                    Ok(false)
                } else {
                    self.leave().await
                };
                let _ = reply.send(result);
            }
            SessionCommand::SendChat { actor, text, reply } => {
                let result = if self.acting_as(&actor, "send_chat") {
                    self.send_chat(text).await
                } else {
                    Ok(())
                };
                let _ = reply.send(result);
            }
            SessionCommand::SetTyping { actor, typing } => {
                if self.acting_as(&actor, "set_typing") {
                    self.set_typing(typing).await;
                }
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.lobby.clone());
            }
        }
    }

    async fn toggle_ready(&mut self) -> Result<Option<bool>, LobbyError> {
        let (store, code, me) = (&self.ctx.store, &self.code, &self.profile.identity);
        let ready = self
            .ctx
            .config
            .retry
            .run("toggle_ready", move || {
                txn::transact_lobby(store, code, move |current| txn::toggle_ready(current, code, me))
            })
            .await?;
        tracing::debug!(%code, identity = %me, ?ready, "ready toggled");
        Ok(ready)
    }

    async fn update_settings(&mut self, settings: &LobbySettings) -> Result<(), LobbyError> {
        let (store, code, me) = (&self.ctx.store, &self.code, &self.profile.identity);
        let seed: u64 = rand::random();
        self.ctx
            .config
            .retry
            .run("update_settings", move || {
                txn::transact_lobby(store, code, move |current| {
                    txn::update_settings(current, code, me, settings, seed)
                })
            })
            .await?;
        tracing::info!(%code, mode = %settings.mode, quiz = %settings.quiz.id, "settings updated");
        Ok(())
    }

    async fn start(&mut self) -> Result<(), LobbyError> {
        if self.starting {
            tracing::debug!(code = %self.code, "start already submitted");
            return Ok(());
        }
        self.starting = true;
        let (store, code, me) = (&self.ctx.store, &self.code, &self.profile.identity);
        let result = self
            .ctx
            .config
            .retry
            .run("start_game", move || {
                txn::transact_lobby(store, code, move |current| txn::start(current, code, me))
            })
            .await;
        match result {
            Ok(StartOutcome::Started) => {
                tracing::info!(%code, "game started");
                Ok(())
            }
            Ok(StartOutcome::AlreadyRunning) => {
                tracing::debug!(%code, "game already running");
                Ok(())
            }
            Err(e) => {
                self.starting = false;
                Err(e)
            }
        }
    }

    async fn kick(&mut self, target: &Identity) -> Result<bool, LobbyError> {
        let removal = txn::remove_player(
            &self.ctx.store,
            &self.ctx.config.retry,
            &self.code,
            &self.profile.identity,
            target,
        )
        .await?;
        Ok(removal.removed())
    }

    async fn leave(&mut self) -> Result<bool, LobbyError> {
        let me = self.profile.identity.clone();
        let removal =
            txn::remove_player(&self.ctx.store, &self.ctx.config.retry, &self.code, &me, &me)
                .await?;
        self.depart(Exit::Left).await;
        Ok(removal.removed())
    }

    async fn send_chat(&mut self, text: String) -> Result<(), LobbyError> {
        let message = ChatMessage {
            identity: self.profile.identity.clone(),
            name: self.profile.display_name.clone(),
            avatar: self.profile.avatar.clone(),
            text,
            timestamp: self.ctx.store.server_time(),
        };
        let bytes = &JsonCodec.encode(&message)?;
        let collection = &paths::messages(&self.code);
        let store = &self.ctx.store;
        self.ctx
            .config
            .retry
            .run("send_chat", move || async move {
                store
                    .add(collection, bytes.clone())
                    .await
                    .map_err(LobbyError::from)
            })
            .await?;
        self.set_typing(false).await;
        Ok(())
    }

    async fn set_typing(&mut self, typing: bool) {
        let key = paths::typing(&self.code, &self.profile.identity);
        if !typing {
            self.typing_idle = None;
            self.typing_throttle.reset();
            self.delete_quietly(&key).await;
            return;
        }

        if self.typing_throttle.try_acquire() {
            let record = TypingRecord {
                name: self.profile.display_name.clone(),
                is_typing: true,
                timestamp: self.ctx.store.server_time(),
            };
            self.write_quietly(&key, &record).await;
        }

        // Replacing the task cancels the previous expiry.
        let store = self.ctx.store.clone();
        self.typing_idle = Some(DelayedTask::spawn(self.ctx.config.typing_idle, async move {
            if let Err(e) = store.delete(&key).await {
                tracing::debug!(error = %e, "typing expiry failed");
            }
        }));
    }

    // -- change feed -------------------------------------------------------

    async fn handle_change(&mut self, event: ChangeEvent) {
        let ChangeEvent { key, change } = event;
        match (paths::classify(&self.code, &key), change) {
            (_, Change::Resync) => self.resync().await,
            (DocKind::Lobby, Change::Put(bytes)) => match JsonCodec.decode::<Lobby>(&bytes) {
                Ok(lobby) => self.on_lobby(lobby).await,
                Err(e) => tracing::warn!(code = %self.code, error = %e, "ignoring malformed lobby"),
            },
            (DocKind::Lobby, Change::Deleted) => self.depart(Exit::Closed).await,
            (DocKind::Presence(id), Change::Put(bytes)) => {
                match JsonCodec.decode::<PresenceRecord>(&bytes) {
                    Ok(record) => self.presence.upsert(id, record),
                    Err(e) => tracing::debug!(%key, error = %e, "ignoring malformed presence"),
                }
                self.emit_presence(false);
            }
            (DocKind::Presence(id), Change::Deleted) => {
                self.presence.remove(&id);
                self.emit_presence(false);
            }
            (DocKind::Typing(id), Change::Put(bytes)) => {
                match JsonCodec.decode::<TypingRecord>(&bytes) {
                    Ok(record) => self.typing.upsert(id, record),
                    Err(e) => tracing::debug!(%key, error = %e, "ignoring malformed typing marker"),
                }
                self.emit_typing(false);
            }
            (DocKind::Typing(id), Change::Deleted) => {
                self.typing.remove(&id);
                self.emit_typing(false);
            }
            (DocKind::Message, Change::Put(bytes)) => match JsonCodec.decode::<ChatMessage>(&bytes) {
                Ok(message) => {
                    if let Some((message, notify)) =
                        self.chat.apply(key, message, &self.profile.identity)
                    {
                        self.emit(LobbyEvent::Chat { message, notify });
                    }
                }
                Err(e) => tracing::debug!(error = %e, "ignoring malformed chat message"),
            },
            (DocKind::Message, Change::Deleted) | (DocKind::Other, _) => {}
        }
    }

    async fn on_lobby(&mut self, lobby: Lobby) {
        let member = lobby.is_member(&self.profile.identity);
        let waiting = lobby.is_waiting();
        self.lobby = Some(lobby.clone());
        if !member {
            self.depart(Exit::Kicked).await;
            return;
        }

        self.emit(LobbyEvent::Updated(lobby));
        if waiting {
            self.set_phase(LobbyPhase::Waiting);
        } else {
            self.begin_countdown();
        }
        self.emit_presence(false);
    }

    /// The feed lagged: re-read everything.
    async fn resync(&mut self) {
        tracing::debug!(code = %self.code, "resyncing after feed lag");
        match txn::read_lobby(&self.ctx.store, &self.code).await {
            Ok(Some(lobby)) => self.on_lobby(lobby).await,
            Ok(None) => self.depart(Exit::Closed).await,
            Err(e) => tracing::warn!(code = %self.code, error = %e, "resync read failed"),
        }
        if self.exit.is_none() {
            self.load_subcollections().await;
        }
    }

    async fn load_subcollections(&mut self) {
        let store = &self.ctx.store;

        match store.query(&paths::presence_collection(&self.code)).await {
            Ok(docs) => {
                self.presence.clear();
                for doc in docs {
                    if let Ok(record) = JsonCodec.decode::<PresenceRecord>(&doc.data) {
                        self.presence.upsert(Identity::new(doc.id()), record);
                    }
                }
            }
            Err(e) => tracing::warn!(code = %self.code, error = %e, "presence load failed"),
        }

        match store.query(&paths::typing_collection(&self.code)).await {
            Ok(docs) => {
                self.typing.clear();
                for doc in docs {
                    if let Ok(record) = JsonCodec.decode::<TypingRecord>(&doc.data) {
                        self.typing.upsert(Identity::new(doc.id()), record);
                    }
                }
            }
            Err(e) => tracing::warn!(code = %self.code, error = %e, "typing load failed"),
        }

        match store.query(&paths::messages(&self.code)).await {
            Ok(docs) => {
                let messages = docs
                    .into_iter()
                    .filter_map(|doc| {
                        let message = JsonCodec.decode::<ChatMessage>(&doc.data).ok()?;
                        Some((doc.key, message))
                    })
                    .collect();
                let history = self.chat.load(messages);
                self.emit(LobbyEvent::ChatHistory(history));
            }
            Err(e) => tracing::warn!(code = %self.code, error = %e, "chat load failed"),
        }

        self.emit_presence(true);
        self.emit_typing(true);
    }

    // -- timers ------------------------------------------------------------

    async fn beat(&mut self) {
        let record = PresenceRecord {
            last_seen: self.ctx.store.server_time(),
            is_online: true,
            name: self.profile.display_name.clone(),
        };
        let key = paths::presence(&self.code, &self.profile.identity);
        self.write_quietly(&key, &record).await;
        tracing::trace!(code = %self.code, "heartbeat");
        // Ages moved on; re-derive what observers see.
        self.emit_presence(false);
        self.emit_typing(false);
    }

    fn begin_countdown(&mut self) {
        self.set_phase(LobbyPhase::Started);
        if !self.handoff.begin() {
            return;
        }
        let ticks = self.ctx.config.countdown_ticks;
        tracing::info!(code = %self.code, ticks, "countdown started");
        self.countdown = Some(Countdown::new(ticks, self.ctx.config.countdown_interval));
        self.emit(LobbyEvent::Countdown(ticks));
    }

    fn handle_step(&mut self, step: CountdownStep) {
        match step {
            CountdownStep::Remaining(n) => self.emit(LobbyEvent::Countdown(n)),
            CountdownStep::Finished => {
                self.countdown = None;
                let Some(lobby) = &self.lobby else {
                    return;
                };
                let params = SessionParams::from_lobby(lobby);
                if self.handoff.complete(self.ctx.sink.as_ref(), params.clone()) {
                    tracing::info!(
                        code = %self.code,
                        seed = params.seed,
                        amount = params.amount,
                        "handed off to quiz session"
                    );
                    self.emit(LobbyEvent::HandedOff(params));
                }
            }
        }
    }

    // -- exit --------------------------------------------------------------

    /// Ends the membership: stops timers, removes this client's markers
    /// and clears the reconnection slot.
    async fn depart(&mut self, exit: Exit) {
        if self.exit.is_some() {
            return;
        }
        self.countdown = None;
        self.typing_idle = None;
        self.heartbeat.pause();

        let (phase, event) = match exit {
            Exit::Left => (LobbyPhase::Left, LobbyEvent::Left),
            Exit::Kicked => (LobbyPhase::Kicked, LobbyEvent::Kicked),
            Exit::Closed => (LobbyPhase::Closed, LobbyEvent::Closed),
            Exit::Detached => {
                self.exit = Some(exit);
                return;
            }
        };

        let me = &self.profile.identity;
        self.delete_quietly(&paths::presence(&self.code, me)).await;
        self.delete_quietly(&paths::typing(&self.code, me)).await;
        self.ctx.reconnect.forget();

        match exit {
            Exit::Kicked => tracing::info!(code = %self.code, "kicked from lobby"),
            Exit::Closed => tracing::info!(code = %self.code, "lobby closed"),
            _ => tracing::debug!(code = %self.code, "left lobby"),
        }
        self.phase.send_replace(phase);
        self.emit(event);
        self.exit = Some(exit);
    }

    // -- helpers -----------------------------------------------------------

    /// `true` if `actor` is the identity this membership belongs to.
    fn acting_as(&self, actor: &Identity, op: &'static str) -> bool {
        if *actor == self.profile.identity {
            return true;
        }
        tracing::info!(
            code = %self.code,
            member = %self.profile.identity,
            %actor,
            op,
            "command from another identity ignored"
        );
        false
    }

    fn set_phase(&self, next: LobbyPhase) {
        self.phase.send_if_modified(|current| {
            if *current == next || !current.can_transition_to(next) {
                return false;
            }
            tracing::debug!(code = %self.code, from = %current, to = %next, "phase changed");
            *current = next;
            true
        });
    }

    fn emit(&self, event: LobbyEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    fn emit_presence(&mut self, force: bool) {
        let Some(lobby) = &self.lobby else {
            return;
        };
        let liveness = self.presence.liveness(
            lobby,
            self.ctx.store.server_time(),
            &self.profile.identity,
            self.ctx.config.presence_stale_after,
        );
        if force || liveness != self.presence_shown {
            self.presence_shown = liveness.clone();
            self.emit(LobbyEvent::PresenceChanged(liveness));
        }
    }

    fn emit_typing(&mut self, force: bool) {
        let active = self.typing.active(
            self.ctx.store.server_time(),
            &self.profile.identity,
            self.ctx.config.typing_stale_after,
        );
        if force || active != self.typing_shown {
            self.typing_shown = active.clone();
            self.emit(LobbyEvent::Typing(active));
        }
    }

    async fn write_quietly<T: serde::Serialize>(&self, key: &str, value: &T) {
        let bytes = match JsonCodec.encode(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key, error = %e, "encode failed");
                return;
            }
        };
        if let Err(e) = self.ctx.store.set(key, bytes).await {
            tracing::warn!(key, error = %e, "write failed, will retry on next change");
        }
    }

    async fn delete_quietly(&self, key: &str) {
        if let Err(e) = self.ctx.store.delete(key).await {
            tracing::warn!(key, error = %e, "best-effort delete failed");
        }
    }
}
