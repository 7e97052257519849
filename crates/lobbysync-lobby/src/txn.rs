//! Lobby transactions.
//!
//! Every mutation of a lobby document is a pure function from the current
//! document (`None` if absent) to a [`Mutation`] plus an outcome. The store
//! may run that function several times if another writer races it, so the
//! bodies never perform side effects; authorization is decided inside them
//! against the same snapshot that is written back.
//!
//! The async wrappers at the bottom combine a body with decoding, the
//! retry policy and best-effort subcollection teardown.

use lobbysync_protocol::{
    Codec, Identity, JsonCodec, Lobby, LobbyCode, LobbySettings, LobbyStatus, Player, Profile,
};
use lobbysync_store::{DocumentStore, TxWrite};

use crate::{paths, LobbyError, RetryPolicy};

/// What a transaction body wants written.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Mutation {
    Keep,
    Put(Lobby),
    Delete,
}

/// Result of a join transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JoinOutcome {
    Joined,
    /// Already listed; nothing written.
    Rejoined,
}

/// Result of a remove transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Removal {
    /// The lobby no longer exists.
    Absent,
    /// The target wasn't listed.
    NotMember,
    /// The target was filtered out; the lobby lives on.
    Removed,
    /// The lobby document was deleted (host removed or list emptied).
    Deleted,
}

impl Removal {
    pub(crate) fn removed(self) -> bool {
        matches!(self, Self::Removed | Self::Deleted)
    }
}

/// Result of a start transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartOutcome {
    Started,
    AlreadyRunning,
}

// ---------------------------------------------------------------------------
// Bodies
// ---------------------------------------------------------------------------

pub(crate) fn create_if_absent(
    current: Option<Lobby>,
    lobby: &Lobby,
) -> Result<(Mutation, bool), LobbyError> {
    Ok(match current {
        Some(_) => (Mutation::Keep, false),
        None => (Mutation::Put(lobby.clone()), true),
    })
}

pub(crate) fn join(
    current: Option<Lobby>,
    code: &LobbyCode,
    profile: &Profile,
) -> Result<(Mutation, JoinOutcome), LobbyError> {
    let mut lobby = current.ok_or_else(|| LobbyError::NotFound(code.clone()))?;
    if lobby.is_member(&profile.identity) {
        return Ok((Mutation::Keep, JoinOutcome::Rejoined));
    }
    if !lobby.is_waiting() {
        return Err(LobbyError::AlreadyStarted(code.clone()));
    }
    lobby.players.push(Player::from_profile(profile, false));
    Ok((Mutation::Put(lobby), JoinOutcome::Joined))
}

pub(crate) fn remove(
    current: Option<Lobby>,
    caller: &Identity,
    target: &Identity,
) -> Result<(Mutation, Removal), LobbyError> {
    let Some(mut lobby) = current else {
        return Ok((Mutation::Keep, Removal::Absent));
    };
    if caller != target && !lobby.is_host(caller) {
        return Err(LobbyError::Unauthorized(format!(
            "{caller} cannot remove {target}"
        )));
    }
    if lobby.is_host(target) {
        return Ok((Mutation::Delete, Removal::Deleted));
    }
    if !lobby.is_member(target) {
        return Ok((Mutation::Keep, Removal::NotMember));
    }
    lobby.players.retain(|p| &p.identity != target);
    if lobby.players.is_empty() {
        Ok((Mutation::Delete, Removal::Deleted))
    } else {
        Ok((Mutation::Put(lobby), Removal::Removed))
    }
}

/// Flips the caller's ready flag. Returns the new value, or `None` when
/// there was nothing to flip (lobby gone, caller not listed).
pub(crate) fn toggle_ready(
    current: Option<Lobby>,
    code: &LobbyCode,
    caller: &Identity,
) -> Result<(Mutation, Option<bool>), LobbyError> {
    let Some(mut lobby) = current else {
        return Ok((Mutation::Keep, None));
    };
    if !lobby.is_waiting() {
        return Err(LobbyError::AlreadyStarted(code.clone()));
    }
    if lobby.is_host(caller) {
        return Ok((Mutation::Keep, Some(true)));
    }
    let Some(player) = lobby.players.iter_mut().find(|p| &p.identity == caller) else {
        return Ok((Mutation::Keep, None));
    };
    player.ready = !player.ready;
    let ready = player.ready;
    Ok((Mutation::Put(lobby), Some(ready)))
}

pub(crate) fn update_settings(
    current: Option<Lobby>,
    code: &LobbyCode,
    caller: &Identity,
    settings: &LobbySettings,
    seed: u64,
) -> Result<(Mutation, ()), LobbyError> {
    let mut lobby = current.ok_or_else(|| LobbyError::NotFound(code.clone()))?;
    if !lobby.is_host(caller) {
        return Err(LobbyError::Unauthorized("only the host can change settings".into()));
    }
    if !lobby.is_waiting() {
        return Err(LobbyError::AlreadyStarted(code.clone()));
    }
    lobby.mode = settings.mode;
    lobby.quiz_config = settings.quiz_config(seed);
    Ok((Mutation::Put(lobby), ()))
}

pub(crate) fn start(
    current: Option<Lobby>,
    code: &LobbyCode,
    caller: &Identity,
) -> Result<(Mutation, StartOutcome), LobbyError> {
    let mut lobby = current.ok_or_else(|| LobbyError::NotFound(code.clone()))?;
    if !lobby.is_host(caller) {
        return Err(LobbyError::Unauthorized("only the host can start".into()));
    }
    if !lobby.is_waiting() {
        return Ok((Mutation::Keep, StartOutcome::AlreadyRunning));
    }
    if !lobby.all_ready() {
        return Err(LobbyError::PlayersNotReady {
            ready: lobby.ready_count(),
            total: lobby.players.len(),
        });
    }
    lobby.status = LobbyStatus::Started;
    Ok((Mutation::Put(lobby), StartOutcome::Started))
}

// ---------------------------------------------------------------------------
// Store plumbing
// ---------------------------------------------------------------------------

/// Runs `body` as a transaction on the lobby document for `code`.
pub(crate) async fn transact_lobby<S, R, F>(
    store: &S,
    code: &LobbyCode,
    mut body: F,
) -> Result<R, LobbyError>
where
    S: DocumentStore,
    F: FnMut(Option<Lobby>) -> Result<(Mutation, R), LobbyError> + Send,
    R: Send,
{
    store
        .transact(&paths::lobby(code), |bytes| {
            let current = bytes.map(|b| JsonCodec.decode::<Lobby>(b)).transpose()?;
            let (mutation, out) = body(current)?;
            let write = match mutation {
                Mutation::Keep => TxWrite::Keep,
                Mutation::Put(lobby) => TxWrite::Put(JsonCodec.encode(&lobby)?),
                Mutation::Delete => TxWrite::Delete,
            };
            Ok((write, out))
        })
        .await
}

/// Reads the lobby document, if any.
pub(crate) async fn read_lobby<S: DocumentStore>(
    store: &S,
    code: &LobbyCode,
) -> Result<Option<Lobby>, LobbyError> {
    let bytes = store.get(&paths::lobby(code)).await?;
    Ok(bytes.map(|b| JsonCodec.decode(&b)).transpose()?)
}

/// Best-effort removal of presence, chat and typing documents.
pub(crate) async fn teardown_subcollections<S: DocumentStore>(store: &S, code: &LobbyCode) {
    match store.delete_prefix(&paths::subtree(code)).await {
        Ok(removed) => tracing::debug!(%code, removed, "lobby subcollections removed"),
        Err(e) => tracing::warn!(%code, error = %e, "lobby teardown failed"),
    }
}

/// Removes `target` from the lobby on behalf of `caller`, tearing down the
/// subcollections if the document was deleted.
pub(crate) async fn remove_player<S: DocumentStore>(
    store: &S,
    retry: &RetryPolicy,
    code: &LobbyCode,
    caller: &Identity,
    target: &Identity,
) -> Result<Removal, LobbyError> {
    let removal = retry
        .run("remove_player", move || {
            transact_lobby(store, code, move |current| remove(current, caller, target))
        })
        .await?;
    match removal {
        Removal::Deleted => {
            tracing::info!(%code, %caller, %target, "lobby deleted");
            teardown_subcollections(store, code).await;
        }
        Removal::Removed if caller == target => tracing::info!(%code, %target, "player left"),
        Removal::Removed => tracing::info!(%code, %caller, %target, "player kicked"),
        Removal::Absent | Removal::NotMember => {
            tracing::debug!(%code, %target, ?removal, "nothing to remove")
        }
    }
    Ok(removal)
}

#[cfg(test)]
mod tests {
    use lobbysync_protocol::{GameMode, QuizSelector, SessionSettings, TimerMode};

    use super::*;

    fn code() -> LobbyCode {
        LobbyCode::parse("123456").unwrap()
    }

    fn host() -> Profile {
        Profile::new("a", "Ana", "owl")
    }

    fn guest(id: &str) -> Profile {
        Profile::new(id, id.to_uppercase(), "cat")
    }

    fn settings() -> LobbySettings {
        LobbySettings {
            mode: GameMode::Classic,
            quiz: QuizSelector {
                id: "q1".into(),
                title: "Rivers".into(),
                total_questions: 8,
            },
            session: SessionSettings::default(),
        }
    }

    fn waiting() -> Lobby {
        Lobby::new(code(), &host(), GameMode::Classic, settings().quiz_config(1), 0)
    }

    fn with_guest(id: &str) -> Lobby {
        let mut lobby = waiting();
        lobby.players.push(Player::from_profile(&guest(id), false));
        lobby
    }

    fn put(m: Mutation) -> Lobby {
        match m {
            Mutation::Put(lobby) => lobby,
            other => panic!("expected Put, got {other:?}"),
        }
    }

    // --- create ---

    #[test]
    fn test_create_if_absent_writes_only_when_free() {
        let (m, created) = create_if_absent(None, &waiting()).unwrap();
        assert!(created);
        assert_eq!(put(m).code, code());

        let (m, created) = create_if_absent(Some(waiting()), &waiting()).unwrap();
        assert!(!created);
        assert_eq!(m, Mutation::Keep);
    }

    // --- join ---

    #[test]
    fn test_join_missing_lobby_is_not_found() {
        let err = join(None, &code(), &guest("b")).unwrap_err();
        assert!(matches!(err, LobbyError::NotFound(_)));
    }

    #[test]
    fn test_join_appends_unready_player() {
        let (m, outcome) = join(Some(waiting()), &code(), &guest("b")).unwrap();
        assert_eq!(outcome, JoinOutcome::Joined);
        let lobby = put(m);
        assert_eq!(lobby.players.len(), 2);
        assert!(!lobby.players[1].ready);
    }

    #[test]
    fn test_join_existing_member_is_noop() {
        let (m, outcome) = join(Some(with_guest("b")), &code(), &guest("b")).unwrap();
        assert_eq!(m, Mutation::Keep);
        assert_eq!(outcome, JoinOutcome::Rejoined);
    }

    #[test]
    fn test_join_started_rejects_newcomer_but_admits_member() {
        let mut lobby = with_guest("b");
        lobby.status = LobbyStatus::Started;

        let err = join(Some(lobby.clone()), &code(), &guest("c")).unwrap_err();
        assert!(matches!(err, LobbyError::AlreadyStarted(_)));

        let (_, outcome) = join(Some(lobby), &code(), &guest("b")).unwrap();
        assert_eq!(outcome, JoinOutcome::Rejoined);
    }

    // --- remove ---

    #[test]
    fn test_remove_self_filters_player() {
        let b = Identity::new("b");
        let mut lobby = with_guest("b");
        lobby.players.push(Player::from_profile(&guest("c"), false));

        let (m, removal) = remove(Some(lobby), &b, &b).unwrap();

        assert_eq!(removal, Removal::Removed);
        let lobby = put(m);
        assert!(!lobby.is_member(&b));
        assert_eq!(lobby.players.len(), 2);
    }

    #[test]
    fn test_remove_host_deletes_regardless_of_players() {
        let a = Identity::new("a");
        let mut lobby = with_guest("b");
        lobby.players.push(Player::from_profile(&guest("c"), false));

        let (m, removal) = remove(Some(lobby), &a, &a).unwrap();

        assert_eq!(m, Mutation::Delete);
        assert_eq!(removal, Removal::Deleted);
    }

    #[test]
    fn test_remove_last_player_deletes() {
        // A lobby whose host entry was lost: the last listed player leaves.
        let b = Identity::new("b");
        let mut lobby = with_guest("b");
        lobby.players.remove(0);

        let (m, removal) = remove(Some(lobby), &b, &b).unwrap();

        assert_eq!(m, Mutation::Delete);
        assert_eq!(removal, Removal::Deleted);
    }

    #[test]
    fn test_remove_other_requires_host() {
        let mut lobby = with_guest("b");
        lobby.players.push(Player::from_profile(&guest("c"), false));

        let err = remove(Some(lobby.clone()), &Identity::new("b"), &Identity::new("c"))
            .unwrap_err();
        assert!(matches!(err, LobbyError::Unauthorized(_)));

        let (_, removal) = remove(Some(lobby), &Identity::new("a"), &Identity::new("c")).unwrap();
        assert_eq!(removal, Removal::Removed);
    }

    #[test]
    fn test_remove_guest_cannot_delete_via_host_target() {
        let err = remove(Some(with_guest("b")), &Identity::new("b"), &Identity::new("a"))
            .unwrap_err();
        assert!(matches!(err, LobbyError::Unauthorized(_)));
    }

    #[test]
    fn test_remove_absent_lobby_and_non_member() {
        let b = Identity::new("b");
        assert_eq!(remove(None, &b, &b).unwrap().1, Removal::Absent);
        assert_eq!(remove(Some(waiting()), &b, &b).unwrap().1, Removal::NotMember);
    }

    // --- toggle_ready ---

    #[test]
    fn test_toggle_ready_twice_restores_value() {
        let b = Identity::new("b");
        let (m, ready) = toggle_ready(Some(with_guest("b")), &code(), &b).unwrap();
        assert_eq!(ready, Some(true));
        let (m, ready) = toggle_ready(Some(put(m)), &code(), &b).unwrap();
        assert_eq!(ready, Some(false));
        assert!(!put(m).player(&b).unwrap().ready);
    }

    #[test]
    fn test_toggle_ready_host_stays_ready() {
        let (m, ready) = toggle_ready(Some(waiting()), &code(), &Identity::new("a")).unwrap();
        assert_eq!(m, Mutation::Keep);
        assert_eq!(ready, Some(true));
    }

    #[test]
    fn test_toggle_ready_missing_lobby_is_noop() {
        let (m, ready) = toggle_ready(None, &code(), &Identity::new("b")).unwrap();
        assert_eq!(m, Mutation::Keep);
        assert_eq!(ready, None);
    }

    // --- update_settings ---

    #[test]
    fn test_update_settings_replaces_config_with_new_seed() {
        let mut next = settings();
        next.mode = GameMode::Survival;
        next.session = SessionSettings {
            timer_mode: TimerMode::Off,
            custom_duration: None,
            lives: Some(3),
        };

        let (m, ()) =
            update_settings(Some(waiting()), &code(), &Identity::new("a"), &next, 99).unwrap();

        let lobby = put(m);
        assert_eq!(lobby.mode, GameMode::Survival);
        assert_eq!(lobby.quiz_config.seed, 99);
        assert_eq!(lobby.quiz_config.lives, Some(3));
    }

    #[test]
    fn test_update_settings_rejects_guest_and_started() {
        let err = update_settings(Some(with_guest("b")), &code(), &Identity::new("b"), &settings(), 1)
            .unwrap_err();
        assert!(matches!(err, LobbyError::Unauthorized(_)));

        let mut lobby = waiting();
        lobby.status = LobbyStatus::Started;
        let err = update_settings(Some(lobby), &code(), &Identity::new("a"), &settings(), 1)
            .unwrap_err();
        assert!(matches!(err, LobbyError::AlreadyStarted(_)));
    }

    // --- start ---

    #[test]
    fn test_start_requires_host_and_ready_players() {
        let a = Identity::new("a");
        let err = start(Some(with_guest("b")), &code(), &Identity::new("b")).unwrap_err();
        assert!(matches!(err, LobbyError::Unauthorized(_)));

        let err = start(Some(with_guest("b")), &code(), &a).unwrap_err();
        assert!(matches!(err, LobbyError::PlayersNotReady { ready: 1, total: 2 }));

        let (m, outcome) = start(Some(waiting()), &code(), &a).unwrap();
        assert_eq!(outcome, StartOutcome::Started);
        assert_eq!(put(m).status, LobbyStatus::Started);
    }

    #[test]
    fn test_start_is_idempotent_once_started() {
        let mut lobby = waiting();
        lobby.status = LobbyStatus::Started;
        let (m, outcome) = start(Some(lobby), &code(), &Identity::new("a")).unwrap();
        assert_eq!(m, Mutation::Keep);
        assert_eq!(outcome, StartOutcome::AlreadyRunning);
    }
}
