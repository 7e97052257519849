//! End-to-end flows through the `lobbysync` facade.

use std::time::Duration;

use lobbysync::prelude::*;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

// =========================================================================
// Helpers
// =========================================================================

fn profile(id: &str) -> Profile {
    Profile::new(id, id.to_uppercase(), "owl")
}

fn quiz() -> QuizSelector {
    QuizSelector {
        id: "flags".into(),
        title: "Flags of Europe".into(),
        total_questions: 8,
    }
}

async fn next_matching(
    events: &mut UnboundedReceiver<LobbyEvent>,
    mut pred: impl FnMut(&LobbyEvent) -> bool,
) -> LobbyEvent {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            let event = events.recv().await.expect("event stream ended");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

// =========================================================================
// Scenarios
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_full_lobby_round_hands_off_to_quiz() {
    let store = MemoryStore::new();
    let (sink, mut quiz_rx) = ChannelSink::new();

    let mut host = LobbyClient::<MemoryStore, WatchIdentity>::builder()
        .build(store.clone(), WatchIdentity::signed_in(profile("a")), sink)
        .unwrap();
    let code = host
        .create_lobby(GameMode::Survival, &quiz(), SessionSettings {
            lives: Some(3),
            ..SessionSettings::default()
        })
        .await
        .unwrap()
        .unwrap();

    let mut guest = LobbyClient::<MemoryStore, WatchIdentity>::builder()
        .build(store.clone(), WatchIdentity::signed_in(profile("b")), |_: SessionParams| {})
        .unwrap();
    assert!(guest.join_lobby(code.as_str()).await.unwrap());
    let mut guest_events = guest.events().unwrap();

    guest.send_chat("ready when you are").await.unwrap();
    guest.toggle_ready().await.unwrap();
    host.start_game().await.unwrap();

    let LobbyEvent::HandedOff(params) =
        next_matching(&mut guest_events, |e| matches!(e, LobbyEvent::HandedOff(_))).await
    else {
        unreachable!()
    };
    assert_eq!(params.mode, GameMode::Survival);
    assert_eq!(params.settings.lives, Some(3));
    assert_eq!(params.amount, 8);

    let host_params = quiz_rx.recv().await.unwrap();
    assert_eq!(host_params, params);
}

#[tokio::test]
async fn test_restart_rejoins_through_persisted_slot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("slot.json");
    let store = MemoryStore::new();

    let mut host = LobbyClient::<MemoryStore, WatchIdentity>::builder()
        .build(store.clone(), WatchIdentity::signed_in(profile("a")), |_: SessionParams| {})
        .unwrap();
    let code = host
        .create_lobby(GameMode::Classic, &quiz(), SessionSettings::default())
        .await
        .unwrap()
        .unwrap();

    {
        let mut guest = LobbyClient::<MemoryStore, WatchIdentity>::builder()
            .persist_to(&path)
            .build(store.clone(), WatchIdentity::signed_in(profile("b")), |_: SessionParams| {})
            .unwrap();
        guest.join_lobby(code.as_str()).await.unwrap();
    }

    let mut restarted = LobbyClient::<MemoryStore, WatchIdentity>::builder()
        .persist_to(&path)
        .build(store.clone(), WatchIdentity::signed_in(profile("b")), |_: SessionParams| {})
        .unwrap();
    assert_eq!(restarted.start(None::<&UrlLocator>).await.unwrap(), Some(code.clone()));
    assert_eq!(restarted.current_code(), Some(&code));
}

#[tokio::test]
async fn test_start_follows_invite_link() {
    let store = MemoryStore::new();
    let mut host = LobbyClient::<MemoryStore, WatchIdentity>::builder()
        .build(store.clone(), WatchIdentity::signed_in(profile("a")), |_: SessionParams| {})
        .unwrap();
    let code = host
        .create_lobby(GameMode::Classic, &quiz(), SessionSettings::default())
        .await
        .unwrap()
        .unwrap();

    let locator = UrlLocator::new(format!("https://quiz.example/?lobby={code}&ref=share"));
    let mut guest = LobbyClient::<MemoryStore, WatchIdentity>::builder()
        .build(store.clone(), WatchIdentity::signed_in(profile("b")), |_: SessionParams| {})
        .unwrap();

    assert_eq!(guest.start(Some(&locator)).await.unwrap(), Some(code));
    assert_eq!(locator.url(), "https://quiz.example/?ref=share");
}

#[tokio::test]
async fn test_errors_surface_through_facade_type() {
    let store = MemoryStore::new();
    let mut guest = LobbyClient::<MemoryStore, WatchIdentity>::builder()
        .build(store, WatchIdentity::signed_in(profile("b")), |_: SessionParams| {})
        .unwrap();

    let err: LobbySyncError = guest.join_lobby("000001").await.unwrap_err().into();

    assert!(matches!(err, LobbySyncError::Lobby(LobbyError::NotFound(_))));
    assert_eq!(err.user_message(), "Lobby 000001 doesn't exist.");
}

#[test]
fn test_config_loads_from_partial_json() {
    let config: LobbyConfig = serde_json::from_str(r#"{"countdown_ticks": 3}"#).unwrap();
    assert_eq!(config.countdown_ticks, 3);
    assert_eq!(config.chat_history, LobbyConfig::default().chat_history);
}
