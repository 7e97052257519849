use std::time::Duration;

use lobbysync::prelude::*;
use tokio::sync::mpsc::UnboundedReceiver;

// ---------------------------------------------------------------------------
// Event printing
// ---------------------------------------------------------------------------

fn describe(event: &LobbyEvent) -> Option<String> {
    Some(match event {
        LobbyEvent::Updated(lobby) => {
            let names: Vec<String> = lobby
                .players
                .iter()
                .map(|p| format!("{}{}", p.display_name, if p.ready { "*" } else { "" }))
                .collect();
            format!("lobby {} [{}] {:?}", lobby.code, names.join(", "), lobby.status)
        }
        LobbyEvent::Chat { message, notify } => {
            format!("{}{}: {}", if *notify { "(!) " } else { "" }, message.name, message.text)
        }
        LobbyEvent::Typing(names) if !names.is_empty() => format!("{} typing...", names.join(", ")),
        LobbyEvent::Countdown(n) => format!("starting in {n}"),
        LobbyEvent::HandedOff(params) => {
            format!("quiz {} begins ({} questions, seed {})", params.selector, params.amount, params.seed)
        }
        LobbyEvent::Kicked => "kicked by the host".into(),
        LobbyEvent::Closed => "lobby closed".into(),
        LobbyEvent::Left => "left the lobby".into(),
        _ => return None,
    })
}

fn print_events(who: &'static str, mut events: UnboundedReceiver<LobbyEvent>) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Some(line) = describe(&event) {
                println!("[{who}] {line}");
            }
        }
    });
}

fn load_config() -> Result<LobbyConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => Ok(serde_json::from_slice(&std::fs::read(path)?)?),
        None => Ok(LobbyConfig::default()),
    }
}

// ---------------------------------------------------------------------------
// Demo
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    lobbysync::init_tracing();
    let config = load_config()?;
    let store = MemoryStore::new();

    let client = |id: &str, name: &str| {
        LobbyClient::<MemoryStore, WatchIdentity>::builder().config(config.clone()).build(
            store.clone(),
            WatchIdentity::signed_in(Profile::new(id, name, "owl")),
            |_: SessionParams| {},
        )
    };

    let (sink, mut quiz) = ChannelSink::new();
    let mut host = LobbyClient::<MemoryStore, WatchIdentity>::builder().config(config.clone()).build(
        store.clone(),
        WatchIdentity::signed_in(Profile::new("uid-ana", "Ana", "fox")),
        sink,
    )?;
    let quiz_pick = QuizSelector {
        id: "capitals".into(),
        title: "World capitals".into(),
        total_questions: 10,
    };
    let Some(code) = host
        .create_lobby(GameMode::Classic, &quiz_pick, SessionSettings::default())
        .await?
    else {
        return Ok(());
    };
    if let Some(events) = host.events() {
        print_events("ana", events);
    }
    tracing::info!(%code, "share this code to invite players");

    let mut bo = client("uid-bo", "Bo")?;
    let mut cy = client("uid-cy", "Cy")?;
    for (who, guest) in [("bo", &mut bo), ("cy", &mut cy)] {
        guest.join_lobby(code.as_str()).await?;
        if let Some(events) = guest.events() {
            print_events(who, events);
        }
    }

    bo.set_typing(true).await?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    bo.send_chat("hi all, ready in a sec").await?;
    bo.toggle_ready().await?;

    host.kick(&Identity::new("uid-cy")).await?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    host.start_game().await?;
    if let Some(params) = quiz.recv().await {
        println!("host hands off: {}", serde_json::to_string(&params)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_skips_noise() {
        assert!(describe(&LobbyEvent::Typing(Vec::new())).is_none());
        assert!(describe(&LobbyEvent::ChatHistory(Vec::new())).is_none());
        assert_eq!(describe(&LobbyEvent::Countdown(3)).unwrap(), "starting in 3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_demo_lobby_hands_off() {
        let store = MemoryStore::new();
        let (sink, mut quiz) = ChannelSink::new();
        let mut host = LobbyClient::<MemoryStore, WatchIdentity>::builder()
            .build(store, WatchIdentity::signed_in(Profile::new("h", "Host", "fox")), sink)
            .unwrap();
        let quiz_pick = QuizSelector {
            id: "q".into(),
            title: "Q".into(),
            total_questions: 3,
        };
        host.create_lobby(GameMode::Classic, &quiz_pick, SessionSettings::default())
            .await
            .unwrap();
        host.start_game().await.unwrap();

        let params = quiz.recv().await.unwrap();
        assert_eq!(params.amount, 3);
    }
}
