//! Session handoff to the quiz subsystem.
//!
//! When the countdown ends, each client builds the session parameters from
//! the committed quiz config (never from local UI state) and hands them to
//! a [`QuizSink`] exactly once.

use lobbysync_protocol::{GameMode, Lobby, LobbyCode, SessionSettings};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Everything the quiz subsystem needs to run the session.
///
/// Built purely from the lobby document, so every client derives the same
/// values (the `seed` fixes question order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionParams {
    /// Quiz id.
    pub selector: String,
    pub mode: GameMode,
    pub seed: u64,
    /// Number of questions.
    pub amount: u32,
    pub lobby_id: LobbyCode,
    pub settings: SessionSettings,
}

impl SessionParams {
    pub fn from_lobby(lobby: &Lobby) -> Self {
        let config = &lobby.quiz_config;
        Self {
            selector: config.id.clone(),
            mode: lobby.mode,
            seed: config.seed,
            amount: config.total_questions,
            lobby_id: lobby.code.clone(),
            settings: SessionSettings {
                timer_mode: config.timer_mode,
                custom_duration: config.custom_duration,
                lives: config.lives,
            },
        }
    }
}

/// Receives the handoff. Implemented by the quiz subsystem.
pub trait QuizSink: Send + Sync + 'static {
    fn begin(&self, params: SessionParams);
}

impl<F> QuizSink for F
where
    F: Fn(SessionParams) + Send + Sync + 'static,
{
    fn begin(&self, params: SessionParams) {
        self(params)
    }
}

/// A [`QuizSink`] forwarding parameters over a channel.
#[derive(Debug, Clone)]
pub struct ChannelSink(mpsc::UnboundedSender<SessionParams>);

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionParams>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

impl QuizSink for ChannelSink {
    fn begin(&self, params: SessionParams) {
        if self.0.send(params).is_err() {
            tracing::warn!("quiz sink receiver dropped, handoff lost");
        }
    }
}

/// Once-only guard around the transition into the session.
///
/// `transitioning` is raised when the countdown begins and never lowered;
/// while it is up, closing the lobby view is not treated as leaving.
#[derive(Debug, Default)]
pub struct Handoff {
    transitioning: bool,
    completed: bool,
}

impl Handoff {
    /// Raises the transitioning flag. Returns `false` if it was already up.
    pub fn begin(&mut self) -> bool {
        !std::mem::replace(&mut self.transitioning, true)
    }

    pub fn is_transitioning(&self) -> bool {
        self.transitioning
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Delivers `params` to `sink` the first time only.
    pub fn complete(&mut self, sink: &dyn QuizSink, params: SessionParams) -> bool {
        if self.completed {
            return false;
        }
        self.transitioning = true;
        self.completed = true;
        sink.begin(params);
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use lobbysync_protocol::{Profile, QuizSelector, LobbySettings, TimerMode};

    use super::*;

    fn lobby() -> Lobby {
        let settings = LobbySettings {
            mode: GameMode::Survival,
            quiz: QuizSelector {
                id: "quiz-9".into(),
                title: "Flags".into(),
                total_questions: 12,
            },
            session: SessionSettings {
                timer_mode: TimerMode::Custom,
                custom_duration: Some(15),
                lives: Some(2),
            },
        };
        Lobby::new(
            LobbyCode::parse("123456").unwrap(),
            &Profile::new("a", "Ana", "owl"),
            settings.mode,
            settings.quiz_config(4242),
            0,
        )
    }

    #[test]
    fn test_params_come_from_committed_config() {
        let params = SessionParams::from_lobby(&lobby());
        assert_eq!(params.selector, "quiz-9");
        assert_eq!(params.mode, GameMode::Survival);
        assert_eq!(params.seed, 4242);
        assert_eq!(params.amount, 12);
        assert_eq!(params.lobby_id.as_str(), "123456");
        assert_eq!(params.settings.custom_duration, Some(15));
        assert_eq!(params.settings.lives, Some(2));
    }

    #[test]
    fn test_handoff_delivers_exactly_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let sink = move |_: SessionParams| {
            counter.fetch_add(1, Ordering::SeqCst);
        };
        let mut handoff = Handoff::default();

        assert!(handoff.begin());
        assert!(!handoff.begin());
        assert!(handoff.complete(&sink, SessionParams::from_lobby(&lobby())));
        assert!(!handoff.complete(&sink, SessionParams::from_lobby(&lobby())));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handoff.is_transitioning());
        assert!(handoff.is_completed());
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelSink::new();
        sink.begin(SessionParams::from_lobby(&lobby()));
        assert_eq!(rx.recv().await.unwrap().seed, 4242);
    }
}
