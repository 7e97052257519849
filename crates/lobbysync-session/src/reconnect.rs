//! Reconnection and invite handling.
//!
//! A client remembers the code of the lobby it last joined so a restart can
//! put it back in. Separately, it may be launched with an invite (for
//! example a link carrying `?lobby=123456`). [`ReconnectManager`] owns both
//! slots and decides what to try at startup:
//!
//! 1. the remembered lobby, if any (attempted once; forgotten on failure)
//! 2. then the captured invite, if any (consumed on read)
//!
//! The manager never talks to the store. Joining is the lobby controller's
//! job; this type only answers "where should I go?".

use std::sync::{Arc, Mutex};

use lobbysync_protocol::LobbyCode;
use url::Url;

use crate::storage::{LocalStore, LAST_LOBBY_KEY, PENDING_INVITE_KEY};
use crate::SessionError;

// ---------------------------------------------------------------------------
// Invite locator
// ---------------------------------------------------------------------------

/// Where an invite arrives from: a launch URL, a command-line flag, etc.
pub trait InviteLocator: Send + Sync {
    /// The raw invite code, if the locator carries one. Not yet validated.
    fn invite_code(&self) -> Option<String>;

    /// Removes the invite from the locator so it isn't processed twice.
    fn clear_invite(&self);
}

/// An [`InviteLocator`] reading the `lobby` query parameter of a URL.
#[derive(Debug)]
pub struct UrlLocator {
    url: Mutex<String>,
}

impl UrlLocator {
    /// Query parameter carrying the invite code.
    pub const PARAM: &'static str = "lobby";

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Mutex::new(url.into()),
        }
    }

    /// The URL as it currently stands (without the invite once cleared).
    pub fn url(&self) -> String {
        self.url.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

impl InviteLocator for UrlLocator {
    fn invite_code(&self) -> Option<String> {
        let url = Url::parse(&self.url.lock().ok()?).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == Self::PARAM)
            .map(|(_, value)| value.into_owned())
    }

    fn clear_invite(&self) {
        let Ok(mut raw) = self.url.lock() else {
            return;
        };
        let Ok(mut url) = Url::parse(&raw) else {
            return;
        };
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != Self::PARAM)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
        *raw = url.into();
    }
}

// ---------------------------------------------------------------------------
// ReconnectManager
// ---------------------------------------------------------------------------

/// Why a startup target was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeSource {
    /// The lobby this client was in before it restarted.
    Reconnect,
    /// An invite captured from the launch location.
    Invite,
}

/// A lobby to try joining at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeTarget {
    pub code: LobbyCode,
    pub source: ResumeSource,
}

/// Remembers the last lobby and pending invite in a [`LocalStore`].
///
/// Cheap to clone; clones share the underlying store.
#[derive(Clone)]
pub struct ReconnectManager {
    store: Arc<dyn LocalStore>,
}

impl ReconnectManager {
    pub fn new(store: impl LocalStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// Records `code` as the lobby to reconnect to after a restart.
    pub fn remember(&self, code: &LobbyCode) -> Result<(), SessionError> {
        self.store.set(LAST_LOBBY_KEY, code.as_str())?;
        tracing::debug!(%code, "remembered lobby");
        Ok(())
    }

    /// Clears the reconnect slot. Best-effort: failures are logged.
    pub fn forget(&self) {
        if let Err(e) = self.store.remove(LAST_LOBBY_KEY) {
            tracing::warn!(error = %e, "failed to clear remembered lobby");
        }
    }

    /// The remembered lobby, if it holds a valid code.
    ///
    /// A corrupted value is cleared rather than attempted.
    pub fn last_lobby(&self) -> Option<LobbyCode> {
        let raw = self.store.get(LAST_LOBBY_KEY)?;
        match LobbyCode::parse(&raw) {
            Ok(code) => Some(code),
            Err(_) => {
                tracing::warn!(raw, "discarding invalid remembered lobby");
                self.forget();
                None
            }
        }
    }

    /// Moves an invite from `locator` into local persistence.
    ///
    /// The locator is cleared whether or not the code is valid, so a bad
    /// link isn't re-processed on every launch. Returns the captured code.
    pub fn capture_invite(&self, locator: &impl InviteLocator) -> Option<LobbyCode> {
        let raw = locator.invite_code()?;
        locator.clear_invite();
        match LobbyCode::parse(&raw) {
            Ok(code) => {
                if let Err(e) = self.store.set(PENDING_INVITE_KEY, code.as_str()) {
                    tracing::warn!(error = %e, "failed to persist invite");
                }
                tracing::info!(%code, "captured invite");
                Some(code)
            }
            Err(_) => {
                tracing::warn!(raw, "ignoring invite with invalid code");
                None
            }
        }
    }

    /// Reads and consumes the pending invite.
    pub fn take_pending_invite(&self) -> Option<LobbyCode> {
        let raw = self.store.get(PENDING_INVITE_KEY)?;
        if let Err(e) = self.store.remove(PENDING_INVITE_KEY) {
            tracing::warn!(error = %e, "failed to clear pending invite");
        }
        LobbyCode::parse(&raw).ok()
    }

    /// What to try at startup, in order: reconnect first, then invite.
    ///
    /// Consumes the pending invite. An invite equal to the remembered lobby
    /// is not repeated.
    pub fn startup_targets(&self) -> Vec<ResumeTarget> {
        let mut targets = Vec::with_capacity(2);
        if let Some(code) = self.last_lobby() {
            targets.push(ResumeTarget {
                code,
                source: ResumeSource::Reconnect,
            });
        }
        if let Some(code) = self.take_pending_invite() {
            if targets.first().is_none_or(|t| t.code != code) {
                targets.push(ResumeTarget {
                    code,
                    source: ResumeSource::Invite,
                });
            }
        }
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryLocalStore;

    fn code(raw: &str) -> LobbyCode {
        LobbyCode::parse(raw).unwrap()
    }

    #[test]
    fn test_url_locator_reads_lobby_param() {
        let locator = UrlLocator::new("https://quiz.example/play?ref=x&lobby=123456#top");
        assert_eq!(locator.invite_code().as_deref(), Some("123456"));
    }

    #[test]
    fn test_url_locator_without_param_returns_none() {
        let locator = UrlLocator::new("https://quiz.example/play?ref=x");
        assert_eq!(locator.invite_code(), None);
    }

    #[test]
    fn test_url_locator_clear_keeps_other_params() {
        let locator = UrlLocator::new("https://quiz.example/play?ref=x&lobby=123456");
        locator.clear_invite();
        assert_eq!(locator.url(), "https://quiz.example/play?ref=x");

        let only = UrlLocator::new("https://quiz.example/play?lobby=123456");
        only.clear_invite();
        assert_eq!(only.url(), "https://quiz.example/play");
    }

    #[test]
    fn test_url_locator_decodes_percent_encoded_invite() {
        let value = UrlLocator::new("https://quiz.example/play?lobby=12345%36");
        assert_eq!(value.invite_code().as_deref(), Some("123456"));

        let key = UrlLocator::new("https://quiz.example/play?lob%62y=123456&ref=x");
        assert_eq!(key.invite_code().as_deref(), Some("123456"));
        key.clear_invite();
        assert_eq!(key.url(), "https://quiz.example/play?ref=x");
    }

    #[test]
    fn test_capture_invite_accepts_percent_encoded_code() {
        let manager = ReconnectManager::new(MemoryLocalStore::new());
        let locator = UrlLocator::new("https://quiz.example/play?lobby=%3123456");

        assert_eq!(manager.capture_invite(&locator), Some(code("123456")));
        assert_eq!(locator.url(), "https://quiz.example/play");
    }

    #[test]
    fn test_url_locator_ignores_unparseable_url() {
        let locator = UrlLocator::new("not a url ?lobby=123456");
        assert_eq!(locator.invite_code(), None);
        locator.clear_invite();
        assert_eq!(locator.url(), "not a url ?lobby=123456");
    }

    #[test]
    fn test_remember_then_last_lobby() {
        let manager = ReconnectManager::new(MemoryLocalStore::new());
        manager.remember(&code("123456")).unwrap();
        assert_eq!(manager.last_lobby(), Some(code("123456")));

        manager.forget();
        assert_eq!(manager.last_lobby(), None);
    }

    #[test]
    fn test_last_lobby_discards_corrupt_value() {
        let store = MemoryLocalStore::new();
        store.set(LAST_LOBBY_KEY, "../evil").unwrap();
        let manager = ReconnectManager::new(store.clone());

        assert_eq!(manager.last_lobby(), None);
        assert_eq!(store.get(LAST_LOBBY_KEY), None);
    }

    #[test]
    fn test_capture_invite_persists_and_clears_locator() {
        let manager = ReconnectManager::new(MemoryLocalStore::new());
        let locator = UrlLocator::new("app://join?lobby=654321");

        assert_eq!(manager.capture_invite(&locator), Some(code("654321")));
        assert_eq!(locator.invite_code(), None);
        assert_eq!(manager.take_pending_invite(), Some(code("654321")));
        assert_eq!(manager.take_pending_invite(), None, "consumed on read");
    }

    #[test]
    fn test_capture_invite_rejects_bad_code_but_still_clears() {
        let manager = ReconnectManager::new(MemoryLocalStore::new());
        let locator = UrlLocator::new("app://join?lobby=12345");

        assert_eq!(manager.capture_invite(&locator), None);
        assert_eq!(locator.invite_code(), None);
        assert_eq!(manager.take_pending_invite(), None);
    }

    #[test]
    fn test_startup_targets_prefer_reconnect_then_invite() {
        let manager = ReconnectManager::new(MemoryLocalStore::new());
        manager.remember(&code("111111")).unwrap();
        manager.capture_invite(&UrlLocator::new("app://join?lobby=222222"));

        let targets = manager.startup_targets();

        assert_eq!(
            targets,
            vec![
                ResumeTarget { code: code("111111"), source: ResumeSource::Reconnect },
                ResumeTarget { code: code("222222"), source: ResumeSource::Invite },
            ]
        );
        // The invite is gone; the reconnect slot stays until forgotten.
        assert_eq!(manager.startup_targets().len(), 1);
    }

    #[test]
    fn test_startup_targets_dedupes_same_code() {
        let manager = ReconnectManager::new(MemoryLocalStore::new());
        manager.remember(&code("111111")).unwrap();
        manager.capture_invite(&UrlLocator::new("app://join?lobby=111111"));

        assert_eq!(manager.startup_targets().len(), 1);
    }

    #[test]
    fn test_startup_targets_empty_by_default() {
        let manager = ReconnectManager::new(MemoryLocalStore::new());
        assert!(manager.startup_targets().is_empty());
    }
}
