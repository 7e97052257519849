//! Restart behavior: a file-backed store carries the reconnect slot across
//! process "lifetimes", while invites are consumed once.

use lobbysync_protocol::LobbyCode;
use lobbysync_session::{FileLocalStore, ReconnectManager, ResumeSource, UrlLocator};
use tempfile::TempDir;

#[test]
fn test_reconnect_slot_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");
    let code = LobbyCode::parse("123456").unwrap();

    {
        let manager = ReconnectManager::new(FileLocalStore::open(&path).unwrap());
        manager.remember(&code).unwrap();
    }

    let manager = ReconnectManager::new(FileLocalStore::open(&path).unwrap());
    let targets = manager.startup_targets();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].code, code);
    assert_eq!(targets[0].source, ResumeSource::Reconnect);
}

#[test]
fn test_invite_is_consumed_across_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");

    {
        let manager = ReconnectManager::new(FileLocalStore::open(&path).unwrap());
        manager.capture_invite(&UrlLocator::new("app://join?lobby=654321"));
    }
    {
        let manager = ReconnectManager::new(FileLocalStore::open(&path).unwrap());
        let targets = manager.startup_targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].source, ResumeSource::Invite);
    }

    let manager = ReconnectManager::new(FileLocalStore::open(&path).unwrap());
    assert!(manager.startup_targets().is_empty());
}
