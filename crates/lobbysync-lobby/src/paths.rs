//! Store key layout.
//!
//! Every key is built from a validated [`LobbyCode`], so user input never
//! reaches the store's key space unchecked.

use lobbysync_protocol::{Identity, LobbyCode};

/// Collection holding every lobby document.
pub const LOBBIES: &str = "lobbies";

pub fn lobby(code: &LobbyCode) -> String {
    format!("{LOBBIES}/{code}")
}

/// Prefix covering all subcollections of a lobby (not the lobby itself).
pub fn subtree(code: &LobbyCode) -> String {
    format!("{LOBBIES}/{code}/")
}

pub fn presence_collection(code: &LobbyCode) -> String {
    format!("{LOBBIES}/{code}/presence")
}

pub fn presence(code: &LobbyCode, identity: &Identity) -> String {
    format!("{LOBBIES}/{code}/presence/{identity}")
}

pub fn messages(code: &LobbyCode) -> String {
    format!("{LOBBIES}/{code}/messages")
}

pub fn typing_collection(code: &LobbyCode) -> String {
    format!("{LOBBIES}/{code}/typing")
}

pub fn typing(code: &LobbyCode, identity: &Identity) -> String {
    format!("{LOBBIES}/{code}/typing/{identity}")
}

/// What a key under one lobby's prefix refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocKind {
    Lobby,
    Presence(Identity),
    Message,
    Typing(Identity),
    Other,
}

/// Classifies `key` relative to the lobby `code`.
pub fn classify(code: &LobbyCode, key: &str) -> DocKind {
    let root = lobby(code);
    let Some(rest) = key.strip_prefix(root.as_str()) else {
        return DocKind::Other;
    };
    if rest.is_empty() {
        return DocKind::Lobby;
    }
    let mut parts = rest.trim_start_matches('/').splitn(2, '/');
    match (parts.next(), parts.next()) {
        (Some("presence"), Some(id)) if !id.contains('/') => DocKind::Presence(Identity::new(id)),
        (Some("messages"), Some(id)) if !id.contains('/') => DocKind::Message,
        (Some("typing"), Some(id)) if !id.contains('/') => DocKind::Typing(Identity::new(id)),
        _ => DocKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> LobbyCode {
        LobbyCode::parse("123456").unwrap()
    }

    #[test]
    fn test_keys() {
        let id = Identity::new("u1");
        assert_eq!(lobby(&code()), "lobbies/123456");
        assert_eq!(presence(&code(), &id), "lobbies/123456/presence/u1");
        assert_eq!(typing(&code(), &id), "lobbies/123456/typing/u1");
        assert_eq!(messages(&code()), "lobbies/123456/messages");
        assert!(presence(&code(), &id).starts_with(&subtree(&code())));
    }

    #[test]
    fn test_classify() {
        let c = code();
        assert_eq!(classify(&c, "lobbies/123456"), DocKind::Lobby);
        assert_eq!(
            classify(&c, "lobbies/123456/presence/u1"),
            DocKind::Presence(Identity::new("u1"))
        );
        assert_eq!(classify(&c, "lobbies/123456/messages/00000000000000000001"), DocKind::Message);
        assert_eq!(
            classify(&c, "lobbies/123456/typing/u2"),
            DocKind::Typing(Identity::new("u2"))
        );
        assert_eq!(classify(&c, "lobbies/654321"), DocKind::Other);
        assert_eq!(classify(&c, "lobbies/123456/other/x"), DocKind::Other);
        assert_eq!(classify(&c, "lobbies/123456/presence"), DocKind::Other);
    }
}
