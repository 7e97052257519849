//! Identity and addressing types.
//!
//! These are the keys of the system: a [`LobbyCode`] addresses a lobby
//! document in the store, an [`Identity`] addresses a player inside it.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The stable identifier of an acting user, as resolved by the identity
/// provider.
///
/// This is a "newtype wrapper" around the provider's opaque user id. You
/// can't accidentally pass a display name where an identity is expected,
/// even though both are strings underneath.
///
/// `#[serde(transparent)]` serializes this as the bare string, so an
/// identity `"uid-42"` is just `"uid-42"` in a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wraps a provider user id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who is acting: the identity plus the public profile shown to others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub identity: Identity,
    pub display_name: String,
    pub avatar: String,
}

impl Profile {
    pub fn new(
        identity: impl Into<String>,
        display_name: impl Into<String>,
        avatar: impl Into<String>,
    ) -> Self {
        Self {
            identity: Identity::new(identity),
            display_name: display_name.into(),
            avatar: avatar.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// LobbyCode
// ---------------------------------------------------------------------------

/// A 6-digit numeric lobby code, e.g. `"123456"`.
///
/// The only way to build one is [`LobbyCode::parse`] (or
/// [`LobbyCode::generate`]), so any `LobbyCode` in hand is guaranteed to
/// match `^\d{6}$`. That is the hard validation boundary in front of the
/// store's key space: a user-typed `"../x"` never becomes a store path.
///
/// Deserialization goes through the same check via `try_from`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LobbyCode(String);

impl LobbyCode {
    /// Number of digits in a code.
    pub const LEN: usize = 6;

    /// Validates a raw code. No trimming is applied.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidCode`] unless `raw` is exactly six
    /// ASCII digits.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        if raw.len() == Self::LEN && raw.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(raw.to_owned()))
        } else {
            Err(ProtocolError::InvalidCode(raw.to_owned()))
        }
    }

    /// Generates a random code in `100000..=999999`.
    ///
    /// Uniqueness is not guaranteed here; the caller claims the code with a
    /// create-if-absent transaction and draws again on collision.
    pub fn generate() -> Self {
        let n: u32 = rand::rng().random_range(100_000..1_000_000);
        Self(n.to_string())
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LobbyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LobbyCode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LobbyCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<LobbyCode> for String {
    fn from(code: LobbyCode) -> Self {
        code.0
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Milliseconds since the Unix epoch on this machine's wall clock.
///
/// Used for liveness classification, which is deliberately per-observer:
/// two clients with skewed clocks may disagree briefly.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_six_digits() {
        let code = LobbyCode::parse("123456").unwrap();
        assert_eq!(code.as_str(), "123456");
        assert_eq!(code.to_string(), "123456");
    }

    #[test]
    fn test_parse_accepts_leading_zero() {
        assert!(LobbyCode::parse("000042").is_ok());
    }

    #[test]
    fn test_parse_rejects_malformed_codes() {
        for raw in ["", "12345", "1234567", "12a456", " 123456", "12345/", "../../x", "１２３４５６"] {
            assert!(
                matches!(LobbyCode::parse(raw), Err(ProtocolError::InvalidCode(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_generate_produces_valid_codes() {
        for _ in 0..200 {
            let code = LobbyCode::generate();
            assert!(LobbyCode::parse(code.as_str()).is_ok());
            assert!(!code.as_str().starts_with('0'));
        }
    }

    #[test]
    fn test_lobby_code_deserialize_validates() {
        let ok: LobbyCode = serde_json::from_str("\"654321\"").unwrap();
        assert_eq!(ok.as_str(), "654321");

        let bad: Result<LobbyCode, _> = serde_json::from_str("\"lobbies/1\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_identity_serializes_transparently() {
        let json = serde_json::to_string(&Identity::new("uid-7")).unwrap();
        assert_eq!(json, "\"uid-7\"");
    }

    #[test]
    fn test_now_millis_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000);
    }
}
