//! Local persistence that survives a client restart.
//!
//! Two slots live here: the last lobby the client joined, and an invite
//! code captured at startup. [`LocalStore`] is a tiny synchronous
//! string map; [`FileLocalStore`] keeps it in a JSON file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use lobbysync_protocol::{Codec, JsonCodec};

use crate::SessionError;

/// Slot holding the code of the lobby this client last joined.
pub const LAST_LOBBY_KEY: &str = "lobbysync.last_lobby";

/// Slot holding an invite code captured from the launch location.
pub const PENDING_INVITE_KEY: &str = "lobbysync.pending_invite";

/// A restart-surviving string map.
pub trait LocalStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;
    fn remove(&self, key: &str) -> Result<(), SessionError>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// A [`LocalStore`] held in process memory. Clones share state, so a test
/// can hand one clone to a "restarted" client.
#[derive(Debug, Clone, Default)]
pub struct MemoryLocalStore {
    slots: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>, SessionError> {
        self.slots.lock().map_err(|_| SessionError::Poisoned)
    }
}

impl LocalStore for MemoryLocalStore {
    fn get(&self, key: &str) -> Option<String> {
        self.slots().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.slots()?.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.slots()?.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File-backed
// ---------------------------------------------------------------------------

/// A [`LocalStore`] persisted as a JSON object in a single file.
///
/// The whole map is rewritten on every change via a temp file and rename,
/// so a crash mid-write leaves the previous contents intact.
#[derive(Debug)]
pub struct FileLocalStore {
    path: PathBuf,
    slots: Mutex<BTreeMap<String, String>>,
}

impl FileLocalStore {
    /// Opens (or lazily creates) the store at `path`.
    ///
    /// A missing file is an empty store. A file that isn't a JSON object of
    /// strings is an error rather than being silently overwritten.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let path = path.into();
        let slots = match fs::read(&path) {
            Ok(bytes) => JsonCodec.decode(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), slots = slots.len(), "local store opened");
        Ok(Self {
            path,
            slots: Mutex::new(slots),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), SessionError> {
        let mut slots = self.slots.lock().map_err(|_| SessionError::Poisoned)?;
        f(&mut slots);
        let bytes = JsonCodec.encode(&*slots)?;
        let tmp = self.path.with_extension("tmp");
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl LocalStore for FileLocalStore {
    fn get(&self, key: &str) -> Option<String> {
        self.slots.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.update(|slots| {
            slots.insert(key.to_owned(), value.to_owned());
        })
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.update(|slots| {
            slots.remove(key);
        })
    }
}
