//! Change feed returned by [`DocumentStore::watch`](crate::DocumentStore::watch).

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// What happened to a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// The document was created or replaced; carries the new bytes.
    Put(Vec<u8>),
    /// The document was removed.
    Deleted,
    /// The feed dropped events. Consumers must re-read whatever they track.
    Resync,
}

/// A committed change to one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub key: String,
    pub change: Change,
}

/// A subscription to every key under a prefix.
///
/// Consumers poll [`next`](Self::next) inside a `tokio::select!` loop
/// instead of registering callbacks.
pub struct Watch {
    prefix: String,
    receiver: broadcast::Receiver<ChangeEvent>,
}

impl Watch {
    /// Wraps a backend's broadcast receiver, filtering to `prefix`.
    pub fn new(prefix: impl Into<String>, receiver: broadcast::Receiver<ChangeEvent>) -> Self {
        Self {
            prefix: prefix.into(),
            receiver,
        }
    }

    /// The prefix this feed is scoped to.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Waits for the next change under the prefix.
    ///
    /// Returns `None` once the store is gone. If the subscriber fell
    /// behind, a single [`Change::Resync`] event keyed by the prefix is
    /// delivered in place of the lost events.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.key.starts_with(&self.prefix) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(prefix = %self.prefix, skipped, "watch lagged, requesting resync");
                    return Some(ChangeEvent {
                        key: self.prefix.clone(),
                        change: Change::Resync,
                    });
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(key: &str) -> ChangeEvent {
        ChangeEvent {
            key: key.into(),
            change: Change::Put(b"{}".to_vec()),
        }
    }

    #[tokio::test]
    async fn test_next_filters_by_prefix() {
        let (tx, rx) = broadcast::channel(8);
        let mut watch = Watch::new("lobbies/111111", rx);

        tx.send(put("lobbies/222222")).unwrap();
        tx.send(put("lobbies/111111/typing/a")).unwrap();

        let event = watch.next().await.unwrap();
        assert_eq!(event.key, "lobbies/111111/typing/a");
    }

    #[tokio::test]
    async fn test_next_returns_none_when_closed() {
        let (tx, rx) = broadcast::channel(8);
        let mut watch = Watch::new("x", rx);
        drop(tx);
        assert!(watch.next().await.is_none());
    }

    #[tokio::test]
    async fn test_next_reports_resync_on_lag() {
        let (tx, rx) = broadcast::channel(2);
        let mut watch = Watch::new("k", rx);
        for _ in 0..5 {
            tx.send(put("k")).unwrap();
        }
        let event = watch.next().await.unwrap();
        assert_eq!(event.change, Change::Resync);
        assert_eq!(event.key, "k");
    }
}
