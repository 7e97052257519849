//! Cancellable delayed task.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A future that runs after `delay` unless cancelled first.
///
/// The future is built up front, so everything it needs (who scheduled
/// it, for which lobby) is captured by value at schedule time. It should
/// re-validate that snapshot when it runs.
///
/// Dropping the handle cancels the task if it hasn't fired yet; use
/// [`detach`](Self::detach) to let it run unattended.
pub struct DelayedTask {
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl DelayedTask {
    /// Spawns `task` to run after `delay`. Must be called inside a Tokio
    /// runtime.
    pub fn spawn<F>(delay: Duration, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            tokio::select! {
                // A dropped sender without a send means "detached".
                _ = async {
                    if cancel_rx.await.is_err() {
                        std::future::pending::<()>().await;
                    }
                } => {
                    tracing::trace!("delayed task cancelled");
                }
                _ = tokio::time::sleep(delay) => task.await,
            }
        });
        Self {
            cancel: Some(cancel_tx),
            handle,
        }
    }

    /// Cancels the task if it hasn't started running.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    /// Lets the task run even though the handle goes away.
    pub fn detach(mut self) {
        drop(self.cancel.take());
    }

    /// `true` once the task has run to completion or been cancelled.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for DelayedTask {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}
