//! Identity hook for resolving the acting user.
//!
//! Lobbysync doesn't implement sign-in. That's your identity provider's
//! job. Instead it defines the [`IdentityProvider`] trait: a ready-signal
//! that settles once, plus a way to read whoever is signed in *right now*.
//!
//! # Why two methods?
//!
//! At process start the provider may not know yet whether anyone is
//! signed in. Treating that early "nobody" as "signed out" produces false
//! "please log in" errors, so operations first await
//! [`wait_until_ready`](IdentityProvider::wait_until_ready). After that the
//! identity can still change at any time (sign-out, account switch), so
//! every operation re-reads [`current`](IdentityProvider::current) instead
//! of caching it across an `.await`.

use std::future::Future;
use std::sync::{Arc, OnceLock};

use lobbysync_protocol::Profile;
use tokio::sync::watch;

/// Resolves who is acting.
///
/// `Send + Sync + 'static` because the provider is shared by the
/// controller and the per-lobby session task.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Resolves once to the first settled auth state (`None` = signed
    /// out). Every later call returns that same first value immediately.
    fn wait_until_ready(&self) -> impl Future<Output = Option<Profile>> + Send;

    /// Who is signed in at this instant. `None` before the provider
    /// settles and while signed out.
    fn current(&self) -> Option<Profile>;
}

#[derive(Debug, Clone)]
enum AuthState {
    Pending,
    Settled(Option<Profile>),
}

/// An [`IdentityProvider`] driven by explicit [`set`](Self::set) calls.
///
/// Wrap your real provider's auth-state callback around `set`, or use it
/// directly in tests to simulate sign-in races and account switches.
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct WatchIdentity {
    state: Arc<watch::Sender<AuthState>>,
    first: Arc<OnceLock<Option<Profile>>>,
}

impl WatchIdentity {
    /// A provider that hasn't settled yet.
    pub fn pending() -> Self {
        let (state, _) = watch::channel(AuthState::Pending);
        Self {
            state: Arc::new(state),
            first: Arc::new(OnceLock::new()),
        }
    }

    /// A provider already settled with `profile` signed in.
    pub fn signed_in(profile: Profile) -> Self {
        let provider = Self::pending();
        provider.set(Some(profile));
        provider
    }

    /// Publishes a new auth state. The first call settles the provider.
    pub fn set(&self, profile: Option<Profile>) {
        // Record the first settled value before waking waiters.
        self.first.get_or_init(|| profile.clone());
        match &profile {
            Some(p) => tracing::debug!(identity = %p.identity, "identity changed"),
            None => tracing::debug!("identity cleared"),
        }
        self.state.send_replace(AuthState::Settled(profile));
    }
}

impl IdentityProvider for WatchIdentity {
    async fn wait_until_ready(&self) -> Option<Profile> {
        if let Some(first) = self.first.get() {
            return first.clone();
        }
        let mut rx = self.state.subscribe();
        let settled = rx
            .wait_for(|s| matches!(s, AuthState::Settled(_)))
            .await
            .is_ok();
        if settled {
            self.first.get().cloned().flatten()
        } else {
            None
        }
    }

    fn current(&self) -> Option<Profile> {
        match &*self.state.borrow() {
            AuthState::Settled(profile) => profile.clone(),
            AuthState::Pending => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn ana() -> Profile {
        Profile::new("uid-ana", "Ana", "owl")
    }

    #[tokio::test]
    async fn test_signed_in_is_ready_immediately() {
        let provider = WatchIdentity::signed_in(ana());
        assert_eq!(provider.wait_until_ready().await, Some(ana()));
        assert_eq!(provider.current(), Some(ana()));
    }

    #[tokio::test]
    async fn test_pending_current_is_none() {
        let provider = WatchIdentity::pending();
        assert_eq!(provider.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_ready_blocks_until_settled() {
        let provider = WatchIdentity::pending();
        let setter = provider.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            setter.set(Some(ana()));
        });

        let ready = provider.wait_until_ready().await;

        assert_eq!(ready, Some(ana()));
    }

    #[tokio::test]
    async fn test_wait_until_ready_returns_first_settled_state() {
        let provider = WatchIdentity::pending();
        provider.set(None);
        provider.set(Some(ana()));

        // The first settled state was "signed out", and it stays that way.
        assert_eq!(provider.wait_until_ready().await, None);
        // `current` reflects the latest state.
        assert_eq!(provider.current(), Some(ana()));
    }

    #[tokio::test]
    async fn test_current_tracks_account_switch() {
        let provider = WatchIdentity::signed_in(ana());
        let bo = Profile::new("uid-bo", "Bo", "cat");
        provider.set(Some(bo.clone()));
        assert_eq!(provider.current(), Some(bo));
        assert_eq!(provider.wait_until_ready().await, Some(ana()));
    }
}
