use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Error;
use crate::session::{AuthChange, AuthUiState, Session};

/// Proof of an active subscription, needed to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle(Uuid);

type ChangeListener = Box<dyn Fn(AuthUiState) + Send + Sync>;

/// Everything guarded by the sync lock.
struct SyncState {
    session: Option<Session>,
    listener: Option<(Uuid, ChangeListener)>,
    deliveries: u64,
}

/// Mirrors the provider's auth state for exactly one observer.
///
/// All notifications flow through [`apply`](SessionStateSync::apply), which
/// replaces the held session, recomputes the UI projection, and invokes the
/// listener before returning. Notifications are never deduplicated: two
/// identical sign-outs mean two listener invocations.
pub struct SessionStateSync {
    state: RwLock<SyncState>,
}

impl SessionStateSync {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SyncState {
                session: None,
                listener: None,
                deliveries: 0,
            }),
        }
    }

    /// Register the observer. At most one may exist at a time; a second call
    /// fails with [`Error::AlreadySubscribed`] until the first handle is
    /// unsubscribed.
    ///
    /// The listener is invoked while internal state is locked, so it must
    /// not call back into this object.
    pub async fn subscribe<F>(&self, on_change: F) -> Result<SubscriptionHandle, Error>
    where
        F: Fn(AuthUiState) + Send + Sync + 'static,
    {
        let mut state = self.state.write().await;
        if state.listener.is_some() {
            warn!("subscribe rejected, a listener is already registered");
            return Err(Error::AlreadySubscribed);
        }

        let subscription = Uuid::new_v4();
        state.listener = Some((subscription, Box::new(on_change)));
        debug!(subscription = %subscription, "state listener subscribed");
        Ok(SubscriptionHandle(subscription))
    }

    /// Tear down the subscription behind `handle`.
    ///
    /// Returns whether a subscription was actually removed. Handles that were
    /// already unsubscribed, or that belong to an earlier subscription, are
    /// ignored.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut state = self.state.write().await;
        match &state.listener {
            Some((subscription, _)) if *subscription == handle.0 => {
                state.listener = None;
                debug!(subscription = %handle.0, "state listener unsubscribed");
                true
            }
            _ => {
                debug!(subscription = %handle.0, "unsubscribe ignored, handle not active");
                false
            }
        }
    }

    /// Apply one provider notification: replace the session, recompute the
    /// projection, and deliver it to the listener before returning.
    pub async fn apply(&self, change: AuthChange) {
        let mut state = self.state.write().await;
        let kind = change.kind;
        state.session = change.session;
        let ui = AuthUiState::project(state.session.as_ref());

        let delivered = if let Some((subscription, listener)) = &state.listener {
            listener(ui.clone());
            debug!(
                kind = kind.as_str(),
                subscription = %subscription,
                signed_in = ui.signed_in,
                "auth change delivered"
            );
            true
        } else {
            debug!(kind = kind.as_str(), "auth change applied with no listener");
            false
        };

        if delivered {
            state.deliveries += 1;
        }
    }

    /// Current projection of the held session.
    pub async fn ui_state(&self) -> AuthUiState {
        let state = self.state.read().await;
        AuthUiState::project(state.session.as_ref())
    }

    /// The session as of the latest applied notification.
    pub async fn session(&self) -> Option<Session> {
        self.state.read().await.session.clone()
    }

    /// How many notifications have been delivered to a listener.
    pub async fn deliveries(&self) -> u64 {
        self.state.read().await.deliveries
    }
}

impl Default for SessionStateSync {
    fn default() -> Self {
        Self::new()
    }
}
