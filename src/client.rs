use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::provider::IdentityProvider;
use crate::session::{AuthUiState, Session};
use crate::submission::{CredentialSubmission, SubmitMode, SubmitOutcome};
use crate::sync::{SessionStateSync, SubscriptionHandle};

/// One provider, one state mirror, and the pump between them.
///
/// The client owns the only subscription to the provider's change stream and
/// forwards every notification to a [`SessionStateSync`] in emission order.
/// Changes cross a channel on the way, so the mirror reflects a completed
/// call once the runtime has polled the pump task, not within the call
/// itself.
///
/// The channel buffers 64 changes. With at most one submission in flight and
/// a pump that does nothing but forward, a backlog that deep requires the
/// pump to go unpolled while dozens of changes are emitted; should that
/// happen, the oldest changes are skipped with a warning and the next
/// delivered change carries the full replacement state.
///
/// Must be constructed inside a Tokio runtime.
pub struct AuthClient {
    provider: Arc<dyn IdentityProvider>,
    sync: Arc<SessionStateSync>,
    submission: CredentialSubmission,
    pump: JoinHandle<()>,
}

impl AuthClient {
    /// Wire a client to `provider` and start pumping its change stream.
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let sync = Arc::new(SessionStateSync::new());
        let mut changes = provider.changes();

        let pump = tokio::spawn({
            let sync = Arc::clone(&sync);
            async move {
                loop {
                    match changes.recv().await {
                        Ok(change) => sync.apply(change).await,
                        Err(RecvError::Lagged(skipped)) => {
                            // The next applied change carries the full
                            // replacement state, so the mirror recovers on
                            // its own.
                            warn!(skipped, "auth change stream lagged");
                        }
                        Err(RecvError::Closed) => {
                            debug!("auth change stream closed, pump stopping");
                            break;
                        }
                    }
                }
            }
        });

        info!(provider = provider.name(), "auth client started");

        Self {
            submission: CredentialSubmission::new(Arc::clone(&provider)),
            provider,
            sync,
            pump,
        }
    }

    /// Register the single state observer.
    ///
    /// See [`SessionStateSync::subscribe`] for the single-observer rules.
    pub async fn subscribe<F>(&self, on_change: F) -> Result<SubscriptionHandle, Error>
    where
        F: Fn(AuthUiState) + Send + Sync + 'static,
    {
        self.sync.subscribe(on_change).await
    }

    /// Remove the observer registered under `handle`.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.sync.unsubscribe(handle).await
    }

    /// Submit credentials in the given mode.
    pub async fn submit(
        &self,
        mode: SubmitMode,
        email: &str,
        password: &str,
    ) -> Result<SubmitOutcome, Error> {
        self.submission.submit(mode, email, password).await
    }

    /// Sign in with an email/password pair.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SubmitOutcome, Error> {
        self.submit(SubmitMode::SignIn, email, password).await
    }

    /// Register a new identity.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SubmitOutcome, Error> {
        self.submit(SubmitMode::SignUp, email, password).await
    }

    /// End the current session.
    pub async fn sign_out(&self) -> Result<(), Error> {
        self.submission.sign_out().await
    }

    /// Trade the held refresh token for a fresh session.
    pub async fn refresh_session(&self) -> Result<Session, Error> {
        self.provider.refresh_session().await
    }

    /// Whether a credential submission is currently in flight.
    pub fn in_flight(&self) -> bool {
        self.submission.in_flight()
    }

    /// Current projection of the mirrored session.
    pub async fn ui_state(&self) -> AuthUiState {
        self.sync.ui_state().await
    }

    /// The mirrored session, if any.
    pub async fn session(&self) -> Option<Session> {
        self.sync.session().await
    }
}

impl Drop for AuthClient {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
