use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::Error;
use crate::session::{AuthChange, Session};

pub mod gotrue;
pub mod mock;

pub use gotrue::GoTrueProvider;
pub use mock::MockProvider;

/// Capacity of the change stream between a provider and its subscribers
const CHANGE_STREAM_CAPACITY: usize = 64;

/// What a sign-up call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SignUpOutcome {
    /// The provider auto-confirmed the address and issued a session
    SignedIn(Session),
    /// The provider sent a confirmation email; no session exists yet
    ConfirmationRequired { email: String },
}

/// Common interface to a hosted identity provider.
///
/// Implementations own the wire protocol and the currently held session.
/// Every successful state transition must also be emitted on the change
/// stream returned by [`changes`](IdentityProvider::changes); failed calls
/// emit nothing.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Provider name for logging and diagnostics
    fn name(&self) -> &str;

    /// Exchange an email/password pair for a session.
    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<Session, Error>;

    /// Register a new identity with an email/password pair.
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, Error>;

    /// End the current session locally and, best effort, provider-side.
    async fn sign_out(&self) -> Result<(), Error>;

    /// Trade the held refresh token for a fresh session.
    async fn refresh_session(&self) -> Result<Session, Error>;

    /// Subscribe to auth-state changes.
    ///
    /// Changes emitted before the first subscription are dropped. The stream
    /// retains the most recent 64 changes; a receiver that falls further
    /// behind skips the overwritten ones and resumes from the oldest retained
    /// change. Every change carries full replacement state, so one delivered
    /// change is enough to catch back up.
    fn changes(&self) -> broadcast::Receiver<AuthChange>;

    /// The session the provider currently holds, if any.
    async fn current_session(&self) -> Option<Session>;
}

/// Fan-out for auth-state changes, shared by provider implementations.
#[derive(Debug, Clone)]
pub(crate) struct ChangeFeed {
    sender: broadcast::Sender<AuthChange>,
}

impl ChangeFeed {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANGE_STREAM_CAPACITY);
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.sender.subscribe()
    }

    /// Publish a change to every live receiver.
    pub(crate) fn emit(&self, change: AuthChange) {
        let kind = change.kind;
        match self.sender.send(change) {
            Ok(receivers) => {
                debug!(kind = kind.as_str(), receivers, "auth change emitted");
            }
            Err(_) => {
                debug!(kind = kind.as_str(), "auth change emitted with no subscribers");
            }
        }
    }
}
