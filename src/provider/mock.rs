use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, Notify, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::error::Error;
use crate::provider::{ChangeFeed, IdentityProvider, SignUpOutcome};
use crate::session::{AuthChange, ChangeKind, Session};

/// Calls a [`MockProvider`] has served, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    SignIn { email: String },
    SignUp { email: String },
    SignOut,
    Refresh,
}

/// Scripted in-process provider for tests and offline UI work.
///
/// Unscripted calls succeed: sign-in fabricates a session, sign-up reports a
/// pending confirmation. Queue explicit results with
/// [`script_sign_in`](MockProvider::script_sign_in) and
/// [`script_sign_up`](MockProvider::script_sign_up) to exercise other paths.
pub struct MockProvider {
    sign_in_results: Mutex<VecDeque<Result<Session, Error>>>,
    sign_up_results: Mutex<VecDeque<Result<SignUpOutcome, Error>>>,
    /// When set, the next sign-in waits here before answering
    sign_in_gate: Mutex<Option<Arc<Notify>>>,
    session: RwLock<Option<Session>>,
    calls: Mutex<Vec<MockCall>>,
    issued: AtomicU64,
    changes: ChangeFeed,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            sign_in_results: Mutex::new(VecDeque::new()),
            sign_up_results: Mutex::new(VecDeque::new()),
            sign_in_gate: Mutex::new(None),
            session: RwLock::new(None),
            calls: Mutex::new(Vec::new()),
            issued: AtomicU64::new(0),
            changes: ChangeFeed::new(),
        }
    }

    /// Queue the result of the next unserved sign-in call.
    pub fn script_sign_in(&self, result: Result<Session, Error>) {
        self.sign_in_results.lock().unwrap().push_back(result);
    }

    /// Queue the result of the next unserved sign-up call.
    pub fn script_sign_up(&self, result: Result<SignUpOutcome, Error>) {
        self.sign_up_results.lock().unwrap().push_back(result);
    }

    /// Make the next sign-in block until the returned handle is notified.
    pub fn hold_next_sign_in(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.sign_in_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Fabricate a plausible session for `email`.
    pub fn issue_session(&self, email: &str) -> Session {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        Session {
            user_id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            access_token: format!("mock-access-{}", n),
            refresh_token: Some(format!("mock-refresh-{}", n)),
            token_type: "bearer".to_string(),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        }
    }

    /// Inject a provider-originated change, e.g. a sign-out that happened on
    /// another surface. The held session is updated to match.
    pub async fn emit(&self, change: AuthChange) {
        *self.session.write().await = change.session.clone();
        self.changes.emit(change);
    }

    /// Every call served so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: MockCall) {
        debug!(call = ?call, "mock provider call");
        self.calls.lock().unwrap().push(call);
    }

    async fn install_session(&self, session: Session, kind: ChangeKind) {
        *self.session.write().await = Some(session.clone());
        self.changes.emit(AuthChange {
            kind,
            session: Some(session),
        });
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        _password: &str,
    ) -> Result<Session, Error> {
        self.record(MockCall::SignIn {
            email: email.to_string(),
        });

        let gate = self.sign_in_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let scripted = self.sign_in_results.lock().unwrap().pop_front();
        let session = match scripted {
            Some(Ok(session)) => session,
            Some(Err(e)) => return Err(e),
            None => self.issue_session(email),
        };

        self.install_session(session.clone(), ChangeKind::SignedIn)
            .await;
        Ok(session)
    }

    async fn sign_up(&self, email: &str, _password: &str) -> Result<SignUpOutcome, Error> {
        self.record(MockCall::SignUp {
            email: email.to_string(),
        });

        let scripted = self.sign_up_results.lock().unwrap().pop_front();
        let outcome = match scripted {
            Some(Ok(outcome)) => outcome,
            Some(Err(e)) => return Err(e),
            None => SignUpOutcome::ConfirmationRequired {
                email: email.to_string(),
            },
        };

        if let SignUpOutcome::SignedIn(session) = &outcome {
            self.install_session(session.clone(), ChangeKind::SignedIn)
                .await;
        }
        Ok(outcome)
    }

    async fn sign_out(&self) -> Result<(), Error> {
        self.record(MockCall::SignOut);
        self.session.write().await.take();
        // Emitted unconditionally, matching providers that report sign-out
        // even when no session was held.
        self.changes.emit(AuthChange::signed_out());
        Ok(())
    }

    async fn refresh_session(&self) -> Result<Session, Error> {
        self.record(MockCall::Refresh);

        let held = self.session.read().await.clone();
        let Some(previous) = held else {
            return Err(Error::auth("no session to refresh"));
        };

        let mut refreshed = self.issue_session(&previous.email);
        refreshed.user_id = previous.user_id;
        self.install_session(refreshed.clone(), ChangeKind::TokenRefreshed)
            .await;
        Ok(refreshed)
    }

    fn changes(&self) -> broadcast::Receiver<AuthChange> {
        self.changes.subscribe()
    }

    async fn current_session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }
}
