use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Error;
use crate::provider::{IdentityProvider, SignUpOutcome};
use crate::session::Session;

/// Which credential form is being submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    SignIn,
    SignUp,
}

impl SubmitMode {
    /// The other mode. Sign-in surfaces flip between the two.
    pub fn toggle(self) -> Self {
        match self {
            Self::SignIn => Self::SignUp,
            Self::SignUp => Self::SignIn,
        }
    }

    /// Label for the submit control in this mode.
    pub fn submit_label(&self) -> &'static str {
        match self {
            Self::SignIn => "Sign in",
            Self::SignUp => "Create account",
        }
    }
}

/// What a credential submission produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The provider issued a session; the user is signed in
    SignedIn(Session),
    /// Sign-up was accepted and a confirmation email sent; still signed out
    ConfirmationRequired { email: String },
}

/// Hands credentials to the provider, one submission at a time.
///
/// A second submission while one is awaiting the provider fails fast with
/// [`Error::SubmissionInFlight`] instead of queueing, the programmatic
/// equivalent of a submit button that is disabled while the request runs.
pub struct CredentialSubmission {
    provider: Arc<dyn IdentityProvider>,
    busy: AtomicBool,
}

/// Clears the busy flag when the submission ends, error paths included.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl CredentialSubmission {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            busy: AtomicBool::new(false),
        }
    }

    /// Whether a submission is currently awaiting the provider.
    pub fn in_flight(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Validate and hand the credentials to the provider.
    ///
    /// Validation stops at presence: both fields must be non-empty, nothing
    /// more. The provider's verdict comes back unchanged, and a rejected
    /// submission is never retried.
    pub async fn submit(
        &self,
        mode: SubmitMode,
        email: &str,
        password: &str,
    ) -> Result<SubmitOutcome, Error> {
        if email.is_empty() {
            return Err(Error::auth("email must not be empty"));
        }
        if password.is_empty() {
            return Err(Error::auth("password must not be empty"));
        }

        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("submission rejected, another is in flight");
            return Err(Error::SubmissionInFlight);
        }
        let _guard = BusyGuard(&self.busy);

        debug!(mode = ?mode, provider = self.provider.name(), "submitting credentials");
        match mode {
            SubmitMode::SignIn => {
                let session = self.provider.sign_in_with_password(email, password).await?;
                Ok(SubmitOutcome::SignedIn(session))
            }
            SubmitMode::SignUp => match self.provider.sign_up(email, password).await? {
                SignUpOutcome::SignedIn(session) => Ok(SubmitOutcome::SignedIn(session)),
                SignUpOutcome::ConfirmationRequired { email } => {
                    debug!(email = %email, "sign-up accepted, awaiting confirmation");
                    Ok(SubmitOutcome::ConfirmationRequired { email })
                }
            },
        }
    }

    /// End the current session via the provider.
    ///
    /// Sign-out is not gated by the busy flag; it can always be requested.
    pub async fn sign_out(&self) -> Result<(), Error> {
        self.provider.sign_out().await
    }
}
