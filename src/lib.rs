//! Session-state synchronization for password-based identity providers.
//!
//! The crate keeps one process-local mirror of the auth state a hosted
//! identity provider (GoTrue/Supabase style) holds for the current user.
//! Credentials go out through [`CredentialSubmission`], state comes back on
//! the provider's change stream, and [`SessionStateSync`] turns each
//! notification into exactly one [`AuthUiState`] delivery to the registered
//! observer. [`AuthClient`] wires the pieces together around any
//! [`IdentityProvider`].

pub mod client;
pub mod config;
pub mod error;
pub mod provider;
pub mod session;
pub mod submission;
pub mod sync;

pub use client::AuthClient;
pub use config::ProviderConfig;
pub use error::Error;
pub use provider::{GoTrueProvider, IdentityProvider, MockProvider, SignUpOutcome};
pub use session::{AuthChange, AuthUiState, ChangeKind, Session};
pub use submission::{CredentialSubmission, SubmitMode, SubmitOutcome};
pub use sync::{SessionStateSync, SubscriptionHandle};
