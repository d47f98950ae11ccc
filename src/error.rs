use thiserror::Error;

/// Common error type for everything the crate does.
///
/// `ProviderInit` is fatal for the component that hit it; `Auth` and
/// `SubmissionInFlight` are recoverable and safe to surface to the user;
/// `AlreadySubscribed` indicates a caller bug.
#[derive(Error, Debug)]
pub enum Error {
    /// The provider client could not be constructed (bad URL, missing key)
    #[error("provider initialization error: {message}")]
    ProviderInit {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An authentication call was rejected by the provider or the transport
    #[error("authentication error: {message}")]
    Auth {
        message: String,
        /// HTTP status from the provider, when one was received
        status: Option<u16>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A second state listener was registered while one was active
    #[error("a state listener is already subscribed")]
    AlreadySubscribed,

    /// A credential submission arrived while another was still in flight
    #[error("a credential submission is already in flight")]
    SubmissionInFlight,
}

impl Error {
    /// Create a new provider initialization error
    pub fn provider_init(message: impl Into<String>) -> Self {
        Self::ProviderInit {
            message: message.into(),
            source: None,
        }
    }

    /// Create a provider initialization error with a source
    pub fn provider_init_with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ProviderInit {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new authentication error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// Create an authentication error carrying the provider's HTTP status
    pub fn auth_with_status(message: impl Into<String>, status: u16) -> Self {
        Self::Auth {
            message: message.into(),
            status: Some(status),
            source: None,
        }
    }

    /// Create an authentication error with a source
    pub fn auth_with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Auth {
            message: message.into(),
            status: None,
            source: Some(source.into()),
        }
    }

    /// Whether the caller can reasonably show this to the user and move on
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::SubmissionInFlight)
    }

    /// The provider's HTTP status, if this error carries one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. } => *status,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_provider_message() {
        let err = Error::auth_with_status("Invalid login credentials", 400);
        assert_eq!(
            err.to_string(),
            "authentication error: Invalid login credentials"
        );
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn test_recoverability_split_matches_taxonomy() {
        assert!(Error::auth("bad password").is_recoverable());
        assert!(Error::SubmissionInFlight.is_recoverable());
        assert!(!Error::provider_init("no key").is_recoverable());
        assert!(!Error::AlreadySubscribed.is_recoverable());
    }

    #[test]
    fn test_source_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "socket closed");
        let err = Error::auth_with_source("could not reach provider", io);
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.status(), None);
    }
}
