use std::env;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;

/// Environment variable carrying the provider's base URL
pub const PROVIDER_URL_ENV: &str = "SESAME_PROVIDER_URL";
/// Environment variable carrying the provider's publishable (anon) API key
pub const ANON_KEY_ENV: &str = "SESAME_ANON_KEY";

fn default_timeout_secs() -> u64 {
    30
}

/// Connection settings for a hosted identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the provider project, e.g. `https://example.supabase.co`
    pub url: String,
    /// Publishable API key sent with every request
    pub anon_key: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// Build a config and validate it immediately.
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Result<Self, Error> {
        let config = Self {
            url: url.into(),
            anon_key: anon_key.into(),
            timeout_secs: default_timeout_secs(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Read the URL and key from `SESAME_PROVIDER_URL` / `SESAME_ANON_KEY`.
    pub fn from_env() -> Result<Self, Error> {
        let url = env::var(PROVIDER_URL_ENV)
            .map_err(|_| Error::provider_init(format!("{} is not set", PROVIDER_URL_ENV)))?;
        let anon_key = env::var(ANON_KEY_ENV)
            .map_err(|_| Error::provider_init(format!("{} is not set", ANON_KEY_ENV)))?;
        debug!(url = %url, "provider config loaded from environment");
        Self::new(url, anon_key)
    }

    /// Check that the URL parses as http(s) and the key is present.
    pub fn validate(&self) -> Result<(), Error> {
        if self.anon_key.trim().is_empty() {
            return Err(Error::provider_init("anon key must not be empty"));
        }
        let url = Url::parse(&self.url).map_err(|e| {
            Error::provider_init_with_source(format!("invalid provider URL '{}'", self.url), e)
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::provider_init(format!(
                "provider URL must be http(s), got '{}'",
                url.scheme()
            )));
        }
        Ok(())
    }

    /// Absolute URL of an auth endpoint, e.g. `auth_endpoint("token")`.
    pub(crate) fn auth_endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.url.trim_end_matches('/'), path)
    }

    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
