//! Provider configuration.
//!
//! The host passes the provider configuration as JSON. The API key may be
//! omitted there and supplied through the `NEON_API_KEY` environment variable
//! instead.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Environment variable consulted when the configuration has no API key.
pub const API_KEY_ENV: &str = "NEON_API_KEY";

/// Name and version of the provider build, used to identify API calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    /// Provider name.
    pub name: String,
    /// Provider version.
    pub version: String,
}

impl ProviderInfo {
    /// Info for a named build.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Info taken from this crate's package metadata.
    pub fn from_package() -> Self {
        Self::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }

    /// The user agent handed to the API client.
    pub fn user_agent(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }
}

/// Provider configuration as declared by the user.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Neon API key.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| crate::state::REDACTED))
            .finish()
    }
}

impl ProviderConfig {
    /// Parse the host-supplied JSON. `null` is treated as an empty object.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ProviderError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
            .map_err(|e| ProviderError::Configuration(format!("invalid provider config: {}", e)))
    }

    /// Whether the configuration itself carries a usable API key.
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    /// Resolve the API key, falling back to [`API_KEY_ENV`] through `lookup`.
    pub fn resolve_api_key<F>(&self, lookup: F) -> Result<String, ProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| lookup(API_KEY_ENV).filter(|key| !key.trim().is_empty()))
            .ok_or_else(|| {
                ProviderError::Configuration(format!(
                    "Neon API key is not set: provide `api_key` or the {} environment variable",
                    API_KEY_ENV
                ))
            })
    }

    /// Build the settings for the API client.
    pub fn client_config<F>(
        &self,
        info: &ProviderInfo,
        lookup: F,
    ) -> Result<ClientConfig, ProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(ClientConfig {
            api_key: self.resolve_api_key(lookup)?,
            user_agent: info.user_agent(),
        })
    }
}

/// Settings handed to a [`crate::api::ClientFactory`].
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Resolved API key.
    pub api_key: String,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &crate::state::REDACTED)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}
