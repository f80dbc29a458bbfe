use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

use crate::storage::StorageConfig;

/// Construction parameters for a single provider client
///
/// Values are read once when the client is built and never change afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Provider selection key (e.g. "OpenAI", "Xfyun", "DeepSeek")
    pub provider: String,
    /// Model name sent upstream
    pub model: String,
    /// Credential for the provider
    ///
    /// For Xfyun this is `app_id|api_secret|api_key`.
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Request path override
    #[serde(default)]
    pub path: Option<String>,
    /// Whether the upstream accepts a `system` message; unset means supported
    #[serde(default)]
    pub supports_system_role: Option<bool>,
    /// Outbound proxy URL
    #[serde(default)]
    pub proxy_url: Option<String>,
    /// Object storage used to publish generated images
    #[serde(default)]
    pub storage: Option<StorageConfig>,
}

impl ClientConfig {
    /// Create a config with only the provider and model set
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            api_key: None,
            base_url: None,
            path: None,
            supports_system_role: None,
            proxy_url: None,
            storage: None,
        }
    }

    /// Set the credential
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Set the request path
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Resolved system-role support flag
    pub fn system_role_supported(&self) -> bool {
        self.supports_system_role.unwrap_or(true)
    }
}
