use secrecy::SecretString;
use serde::Deserialize;

/// Object storage credentials
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Storage service endpoint (e.g. `https://oss-cn-hangzhou.aliyuncs.com`)
    pub endpoint: String,
    /// Storage region
    #[serde(default)]
    pub region: String,
    /// Access key identifier
    pub access_key: SecretString,
    /// Access key secret
    pub secret_key: SecretString,
    /// Bucket receiving uploads
    pub bucket: String,
    /// Public domain serving the bucket, if any
    #[serde(default)]
    pub domain: Option<String>,
}

impl StorageConfig {
    /// Public URL of an object stored under `key`
    pub fn object_url(&self, key: &str) -> String {
        match self.domain.as_deref().filter(|d| !d.is_empty()) {
            Some(domain) => format!("{}/{key}", domain.trim_end_matches('/')),
            None => format!("{}/{}/{key}", self.endpoint.trim_end_matches('/'), self.bucket),
        }
    }
}
