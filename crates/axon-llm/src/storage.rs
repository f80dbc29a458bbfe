//! Object storage used to publish generated images

use async_trait::async_trait;
use rand::Rng;
use rand::distr::Alphanumeric;

use crate::error::LlmError;

/// Key prefix for uploaded images
const IMAGE_KEY_PREFIX: &str = "axon";

/// Uploads bytes and returns a publicly reachable URL
///
/// Only called when an image must be returned by URL but the provider
/// produced inline data.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, data: Vec<u8>, key: &str) -> Result<String, LlmError>;
}

/// Fresh object key for a generated image (`axon/<8 alphanumerics>.jpg`)
pub fn image_key() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();

    format!("{IMAGE_KEY_PREFIX}/{suffix}.jpg")
}
