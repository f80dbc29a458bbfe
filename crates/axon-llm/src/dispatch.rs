//! Provider selection
//!
//! A closed set of provider identifiers mapped onto adapter constructors.
//! Unknown identifiers select the `OpenAI` adapter instead of failing, so a
//! caller that needs strict validation parses [`ProviderKind`] itself.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use axon_config::ClientConfig;
use thiserror::Error;

use crate::classify::{AI360_RULES, ErrorRule, OPENAI_RULES};
use crate::error::LlmError;
use crate::provider::Provider;
use crate::provider::openai::OpenAiProvider;
use crate::provider::xfyun::XfyunProvider;
use crate::storage::ObjectStorage;

/// Known provider identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Azure,
    Xfyun,
    DeepSeek,
    Ai360,
    Cloudflare,
    Hyperbolic,
    Siliconflow,
    Groq,
}

/// Identifier that names no known provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown provider `{0}`")]
pub struct UnknownProvider(pub String);

impl ProviderKind {
    pub const ALL: [Self; 9] = [
        Self::OpenAi,
        Self::Azure,
        Self::Xfyun,
        Self::DeepSeek,
        Self::Ai360,
        Self::Cloudflare,
        Self::Hyperbolic,
        Self::Siliconflow,
        Self::Groq,
    ];

    /// Identifier as written in configuration
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Azure => "Azure",
            Self::Xfyun => "Xfyun",
            Self::DeepSeek => "DeepSeek",
            Self::Ai360 => "360AI",
            Self::Cloudflare => "Cloudflare",
            Self::Hyperbolic => "Hyperbolic",
            Self::Siliconflow => "Siliconflow",
            Self::Groq => "groq",
        }
    }

    /// Base URL used when the client configuration sets none
    ///
    /// Azure and Cloudflare endpoints are account specific and must be
    /// configured explicitly.
    pub const fn default_base_url(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("https://api.openai.com/v1"),
            Self::Xfyun => Some("https://spark-api.xf-yun.com/v4.0"),
            Self::DeepSeek => Some("https://api.deepseek.com/v1"),
            Self::Ai360 => Some("https://api.360.cn/v1"),
            Self::Hyperbolic => Some("https://api.hyperbolic.xyz/v1"),
            Self::Siliconflow => Some("https://api.siliconflow.cn/v1"),
            Self::Groq => Some("https://api.groq.com/openai/v1"),
            Self::Azure | Self::Cloudflare => None,
        }
    }

    /// `(status, code)` table used to classify this vendor's HTTP errors
    pub const fn error_rules(self) -> &'static [ErrorRule] {
        match self {
            Self::Ai360 => AI360_RULES,
            _ => OPENAI_RULES,
        }
    }

    /// Whether the vendor speaks the `OpenAI` protocol without being `OpenAI`
    pub const fn is_compatible(self) -> bool {
        !matches!(self, Self::OpenAi | Self::Azure | Self::Xfyun)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownProvider(s.to_owned()))
    }
}

/// Provider kind for a configured identifier, falling back to `OpenAI`
pub fn resolve_kind(provider: &str) -> ProviderKind {
    provider.parse().unwrap_or_else(|e: UnknownProvider| {
        tracing::warn!(provider, error = %e, "falling back to OpenAI adapter");
        ProviderKind::OpenAi
    })
}

/// Build the adapter serving `config`
///
/// `storage` is only used to publish generated images by URL. Construction
/// fails on a malformed proxy URL, a malformed Xfyun credential or a missing
/// base URL for vendors without a default.
pub fn build_client(
    config: &ClientConfig,
    storage: Option<Arc<dyn ObjectStorage>>,
) -> Result<Arc<dyn Provider>, LlmError> {
    let kind = resolve_kind(&config.provider);

    tracing::info!(provider = %kind, model = %config.model, "building provider client");

    let client: Arc<dyn Provider> = match kind {
        ProviderKind::Xfyun => Arc::new(XfyunProvider::new(config)?),
        other => Arc::new(OpenAiProvider::new(other, config, storage)?),
    };

    Ok(client)
}
