use std::fmt;

use thiserror::Error;

/// Canonical error kinds callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Prompt plus completion exceed the model's context window
    ContextLengthExceeded,
    /// Credential rejected by the provider
    InvalidApiKey,
    /// Account has no remaining quota
    InsufficientQuota,
    /// Requested model does not exist upstream
    ModelNotFound,
    /// Transport-level failure, with the HTTP status when one was received
    RequestError,
    /// Anything else, passed through unchanged
    Unknown,
}

/// Provider error that matched no canonical kind
///
/// Carries everything the provider sent so operators can diagnose it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status, or 500 for socket-level protocol errors
    pub status: u16,
    /// Vendor error code (string codes are kept as-is, numeric ones stringified)
    pub code: Option<String>,
    /// Vendor error type
    pub error_type: Option<String>,
    /// Human-readable message
    pub message: String,
    /// Raw payload as received
    pub raw: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "api error (status {}", self.status)?;
        if let Some(code) = &self.code {
            write!(f, ", code {code}")?;
        }
        write!(f, "): {}", self.message)
    }
}

impl std::error::Error for ApiError {}

/// Errors that can occur during provider operations
#[derive(Debug, Error)]
pub enum LlmError {
    /// Prompt too long for the model
    #[error("context length exceeded: {raw}")]
    ContextLengthExceeded {
        /// Provider payload
        raw: String,
    },

    /// Credential rejected
    #[error("invalid api key: {raw}")]
    InvalidApiKey {
        /// Provider payload
        raw: String,
    },

    /// Quota exhausted
    #[error("insufficient quota: {raw}")]
    InsufficientQuota {
        /// Provider payload
        raw: String,
    },

    /// Model unknown to the provider
    #[error("model not found: {raw}")]
    ModelNotFound {
        /// Provider payload
        raw: String,
    },

    /// Transport failure (DNS, connect, read, undecodable body)
    #[error("request error{}: {message}", status_suffix(.status.as_ref()))]
    Request {
        /// HTTP status, if the upstream answered at all
        status: Option<u16>,
        /// Underlying cause
        message: String,
    },

    /// Provider error without a canonical mapping
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Caller cancelled the request
    #[error("request cancelled")]
    Cancelled,

    /// Operation has no implementation for this provider
    #[error("{operation} is not implemented for {provider}")]
    NotImplemented {
        /// Provider name
        provider: String,
        /// Operation name
        operation: &'static str,
    },

    /// Client could not be constructed from its configuration
    #[error("invalid client configuration: {0}")]
    Config(String),

    /// Caller sent a request the adapter cannot express
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

fn status_suffix(status: Option<&u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl LlmError {
    /// Canonical kind of this error
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ContextLengthExceeded { .. } => ErrorKind::ContextLengthExceeded,
            Self::InvalidApiKey { .. } => ErrorKind::InvalidApiKey,
            Self::InsufficientQuota { .. } => ErrorKind::InsufficientQuota,
            Self::ModelNotFound { .. } => ErrorKind::ModelNotFound,
            Self::Request { .. } => ErrorKind::RequestError,
            Self::Api(_)
            | Self::Cancelled
            | Self::NotImplemented { .. }
            | Self::Config(_)
            | Self::InvalidRequest(_)
            | Self::Internal(_) => ErrorKind::Unknown,
        }
    }

    /// HTTP status associated with the error, if any
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Request { status, .. } => *status,
            Self::Api(api) => Some(api.status),
            _ => None,
        }
    }

    /// Whether a retry against the same or another provider may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request { status, .. } => status.is_none_or(|s| s == 429 || s >= 500),
            Self::Api(api) => api.status == 429 || api.status >= 500,
            _ => false,
        }
    }

    /// Transport failure without an HTTP status
    pub fn request(message: impl fmt::Display) -> Self {
        Self::Request {
            status: None,
            message: message.to_string(),
        }
    }

    /// Provider payload retained for diagnostics
    pub fn raw(&self) -> Option<&str> {
        match self {
            Self::ContextLengthExceeded { raw }
            | Self::InvalidApiKey { raw }
            | Self::InsufficientQuota { raw }
            | Self::ModelNotFound { raw } => Some(raw),
            Self::Api(api) => Some(&api.raw),
            _ => None,
        }
    }
}
