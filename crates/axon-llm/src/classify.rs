//! Mapping of vendor error vocabularies onto [`ErrorKind`]
//!
//! Every function here is pure: the same status and code always yield the
//! same kind, and an unmatched error is handed back unchanged.

use crate::error::{ApiError, ErrorKind, LlmError};

/// One `(status, code) => kind` entry
///
/// A rule without a code matches any code for its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorRule {
    pub status: u16,
    pub code: Option<&'static str>,
    pub kind: ErrorKind,
}

impl ErrorRule {
    const fn new(status: u16, code: Option<&'static str>, kind: ErrorKind) -> Self {
        Self { status, code, kind }
    }

    fn matches(&self, status: u16, code: Option<&str>) -> bool {
        self.status == status && self.code.is_none_or(|expected| code == Some(expected))
    }
}

/// Rules shared by `OpenAI`, Azure and the OpenAI-compatible vendors
pub const OPENAI_RULES: &[ErrorRule] = &[
    ErrorRule::new(400, Some("context_length_exceeded"), ErrorKind::ContextLengthExceeded),
    ErrorRule::new(401, Some("invalid_api_key"), ErrorKind::InvalidApiKey),
    ErrorRule::new(404, None, ErrorKind::ModelNotFound),
    ErrorRule::new(429, Some("insufficient_quota"), ErrorKind::InsufficientQuota),
];

/// Rules for 360AI, which reports numeric vendor codes
pub const AI360_RULES: &[ErrorRule] = &[
    ErrorRule::new(400, Some("1001"), ErrorKind::ContextLengthExceeded),
    ErrorRule::new(401, Some("1002"), ErrorKind::InvalidApiKey),
    ErrorRule::new(401, Some("1004"), ErrorKind::InsufficientQuota),
    ErrorRule::new(401, Some("1006"), ErrorKind::InsufficientQuota),
    ErrorRule::new(404, None, ErrorKind::ModelNotFound),
    ErrorRule::new(429, Some("1005"), ErrorKind::ContextLengthExceeded),
];

/// Spark frame codes meaning the conversation is too long
pub const SPARK_CONTEXT_LENGTH_CODES: &[i64] = &[10163, 10907];

/// First matching kind for a status and vendor code
pub fn classify(rules: &[ErrorRule], status: u16, code: Option<&str>) -> Option<ErrorKind> {
    rules.iter().find(|rule| rule.matches(status, code)).map(|rule| rule.kind)
}

/// Reclassify a provider error, passing it through when no rule matches
pub fn classify_api_error(rules: &[ErrorRule], error: ApiError) -> LlmError {
    match classify(rules, error.status, error.code.as_deref()) {
        Some(kind) => with_kind(kind, error),
        None => LlmError::Api(error),
    }
}

/// Classify a non-zero status code from a socket frame header
pub fn classify_frame_code(code: i64, message: &str, raw: String) -> LlmError {
    if SPARK_CONTEXT_LENGTH_CODES.contains(&code) {
        return LlmError::ContextLengthExceeded { raw };
    }

    LlmError::Api(ApiError {
        status: 500,
        code: Some(code.to_string()),
        error_type: Some("api_error".to_owned()),
        message: message.to_owned(),
        raw,
    })
}

fn with_kind(kind: ErrorKind, error: ApiError) -> LlmError {
    let raw = error.raw.clone();
    match kind {
        ErrorKind::ContextLengthExceeded => LlmError::ContextLengthExceeded { raw },
        ErrorKind::InvalidApiKey => LlmError::InvalidApiKey { raw },
        ErrorKind::InsufficientQuota => LlmError::InsufficientQuota { raw },
        ErrorKind::ModelNotFound => LlmError::ModelNotFound { raw },
        ErrorKind::RequestError => LlmError::Request {
            status: Some(error.status),
            message: error.message,
        },
        ErrorKind::Unknown => LlmError::Api(error),
    }
}
