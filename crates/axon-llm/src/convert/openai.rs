//! Conversion from `OpenAI` wire format to canonical types

use crate::error::ApiError;
use crate::protocol::openai::{OpenAiChoice, OpenAiErrorResponse, OpenAiResponse};
use crate::types::{ChatCompletionResponse, Choice, FinishReason, Timing};

/// Map a raw finish reason onto [`FinishReason`]
///
/// Unknown or empty values read as "not finished".
pub fn parse_finish_reason(raw: &str) -> Option<FinishReason> {
    match raw {
        "stop" => Some(FinishReason::Stop),
        "length" => Some(FinishReason::Length),
        "function_call" => Some(FinishReason::FunctionCall),
        "tool_calls" => Some(FinishReason::ToolCalls),
        "content_filter" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

impl From<OpenAiChoice> for Choice {
    fn from(choice: OpenAiChoice) -> Self {
        Self {
            index: choice.index,
            message: choice.message,
            delta: choice.delta,
            finish_reason: choice.finish_reason.as_deref().and_then(parse_finish_reason),
        }
    }
}

impl From<OpenAiResponse> for ChatCompletionResponse {
    fn from(resp: OpenAiResponse) -> Self {
        Self {
            id: resp.id,
            object: resp.object,
            created: resp.created,
            model: resp.model,
            choices: resp.choices.into_iter().map(Into::into).collect(),
            usage: resp.usage,
            system_fingerprint: resp.system_fingerprint,
            timing: Timing::default(),
        }
    }
}

/// Build an [`ApiError`] from a non-success response body
///
/// Bodies that are not `OpenAI` error envelopes keep the raw text as message.
pub fn api_error_from_body(status: u16, body: &str) -> ApiError {
    match serde_json::from_str::<OpenAiErrorResponse>(body) {
        Ok(envelope) => {
            let detail = envelope.error;
            let code = detail.code.and_then(|code| match code {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            });

            ApiError {
                status,
                code,
                error_type: detail.error_type,
                message: detail.message,
                raw: body.to_owned(),
            }
        }
        Err(_) => ApiError {
            status,
            code: None,
            error_type: None,
            message: body.to_owned(),
            raw: body.to_owned(),
        },
    }
}
