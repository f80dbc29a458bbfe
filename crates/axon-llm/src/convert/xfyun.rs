//! Conversion between canonical types and Spark frames

use crate::normalize::normalize_messages;
use crate::protocol::xfyun::{STATUS_FINAL, SparkMessage, SparkResponse, SparkText};
use crate::types::{
    COMPLETION_ID_PREFIX, ChatCompletionResponse, Choice, Delta, FinishReason, FunctionCall, Message,
    OBJECT_CHUNK, OBJECT_COMPLETION, Role, Usage,
};

/// Normalized history in Spark's message shape
///
/// Spark rejects a conversation made of a lone system message, so one is
/// re-labelled as `user`.
pub fn spark_messages(messages: &[Message], supports_system_role: bool) -> Vec<SparkMessage> {
    let mut normalized = normalize_messages(messages, supports_system_role);

    if let [only] = normalized.as_mut_slice()
        && only.role == Role::System
    {
        only.role = Role::User;
    }

    normalized
        .into_iter()
        .map(|m| SparkMessage {
            role: m.role.as_str(),
            content: m.content.as_text(),
        })
        .collect()
}

fn first_text(frame: &SparkResponse) -> Option<&SparkText> {
    frame.payload.as_ref()?.choices.text.first()
}

fn frame_usage(frame: &SparkResponse) -> Option<Usage> {
    frame.payload.as_ref()?.usage.as_ref().map(|u| u.text)
}

fn frame_seq(frame: &SparkResponse) -> u32 {
    frame.payload.as_ref().map_or(0, |p| p.choices.seq)
}

/// Whether this is the last frame of a generation
pub const fn is_final(frame: &SparkResponse) -> bool {
    frame.header.status == STATUS_FINAL
}

/// One streamed chunk per frame
pub fn spark_chunk(frame: &SparkResponse, model: &str, created: i64) -> ChatCompletionResponse {
    let text = first_text(frame);

    ChatCompletionResponse {
        id: format!("{COMPLETION_ID_PREFIX}{}", frame.header.sid),
        object: OBJECT_CHUNK.to_owned(),
        created,
        model: model.to_owned(),
        choices: vec![Choice {
            index: frame_seq(frame),
            message: None,
            delta: Some(Delta {
                role: Some(Role::Assistant),
                content: text.map(|t| t.content.clone()),
                function_call: text.and_then(|t| t.function_call.clone()),
                tool_calls: None,
            }),
            finish_reason: is_final(frame).then_some(FinishReason::Stop),
        }],
        usage: frame_usage(frame),
        ..ChatCompletionResponse::default()
    }
}

/// Accumulates the frames of a non-streaming call
#[derive(Debug, Default)]
pub struct SparkTranscript {
    sid: String,
    seq: u32,
    content: String,
    function_call: Option<FunctionCall>,
    usage: Option<Usage>,
}

impl SparkTranscript {
    /// Append a frame's delta in arrival order
    pub fn push(&mut self, frame: &SparkResponse) {
        self.sid.clone_from(&frame.header.sid);
        self.seq = frame_seq(frame);

        if let Some(text) = first_text(frame) {
            self.content.push_str(&text.content);
            if text.function_call.is_some() {
                self.function_call.clone_from(&text.function_call);
            }
        }

        if let Some(usage) = frame_usage(frame) {
            self.usage = Some(usage);
        }
    }

    /// Complete response built from every frame seen so far
    pub fn into_response(self, model: &str, created: i64) -> ChatCompletionResponse {
        let finish_reason = if self.function_call.is_some() {
            FinishReason::FunctionCall
        } else {
            FinishReason::Stop
        };

        let message = Message {
            function_call: self.function_call,
            ..Message::new(Role::Assistant, self.content)
        };

        ChatCompletionResponse {
            id: format!("{COMPLETION_ID_PREFIX}{}", self.sid),
            object: OBJECT_COMPLETION.to_owned(),
            created,
            model: model.to_owned(),
            choices: vec![Choice {
                index: self.seq,
                message: Some(message),
                delta: None,
                finish_reason: Some(finish_reason),
            }],
            usage: self.usage,
            ..ChatCompletionResponse::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(json: &str) -> SparkResponse {
        serde_json::from_str(json).unwrap()
    }

    const FIRST: &str = r#"{"header":{"code":0,"message":"Success","sid":"cht000b","status":0},
        "payload":{"choices":{"status":0,"seq":0,"text":[{"content":"Hello","role":"assistant","index":0}]}}}"#;
    const LAST: &str = r#"{"header":{"code":0,"message":"Success","sid":"cht000b","status":2},
        "payload":{"choices":{"status":2,"seq":1,"text":[{"content":" world","role":"assistant","index":0}]},
        "usage":{"text":{"question_tokens":4,"prompt_tokens":4,"completion_tokens":2,"total_tokens":6}}}}"#;

    #[test]
    fn lone_system_message_becomes_user() {
        let messages = spark_messages(&[Message::system("be brief")], true);
        assert_eq!(
            messages,
            [SparkMessage {
                role: "user",
                content: "be brief".to_owned()
            }]
        );
    }

    #[test]
    fn system_prefix_survives_alongside_turns() {
        let messages = spark_messages(&[Message::system("s"), Message::user("a")], true);
        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, ["system", "user"]);
    }

    #[test]
    fn chunk_carries_delta_and_final_marker() {
        let first = spark_chunk(&frame(FIRST), "spark", 7);
        assert_eq!(first.id, "chatcmpl-cht000b");
        assert_eq!(first.object, "chat.completion.chunk");
        assert_eq!(first.text().as_deref(), Some("Hello"));
        assert_eq!(first.choices[0].finish_reason, None);
        assert!(first.usage.is_none());

        let last = spark_chunk(&frame(LAST), "spark", 7);
        assert_eq!(last.choices[0].finish_reason, Some(FinishReason::Stop));
        assert_eq!(last.usage.unwrap().total_tokens, 6);
    }

    #[test]
    fn transcript_concatenates_in_order() {
        let mut transcript = SparkTranscript::default();
        transcript.push(&frame(FIRST));
        transcript.push(&frame(LAST));

        let response = transcript.into_response("spark", 7);

        assert_eq!(response.object, "chat.completion");
        assert_eq!(response.text().as_deref(), Some("Hello world"));
        assert_eq!(response.choices[0].finish_reason, Some(FinishReason::Stop));
        assert_eq!(response.usage.unwrap().prompt_tokens, 4);
    }
}
