//! Canonical request/response shapes shared by every adapter
//!
//! These types are provider-agnostic. Each adapter derives its wire format
//! from them and converts replies back into them.

pub mod audio;
pub mod embedding;
pub mod image;
pub mod message;
pub mod request;
pub mod response;
pub mod tool;

pub use audio::{SpeechRequest, SpeechResponse, TranscriptionRequest, TranscriptionResponse};
pub use embedding::{Embedding, EmbeddingRequest, EmbeddingResponse, ModerationRequest, ModerationResponse};
pub use image::{ImageData, ImageRequest, ImageResponse};
pub use message::{Content, ContentPart, FunctionCall, ImageUrl, Message, Role, ToolCall};
pub use request::{ChatCompletionRequest, StreamOptions};
pub use response::{
    COMPLETION_ID_PREFIX, ChatCompletionResponse, Choice, Delta, FinishReason, OBJECT_CHUNK, OBJECT_COMPLETION,
    Timing, Usage,
};
pub use tool::{FunctionDefinition, ToolDefinition};
