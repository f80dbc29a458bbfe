//! Provider trait and transport adapters

mod http;
pub mod openai;
pub mod xfyun;

use std::future::Future;

use async_trait::async_trait;

pub(crate) use self::http::http_client;
use crate::context::RequestContext;
use crate::error::LlmError;
use crate::stream::ChatStream;
use crate::types::{
    ChatCompletionRequest, ChatCompletionResponse, EmbeddingRequest, EmbeddingResponse, ImageRequest, ImageResponse,
    ModerationRequest, ModerationResponse, SpeechRequest, SpeechResponse, TranscriptionRequest, TranscriptionResponse,
};

/// Canonical operations every adapter exposes
///
/// Operations an adapter cannot serve fail with [`LlmError::NotImplemented`].
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider identifier used in logs
    fn name(&self) -> &str;

    /// Send a non-streaming chat completion request
    async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
        context: &RequestContext,
    ) -> Result<ChatCompletionResponse, LlmError>;

    /// Start a streaming chat completion
    ///
    /// Failures before the first byte are returned directly; later failures
    /// arrive as the stream's terminal event.
    async fn chat_completion_stream(
        &self,
        request: &ChatCompletionRequest,
        context: &RequestContext,
    ) -> Result<ChatStream, LlmError>;

    /// Generate images from a prompt
    async fn image(&self, request: &ImageRequest, context: &RequestContext) -> Result<ImageResponse, LlmError>;

    /// Synthesize speech
    async fn speech(&self, _request: &SpeechRequest, _context: &RequestContext) -> Result<SpeechResponse, LlmError> {
        Err(not_implemented(self.name(), "speech"))
    }

    /// Transcribe audio
    async fn transcription(
        &self,
        _request: &TranscriptionRequest,
        _context: &RequestContext,
    ) -> Result<TranscriptionResponse, LlmError> {
        Err(not_implemented(self.name(), "transcription"))
    }

    /// Embed text
    async fn embeddings(
        &self,
        _request: &EmbeddingRequest,
        _context: &RequestContext,
    ) -> Result<EmbeddingResponse, LlmError> {
        Err(not_implemented(self.name(), "embeddings"))
    }

    /// Classify text against content policies
    async fn moderations(
        &self,
        _request: &ModerationRequest,
        _context: &RequestContext,
    ) -> Result<ModerationResponse, LlmError> {
        Err(not_implemented(self.name(), "moderations"))
    }
}

fn not_implemented(provider: &str, operation: &'static str) -> LlmError {
    LlmError::NotImplemented {
        provider: provider.to_owned(),
        operation,
    }
}

/// Race `future` against the context's cancellation token
pub(crate) async fn cancellable<T, F>(context: &RequestContext, future: F) -> Result<T, LlmError>
where
    F: Future<Output = Result<T, LlmError>>,
{
    tokio::select! {
        biased;
        () = context.cancellation().cancelled() => Err(LlmError::Cancelled),
        result = future => result,
    }
}

/// Log a failed call; cancellation is expected and stays below error level
pub(crate) fn log_failure(provider: &str, model: &str, operation: &'static str, error: &LlmError) {
    if matches!(error, LlmError::Cancelled) {
        tracing::debug!(provider, model, operation, "call cancelled");
    } else {
        tracing::error!(provider, model, operation, error = %error, "call failed");
    }
}
