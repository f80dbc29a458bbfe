//! HTTP/JSON adapter for `OpenAI`, Azure and OpenAI-compatible vendors

use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axon_config::ClientConfig;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures_util::{Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use super::{Provider, cancellable, http_client, log_failure};
use crate::classify::{ErrorRule, classify_api_error};
use crate::context::RequestContext;
use crate::convert::openai::api_error_from_body;
use crate::convert::parse_image_size;
use crate::dispatch::ProviderKind;
use crate::error::LlmError;
use crate::normalize::normalize_messages;
use crate::protocol::openai::{
    CompatibleImageRequest, CompatibleImageResponse, CompatibleSpeechRequest, CompatibleSpeechResponse,
    OpenAiErrorResponse, OpenAiResponse,
};
use crate::storage::{ObjectStorage, image_key};
use crate::stream::{ChatStream, Frame, FrameSource, StreamMeta, millis, spawn_stream};
use crate::types::{
    COMPLETION_ID_PREFIX, ChatCompletionRequest, ChatCompletionResponse, FinishReason, ImageData, ImageRequest,
    ImageResponse, SpeechRequest, SpeechResponse, StreamOptions, Timing,
};

const DEFAULT_AZURE_API_VERSION: &str = "2024-02-01";

/// Sentinel data line closing an `OpenAI` event stream
const DONE_MARKER: &str = "[DONE]";

const DEFAULT_AUDIO_TYPE: &str = "audio/mpeg";

/// Protocol dialect spoken by the upstream
#[derive(Debug, Clone, PartialEq, Eq)]
enum Flavor {
    OpenAi,
    Azure { api_version: String },
    Compatible,
}

/// Adapter for every vendor speaking the `OpenAI` HTTP protocol
pub struct OpenAiProvider {
    kind: ProviderKind,
    flavor: Flavor,
    client: Client,
    base_url: String,
    path: String,
    model: String,
    api_key: Option<SecretString>,
    supports_system_role: bool,
    storage: Option<Arc<dyn ObjectStorage>>,
}

impl OpenAiProvider {
    /// Create the adapter for `kind` from client configuration
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Config` if the proxy URL is malformed, if the vendor
    /// has no default base URL and none is configured, or if `kind` is not
    /// served over HTTP.
    pub fn new(
        kind: ProviderKind,
        config: &ClientConfig,
        storage: Option<Arc<dyn ObjectStorage>>,
    ) -> Result<Self, LlmError> {
        let flavor = match kind {
            ProviderKind::OpenAi => Flavor::OpenAi,
            ProviderKind::Azure => Flavor::Azure {
                api_version: azure_api_version(config.path.as_deref()),
            },
            ProviderKind::Xfyun => {
                return Err(LlmError::Config("Xfyun is served by the WebSocket adapter".to_owned()));
            }
            _ => Flavor::Compatible,
        };

        let base_url = config
            .base_url
            .as_ref()
            .map(|url| url.as_str().trim_end_matches('/').to_owned())
            .or_else(|| kind.default_base_url().map(str::to_owned))
            .ok_or_else(|| LlmError::Config(format!("{kind} requires a base_url")))?;

        Ok(Self {
            kind,
            flavor,
            client: http_client(config.proxy_url.as_deref())?,
            base_url,
            path: config.path.clone().unwrap_or_default(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            supports_system_role: config.system_role_supported(),
            storage,
        })
    }

    /// Model sent upstream: the request's, else the configured one
    fn model<'a>(&'a self, requested: &'a str) -> &'a str {
        if requested.is_empty() { &self.model } else { requested }
    }

    /// URL of an `OpenAI` operation such as `chat/completions`
    fn endpoint(&self, operation: &str, model: &str) -> String {
        match &self.flavor {
            Flavor::Azure { api_version } => format!(
                "{}/openai/deployments/{model}/{operation}?api-version={api_version}",
                self.base_url
            ),
            Flavor::OpenAi | Flavor::Compatible => format!("{}/{operation}", self.base_url),
        }
    }

    /// URL of a vendor-specific operation (image, speech) on a compatible upstream
    fn vendor_endpoint(&self) -> String {
        format!("{}{}", self.base_url, self.path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match (&self.api_key, &self.flavor) {
            (None, _) => builder,
            (Some(key), Flavor::Azure { .. }) => builder.header("api-key", key.expose_secret()),
            (Some(key), _) => builder.bearer_auth(key.expose_secret()),
        }
    }

    /// Derive the upstream request without touching the caller's
    fn wire_request(&self, request: &ChatCompletionRequest, stream: bool) -> ChatCompletionRequest {
        let mut wire = request.clone();
        wire.model = self.model(&request.model).to_owned();
        wire.stream = stream;

        if self.flavor == Flavor::Compatible {
            wire.messages = normalize_messages(&request.messages, self.supports_system_role);
        }

        if self.kind == ProviderKind::Hyperbolic {
            wire.max_tokens = None;
        }

        wire.stream_options = match (&self.flavor, stream) {
            (_, false) => None,
            (Flavor::OpenAi, true) => Some(request.stream_options.unwrap_or(StreamOptions { include_usage: true })),
            (_, true) => request.stream_options,
        };

        wire
    }

    /// POST a JSON body, classifying non-success responses
    async fn post_json<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Response, LlmError> {
        let response = self
            .authorize(self.client.post(url).json(body))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        tracing::warn!(provider = %self.kind, status = %status, "upstream returned error");

        let body = response.text().await.map_err(|e| LlmError::Request {
            status: Some(status.as_u16()),
            message: format!("failed to read error body: {e}"),
        })?;

        Err(classify_api_error(self.kind.error_rules(), api_error_from_body(status.as_u16(), &body)))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, LlmError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(transport_error)?;

        Ok(response.bytes().await.map_err(transport_error)?.to_vec())
    }

    async fn complete(
        &self,
        request: &ChatCompletionRequest,
        context: &RequestContext,
    ) -> Result<ChatCompletionResponse, LlmError> {
        let started = Instant::now();
        let model = self.model(&request.model);
        let wire = self.wire_request(request, false);

        let response = cancellable(context, self.post_json(&self.endpoint("chat/completions", model), &wire)).await?;
        let connected = Instant::now();

        let body: OpenAiResponse =
            cancellable(context, async { response.json().await.map_err(transport_error) }).await?;

        let mut response = ChatCompletionResponse::from(body);
        if self.flavor == Flavor::Compatible {
            response.id = with_completion_prefix(response.id);
        }

        let finished = Instant::now();
        response.timing = Timing {
            conn_time: millis(connected - started),
            duration: millis(finished - connected),
            total_time: millis(finished - started),
        };

        Ok(response)
    }

    async fn openai_image(&self, request: &ImageRequest, model: &str) -> Result<ImageResponse, LlmError> {
        let mut wire = request.clone();
        wire.model = model.to_owned();

        let response = self.post_json(&self.endpoint("images/generations", model), &wire).await?;
        response.json().await.map_err(transport_error)
    }

    async fn compatible_image(&self, request: &ImageRequest, model: &str) -> Result<ImageResponse, LlmError> {
        let format = ImageFormat::parse(request.response_format.as_deref())?;
        let (width, height) = parse_image_size(request.size.as_deref());

        let mut url = self.vendor_endpoint();
        if self.kind == ProviderKind::Cloudflare {
            if !url.ends_with('/') {
                url.push('/');
            }
            url.push_str(model);
        }

        let body = CompatibleImageRequest {
            prompt: &request.prompt,
            width,
            height,
            model_name: (self.kind == ProviderKind::Hyperbolic).then_some(model),
        };

        let count = request.count();
        let mut data = Vec::new();
        let mut failure = None;

        for _ in 0..count {
            let rendered = match self.generate_image(&url, &body).await {
                Ok(image) => self.render_image(image, format, &request.prompt).await,
                Err(e) => Err(e),
            };

            match rendered {
                Ok(image) => data.push(image),
                Err(e) => {
                    tracing::error!(provider = %self.kind, model, error = %e, "image generation failed");
                    failure = Some(e);
                }
            }
        }

        if count == 1
            && let Some(e) = failure
        {
            return Err(e);
        }

        Ok(ImageResponse {
            created: jiff::Timestamp::now().as_second(),
            data,
            total_time: 0,
        })
    }

    /// One text-to-image call against a compatible upstream
    async fn generate_image(
        &self,
        url: &str,
        body: &CompatibleImageRequest<'_>,
    ) -> Result<GeneratedImage, LlmError> {
        let response = self.post_json(url, body).await?;

        if self.kind == ProviderKind::Cloudflare {
            let bytes = response.bytes().await.map_err(transport_error)?;
            return Ok(GeneratedImage::Inline(bytes.to_vec()));
        }

        let parsed: CompatibleImageResponse = response.json().await.map_err(transport_error)?;
        let image = parsed
            .images
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::request("image response contained no images"))?;

        if self.kind == ProviderKind::Siliconflow {
            return image
                .url
                .map(GeneratedImage::Hosted)
                .ok_or_else(|| LlmError::request("image response contained no url"));
        }

        let encoded = image
            .image
            .ok_or_else(|| LlmError::request("image response contained no image data"))?;
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| LlmError::request(format!("image data is not valid base64: {e}")))?;

        Ok(GeneratedImage::Inline(bytes))
    }

    /// Shape a generated image into the requested response format
    async fn render_image(
        &self,
        image: GeneratedImage,
        format: ImageFormat,
        prompt: &str,
    ) -> Result<ImageData, LlmError> {
        let mut data = ImageData {
            revised_prompt: Some(prompt.to_owned()),
            ..ImageData::default()
        };

        match (format, image) {
            (ImageFormat::Url, GeneratedImage::Hosted(url)) => data.url = Some(url),
            (ImageFormat::Url, GeneratedImage::Inline(bytes)) => {
                let storage = self
                    .storage
                    .as_ref()
                    .ok_or_else(|| LlmError::Config("object storage is required to return image urls".to_owned()))?;

                tracing::info!(provider = %self.kind, size = bytes.len(), "uploading generated image");
                data.url = Some(storage.upload(bytes, &image_key()).await?);
            }
            (ImageFormat::B64Json, GeneratedImage::Hosted(url)) => {
                data.b64_json = Some(STANDARD.encode(self.download(&url).await?));
            }
            (ImageFormat::B64Json, GeneratedImage::Inline(bytes)) => data.b64_json = Some(STANDARD.encode(bytes)),
        }

        Ok(data)
    }

    async fn openai_speech(&self, request: &SpeechRequest, model: &str) -> Result<SpeechResponse, LlmError> {
        let mut wire = request.clone();
        wire.model = model.to_owned();

        let response = self.post_json(&self.endpoint("audio/speech", model), &wire).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_AUDIO_TYPE)
            .to_owned();

        let audio = response.bytes().await.map_err(transport_error)?;

        Ok(SpeechResponse {
            audio: audio.to_vec(),
            content_type,
        })
    }

    async fn compatible_speech(&self, request: &SpeechRequest) -> Result<SpeechResponse, LlmError> {
        let body = CompatibleSpeechRequest {
            text: &request.input,
            speed: request.speed.unwrap_or(1.0),
        };

        let response = self.post_json(&self.vendor_endpoint(), &body).await?;
        let parsed: CompatibleSpeechResponse = response.json().await.map_err(transport_error)?;

        let audio = STANDARD
            .decode(parsed.audio)
            .map_err(|e| LlmError::request(format!("audio data is not valid base64: {e}")))?;

        Ok(SpeechResponse {
            audio,
            content_type: audio_content_type(request.response_format.as_deref()).to_owned(),
        })
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
        context: &RequestContext,
    ) -> Result<ChatCompletionResponse, LlmError> {
        let model = self.model(&request.model);
        tracing::info!(
            provider = %self.kind,
            model,
            request_id = %context.request_id,
            "chat completion started"
        );

        let response = self
            .complete(request, context)
            .await
            .inspect_err(|e| log_failure(self.name(), model, "chat_completion", e))?;

        tracing::info!(
            provider = %self.kind,
            model,
            conn_time_ms = response.timing.conn_time,
            duration_ms = response.timing.duration,
            total_time_ms = response.timing.total_time,
            "chat completion finished"
        );

        Ok(response)
    }

    async fn chat_completion_stream(
        &self,
        request: &ChatCompletionRequest,
        context: &RequestContext,
    ) -> Result<ChatStream, LlmError> {
        let started = Instant::now();
        let model = self.model(&request.model).to_owned();
        tracing::info!(
            provider = %self.kind,
            model = %model,
            request_id = %context.request_id,
            "chat completion stream started"
        );

        let wire = self.wire_request(request, true);
        let response = cancellable(context, self.post_json(&self.endpoint("chat/completions", &model), &wire))
            .await
            .inspect_err(|e| log_failure(self.name(), &model, "chat_completion_stream", e))?;

        let source = SseSource {
            status: response.status().as_u16(),
            rules: self.kind.error_rules(),
            compatible: self.flavor == Flavor::Compatible,
            events: Some(Box::pin(response.bytes_stream().eventsource())),
        };

        let meta = StreamMeta {
            provider: self.name().to_owned(),
            id: format!("{COMPLETION_ID_PREFIX}{}", context.request_id),
            model,
            started,
            connected: Instant::now(),
        };

        Ok(spawn_stream(source, meta, context.cancellation().clone()))
    }

    async fn image(&self, request: &ImageRequest, context: &RequestContext) -> Result<ImageResponse, LlmError> {
        let started = Instant::now();
        let model = self.model(&request.model);
        tracing::info!(provider = %self.kind, model, request_id = %context.request_id, "image started");

        let generation = async {
            match self.flavor {
                Flavor::Compatible => self.compatible_image(request, model).await,
                Flavor::OpenAi | Flavor::Azure { .. } => self.openai_image(request, model).await,
            }
        };

        let mut response = cancellable(context, generation)
            .await
            .inspect_err(|e| log_failure(self.name(), model, "image", e))?;

        response.total_time = millis(started.elapsed());
        tracing::info!(
            provider = %self.kind,
            model,
            images = response.data.len(),
            total_time_ms = response.total_time,
            "image finished"
        );

        Ok(response)
    }

    async fn speech(&self, request: &SpeechRequest, context: &RequestContext) -> Result<SpeechResponse, LlmError> {
        let started = Instant::now();
        let model = self.model(&request.model);
        tracing::info!(provider = %self.kind, model, request_id = %context.request_id, "speech started");

        let synthesis = async {
            match self.flavor {
                Flavor::Compatible => self.compatible_speech(request).await,
                Flavor::OpenAi | Flavor::Azure { .. } => self.openai_speech(request, model).await,
            }
        };

        let response = cancellable(context, synthesis)
            .await
            .inspect_err(|e| log_failure(self.name(), model, "speech", e))?;

        tracing::info!(
            provider = %self.kind,
            model,
            bytes = response.audio.len(),
            total_time_ms = millis(started.elapsed()),
            "speech finished"
        );

        Ok(response)
    }
}

/// Requested image response format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageFormat {
    Url,
    B64Json,
}

impl ImageFormat {
    fn parse(raw: Option<&str>) -> Result<Self, LlmError> {
        match raw.unwrap_or_default() {
            "" | "url" => Ok(Self::Url),
            "b64_json" => Ok(Self::B64Json),
            other => Err(LlmError::InvalidRequest(format!(
                "unsupported image response format `{other}`"
            ))),
        }
    }
}

/// Image as produced by a compatible vendor
#[derive(Debug)]
enum GeneratedImage {
    Inline(Vec<u8>),
    Hosted(String),
}

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, EventStreamError<reqwest::Error>>> + Send>>;

/// Server-sent event body of a streaming chat completion
struct SseSource {
    status: u16,
    rules: &'static [ErrorRule],
    compatible: bool,
    events: Option<EventStream>,
}

impl SseSource {
    fn decode(&self, data: &str) -> Result<Frame, LlmError> {
        if serde_json::from_str::<OpenAiErrorResponse>(data).is_ok() {
            return Err(classify_api_error(self.rules, api_error_from_body(self.status, data)));
        }

        let chunk: OpenAiResponse = serde_json::from_str(data)
            .map_err(|e| LlmError::request(format!("malformed stream chunk: {e}")))?;

        let mut response = ChatCompletionResponse::from(chunk);
        if !self.compatible {
            return Ok(Frame::Chunk { response, last: false });
        }

        response.id = with_completion_prefix(response.id);
        let last = response
            .choices
            .first()
            .is_some_and(|choice| choice.finish_reason == Some(FinishReason::Stop));

        Ok(Frame::Chunk { response, last })
    }
}

#[async_trait]
impl FrameSource for SseSource {
    async fn next_frame(&mut self) -> Result<Frame, LlmError> {
        let Some(events) = self.events.as_mut() else {
            return Ok(Frame::End);
        };

        while let Some(event) = events.next().await {
            let event = event.map_err(|e| LlmError::request(format!("failed to read event stream: {e}")))?;

            let data = event.data.trim();
            if data.is_empty() {
                continue;
            }
            if data == DONE_MARKER {
                return Ok(Frame::End);
            }

            return self.decode(data);
        }

        Ok(Frame::End)
    }

    async fn close(&mut self) -> Result<(), LlmError> {
        self.events = None;
        Ok(())
    }
}

fn transport_error(e: reqwest::Error) -> LlmError {
    LlmError::Request {
        status: e.status().map(|s| s.as_u16()),
        message: e.to_string(),
    }
}

fn with_completion_prefix(id: String) -> String {
    if id.starts_with(COMPLETION_ID_PREFIX) {
        id
    } else {
        format!("{COMPLETION_ID_PREFIX}{id}")
    }
}

/// API version from a configured path such as `?api-version=2024-06-01`
fn azure_api_version(path: Option<&str>) -> String {
    path.and_then(|p| p.split_once("api-version="))
        .map(|(_, rest)| rest.split_once('&').map_or(rest, |(version, _)| version))
        .filter(|version| !version.is_empty())
        .unwrap_or(DEFAULT_AZURE_API_VERSION)
        .to_owned()
}

fn audio_content_type(format: Option<&str>) -> &'static str {
    match format.unwrap_or_default() {
        "wav" => "audio/wav",
        "opus" => "audio/opus",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        "pcm" => "audio/pcm",
        _ => DEFAULT_AUDIO_TYPE,
    }
}
