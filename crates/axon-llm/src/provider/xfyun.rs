//! iFlytek Spark adapter
//!
//! Spark has no HTTP streaming mode. Every chat call opens a WebSocket to a
//! URL signed with HMAC-SHA256, sends a single request frame and reads
//! response frames until one carries the final status. Image generation is
//! a single HTTPS POST to a URL signed the same way.

use std::time::Instant;

use async_trait::async_trait;
use axon_config::ClientConfig;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures_util::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use rand::Rng;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::{Provider, cancellable, http_client, log_failure};
use crate::classify::classify_frame_code;
use crate::context::RequestContext;
use crate::convert::parse_image_size;
use crate::convert::xfyun::{SparkTranscript, is_final, spark_chunk, spark_messages};
use crate::dispatch::ProviderKind;
use crate::error::LlmError;
use crate::protocol::xfyun::{
    SparkChat, SparkFunctions, SparkMessage, SparkMessages, SparkParameter, SparkPayload, SparkRequest,
    SparkRequestHeader, SparkResponse,
};
use crate::stream::{ChatStream, Frame, FrameSource, StreamMeta, millis, spawn_stream};
use crate::types::{
    COMPLETION_ID_PREFIX, ChatCompletionRequest, ChatCompletionResponse, ImageData, ImageRequest, ImageResponse,
    Role,
};

/// Host signed for chat calls, whatever host the socket actually reaches
const CHAT_SIGNING_HOST: &str = "spark-api.xf-yun.com";

/// Host signed for image calls
const IMAGE_SIGNING_HOST: &str = "spark-api.cn-huabei-1.xf-yun.com";

const DEFAULT_PATH: &str = "/chat";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const IMAGE_DOMAIN: &str = "general";
const SIGNED_HEADERS: &str = "host date request-line";
const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Adapter for Spark's signed WebSocket protocol
pub struct XfyunProvider {
    model: String,
    app_id: String,
    api_secret: SecretString,
    api_key: SecretString,
    base_url: String,
    path: String,
    /// Version segment of the base URL (e.g. `v4.0`), part of the signed path
    version: String,
    domain: String,
    supports_system_role: bool,
    proxy: Option<Url>,
    http: Client,
}

impl XfyunProvider {
    /// Create the adapter from client configuration
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Config` if the key is not `app_id|api_secret|api_key`
    /// or the proxy URL is malformed or names no host.
    pub fn new(config: &ClientConfig) -> Result<Self, LlmError> {
        let credential = match &config.api_key {
            Some(key) => key.expose_secret(),
            None => "",
        };
        let parts: Vec<&str> = credential.split('|').collect();
        let [app_id, api_secret, api_key] = parts.as_slice() else {
            return Err(LlmError::Config("Xfyun key must be `app_id|api_secret|api_key`".to_owned()));
        };
        if [app_id, api_secret, api_key].iter().any(|part| part.is_empty()) {
            return Err(LlmError::Config("Xfyun key has an empty component".to_owned()));
        }

        let base_url = match &config.base_url {
            Some(url) => url.as_str().trim_end_matches('/').to_owned(),
            None => ProviderKind::Xfyun
                .default_base_url()
                .unwrap_or_default()
                .to_owned(),
        };
        let version = base_url.rsplit('/').next().unwrap_or_default().to_owned();

        let proxy = config
            .proxy_url
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(Url::parse)
            .transpose()
            .map_err(|e| LlmError::Config(format!("invalid proxy url: {e}")))?;
        if let Some(proxy) = proxy.as_ref().filter(|p| p.host_str().is_none_or(str::is_empty)) {
            return Err(LlmError::Config(format!("proxy url `{proxy}` has no host")));
        }

        let domain = infer_domain(&version);
        tracing::debug!(model = %config.model, domain = %domain, "resolved Spark domain");

        Ok(Self {
            model: config.model.clone(),
            app_id: (*app_id).to_owned(),
            api_secret: SecretString::from((*api_secret).to_owned()),
            api_key: SecretString::from((*api_key).to_owned()),
            path: config.path.clone().filter(|p| !p.is_empty()).unwrap_or_else(|| DEFAULT_PATH.to_owned()),
            base_url,
            version,
            domain,
            supports_system_role: config.system_role_supported(),
            proxy,
            http: http_client(config.proxy_url.as_deref())?,
        })
    }

    fn model<'a>(&'a self, requested: &'a str) -> &'a str {
        if requested.is_empty() { &self.model } else { requested }
    }

    /// Path covered by the signature, e.g. `/v4.0/chat`
    fn signed_path(&self) -> String {
        format!("/{}{}", self.version, self.path)
    }

    /// Endpoint URL carrying `authorization`, `date` and `host` query parameters
    fn signed_url(&self, scheme: Scheme, signing_host: &str, date: &str) -> Result<Url, LlmError> {
        let method = match scheme {
            Scheme::WebSocket => "GET",
            Scheme::Https => "POST",
        };

        let signature = signature(self.api_secret.expose_secret(), signing_host, date, method, &self.signed_path())?;
        let authorization = authorization(self.api_key.expose_secret(), &signature);

        let mut url = Url::parse(&format!("{}{}", self.base_url, self.path))
            .map_err(|e| LlmError::Config(format!("invalid Xfyun endpoint: {e}")))?;

        if scheme == Scheme::WebSocket {
            let ws_scheme = match url.scheme() {
                "https" | "wss" => "wss",
                _ => "ws",
            };
            url.set_scheme(ws_scheme)
                .map_err(|()| LlmError::Config(format!("cannot use `{}` as a socket url", url.as_str())))?;
        }

        url.query_pairs_mut()
            .append_pair("authorization", &authorization)
            .append_pair("date", date)
            .append_pair("host", signing_host);

        Ok(url)
    }

    fn request_frame(&self, request: &ChatCompletionRequest) -> Result<String, LlmError> {
        let frame = SparkRequest {
            header: SparkRequestHeader {
                app_id: &self.app_id,
                uid: random_uid(),
            },
            parameter: SparkParameter {
                chat: SparkChat {
                    domain: &self.domain,
                    temperature: request.temperature,
                    max_tokens: Some(request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
                    top_k: request.n,
                    chat_id: request.user.as_deref(),
                    ..SparkChat::default()
                },
            },
            payload: SparkPayload {
                message: SparkMessages {
                    text: spark_messages(&request.messages, self.supports_system_role),
                },
                functions: request
                    .functions
                    .as_deref()
                    .filter(|functions| !functions.is_empty())
                    .map(|text| SparkFunctions { text }),
            },
        };

        serde_json::to_string(&frame).map_err(|e| LlmError::Internal(e.into()))
    }

    /// Open a signed socket and send the request frame
    async fn open(&self, frame: String) -> Result<Socket, LlmError> {
        let date = http_date();
        let url = self.signed_url(Scheme::WebSocket, CHAT_SIGNING_HOST, &date)?;
        let request = url.as_str().into_client_request().map_err(socket_error)?;

        let (mut socket, _) = match &self.proxy {
            None => tokio_tungstenite::connect_async(request).await,
            Some(proxy) => {
                let stream = tunnel(proxy, &url).await?;
                tokio_tungstenite::client_async_tls(request, stream).await
            }
        }
        .map_err(socket_error)?;

        socket.send(WsMessage::Text(frame)).await.map_err(socket_error)?;
        Ok(socket)
    }

    async fn complete(
        &self,
        request: &ChatCompletionRequest,
        context: &RequestContext,
    ) -> Result<ChatCompletionResponse, LlmError> {
        let started = Instant::now();
        let model = self.model(&request.model);
        let frame = self.request_frame(request)?;

        let mut socket = cancellable(context, self.open(frame)).await?;
        let connected = Instant::now();

        let transcript = cancellable(context, read_transcript(&mut socket)).await;
        if let Err(e) = close_socket(&mut socket).await {
            tracing::error!(provider = %ProviderKind::Xfyun, model, error = %e, "failed to close socket");
        }

        let mut response = transcript?.into_response(model, jiff::Timestamp::now().as_second());

        let finished = Instant::now();
        response.timing.conn_time = millis(connected - started);
        response.timing.duration = millis(finished - connected);
        response.timing.total_time = millis(finished - started);

        Ok(response)
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<ImageResponse, LlmError> {
        let (width, height) = parse_image_size(request.size.as_deref());

        let body = SparkRequest {
            header: SparkRequestHeader {
                app_id: &self.app_id,
                uid: random_uid(),
            },
            parameter: SparkParameter {
                chat: SparkChat {
                    domain: IMAGE_DOMAIN,
                    width: Some(width),
                    height: Some(height),
                    ..SparkChat::default()
                },
            },
            payload: SparkPayload {
                message: SparkMessages {
                    text: vec![SparkMessage {
                        role: Role::User.as_str(),
                        content: request.prompt.clone(),
                    }],
                },
                functions: None,
            },
        };

        let url = self.signed_url(Scheme::Https, IMAGE_SIGNING_HOST, &http_date())?;
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Request {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            })?;

        let status = response.status();
        let raw = response.text().await.map_err(LlmError::request)?;
        if !status.is_success() {
            return Err(LlmError::Request {
                status: Some(status.as_u16()),
                message: raw,
            });
        }

        let frame = decode_frame(&raw)?;
        let image = frame
            .payload
            .and_then(|payload| payload.choices.text.into_iter().next())
            .ok_or_else(|| LlmError::request("image response contained no image data"))?;

        Ok(ImageResponse {
            created: jiff::Timestamp::now().as_second(),
            data: vec![ImageData {
                b64_json: Some(image.content),
                ..ImageData::default()
            }],
            total_time: 0,
        })
    }
}

#[async_trait]
impl Provider for XfyunProvider {
    fn name(&self) -> &str {
        ProviderKind::Xfyun.as_str()
    }

    async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
        context: &RequestContext,
    ) -> Result<ChatCompletionResponse, LlmError> {
        let model = self.model(&request.model);
        tracing::info!(
            provider = self.name(),
            model,
            domain = %self.domain,
            request_id = %context.request_id,
            "chat completion started"
        );

        let response = self
            .complete(request, context)
            .await
            .inspect_err(|e| log_failure(self.name(), model, "chat_completion", e))?;

        tracing::info!(
            provider = self.name(),
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
            provider = self.name(),
            model = %model,
            domain = %self.domain,
            request_id = %context.request_id,
            "chat completion stream started"
        );

        let frame = self
            .request_frame(request)
            .inspect_err(|e| log_failure(self.name(), &model, "chat_completion_stream", e))?;
        let socket = cancellable(context, self.open(frame))
            .await
            .inspect_err(|e| log_failure(self.name(), &model, "chat_completion_stream", e))?;

        let source = SparkSource {
            socket: Some(socket),
            model: model.clone(),
            created: jiff::Timestamp::now().as_second(),
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
        tracing::info!(provider = self.name(), model, request_id = %context.request_id, "image started");

        let mut response = cancellable(context, self.generate_image(request))
            .await
            .inspect_err(|e| log_failure(self.name(), model, "image", e))?;

        response.total_time = millis(started.elapsed());
        tracing::info!(provider = self.name(), model, total_time_ms = response.total_time, "image finished");

        Ok(response)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    WebSocket,
    Https,
}

/// Socket frames of one streaming call
struct SparkSource {
    socket: Option<Socket>,
    model: String,
    created: i64,
}

#[async_trait]
impl FrameSource for SparkSource {
    async fn next_frame(&mut self) -> Result<Frame, LlmError> {
        let Some(socket) = self.socket.as_mut() else {
            return Ok(Frame::End);
        };

        let frame = read_frame(socket)
            .await?
            .ok_or_else(|| LlmError::request("connection closed before the final frame"))?;

        Ok(Frame::Chunk {
            response: spark_chunk(&frame, &self.model, self.created),
            last: is_final(&frame),
        })
    }

    async fn close(&mut self) -> Result<(), LlmError> {
        match self.socket.take() {
            Some(mut socket) => close_socket(&mut socket).await,
            None => Ok(()),
        }
    }
}

/// Read frames until the final one
async fn read_transcript(socket: &mut Socket) -> Result<SparkTranscript, LlmError> {
    let mut transcript = SparkTranscript::default();

    loop {
        let frame = read_frame(socket)
            .await?
            .ok_or_else(|| LlmError::request("connection closed before the final frame"))?;

        transcript.push(&frame);
        if is_final(&frame) {
            return Ok(transcript);
        }
    }
}

/// Next data frame, or `None` once the peer closed the socket
async fn read_frame(socket: &mut Socket) -> Result<Option<SparkResponse>, LlmError> {
    while let Some(message) = socket.next().await {
        match message.map_err(socket_error)? {
            WsMessage::Text(text) => return decode_frame(&text).map(Some),
            WsMessage::Binary(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                return decode_frame(&text).map(Some);
            }
            WsMessage::Close(_) => return Ok(None),
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
        }
    }

    Ok(None)
}

/// Parse a frame, turning a non-zero header code into an error
fn decode_frame(raw: &str) -> Result<SparkResponse, LlmError> {
    let frame: SparkResponse =
        serde_json::from_str(raw).map_err(|e| LlmError::request(format!("malformed Spark frame: {e}")))?;

    if frame.header.code != 0 {
        return Err(classify_frame_code(frame.header.code, &frame.header.message, raw.to_owned()));
    }

    Ok(frame)
}

async fn close_socket(socket: &mut Socket) -> Result<(), LlmError> {
    match socket.close(None).await {
        Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
        Err(e) => Err(socket_error(e)),
    }
}

fn socket_error(e: WsError) -> LlmError {
    let status = match &e {
        WsError::Http(response) => Some(response.status().as_u16()),
        _ => None,
    };

    LlmError::Request {
        status,
        message: e.to_string(),
    }
}

/// Open a TCP tunnel to the target through an HTTP proxy
async fn tunnel(proxy: &Url, target: &Url) -> Result<TcpStream, LlmError> {
    let proxy_host = proxy
        .host_str()
        .ok_or_else(|| LlmError::Config(format!("proxy url `{proxy}` has no host")))?;
    let proxy_port = proxy.port_or_known_default().unwrap_or(80);

    let host = target
        .host_str()
        .ok_or_else(|| LlmError::request(format!("socket url `{target}` has no host")))?;
    let port = target.port_or_known_default().unwrap_or(443);
    let authority = format!("{host}:{port}");

    let mut stream = TcpStream::connect((proxy_host, proxy_port))
        .await
        .map_err(|e| LlmError::request(format!("failed to connect to proxy: {e}")))?;

    let mut connect = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
    if !proxy.username().is_empty() {
        let credentials = format!("{}:{}", proxy.username(), proxy.password().unwrap_or_default());
        connect.push_str(&format!("Proxy-Authorization: Basic {}\r\n", STANDARD.encode(credentials)));
    }
    connect.push_str("\r\n");

    stream
        .write_all(connect.as_bytes())
        .await
        .map_err(|e| LlmError::request(format!("failed to write proxy handshake: {e}")))?;

    let mut head = Vec::new();
    let mut byte = [0_u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let read = stream
            .read(&mut byte)
            .await
            .map_err(|e| LlmError::request(format!("failed to read proxy handshake: {e}")))?;
        if read == 0 {
            return Err(LlmError::request("proxy closed the connection during handshake"));
        }
        head.push(byte[0]);
    }

    let head = String::from_utf8_lossy(&head);
    let status_line = head.lines().next().unwrap_or_default();
    if status_line.split_whitespace().nth(1) != Some("200") {
        return Err(LlmError::request(format!("proxy refused tunnel: {status_line}")));
    }

    Ok(stream)
}

/// Spark domain for an endpoint version such as `v3.5`
///
/// Known versions map to fixed domains. Other numeric versions are rounded:
/// a version that rounds up keeps its literal form (`general{version}`), one
/// that rounds down or is whole becomes `generalv{rounded}`.
pub fn infer_domain(version: &str) -> String {
    match version {
        "v4.0" => "4.0Ultra".to_owned(),
        "v3.5" => "generalv3.5".to_owned(),
        "v3.1" => "generalv3".to_owned(),
        "v2.1" => "generalv2".to_owned(),
        "v1.1" => "general".to_owned(),
        _ => {
            let value: f64 = version
                .strip_prefix('v')
                .unwrap_or(version)
                .parse()
                .unwrap_or_default();
            let rounded = value.round();

            if rounded > value {
                format!("general{version}")
            } else {
                format!("generalv{rounded}")
            }
        }
    }
}

/// Base64 HMAC-SHA256 over `host`, `date` and the request line
pub fn signature(secret: &str, host: &str, date: &str, method: &str, path: &str) -> Result<String, LlmError> {
    let canonical = format!("host: {host}\ndate: {date}\n{method} {path} HTTP/1.1");

    let mut mac: Hmac<Sha256> = Hmac::new_from_slice(secret.as_bytes())
        .map_err(|e| LlmError::Config(format!("invalid signing secret: {e}")))?;
    mac.update(canonical.as_bytes());

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Base64 `authorization` query value for a computed signature
pub fn authorization(api_key: &str, signature: &str) -> String {
    STANDARD.encode(format!(
        "api_key=\"{api_key}\",algorithm=\"hmac-sha256\",headers=\"{SIGNED_HEADERS}\",signature=\"{signature}\""
    ))
}

fn http_date() -> String {
    jiff::Timestamp::now().strftime(DATE_FORMAT).to_string()
}

fn random_uid() -> String {
    let mut rng = rand::rng();
    (0..10).map(|_| char::from(b'0' + rng.random_range(0..10_u8))).collect()
}
