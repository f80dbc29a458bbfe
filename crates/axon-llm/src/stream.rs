//! Result channel for streaming calls
//!
//! Every streaming adapter hands its transport to [`spawn_stream`] as a
//! [`FrameSource`]. A background task reads frames, stamps them with timing
//! and republishes them on a bounded channel. The consumer sees content
//! events followed by exactly one terminal event: [`StreamEvent::Done`] on
//! success or [`StreamEvent::Error`] on failure. Nothing follows a terminal
//! event, and the transport is closed exactly once whichever way the loop
//! exits.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;
use crate::types::{ChatCompletionResponse, Choice, FinishReason, OBJECT_CHUNK, Timing};

/// Events buffered between producer and consumer
const CHANNEL_CAPACITY: usize = 64;

/// One event of a streaming call
#[derive(Debug)]
pub enum StreamEvent {
    /// Partial response; consumers accumulate choice deltas themselves
    Chunk(ChatCompletionResponse),
    /// Stream exhausted normally
    Done {
        /// Timing at the moment the stream ended
        timing: Timing,
    },
    /// Stream aborted
    Error {
        /// Cause of the failure
        error: LlmError,
        /// Timing at the moment of failure
        timing: Timing,
    },
}

impl StreamEvent {
    /// Whether this event ends the stream
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Timing carried by the event
    pub const fn timing(&self) -> Timing {
        match self {
            Self::Chunk(chunk) => chunk.timing,
            Self::Done { timing } | Self::Error { timing, .. } => *timing,
        }
    }
}

/// Receiving half of a streaming call
#[derive(Debug)]
pub struct ChatStream {
    rx: mpsc::Receiver<StreamEvent>,
}

impl ChatStream {
    /// Next event, or `None` once the terminal event has been received
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Drain the stream, concatenating the first choice's text
    ///
    /// Returns the error carried by a terminal [`StreamEvent::Error`].
    pub async fn collect_text(mut self) -> Result<String, LlmError> {
        let mut text = String::new();
        while let Some(event) = self.recv().await {
            match event {
                StreamEvent::Chunk(chunk) => {
                    if let Some(delta) = chunk.text() {
                        text.push_str(&delta);
                    }
                }
                StreamEvent::Done { .. } => break,
                StreamEvent::Error { error, .. } => return Err(error),
            }
        }
        Ok(text)
    }
}

impl Stream for ChatStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Unit read from an upstream transport
#[derive(Debug)]
pub(crate) enum Frame {
    /// Content chunk; `last` marks the provider's final chunk
    Chunk {
        response: ChatCompletionResponse,
        last: bool,
    },
    /// Transport reached its end without further content
    End,
}

/// Upstream transport driven by the stream task
#[async_trait]
pub(crate) trait FrameSource: Send {
    /// Read the next frame
    async fn next_frame(&mut self) -> Result<Frame, LlmError>;

    /// Release the transport
    async fn close(&mut self) -> Result<(), LlmError>;
}

/// Identity and clock of one streaming call
#[derive(Debug, Clone)]
pub(crate) struct StreamMeta {
    pub provider: String,
    pub model: String,
    /// Id used for synthesized chunks until the provider supplies one
    pub id: String,
    pub started: Instant,
    pub connected: Instant,
}

impl StreamMeta {
    fn timing(&self) -> Timing {
        let now = Instant::now();
        Timing {
            conn_time: millis(self.connected.saturating_duration_since(self.started)),
            duration: millis(now.saturating_duration_since(self.connected)),
            total_time: millis(now.saturating_duration_since(self.started)),
        }
    }
}

pub(crate) fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Run `source` on a background task and return the consuming end
pub(crate) fn spawn_stream<S>(source: S, meta: StreamMeta, cancellation: CancellationToken) -> ChatStream
where
    S: FrameSource + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(drive(source, meta, cancellation, tx));
    ChatStream { rx }
}

async fn drive<S: FrameSource>(
    mut source: S,
    meta: StreamMeta,
    cancellation: CancellationToken,
    tx: mpsc::Sender<StreamEvent>,
) {
    publish(&mut source, &meta, &cancellation, &tx).await;

    if let Err(e) = source.close().await {
        tracing::error!(
            provider = %meta.provider,
            model = %meta.model,
            error = %e,
            "failed to close upstream stream"
        );
    }
}

/// Forward frames until a terminal event is sent or the consumer goes away
async fn publish<S: FrameSource>(
    source: &mut S,
    meta: &StreamMeta,
    cancellation: &CancellationToken,
    tx: &mpsc::Sender<StreamEvent>,
) {
    let mut template = ChatCompletionResponse {
        id: meta.id.clone(),
        object: OBJECT_CHUNK.to_owned(),
        created: jiff::Timestamp::now().as_second(),
        model: meta.model.clone(),
        ..ChatCompletionResponse::default()
    };
    let mut finished = false;

    loop {
        let frame = tokio::select! {
            biased;
            () = cancellation.cancelled() => Err(LlmError::Cancelled),
            frame = source.next_frame() => frame,
        };

        match frame {
            Ok(Frame::Chunk { mut response, last }) => {
                let last = finish_on_usage(&mut response) || last;
                finished |= response.choices.iter().any(|c| c.finish_reason.is_some());

                template.id.clone_from(&response.id);
                template.created = response.created;
                template.model.clone_from(&response.model);

                response.timing = meta.timing();
                if tx.send(StreamEvent::Chunk(response)).await.is_err() {
                    tracing::debug!(provider = %meta.provider, "stream consumer dropped");
                    return;
                }

                if last {
                    break;
                }
            }
            Ok(Frame::End) => {
                if !finished {
                    let mut closing = template.clone();
                    closing.choices = vec![Choice::stop_delta(0)];
                    closing.timing = meta.timing();
                    if tx.send(StreamEvent::Chunk(closing)).await.is_err() {
                        return;
                    }
                }
                break;
            }
            Err(error) => {
                let timing = meta.timing();
                if matches!(error, LlmError::Cancelled) {
                    tracing::debug!(provider = %meta.provider, model = %meta.model, "stream cancelled");
                } else {
                    tracing::error!(
                        provider = %meta.provider,
                        model = %meta.model,
                        error = %error,
                        "chat completion stream failed"
                    );
                }
                let _ = tx.send(StreamEvent::Error { error, timing }).await;
                return;
            }
        }
    }

    let timing = meta.timing();
    tracing::info!(
        provider = %meta.provider,
        model = %meta.model,
        conn_time_ms = timing.conn_time,
        duration_ms = timing.duration,
        total_time_ms = timing.total_time,
        "chat completion stream finished"
    );
    let _ = tx.send(StreamEvent::Done { timing }).await;
}

/// Treat a usage-bearing chunk as the final one
///
/// The first choice is forced to `stop`; a chunk without choices gets an
/// empty stop delta.
fn finish_on_usage(response: &mut ChatCompletionResponse) -> bool {
    if response.usage.is_none() {
        return false;
    }

    match response.choices.first_mut() {
        Some(choice) => choice.finish_reason = Some(FinishReason::Stop),
        None => response.choices.push(Choice::stop_delta(0)),
    }

    true
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::StreamExt;

    use super::*;
    use crate::types::{Delta, Usage};

    /// Scripted transport for driving the stream task
    struct ScriptedSource {
        frames: VecDeque<Result<Frame, LlmError>>,
        hang_when_empty: bool,
        reads: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(frames: Vec<Result<Frame, LlmError>>) -> Self {
            Self {
                frames: frames.into(),
                hang_when_empty: false,
                reads: Arc::new(AtomicUsize::new(0)),
                closes: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl FrameSource for ScriptedSource {
        async fn next_frame(&mut self) -> Result<Frame, LlmError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            match self.frames.pop_front() {
                Some(frame) => frame,
                None if self.hang_when_empty => std::future::pending().await,
                None => Ok(Frame::End),
            }
        }

        async fn close(&mut self) -> Result<(), LlmError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::request("already closed"))
        }
    }

    fn meta() -> StreamMeta {
        let now = Instant::now();
        StreamMeta {
            provider: "test".to_owned(),
            model: "m".to_owned(),
            id: "chatcmpl-test".to_owned(),
            started: now,
            connected: now,
        }
    }

    fn chunk(text: &str, finish: Option<FinishReason>) -> ChatCompletionResponse {
        ChatCompletionResponse {
            id: "chatcmpl-1".to_owned(),
            object: OBJECT_CHUNK.to_owned(),
            created: 1,
            model: "m".to_owned(),
            choices: vec![Choice {
                index: 0,
                message: None,
                delta: Some(Delta {
                    content: Some(text.to_owned()),
                    ..Delta::default()
                }),
                finish_reason: finish,
            }],
            ..ChatCompletionResponse::default()
        }
    }

    fn content(response: ChatCompletionResponse) -> Result<Frame, LlmError> {
        Ok(Frame::Chunk { response, last: false })
    }

    async fn run(source: ScriptedSource) -> Vec<StreamEvent> {
        spawn_stream(source, meta(), CancellationToken::new()).collect().await
    }

    fn assert_single_terminal(events: &[StreamEvent]) {
        let terminals = events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(terminals, 1);
        assert!(events.last().is_some_and(StreamEvent::is_terminal));
    }

    #[tokio::test]
    async fn end_without_finish_synthesizes_stop_chunk() {
        let source = ScriptedSource::new(vec![content(chunk("Hel", None)), content(chunk("lo", None))]);
        let closes = source.closes.clone();

        let events = run(source).await;

        assert_eq!(events.len(), 4);
        let StreamEvent::Chunk(closing) = &events[2] else {
            panic!("expected synthesized chunk");
        };
        assert_eq!(closing.choices[0].finish_reason, Some(FinishReason::Stop));
        assert_eq!(closing.id, "chatcmpl-1");
        assert!(matches!(events[3], StreamEvent::Done { .. }));
        assert_single_terminal(&events);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn finished_stream_is_not_padded() {
        let source = ScriptedSource::new(vec![content(chunk("hi", None)), content(chunk("", Some(FinishReason::Length)))]);

        let events = run(source).await;

        assert_eq!(events.len(), 3);
        assert_single_terminal(&events);
    }

    #[tokio::test]
    async fn usage_chunk_without_choices_ends_stream() {
        let mut usage_only = chunk("", None);
        usage_only.choices.clear();
        usage_only.usage = Some(Usage {
            prompt_tokens: 3,
            completion_tokens: 2,
            total_tokens: 5,
        });
        let source = ScriptedSource::new(vec![
            content(chunk("hi", None)),
            content(usage_only),
            content(chunk("never read", None)),
        ]);
        let reads = source.reads.clone();

        let events = run(source).await;

        assert_eq!(events.len(), 3);
        let StreamEvent::Chunk(last) = &events[1] else {
            panic!("expected usage chunk");
        };
        assert_eq!(last.choices.len(), 1);
        assert_eq!(last.choices[0].finish_reason, Some(FinishReason::Stop));
        assert_eq!(last.choices[0].delta, Some(Delta::default()));
        assert!(matches!(events[2], StreamEvent::Done { .. }));
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn usage_forces_stop_on_first_choice() {
        let mut with_usage = chunk("tail", None);
        with_usage.usage = Some(Usage::default());

        let events = run(ScriptedSource::new(vec![content(with_usage)])).await;

        let StreamEvent::Chunk(last) = &events[0] else {
            panic!("expected chunk");
        };
        assert_eq!(last.choices[0].finish_reason, Some(FinishReason::Stop));
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn last_chunk_stops_reading() {
        let source = ScriptedSource::new(vec![
            Ok(Frame::Chunk {
                response: chunk("done", Some(FinishReason::Stop)),
                last: true,
            }),
            content(chunk("extra", None)),
        ]);
        let reads = source.reads.clone();

        let events = run(source).await;

        assert_eq!(events.len(), 2);
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mid_stream_error_is_terminal() {
        let source = ScriptedSource::new(vec![
            content(chunk("partial", None)),
            Err(LlmError::request("connection reset")),
            content(chunk("unreachable", None)),
        ]);
        let closes = source.closes.clone();

        let events = run(source).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], StreamEvent::Chunk(_)));
        let StreamEvent::Error { error, .. } = &events[1] else {
            panic!("expected error event");
        };
        assert!(error.to_string().contains("connection reset"));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_interrupts_pending_read() {
        let mut source = ScriptedSource::new(vec![content(chunk("a", None))]);
        source.hang_when_empty = true;
        let closes = source.closes.clone();
        let token = CancellationToken::new();

        let mut stream = spawn_stream(source, meta(), token.clone());
        assert!(matches!(stream.recv().await, Some(StreamEvent::Chunk(_))));

        token.cancel();

        let Some(StreamEvent::Error { error, .. }) = stream.recv().await else {
            panic!("expected cancellation event");
        };
        assert!(matches!(error, LlmError::Cancelled));
        assert!(stream.recv().await.is_none());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timing_is_non_decreasing() {
        let frames = (0..20).map(|i| content(chunk(&i.to_string(), None))).collect();

        let events = run(ScriptedSource::new(frames)).await;

        let timings: Vec<Timing> = events.iter().map(StreamEvent::timing).collect();
        for pair in timings.windows(2) {
            assert!(pair[0].duration <= pair[1].duration);
            assert!(pair[0].total_time <= pair[1].total_time);
            assert_eq!(pair[0].conn_time, pair[1].conn_time);
        }
    }

    #[tokio::test]
    async fn collect_text_joins_deltas() {
        let source = ScriptedSource::new(vec![content(chunk("Hel", None)), content(chunk("lo", None))]);

        let text = spawn_stream(source, meta(), CancellationToken::new()).collect_text().await.unwrap();

        assert_eq!(text, "Hello");
    }
}
