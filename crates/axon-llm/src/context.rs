use tokio_util::sync::CancellationToken;

/// Per-call runtime context
///
/// Cancelling the token aborts any in-flight upstream read for calls made
/// with this context.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Identifier attached to log events for this call
    pub request_id: String,
    cancellation: CancellationToken,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    /// Fresh context with a random request id and its own token
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    /// Context observing an existing token (e.g. a child of a shutdown token)
    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            cancellation,
        }
    }

    /// Token observed by streaming producers
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Abort calls made with this context
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }
}
