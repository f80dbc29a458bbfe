//! Provider-agnostic chat, image and speech client for Axon
//!
//! Callers build requests in one canonical shape and pick a provider by
//! identifier. Adapters translate to each vendor's protocol: plain HTTP/JSON
//! for `OpenAI`, Azure and OpenAI-compatible vendors, and a signed WebSocket
//! for iFlytek Spark. Streaming calls deliver chunks followed by a single
//! terminal event, and vendor errors are reclassified into [`ErrorKind`].

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod classify;
pub mod context;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod normalize;
pub mod protocol;
pub mod provider;
pub mod storage;
pub mod stream;
pub mod types;

pub use context::RequestContext;
pub use dispatch::{ProviderKind, UnknownProvider, build_client};
pub use error::{ApiError, ErrorKind, LlmError};
pub use normalize::normalize_messages;
pub use provider::Provider;
pub use storage::ObjectStorage;
pub use stream::{ChatStream, StreamEvent};
