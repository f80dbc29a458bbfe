//! Wire format types for provider-specific protocols
//!
//! Pure serde structs used only at the serialization boundary. Requests for
//! OpenAI-shaped APIs reuse the canonical types directly; these modules hold
//! the shapes that differ.

pub mod openai;
pub mod xfyun;
