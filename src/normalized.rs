//! Normalized event types for streaming LLM responses.
//!
//! Drivers translate their wire protocol into [`NormalizedEvent`]s so the generation layer
//! sees one event model regardless of provider.
//!
//! # Example
//!
//! ```rust
//! use hybrid_rag::normalized::{NormalizedEvent, event_name};
//!
//! let event = NormalizedEvent::MessageDelta {
//!     text: "Hello".to_string(),
//! };
//! assert_eq!(event_name(&event), "message.delta");
//! ```

use serde::{Deserialize, Serialize};

/// Normalized streaming events emitted by LLM drivers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum NormalizedEvent {
    /// Indicates the start of a new streaming response.
    #[serde(rename = "stream.start")]
    StreamStart {
        /// Unique identifier for this request/response pair.
        request_id: String,
    },

    /// Incremental text delta from the assistant's response.
    #[serde(rename = "message.delta")]
    MessageDelta {
        /// The text fragment to append.
        text: String,
    },

    /// An error reported by the provider mid-stream.
    #[serde(rename = "error")]
    Error {
        /// Error message.
        message: String,
        /// Optional provider error code.
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// The stream has completed.
    #[serde(rename = "done")]
    Done,
}

/// Dotted event name used in logs.
pub fn event_name(evt: &NormalizedEvent) -> &'static str {
    match evt {
        NormalizedEvent::StreamStart { .. } => "stream.start",
        NormalizedEvent::MessageDelta { .. } => "message.delta",
        NormalizedEvent::Error { .. } => "error",
        NormalizedEvent::Done => "done",
    }
}
