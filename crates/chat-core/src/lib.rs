//! Streaming chat aggregation for the portal assistant.
//!
//! Bytes from a streamed completion response flow through
//! [`sse::FrameDecoder`] into [`chunk::interpret`], are folded into
//! conversation messages by [`reducer::TurnState`], and published by
//! [`controller::ChatController`]. [`session::ChatSession`] is the facade a
//! front end drives.

pub mod chunk;
pub mod controller;
pub mod error;
pub mod reducer;
pub mod session;
pub mod sse;
pub mod transport;
pub mod types;

pub use controller::{ChatController, ChatOptions, ChatSnapshot, TurnOutcome};
pub use error::{ChatError, Result};
pub use session::ChatSession;
pub use transport::{ChatRequest, ChatTransport, HttpTransport, ToolRef, ToolSource};
pub use types::{Message, MessageKind, Reasoning, RequestError, Role, Status, ToolCall};
