//! Shared data types for the fathom engine.
//!
//! Everything here is serializable: stream events arrive as tagged JSON
//! from the transport layer, and conversation records round-trip through
//! durable storage.

pub mod conversation;
pub mod events;
pub mod message;

pub use conversation::{ConversationDetail, ConversationSummary, Mode, StoredMessage};
pub use events::{ChatRequest, StreamEvent};
pub use message::{Agent, FinishReason, Message, MessageOption, Role, ToolCall};
