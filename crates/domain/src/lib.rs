//! Shared domain layer for the Sage workspace: configuration, the
//! workspace-wide error type, provider-agnostic chat/tool types, and
//! structured trace events.

pub mod config;
pub mod error;
pub mod tool;
pub mod trace;

pub use error::{Error, Result};
pub use tool::{ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition, Usage};
pub use trace::TraceEvent;
