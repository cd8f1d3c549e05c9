//! Conversation orchestration for Sage.
//!
//! For every inbound user message this crate decides which specialist
//! agent (or sequence of agents) answers, rebuilds that agent's view of
//! the session's domain state, runs a bounded tool-calling loop against
//! the model, validates the output, and composes the final reply.  All
//! failure paths degrade to deterministic on-topic text.

pub mod cli;
pub mod router;
pub mod runtime;
pub mod state;
