//! Per-turn agent execution: context assembly, the bounded tool-calling
//! loop, output guarding, and the per-user rate limiter.

pub mod agent;
pub mod context;
pub mod guard;
pub mod limiter;
pub mod tools;
pub mod turn;
