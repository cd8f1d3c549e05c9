use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Budgets & rate limits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Hard ceilings on per-user traffic and per-turn reasoning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Fixed-window rate limit: messages accepted per user per window.
    #[serde(default = "d_60")]
    pub user_calls_per_window: u32,
    /// Window length in seconds.
    #[serde(default = "d_60u")]
    pub window_secs: u64,
    /// Maximum model calls inside one agent turn (tool loop bound).
    #[serde(default = "d_8")]
    pub max_reasoning_steps: u32,
    /// Checkpointed messages replayed into the prompt, newest first.
    #[serde(default = "d_30")]
    pub history_messages: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            user_calls_per_window: 60,
            window_secs: 60,
            max_reasoning_steps: 8,
            history_messages: 30,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_60() -> u32 {
    60
}
fn d_60u() -> u64 {
    60
}
fn d_8() -> u32 {
    8
}
fn d_30() -> usize {
    30
}
