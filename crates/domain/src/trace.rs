use serde::Serialize;

/// Structured trace events emitted across all Sage crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionResolved {
        session_id: String,
        kind: String,
        is_new: bool,
    },
    TurnRouted {
        session_id: String,
        phase: String,
        agents: Vec<String>,
    },
    PhaseChanged {
        session_id: String,
        from: String,
        to: String,
    },
    LlmRequest {
        provider: String,
        model: String,
        agent: String,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    ToolApplied {
        session_id: String,
        tool: String,
        target: Option<String>,
        ok: bool,
    },
    ProgressRecomputed {
        session_id: String,
        completed: usize,
        total: usize,
        rate: f32,
    },
    FallbackServed {
        session_id: String,
        agent: String,
        reason: String,
    },
    RateLimited {
        user_id: String,
        used: u32,
        limit: u32,
    },
    CheckpointAppend {
        namespace: String,
        lines: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sage_event");
    }
}
