use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connection settings for the OpenAI-compatible chat endpoint.
///
/// An empty `base_url` means no provider is configured: the orchestrator
/// still answers every message, but through deterministic templated
/// replies instead of model output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of the endpoint (e.g. `https://api.openai.com/v1`).
    #[serde(default)]
    pub base_url: String,
    /// Model identifier sent with every chat request.
    #[serde(default = "d_model")]
    pub name: String,
    /// Env var holding the API key.  An unset var is fine for local
    /// endpoints that accept unauthenticated requests.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    /// Per-request timeout in milliseconds.
    #[serde(default = "d_30000")]
    pub timeout_ms: u64,
    /// Sampling temperature passed to the model.
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    /// Response token cap. `None` lets the endpoint choose.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            name: d_model(),
            api_key_env: d_api_key_env(),
            timeout_ms: 30_000,
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_model() -> String {
    "gpt-4o-mini".into()
}
fn d_api_key_env() -> String {
    "SAGE_API_KEY".into()
}
fn d_30000() -> u64 {
    30_000
}
fn d_temperature() -> f32 {
    0.7
}
