//! LLM provider adapters for Sage.
//!
//! One trait (`LlmProvider`), one HTTP adapter for OpenAI-compatible
//! endpoints, and a scripted mock for tests.  The orchestrator treats a
//! missing provider as a permanent degraded mode, so construction
//! failures are reported as `None` rather than propagated.

pub mod mock;
pub mod openai_compat;
pub mod traits;

// Re-exports for convenience.
pub use mock::MockProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use traits::{ChatRequest, ChatResponse, LlmProvider};

use std::sync::Arc;

use sage_domain::config::ModelConfig;

/// Build the configured provider.
///
/// Returns `None` when no endpoint is configured or construction fails;
/// the caller hands every agent a templated-reply fallback instead.
pub fn build_provider(cfg: &ModelConfig) -> Option<Arc<dyn LlmProvider>> {
    if cfg.base_url.is_empty() {
        tracing::warn!("no model endpoint configured; agents will serve templated replies");
        return None;
    }
    match OpenAiCompatProvider::from_config(cfg) {
        Ok(provider) => Some(Arc::new(provider)),
        Err(e) => {
            tracing::error!(error = %e, "provider construction failed; agents will serve templated replies");
            None
        }
    }
}
