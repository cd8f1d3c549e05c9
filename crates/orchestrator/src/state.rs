use std::sync::Arc;

use sage_domain::config::Config;
use sage_domain::error::Result;
use sage_providers::{build_provider, LlmProvider};
use sage_sessions::{CheckpointStore, DomainStore, JsonDomainStore, JsonlCheckpointStore};

use crate::runtime::guard::{OutputGuard, ReplyClassifier};
use crate::runtime::limiter::FixedWindowLimiter;

/// Shared state handed to the router and every agent turn.
///
/// `provider` is `None` when no model endpoint is configured or
/// construction failed; every runtime then serves templated replies.
#[derive(Clone)]
pub struct CoreState {
    pub config: Arc<Config>,
    pub store: Arc<dyn DomainStore>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub provider: Option<Arc<dyn LlmProvider>>,
    pub limiter: Arc<FixedWindowLimiter>,
    pub guard: Arc<dyn ReplyClassifier>,
}

impl CoreState {
    /// Wire up all services from the resolved configuration.
    ///
    /// Domain state lives at `<data_dir>/domain.json`, checkpointed
    /// dialogue under `<data_dir>/checkpoints/`.
    pub fn from_config(config: Arc<Config>) -> Result<Self> {
        let store = JsonDomainStore::new(&config.store.data_dir)?;
        let checkpoints = JsonlCheckpointStore::new(&config.store.data_dir.join("checkpoints"))?;
        let provider = build_provider(&config.model);
        let limiter = FixedWindowLimiter::from_config(&config.limits);
        let guard = OutputGuard::from_config(&config.guard);

        Ok(Self {
            config,
            store: Arc::new(store),
            checkpoints: Arc::new(checkpoints),
            provider,
            limiter: Arc::new(limiter),
            guard: Arc::new(guard),
        })
    }
}
