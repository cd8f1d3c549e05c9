mod guard;
mod limits;
mod model;
mod policy;
mod store;

pub use guard::*;
pub use limits::*;
pub use model::*;
pub use policy::*;
pub use store::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub guard: GuardConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        // Warn when no model endpoint is configured: every agent will
        // serve templated fallback replies instead of model output.
        if self.model.base_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "model.base_url".into(),
                message: "no model endpoint configured; agents run in degraded mode".into(),
            });
        }

        if self.model.name.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "model.name".into(),
                message: "model name must not be empty".into(),
            });
        }

        // Rate-limit window parameters must be positive.
        if self.limits.user_calls_per_window == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "limits.user_calls_per_window".into(),
                message: "per-window call budget must be greater than 0".into(),
            });
        }
        if self.limits.window_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "limits.window_secs".into(),
                message: "window length must be greater than 0".into(),
            });
        }

        // A zero step budget would reject every turn before the first
        // model call.
        if self.limits.max_reasoning_steps == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "limits.max_reasoning_steps".into(),
                message: "reasoning step budget must be greater than 0".into(),
            });
        }

        // Extra corruption markers must compile as regexes.
        for (i, pattern) in self.guard.extra_markers.iter().enumerate() {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("guard.extra_markers[{i}]"),
                    message: format!("invalid regex: {e}"),
                });
            }
        }

        if self.store.data_dir.as_os_str().is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "store.data_dir".into(),
                message: "data_dir must not be empty".into(),
            });
        }

        errors
    }
}
