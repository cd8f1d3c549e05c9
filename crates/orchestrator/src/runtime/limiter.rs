//! Fixed-window per-user rate limiting.
//!
//! One window per user id, reset lazily on the first call after expiry.
//! State is in-process only; restarting the orchestrator clears it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use sage_domain::config::LimitsConfig;
use sage_domain::TraceEvent;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    used: u32,
}

pub struct FixedWindowLimiter {
    limit: u32,
    window: Duration,
    windows: RwLock<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(cfg: &LimitsConfig) -> Self {
        Self::new(cfg.user_calls_per_window, Duration::from_secs(cfg.window_secs))
    }

    /// Record one call for `user_id`.  Returns false when the user has
    /// exhausted the current window.
    pub fn check(&self, user_id: &str) -> bool {
        self.check_at(user_id, Instant::now())
    }

    fn check_at(&self, user_id: &str, now: Instant) -> bool {
        let mut windows = self.windows.write();
        let window = windows.entry(user_id.to_string()).or_insert(Window {
            started: now,
            used: 0,
        });

        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.used = 0;
        }

        if window.used >= self.limit {
            TraceEvent::RateLimited {
                user_id: user_id.to_string(),
                used: window.used,
                limit: self.limit,
            }
            .emit();
            return false;
        }

        window.used += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limit_rejects_the_sixty_first_call() {
        let limiter = FixedWindowLimiter::from_config(&LimitsConfig::default());
        for _ in 0..60 {
            assert!(limiter.check("u1"));
        }
        assert!(!limiter.check("u1"));
    }

    #[test]
    fn window_expiry_resets_the_budget() {
        let limiter = FixedWindowLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();
        assert!(limiter.check_at("u1", start));
        assert!(limiter.check_at("u1", start));
        assert!(!limiter.check_at("u1", start));
        assert!(limiter.check_at("u1", start + Duration::from_secs(61)));
    }

    #[test]
    fn users_have_independent_windows() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("u1"));
        assert!(!limiter.check("u1"));
        assert!(limiter.check("u2"));
    }
}
