use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Output guard
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validation rules applied to every agent reply before it reaches
/// the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Replies shorter than this many characters are replaced with a
    /// topical fallback.
    #[serde(default = "d_12")]
    pub min_reply_chars: usize,
    /// Additional corruption-marker regexes, merged with the built-in
    /// set (provider wrapper tags, leaked tool-call payloads).
    #[serde(default)]
    pub extra_markers: Vec<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            min_reply_chars: 12,
            extra_markers: Vec::new(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_12() -> usize {
    12
}
