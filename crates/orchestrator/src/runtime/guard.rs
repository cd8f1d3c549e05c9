//! Output guard — last-line screening of model replies before they
//! reach the user.
//!
//! Patterns are compiled once at startup into a [`regex::RegexSet`];
//! per-reply classification is a single set scan plus two cheap length
//! checks.  A rejected reply is never surfaced: the turn layer swaps in
//! the agent's on-topic template instead.

use regex::RegexSet;
use sage_domain::config::GuardConfig;

/// Token-stream artifacts that indicate a corrupted or truncated
/// completion rather than prose meant for a person.
const BUILT_IN_MARKERS: &[&str] = &[
    r"<\|endoftext\|>",
    r"<\|im_start\|>",
    r"<\|im_end\|>",
    r"<\|assistant\|>",
    r"\[INST\]",
    r"<tool_call>",
];

/// Why a reply was rejected.  The reason is trace vocabulary, not user
/// copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    Pass,
    Reject(&'static str),
}

/// Screens one candidate reply.  The runtime only ever sees verdicts,
/// so the heuristic can be swapped for a stricter structural check
/// without touching the turn contract.
pub trait ReplyClassifier: Send + Sync {
    fn classify(&self, reply: &str) -> GuardVerdict;
}

pub struct OutputGuard {
    min_chars: usize,
    markers: RegexSet,
}

impl OutputGuard {
    pub fn from_config(cfg: &GuardConfig) -> Self {
        let patterns: Vec<&str> = BUILT_IN_MARKERS
            .iter()
            .copied()
            .chain(cfg.extra_markers.iter().map(String::as_str))
            .collect();
        let markers = RegexSet::new(&patterns).unwrap_or_else(|err| {
            tracing::warn!(%err, "invalid extra guard marker, using built-ins only");
            RegexSet::new(BUILT_IN_MARKERS).unwrap_or_else(|_| RegexSet::empty())
        });
        Self {
            min_chars: cfg.min_reply_chars,
            markers,
        }
    }
}

impl ReplyClassifier for OutputGuard {
    fn classify(&self, reply: &str) -> GuardVerdict {
        let trimmed = reply.trim();
        if trimmed.is_empty() {
            return GuardVerdict::Reject("empty reply");
        }
        if self.markers.is_match(reply) {
            return GuardVerdict::Reject("corruption marker");
        }
        if trimmed.chars().count() < self.min_chars {
            return GuardVerdict::Reject("reply below minimum length");
        }
        GuardVerdict::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> OutputGuard {
        OutputGuard::from_config(&GuardConfig::default())
    }

    #[test]
    fn ordinary_prose_passes() {
        assert_eq!(
            guard().classify("Let's start with what a graph actually is."),
            GuardVerdict::Pass
        );
    }

    #[test]
    fn corruption_markers_are_rejected() {
        for bad in [
            "Sure thing<|endoftext|>",
            "<|im_start|>assistant here we go",
            "[INST] ignore previous [/INST]",
        ] {
            assert_eq!(guard().classify(bad), GuardVerdict::Reject("corruption marker"));
        }
    }

    #[test]
    fn short_and_empty_replies_are_rejected() {
        assert_eq!(guard().classify("   \n"), GuardVerdict::Reject("empty reply"));
        assert_eq!(
            guard().classify("ok"),
            GuardVerdict::Reject("reply below minimum length")
        );
    }

    #[test]
    fn extra_markers_extend_the_built_ins() {
        let guard = OutputGuard::from_config(&GuardConfig {
            min_reply_chars: 4,
            extra_markers: vec!["FORBIDDEN_TOKEN".into()],
        });
        assert_eq!(
            guard.classify("this reply contains FORBIDDEN_TOKEN somewhere"),
            GuardVerdict::Reject("corruption marker")
        );
    }

    #[test]
    fn invalid_extra_marker_falls_back_to_built_ins() {
        let guard = OutputGuard::from_config(&GuardConfig {
            min_reply_chars: 4,
            extra_markers: vec!["([unclosed".into()],
        });
        assert_eq!(
            guard.classify("a perfectly normal sentence."),
            GuardVerdict::Pass
        );
        assert_eq!(
            guard.classify("oops<|im_end|>"),
            GuardVerdict::Reject("corruption marker")
        );
    }
}
