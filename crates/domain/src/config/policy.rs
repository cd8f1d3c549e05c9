use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tool allow/deny policy for one agent variant.
///
/// The registry applies the policy twice: once when building the tool
/// definitions offered to the model, and again on every dispatch, so a
/// hallucinated call to an unoffered tool still fails closed.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolPolicy {
    /// Tool names this agent may use.  `["*"]` or empty = unrestricted.
    #[serde(default)]
    pub allow: Vec<String>,
    /// Tool names this agent is denied (evaluated before allow).
    #[serde(default)]
    pub deny: Vec<String>,
}

impl ToolPolicy {
    /// Check whether the given tool name is permitted by this policy.
    ///
    /// Matching is **case-insensitive** — tool names are normalized to
    /// lowercase before comparison.  Deny always wins over allow.
    pub fn allows(&self, tool_name: &str) -> bool {
        let name = tool_name.to_ascii_lowercase();

        // Deny takes precedence.
        for d in &self.deny {
            let d_lower = d.to_ascii_lowercase();
            if d_lower == "*" || name == d_lower {
                return false;
            }
        }
        // Empty allow or ["*"] means unrestricted (after deny check).
        if self.allow.is_empty() || self.allow.iter().any(|a| a == "*") {
            return true;
        }
        self.allow
            .iter()
            .any(|a| name == a.to_ascii_lowercase())
    }

    /// Allow exactly the named tools, deny everything else.
    pub fn allow_only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allow: names.into_iter().map(Into::into).collect(),
            deny: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_policy_is_unrestricted() {
        let policy = ToolPolicy::default();
        assert!(policy.allows("anything"));
    }

    #[test]
    fn deny_wins_over_allow() {
        let policy = ToolPolicy {
            allow: vec!["mark_goal_progress".into()],
            deny: vec!["mark_goal_progress".into()],
        };
        assert!(!policy.allows("mark_goal_progress"));
    }

    #[test]
    fn allow_list_is_exact_and_case_insensitive() {
        let policy = ToolPolicy::allow_only(["mark_concept_progress"]);
        assert!(policy.allows("MARK_CONCEPT_PROGRESS"));
        assert!(!policy.allows("mark_concept"));
        assert!(!policy.allows("mark_task_progress"));
    }

    #[test]
    fn wildcard_deny_blocks_everything() {
        let policy = ToolPolicy {
            allow: vec!["*".into()],
            deny: vec!["*".into()],
        };
        assert!(!policy.allows("mark_task_progress"));
    }
}
