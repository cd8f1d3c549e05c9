//! Persisted entities of the tutoring/therapy domain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One long-running tutoring or therapy engagement.
///
/// `completion_rate` is always a derived value: the percentage of
/// completed primary items (concepts for learning, goals for therapy),
/// recomputed from the flat item set after every completion toggle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: String,
    /// Conversation thread backing this session.  Checkpoint namespaces
    /// are derived from it, one per agent variant.
    pub thread_id: String,
    pub profile: Profile,
    pub phase: Phase,
    #[serde(default)]
    pub completion_rate: f32,
    #[serde(default)]
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn kind(&self) -> SessionKind {
        self.profile.kind()
    }
}

/// What a session is about.  Learning sessions carry tutoring
/// preferences, therapy sessions carry the presenting concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Profile {
    Learning {
        topic: String,
        #[serde(default)]
        teaching_style: Option<String>,
        #[serde(default)]
        response_style: Option<String>,
    },
    Therapy {
        concern: String,
        #[serde(default)]
        goal: Option<String>,
        #[serde(default)]
        style: Option<String>,
        #[serde(default)]
        session_type: Option<String>,
    },
}

impl Profile {
    pub fn kind(&self) -> SessionKind {
        match self {
            Profile::Learning { .. } => SessionKind::Learning,
            Profile::Therapy { .. } => SessionKind::Therapy,
        }
    }

    /// The topic or concern — whatever the session is about.
    pub fn subject(&self) -> &str {
        match self {
            Profile::Learning { topic, .. } => topic,
            Profile::Therapy { concern, .. } => concern,
        }
    }
}

/// Session flavor, derived from the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Learning,
    Therapy,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Learning => "learning",
            SessionKind::Therapy => "therapy",
        }
    }
}

/// Where the session sits in its per-kind state machine.
///
/// Learning sessions move `NeedsPlan → Teaching` and never back.
/// Therapy sessions move `Assessment → Therapy` and may detour through
/// `CognitiveRestructuring` before returning to `Therapy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    NeedsPlan,
    Teaching,
    Assessment,
    Therapy,
    CognitiveRestructuring,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::NeedsPlan => "needs_plan",
            Phase::Teaching => "teaching",
            Phase::Assessment => "assessment",
            Phase::Therapy => "therapy",
            Phase::CognitiveRestructuring => "cognitive_restructuring",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    Completed,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Domain items
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A unit of work inside a session: a concept or task on the learning
/// side, a goal or exercise on the therapy side.  Concepts and goals
/// may nest via `parent_id`; completion never cascades, aggregates are
/// recomputed over the flat set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainItem {
    pub id: Uuid,
    pub session_id: Uuid,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    pub kind: ItemKind,
    pub title: String,
    #[serde(default)]
    pub detail: Option<String>,
    /// Free-text feedback an agent attached when toggling completion.
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Concept,
    Task,
    Goal,
    Exercise,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Concept => "concept",
            ItemKind::Task => "task",
            ItemKind::Goal => "goal",
            ItemKind::Exercise => "exercise",
        }
    }

    /// The kind whose completion drives a session's aggregate rate.
    pub fn primary_for(kind: SessionKind) -> ItemKind {
        match kind {
            SessionKind::Learning => ItemKind::Concept,
            SessionKind::Therapy => ItemKind::Goal,
        }
    }
}

/// Input for a batched item insert.  `parent` indexes an earlier entry
/// of the same batch (plans arrive as one array; the hierarchy is
/// expressed positionally before any IDs exist).
#[derive(Debug, Clone)]
pub struct NewItem {
    pub kind: ItemKind,
    pub title: String,
    pub detail: Option<String>,
    pub parent: Option<usize>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Structured records (A-B-C-D-E)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A reflective cognitive-restructuring exercise, filled in over one or
/// more turns.  Complete once both the disputation and the alternative
/// belief hold text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    #[serde(default)]
    pub activating_event: Option<String>,
    #[serde(default)]
    pub beliefs: Option<String>,
    #[serde(default)]
    pub consequences: Option<String>,
    #[serde(default)]
    pub disputation: Option<String>,
    #[serde(default)]
    pub alternative_belief: Option<String>,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StructuredRecord {
    /// Derive the status from the populated fields.
    pub fn derive_status(&self) -> RecordStatus {
        let filled = |f: &Option<String>| f.as_deref().is_some_and(|s| !s.trim().is_empty());
        if filled(&self.disputation) && filled(&self.alternative_belief) {
            RecordStatus::Completed
        } else {
            RecordStatus::InProgress
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    InProgress,
    Completed,
}

/// Field updates for a structured record.  `None` leaves the stored
/// value untouched; empty strings are treated as absent.
#[derive(Debug, Clone, Default)]
pub struct RecordFields {
    pub activating_event: Option<String>,
    pub beliefs: Option<String>,
    pub consequences: Option<String>,
    pub disputation: Option<String>,
    pub alternative_belief: Option<String>,
}

impl RecordFields {
    pub fn is_empty(&self) -> bool {
        self.activating_event.is_none()
            && self.beliefs.is_none()
            && self.consequences.is_none()
            && self.disputation.is_none()
            && self.alternative_belief.is_none()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Progress history & chat log
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Append-only audit row, one per state-changing tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub id: Uuid,
    pub session_id: Uuid,
    #[serde(default)]
    pub item_id: Option<Uuid>,
    /// Display name of the agent that made the change.
    pub actor: String,
    pub action: String,
    #[serde(default)]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One bubble of the user-facing conversation.  Append-only per thread;
/// this is the UI transcript, never the agent-history mechanism.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub thread_id: String,
    pub role: ChatRole,
    /// Display name of the agent that produced an assistant message.
    #[serde(default)]
    pub agent: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}
