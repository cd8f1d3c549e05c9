//! The closed set of specialist agents and their per-variant wiring:
//! display names, checkpoint namespace keys, tool policies, system
//! prompts, and the degraded templates served when no model is
//! reachable.

use sage_domain::config::ToolPolicy;

use super::context::ContextSnapshot;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AgentKind
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Every agent the router can select.  The set is closed on purpose:
/// routing is an explicit state machine over these variants, never
/// dynamic lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    /// Designs the learning plan on a session's first turn.
    Planner,
    /// Tutors through the plan, one concept at a time.
    Teacher,
    /// Intake: turns a presenting concern into concrete goals.
    Assessment,
    /// General supportive counseling against the session goals.
    Psychotherapist,
    /// Guides one structured thought exercise at a time.
    Restructuring,
}

impl AgentKind {
    /// Name shown to the user on reply parts and audit rows.
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentKind::Planner => "Planner",
            AgentKind::Teacher => "Teacher",
            AgentKind::Assessment => "Intake Counselor",
            AgentKind::Psychotherapist => "Psychotherapist",
            AgentKind::Restructuring => "Reframing Guide",
        }
    }

    /// Stable key used for the checkpoint namespace
    /// (`thread_id + ":" + variant_key`).
    pub fn variant_key(&self) -> &'static str {
        match self {
            AgentKind::Planner => "planner",
            AgentKind::Teacher => "teacher",
            AgentKind::Assessment => "assessment",
            AgentKind::Psychotherapist => "psychotherapist",
            AgentKind::Restructuring => "restructuring",
        }
    }

    /// The tools this variant may see and invoke.  Enforced both when
    /// definitions are built and again at dispatch time.
    pub fn tool_policy(&self) -> ToolPolicy {
        match self {
            AgentKind::Planner => ToolPolicy::allow_only(["create_learning_plan"]),
            AgentKind::Teacher => {
                ToolPolicy::allow_only(["mark_concept_progress", "mark_task_progress"])
            }
            AgentKind::Assessment => ToolPolicy::allow_only(["create_therapy_goals"]),
            AgentKind::Psychotherapist => ToolPolicy::allow_only([
                "mark_goal_progress",
                "mark_exercise_progress",
                "create_exercise",
            ]),
            AgentKind::Restructuring => ToolPolicy::allow_only(["record_structured_exercise"]),
        }
    }

    // ── System prompts ────────────────────────────────────────────

    /// Role instructions plus the serialized context snapshot.  Rebuilt
    /// on every turn; prior dialogue comes from the checkpoint store,
    /// never from here.
    pub fn system_prompt(&self, ctx: &ContextSnapshot) -> String {
        let role = match self {
            AgentKind::Planner => {
                "You are the Planner, the curriculum designer for a personal tutoring service. \
                 Design a learning plan for the student's topic with the create_learning_plan \
                 tool: 3 to 6 concepts ordered from fundamentals to advanced, each with 1 to 3 \
                 short practice tasks. Call the tool exactly once, then summarize the plan in a \
                 few sentences and hand the student over to the Teacher with an encouraging \
                 closing line. Do not teach the material itself."
                    .to_string()
            }
            AgentKind::Teacher => {
                "You are the Teacher, a patient one-on-one tutor. Teach the session topic one \
                 concept at a time, following the plan in the session context and adapting to \
                 the student's preferred styles when given. When the student demonstrates \
                 understanding of a concept or finishes a task, record it with \
                 mark_concept_progress or mark_task_progress, passing the exact id shown in \
                 the context. Never invent ids. Keep replies focused and end with a question \
                 or a small exercise."
                    .to_string()
            }
            AgentKind::Assessment => {
                "You are the Intake Counselor for a supportive self-help program. Listen to \
                 what brings the person here, reflect it back warmly, and establish 2 to 4 \
                 concrete, achievable goals with the create_therapy_goals tool. Call the tool \
                 once when the goals are clear, then summarize them and explain that your \
                 colleague will continue from here. You are not a crisis service; for anything \
                 acute, advise seeking professional help."
                    .to_string()
            }
            AgentKind::Psychotherapist => {
                "You are the Psychotherapist, a warm, evidence-informed counselor. Work with \
                 the person on the goals listed in the session context. When they make real \
                 progress on a goal or complete an exercise, record it with mark_goal_progress \
                 or mark_exercise_progress, passing the exact id shown in the context; never \
                 invent ids. Suggest small between-session practices with create_exercise. If \
                 they raise a specific distressing thought worth examining step by step, end \
                 your reply with the marker <<handoff:restructuring>> so the reframing \
                 specialist takes the next turn. You are not a crisis service; for acute \
                 distress, advise seeking professional help."
                    .to_string()
            }
            AgentKind::Restructuring => format!(
                "You are the Reframing Guide. You walk the person through one structured \
                 thought exercise: activating event, beliefs, consequences, disputation, and \
                 a more balanced alternative belief. Ask about one part at a time. After each \
                 answer, save what you have with record_structured_exercise, passing \
                 sessionId \"{}\" and only the fields you learned this turn; earlier parts \
                 are kept automatically. The exercise is complete once both the disputation \
                 and the alternative belief are filled in. When it completes, or the person \
                 would rather return to open conversation, close warmly and end your reply \
                 with the marker <<handoff:therapy>>.",
                ctx.session.id
            ),
        };

        format!("{role}\n\n{}", ctx.render())
    }

    // ── Degraded templates ────────────────────────────────────────

    /// Deterministic reply served when the model is unavailable or its
    /// output was rejected.  Always references the session's subject so
    /// a degraded turn still reads as on-topic.
    pub fn degraded_reply(&self, ctx: &ContextSnapshot) -> String {
        let subject = ctx.subject();
        let (completed, total) = ctx.primary_counts();

        match self {
            AgentKind::Planner => format!(
                "Let's map out {subject} step by step. We'll start with the fundamentals, \
                 practice each piece as we go, and build toward the harder ideas. Tell me \
                 what you already know about {subject} and we'll shape the plan from there."
            ),
            AgentKind::Teacher => {
                if total > 0 {
                    format!(
                        "We've worked through {completed} of {total} concepts on {subject} so \
                         far. Pick any open concept from your plan and ask me about it, or \
                         tell me where you got stuck last time and we'll start there."
                    )
                } else {
                    format!(
                        "Let's take {subject} one idea at a time. What part of it feels most \
                         unclear right now?"
                    )
                }
            }
            AgentKind::Assessment => format!(
                "Thank you for sharing that. To make our work on {subject} concrete, think \
                 about what feeling better would look like for you week to week. We'll turn \
                 that into a few clear goals together."
            ),
            AgentKind::Psychotherapist => format!(
                "That sounds important. When {subject} shows up this week, notice what \
                 happens just before it and how it affects you afterward. What stood out to \
                 you most about it recently?"
            ),
            AgentKind::Restructuring => {
                "Let's slow one difficult moment down. Describe the situation, the thought \
                 that came up, and how it made you feel. We'll look at the evidence for and \
                 against that thought together."
                    .to_string()
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handoff markers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Agent-driven phase change requested inside a reply.  Markers are
/// stripped from user-visible text and take effect on the next turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    Restructuring,
    Therapy,
}

const RESTRUCTURING_MARKER: &str = "<<handoff:restructuring>>";
const THERAPY_MARKER: &str = "<<handoff:therapy>>";

/// Remove handoff markers from a reply and report which one (if any)
/// the agent emitted.  When both appear the restructuring request wins.
pub fn extract_handoff(text: &str) -> (String, Option<Handoff>) {
    let mut handoff = None;
    if text.contains(THERAPY_MARKER) {
        handoff = Some(Handoff::Therapy);
    }
    if text.contains(RESTRUCTURING_MARKER) {
        handoff = Some(Handoff::Restructuring);
    }

    if handoff.is_none() {
        return (text.to_string(), None);
    }

    let stripped = text
        .replace(RESTRUCTURING_MARKER, "")
        .replace(THERAPY_MARKER, "")
        .trim()
        .to_string();
    (stripped, handoff)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// User-side phase cues
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const RESTRUCTURING_CUES: &[&str] = &[
    "reframe",
    "restructure",
    "thought record",
    "negative thought",
    "cognitive distortion",
    "challenge this thought",
    "challenge that thought",
    "work through this thought",
    "abcde",
];

const RETURN_CUES: &[&str] = &[
    "back to therapy",
    "back to our session",
    "stop the exercise",
    "stop this exercise",
    "talk about something else",
];

/// Whether a user message asks for structured reflective work.
pub fn wants_restructuring(message: &str) -> bool {
    let m = message.to_lowercase();
    RESTRUCTURING_CUES.iter().any(|cue| m.contains(cue))
}

/// Whether a user message asks to leave the structured exercise and
/// return to general conversation.
pub fn wants_general_therapy(message: &str) -> bool {
    let m = message.to_lowercase();
    RETURN_CUES.iter().any(|cue| m.contains(cue))
}
