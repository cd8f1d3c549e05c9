//! Turn routing: one entry point per domain, agent selection by phase,
//! and the composed reply callers render.
//!
//! Routing never regresses a learning session to planning once a plan
//! exists, and therapy moves freely between the counselor and the
//! reframing exercise.  All phase changes land in the store before the
//! outcome is returned, so a crash between turns never loses a
//! transition.

use serde::Serialize;
use uuid::Uuid;

use sage_domain::{Result, TraceEvent};
use sage_sessions::{ChatRole, ItemKind, Phase, Session, SessionKind};

use crate::runtime::agent::{wants_general_therapy, wants_restructuring, AgentKind, Handoff};
use crate::runtime::context::ContextSnapshot;
use crate::runtime::turn::{run_agent_turn, AgentReply};
use crate::state::CoreState;

/// One agent's slice of the composed reply, kept separate so callers
/// can render speaker labels.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyPart {
    pub agent: String,
    pub text: String,
}

/// What a turn produced.  `success: false` covers only turn-level
/// failures (rate limit, unknown session, persistence); an agent that
/// fell back to a template still reports success.
#[derive(Debug, Clone, Serialize)]
pub struct RespondOutcome {
    pub text: String,
    pub parts: Vec<ReplyPart>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RespondOutcome {
    fn failure(text: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parts: Vec::new(),
            success: false,
            error: Some(error.into()),
        }
    }
}

pub struct Orchestrator {
    pub state: CoreState,
}

impl Orchestrator {
    pub fn new(state: CoreState) -> Self {
        Self { state }
    }

    pub async fn respond_learning(
        &self,
        session_id: Uuid,
        user_id: &str,
        message: &str,
        thread_id: &str,
    ) -> RespondOutcome {
        self.respond(SessionKind::Learning, session_id, user_id, message, thread_id)
            .await
    }

    pub async fn respond_therapy(
        &self,
        session_id: Uuid,
        user_id: &str,
        message: &str,
        thread_id: &str,
    ) -> RespondOutcome {
        self.respond(SessionKind::Therapy, session_id, user_id, message, thread_id)
            .await
    }

    async fn respond(
        &self,
        expected: SessionKind,
        session_id: Uuid,
        user_id: &str,
        message: &str,
        thread_id: &str,
    ) -> RespondOutcome {
        if !self.state.limiter.check(user_id) {
            return RespondOutcome::failure(
                "You're sending messages faster than I can keep up with. Give it a minute and \
                 we'll pick up right where we left off.",
                "rate limit exceeded",
            );
        }

        let Some(session) = self.state.store.get_session(session_id) else {
            return RespondOutcome::failure(
                "I couldn't find that conversation. Start a new session and we'll go from there.",
                format!("session not found: {session_id}"),
            );
        };
        if session.kind() != expected {
            return RespondOutcome::failure(
                "That conversation belongs to the other side of Sage. Open it from there and \
                 we can continue.",
                format!(
                    "session {} is a {} session, not {}",
                    session.id,
                    session.kind().as_str(),
                    expected.as_str()
                ),
            );
        }

        // Callers without their own thread ride the session's default.
        let thread_id = if thread_id.trim().is_empty() {
            session.thread_id.clone()
        } else {
            thread_id.to_string()
        };

        if let Err(err) = self
            .state
            .store
            .append_message(&thread_id, ChatRole::User, None, message)
        {
            tracing::warn!(%err, "failed to persist user message");
        }

        let replies = match session.kind() {
            SessionKind::Learning => self.learning_turn(&session, &thread_id, message).await,
            SessionKind::Therapy => self.therapy_turn(&session, &thread_id, message).await,
        };
        let replies = match replies {
            Ok(replies) => replies,
            Err(err) => {
                tracing::error!(session_id = %session.id, %err, "turn failed");
                return RespondOutcome::failure(
                    "Something went wrong on my side while saving our progress. Let's try \
                     that again in a moment.",
                    err.to_string(),
                );
            }
        };

        for reply in &replies {
            if let Err(err) = self.state.store.append_message(
                &thread_id,
                ChatRole::Assistant,
                Some(reply.agent.display_name().to_string()),
                &reply.text,
            ) {
                tracing::warn!(%err, "failed to persist assistant message");
            }
        }

        // Session timestamps move on every turn, not only on phase
        // transitions; set_phase with the current phase is the touch.
        let phase = match self.state.store.get_session(session_id) {
            Some(current) => match self.state.store.set_phase(session_id, current.phase) {
                Ok(touched) => touched.phase,
                Err(err) => {
                    tracing::warn!(%err, "failed to touch session after turn");
                    current.phase
                }
            },
            None => session.phase,
        };

        TraceEvent::TurnRouted {
            session_id: session_id.to_string(),
            phase: phase.as_str().to_string(),
            agents: replies
                .iter()
                .map(|r| r.agent.display_name().to_string())
                .collect(),
        }
        .emit();

        compose(replies)
    }

    // ── Learning ──────────────────────────────────────────────────

    async fn learning_turn(
        &self,
        session: &Session,
        thread_id: &str,
        message: &str,
    ) -> Result<Vec<AgentReply>> {
        let state = &self.state;
        let has_plan = state
            .store
            .list_items(session.id)
            .iter()
            .any(|i| i.kind == ItemKind::Concept);

        // Once a plan exists the session never drops back to planning.
        if has_plan || session.phase == Phase::Teaching {
            let session = state.store.set_phase(session.id, Phase::Teaching)?;
            let ctx = ContextSnapshot::assemble(state.store.as_ref(), &session);
            let reply = run_agent_turn(state, AgentKind::Teacher, &ctx, thread_id, message).await;
            return Ok(vec![reply]);
        }

        let ctx = ContextSnapshot::assemble(state.store.as_ref(), session);
        let planner = run_agent_turn(state, AgentKind::Planner, &ctx, thread_id, message).await;

        let planned = state
            .store
            .list_items(session.id)
            .iter()
            .any(|i| i.kind == ItemKind::Concept);
        if !planned {
            return Ok(vec![planner]);
        }

        // The plan landed this turn; the teacher picks up the same
        // user message with the fresh context.
        let session = state.store.set_phase(session.id, Phase::Teaching)?;
        let ctx = ContextSnapshot::assemble(state.store.as_ref(), &session);
        let teacher = run_agent_turn(state, AgentKind::Teacher, &ctx, thread_id, message).await;
        Ok(vec![planner, teacher])
    }

    // ── Therapy ───────────────────────────────────────────────────

    async fn therapy_turn(
        &self,
        session: &Session,
        thread_id: &str,
        message: &str,
    ) -> Result<Vec<AgentReply>> {
        match session.phase {
            Phase::CognitiveRestructuring => {
                self.restructuring_turn(session, thread_id, message).await
            }
            Phase::Therapy => self.therapy_phase_turn(session, thread_id, message).await,
            Phase::Assessment => self.intake_turn(session, thread_id, message).await,
            Phase::NeedsPlan | Phase::Teaching => {
                tracing::warn!(
                    session_id = %session.id,
                    phase = session.phase.as_str(),
                    "learning phase on a therapy session, treating as intake"
                );
                self.intake_turn(session, thread_id, message).await
            }
        }
    }

    async fn intake_turn(
        &self,
        session: &Session,
        thread_id: &str,
        message: &str,
    ) -> Result<Vec<AgentReply>> {
        let state = &self.state;
        let has_goals = state
            .store
            .list_items(session.id)
            .iter()
            .any(|i| i.kind == ItemKind::Goal);
        if has_goals {
            let session = state.store.set_phase(session.id, Phase::Therapy)?;
            return self.therapy_phase_turn(&session, thread_id, message).await;
        }

        let ctx = ContextSnapshot::assemble(state.store.as_ref(), session);
        let intake = run_agent_turn(state, AgentKind::Assessment, &ctx, thread_id, message).await;

        let goals_now = state
            .store
            .list_items(session.id)
            .iter()
            .any(|i| i.kind == ItemKind::Goal);
        if !goals_now {
            return Ok(vec![intake]);
        }

        // Goals landed this turn; the counselor takes over immediately.
        let session = state.store.set_phase(session.id, Phase::Therapy)?;
        let ctx = ContextSnapshot::assemble(state.store.as_ref(), &session);
        let counselor =
            run_agent_turn(state, AgentKind::Psychotherapist, &ctx, thread_id, message).await;
        if counselor.handoff == Some(Handoff::Restructuring) {
            state
                .store
                .set_phase(session.id, Phase::CognitiveRestructuring)?;
        }
        Ok(vec![intake, counselor])
    }

    async fn therapy_phase_turn(
        &self,
        session: &Session,
        thread_id: &str,
        message: &str,
    ) -> Result<Vec<AgentReply>> {
        let state = &self.state;

        // An explicit user cue enters the exercise on this very turn;
        // the agent's own handoff marker only takes effect on the next.
        if wants_restructuring(message) {
            let session = state
                .store
                .set_phase(session.id, Phase::CognitiveRestructuring)?;
            return self.restructuring_turn(&session, thread_id, message).await;
        }

        let ctx = ContextSnapshot::assemble(state.store.as_ref(), session);
        let reply =
            run_agent_turn(state, AgentKind::Psychotherapist, &ctx, thread_id, message).await;
        if reply.handoff == Some(Handoff::Restructuring) {
            state
                .store
                .set_phase(session.id, Phase::CognitiveRestructuring)?;
        }
        Ok(vec![reply])
    }

    async fn restructuring_turn(
        &self,
        session: &Session,
        thread_id: &str,
        message: &str,
    ) -> Result<Vec<AgentReply>> {
        let state = &self.state;

        // The user asked to leave the exercise; route straight back to
        // the counselor and ignore any marker it emits.
        if wants_general_therapy(message) {
            let session = state.store.set_phase(session.id, Phase::Therapy)?;
            let ctx = ContextSnapshot::assemble(state.store.as_ref(), &session);
            let reply =
                run_agent_turn(state, AgentKind::Psychotherapist, &ctx, thread_id, message).await;
            return Ok(vec![reply]);
        }

        let records_before = state.store.list_records(session.id).len();
        let open_before = state.store.open_record(session.id).is_some();

        let ctx = ContextSnapshot::assemble(state.store.as_ref(), session);
        let reply =
            run_agent_turn(state, AgentKind::Restructuring, &ctx, thread_id, message).await;

        // A record that was open (or created) this turn and is open no
        // longer got completed: the exercise is over.
        let open_after = state.store.open_record(session.id).is_some();
        let finished_record = !open_after
            && (open_before || state.store.list_records(session.id).len() > records_before);

        if reply.handoff == Some(Handoff::Therapy) || finished_record {
            state.store.set_phase(session.id, Phase::Therapy)?;
        }
        Ok(vec![reply])
    }
}

/// Join the parts into one display string, marking each transfer with
/// the incoming agent's name.
fn compose(replies: Vec<AgentReply>) -> RespondOutcome {
    let mut text = String::new();
    let mut parts = Vec::with_capacity(replies.len());
    for (i, reply) in replies.into_iter().enumerate() {
        let agent = reply.agent.display_name().to_string();
        if i > 0 {
            text.push_str(&format!("\n\n⸻ handing over to {agent} ⸻\n\n"));
        }
        text.push_str(&reply.text);
        parts.push(ReplyPart {
            agent,
            text: reply.text,
        });
    }
    RespondOutcome {
        text,
        parts,
        success: true,
        error: None,
    }
}
