//! The per-agent reasoning loop: prompt assembly, bounded tool rounds,
//! output screening, checkpointing.
//!
//! `run_agent_turn` is infallible.  Whatever goes wrong mid-turn (no
//! provider, model error, garbage output), the caller gets back a
//! usable reply; only the trace records what actually happened.

use std::time::Instant;

use sage_domain::{Message, ToolCall, TraceEvent};
use sage_providers::ChatRequest;
use sage_sessions::{CheckpointLine, CheckpointNamespace};

use crate::runtime::agent::{extract_handoff, AgentKind, Handoff};
use crate::runtime::context::ContextSnapshot;
use crate::runtime::guard::{GuardVerdict, ReplyClassifier as _};
use crate::runtime::tools::{build_tool_definitions, dispatch_tool};
use crate::state::CoreState;

/// Served when an agent spends its whole step budget on tool calls
/// without producing a final text.  The work it did is already saved.
pub const STEP_CAP_REPLY: &str = "I did a lot of work organizing things behind the scenes just \
now and ran out of room to finish this reply. Send your next message and we'll pick up right \
there.";

/// One agent's contribution to a turn.
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub agent: AgentKind,
    pub text: String,
    pub handoff: Option<Handoff>,
    pub degraded: bool,
}

/// Run one agent against its own checkpointed thread.
pub async fn run_agent_turn(
    state: &CoreState,
    agent: AgentKind,
    ctx: &ContextSnapshot,
    thread_id: &str,
    user_message: &str,
) -> AgentReply {
    let ns = CheckpointNamespace::new(thread_id, agent.variant_key());

    let mut messages = vec![Message::system(agent.system_prompt(ctx))];
    messages.extend(history_tail(state, &ns));
    messages.push(Message::user(user_message));

    let Some(provider) = state.provider.clone() else {
        return degraded_finish(state, agent, ctx, &ns, user_message, "provider unavailable");
    };

    let tools = build_tool_definitions(agent);
    let max_steps = state.config.limits.max_reasoning_steps;
    let mut final_text: Option<String> = None;

    for _ in 0..max_steps {
        let request = ChatRequest {
            messages: messages.clone(),
            tools: tools.clone(),
            temperature: Some(state.config.model.temperature),
            max_tokens: state.config.model.max_tokens,
            model: None,
        };

        let started = Instant::now();
        let response = match provider.chat(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(agent = agent.variant_key(), %err, "model call failed");
                return degraded_finish(state, agent, ctx, &ns, user_message, "model error");
            }
        };
        TraceEvent::LlmRequest {
            provider: provider.provider_id().to_string(),
            model: response.model.clone(),
            agent: agent.variant_key().to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
            prompt_tokens: response.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens: response.usage.as_ref().map(|u| u.completion_tokens),
        }
        .emit();

        if response.tool_calls.is_empty() {
            final_text = Some(response.content);
            break;
        }

        messages.push(assistant_tool_message(&response.content, &response.tool_calls));
        for call in &response.tool_calls {
            let (result, is_error) = dispatch_tool(
                state.store.as_ref(),
                &ctx.session,
                agent,
                &call.tool_name,
                &call.arguments,
            );
            messages.push(Message::tool_result(&call.call_id, result, is_error));
        }
    }

    let raw = final_text.unwrap_or_else(|| STEP_CAP_REPLY.to_string());
    let (stripped, handoff) = extract_handoff(&raw);

    if let GuardVerdict::Reject(reason) = state.guard.classify(&stripped) {
        tracing::warn!(agent = agent.variant_key(), reason, "reply rejected by output guard");
        return degraded_finish(state, agent, ctx, &ns, user_message, reason);
    }

    checkpoint(state, &ns, user_message, &stripped);
    AgentReply {
        agent,
        text: stripped,
        handoff,
        degraded: false,
    }
}

/// Recent dialogue from this agent's checkpoint, mapped back to chat
/// messages.  Unreadable history degrades to an empty one.
fn history_tail(state: &CoreState, ns: &CheckpointNamespace) -> Vec<Message> {
    let lines = state.checkpoints.read(ns).unwrap_or_else(|err| {
        tracing::warn!(namespace = %ns.key(), %err, "checkpoint read failed, starting fresh");
        Vec::new()
    });
    let keep = state.config.limits.history_messages;
    let skip = lines.len().saturating_sub(keep);
    lines
        .into_iter()
        .skip(skip)
        .filter_map(|line| match line.role.as_str() {
            "user" => Some(Message::user(line.content)),
            "assistant" => Some(Message::assistant(line.content)),
            _ => None,
        })
        .collect()
}

fn assistant_tool_message(content: &str, calls: &[ToolCall]) -> Message {
    use sage_domain::{ContentPart, MessageContent, Role};

    let mut parts = Vec::with_capacity(calls.len() + 1);
    if !content.trim().is_empty() {
        parts.push(ContentPart::Text {
            text: content.to_string(),
        });
    }
    for call in calls {
        parts.push(ContentPart::ToolUse {
            id: call.call_id.clone(),
            name: call.tool_name.clone(),
            input: call.arguments.clone(),
        });
    }
    Message {
        role: Role::Assistant,
        content: MessageContent::Parts(parts),
    }
}

/// Serve the agent's on-topic template instead of model output, and
/// checkpoint it like any other exchange so the dialogue stays coherent
/// when the model comes back.
fn degraded_finish(
    state: &CoreState,
    agent: AgentKind,
    ctx: &ContextSnapshot,
    ns: &CheckpointNamespace,
    user_message: &str,
    reason: &str,
) -> AgentReply {
    TraceEvent::FallbackServed {
        session_id: ctx.session.id.to_string(),
        agent: agent.variant_key().to_string(),
        reason: reason.to_string(),
    }
    .emit();

    let text = agent.degraded_reply(ctx);
    checkpoint(state, ns, user_message, &text);
    AgentReply {
        agent,
        text,
        handoff: None,
        degraded: true,
    }
}

fn checkpoint(state: &CoreState, ns: &CheckpointNamespace, user: &str, assistant: &str) {
    let lines = [
        CheckpointLine::now("user", user),
        CheckpointLine::now("assistant", assistant),
    ];
    if let Err(err) = state.checkpoints.append(ns, &lines) {
        tracing::warn!(namespace = %ns.key(), %err, "checkpoint append failed");
    }
}
