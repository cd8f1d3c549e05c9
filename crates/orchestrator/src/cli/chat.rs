//! `sage chat` — interactive REPL command.
//!
//! Opens a readline-based loop that sends each line through the
//! orchestrator and prints the agent replies.  Supports slash-commands
//! for inspecting the session mid-conversation.

use std::sync::Arc;

use sage_domain::config::Config;
use sage_domain::TraceEvent;
use sage_sessions::{Profile, Session, SessionKind};
use uuid::Uuid;

use crate::router::Orchestrator;
use crate::runtime::context::ContextSnapshot;
use crate::state::CoreState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run the interactive chat REPL.
pub async fn chat(
    config: Arc<Config>,
    learning: Option<String>,
    therapy: Option<String>,
    session_id: Option<Uuid>,
    user: String,
) -> anyhow::Result<()> {
    // 1. Boot the core.
    let state = CoreState::from_config(config)?;

    // 2. Resolve or create the session.
    let session = resolve_session(&state, learning, therapy, session_id, &user)?;
    let orchestrator = Orchestrator::new(state.clone());

    // 3. Initialize rustyline editor with persistent history.
    let history_path = dirs::home_dir()
        .unwrap_or_default()
        .join(".sage")
        .join("chat_history.txt");
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    // 4. Print welcome message to stderr (keep stdout clean for output).
    eprintln!("Sage interactive chat");
    eprintln!(
        "Session: {} ({}: {})  |  Type /help for commands, Ctrl+D to exit",
        session.id,
        session.kind().as_str(),
        session.profile.subject()
    );
    eprintln!();

    // 5. REPL loop.
    loop {
        let readline = rl.readline("you> ");

        match readline {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                rl.add_history_entry(&line).ok();

                // ── Slash commands ────────────────────────────────
                if trimmed.starts_with('/') {
                    if handle_slash_command(trimmed, &state, &session) {
                        break;
                    }
                    continue;
                }

                // ── User message → orchestrated turn ─────────────
                send_message(&orchestrator, &session, &user, trimmed).await;
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                break;
            }
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    // 6. Save history.
    rl.save_history(&history_path).ok();

    eprintln!("Goodbye!");
    Ok(())
}

fn resolve_session(
    state: &CoreState,
    learning: Option<String>,
    therapy: Option<String>,
    session_id: Option<Uuid>,
    user: &str,
) -> anyhow::Result<Session> {
    let (session, is_new) = if let Some(id) = session_id {
        let session = state
            .store
            .get_session(id)
            .ok_or_else(|| anyhow::anyhow!("no session with id {id}"))?;
        (session, false)
    } else if let Some(topic) = learning {
        let session = state.store.create_session(
            user,
            Profile::Learning {
                topic,
                teaching_style: None,
                response_style: None,
            },
        )?;
        (session, true)
    } else if let Some(concern) = therapy {
        let session = state.store.create_session(
            user,
            Profile::Therapy {
                concern,
                goal: None,
                style: None,
                session_type: None,
            },
        )?;
        (session, true)
    } else {
        anyhow::bail!("pass --learning <topic>, --therapy <concern>, or --session <id>");
    };

    TraceEvent::SessionResolved {
        session_id: session.id.to_string(),
        kind: session.kind().as_str().to_string(),
        is_new,
    }
    .emit();

    Ok(session)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slash command handling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process a slash command.  Returns `true` if the REPL should exit.
fn handle_slash_command(input: &str, state: &CoreState, session: &Session) -> bool {
    match input {
        "/exit" | "/quit" => return true,

        "/items" => match state.store.get_session(session.id) {
            Some(current) => {
                let ctx = ContextSnapshot::assemble(state.store.as_ref(), &current);
                println!("{}", ctx.render());
            }
            None => eprintln!("Session no longer exists."),
        },

        "/history" => {
            let messages = state.store.list_messages(&session.thread_id);
            if messages.is_empty() {
                eprintln!("No messages yet.");
            }
            let skip = messages.len().saturating_sub(10);
            for msg in messages.into_iter().skip(skip) {
                let speaker = match msg.agent {
                    Some(agent) => agent,
                    None => "you".to_string(),
                };
                println!("{speaker}: {}", msg.content);
            }
        }

        "/help" => {
            eprintln!("Commands:");
            eprintln!("  /items     Show the session's plan, goals and progress");
            eprintln!("  /history   Show the last 10 messages on this thread");
            eprintln!("  /exit, /quit  Exit the chat");
            eprintln!("  /help      Show this help");
        }

        other => {
            eprintln!("Unknown command: {other}  (type /help for a list)");
        }
    }

    false
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message sending
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Route one message through the session's domain entry point and print
/// each agent's part with a dim speaker label on stderr.
async fn send_message(orchestrator: &Orchestrator, session: &Session, user: &str, text: &str) {
    let outcome = match session.kind() {
        SessionKind::Learning => {
            orchestrator
                .respond_learning(session.id, user, text, "")
                .await
        }
        SessionKind::Therapy => {
            orchestrator
                .respond_therapy(session.id, user, text, "")
                .await
        }
    };

    if !outcome.success {
        if let Some(detail) = &outcome.error {
            eprintln!("\x1B[31merror: {detail}\x1B[0m");
        }
        println!("{}\n", outcome.text);
        return;
    }

    for part in &outcome.parts {
        eprintln!("\x1B[2m[{}]\x1B[0m", part.agent);
        println!("{}\n", part.text);
    }
}
