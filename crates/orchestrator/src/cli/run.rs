//! `sage run` — one-shot execution command.
//!
//! Sends a single message to an existing session, prints the composed
//! reply, and exits.  Useful for scripting and quick checks.

use std::sync::Arc;

use sage_domain::config::Config;
use sage_sessions::SessionKind;
use uuid::Uuid;

use crate::router::Orchestrator;
use crate::state::CoreState;

/// Execute a single orchestrated turn and print the response.
pub async fn run(
    config: Arc<Config>,
    session_id: Uuid,
    message: String,
    user: String,
    json_output: bool,
) -> anyhow::Result<()> {
    // 1. Boot the core.
    let state = CoreState::from_config(config)?;

    // 2. The session must already exist; `run` never creates one.
    let session = state
        .store
        .get_session(session_id)
        .ok_or_else(|| anyhow::anyhow!("no session with id {session_id}"))?;

    // 3. Route through the session's domain entry point.
    let orchestrator = Orchestrator::new(state);
    let outcome = match session.kind() {
        SessionKind::Learning => {
            orchestrator
                .respond_learning(session.id, &user, &message, "")
                .await
        }
        SessionKind::Therapy => {
            orchestrator
                .respond_therapy(session.id, &user, &message, "")
                .await
        }
    };

    // 4. Print.
    if json_output {
        let json = serde_json::to_string_pretty(&outcome)
            .map_err(|e| anyhow::anyhow!("serializing outcome: {e}"))?;
        println!("{json}");
    } else {
        println!("{}", outcome.text);
    }

    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}
