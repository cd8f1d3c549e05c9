//! `sage sessions` — list every session in the data directory.

use std::sync::Arc;

use sage_domain::config::Config;
use sage_sessions::SessionStatus;

use crate::state::CoreState;

pub fn run(config: Arc<Config>) -> anyhow::Result<()> {
    let state = CoreState::from_config(config)?;

    let mut sessions = state.store.list_sessions();
    if sessions.is_empty() {
        println!("No sessions yet. Start one with `sage chat --learning <topic>`.");
        return Ok(());
    }
    sessions.sort_by_key(|s| s.created_at);

    println!(
        "{:<36}  {:<8}  {:<24}  {:>8}  {:<9}  subject",
        "id", "kind", "phase", "progress", "status"
    );
    for session in sessions {
        let status = match session.status {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
        };
        println!(
            "{:<36}  {:<8}  {:<24}  {:>7.0}%  {:<9}  {}",
            session.id,
            session.kind().as_str(),
            session.phase.as_str(),
            session.completion_rate,
            status,
            session.profile.subject()
        );
    }
    Ok(())
}
