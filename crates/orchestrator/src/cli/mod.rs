pub mod chat;
pub mod config;
pub mod doctor;
pub mod run;
pub mod sessions;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Sage — multi-agent tutoring and therapy conversations.
#[derive(Debug, Parser)]
#[command(name = "sage", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactive chat with a session's agents.
    Chat {
        /// Start a new learning session on this topic.
        #[arg(long, value_name = "TOPIC", conflicts_with_all = ["therapy", "session"])]
        learning: Option<String>,
        /// Start a new therapy session around this concern.
        #[arg(long, value_name = "CONCERN", conflicts_with = "session")]
        therapy: Option<String>,
        /// Resume an existing session by id.
        #[arg(long)]
        session: Option<Uuid>,
        /// User id for rate limiting and audit rows.
        #[arg(long, default_value = "local")]
        user: String,
    },
    /// Send a single message to a session and print the reply.
    Run {
        /// Session id to send to.
        session_id: Uuid,
        /// The message to send.
        message: String,
        /// User id for rate limiting and audit rows.
        #[arg(long, default_value = "local")]
        user: String,
        /// Output the full outcome as JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },
    /// List all sessions in the data directory.
    Sessions,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Run diagnostic checks against the current configuration.
    Doctor,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `SAGE_CONFIG` (or
/// `config.toml` by default).  Returns the parsed [`Config`] and the
/// path that was used.
///
/// Shared by every subcommand so the logic lives in one place.
pub fn load_config() -> anyhow::Result<(sage_domain::config::Config, String)> {
    let config_path = std::env::var("SAGE_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        sage_domain::config::Config::default()
    };

    Ok((config, config_path))
}
