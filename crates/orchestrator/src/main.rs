use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sage_orchestrator::cli::{self, Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Chat {
            learning,
            therapy,
            session,
            user,
        } => {
            init_cli_tracing();
            let (config, _) = cli::load_config()?;
            cli::chat::chat(Arc::new(config), learning, therapy, session, user).await
        }
        Command::Run {
            session_id,
            message,
            user,
            json,
        } => {
            init_cli_tracing();
            let (config, _) = cli::load_config()?;
            cli::run::run(Arc::new(config), session_id, message, user, json).await
        }
        Command::Sessions => {
            init_cli_tracing();
            let (config, _) = cli::load_config()?;
            cli::sessions::run(Arc::new(config))
        }
        Command::Config(ConfigCommand::Validate) => {
            let (config, config_path) = cli::load_config()?;
            let valid = cli::config::validate(&config, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => {
            let (config, _) = cli::load_config()?;
            cli::config::show(&config);
            Ok(())
        }
        Command::Doctor => {
            let (config, config_path) = cli::load_config()?;
            let passed = cli::doctor::run(&config, &config_path).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

/// Initialize compact stderr-only tracing for CLI commands.
///
/// Defaults to `warn` level so diagnostic output does not pollute stdout.
fn init_cli_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
