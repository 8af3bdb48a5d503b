//! switchyard CLI entry point.
//!
//! Binary name: `swyd`
//!
//! Parses CLI arguments, loads the router config, builds the orchestrator,
//! then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,switchyard=debug",
        _ => "trace",
    };
    switchyard_observe::tracing_setup::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "swyd", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(cli.config.as_deref()).await?;

    let result = match cli.command {
        Commands::Chat(args) => cli::chat::run(&state, args, cli.json).await,
        Commands::Provider { action } => {
            cli::provider::handle_provider_command(action, &state, cli.json).await
        }
        Commands::Session { action } => {
            cli::session::handle_session_command(action, &state, cli.json).await
        }
        Commands::Config => cli::show_config(&state, cli.json),
        Commands::Completions { .. } => Ok(()),
    };

    state.shutdown().await;
    switchyard_observe::tracing_setup::shutdown_tracing();
    result
}
