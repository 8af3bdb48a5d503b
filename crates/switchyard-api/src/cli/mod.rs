//! CLI command definitions for the `swyd` binary.
//!
//! Uses clap derive macros for argument parsing. Every command accepts
//! `--json` for machine-readable output.

pub mod chat;
pub mod provider;
pub mod session;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;

use crate::state::AppState;

/// Route LLM requests across providers with failover and context budgeting.
#[derive(Parser)]
#[command(name = "swyd", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: $SWITCHYARD_CONFIG, then <data dir>/config.toml).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true, hide = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a message, or start an interactive chat when --message is omitted.
    Chat(chat::ChatArgs),

    /// Inspect and manage providers (status, health checks, breakers, metrics).
    Provider {
        #[command(subcommand)]
        action: provider::ProviderCommand,
    },

    /// Inspect and manage conversations.
    #[command(alias = "sessions")]
    Session {
        #[command(subcommand)]
        action: session::SessionCommand,
    },

    /// Show the effective configuration.
    Config,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Print the effective configuration (defaults applied).
pub fn show_config(state: &AppState, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&state.config)?);
        return Ok(());
    }
    println!();
    println!(
        "  {} {}",
        style("Config").bold(),
        style(state.config_path.display()).dim()
    );
    println!("  {} {}", style("Data dir").bold(), style(state.data_dir.display()).dim());
    println!();
    print!("{}", toml::to_string_pretty(&state.config)?);
    Ok(())
}

/// Shorten `s` to at most `max` characters, adding an ellipsis.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
