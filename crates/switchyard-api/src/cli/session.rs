//! Conversation CLI commands: list, history, clear, cleanup.

use anyhow::Result;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use switchyard_types::llm::MessageRole;

use super::truncate;
use crate::state::AppState;

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// List known conversations.
    #[command(alias = "ls")]
    List,

    /// Show the history of a conversation.
    History {
        /// Conversation id.
        id: String,
    },

    /// Delete a conversation and its snapshot.
    Clear {
        /// Conversation id.
        id: String,
    },

    /// Remove conversations idle past the configured timeout.
    Cleanup,
}

pub async fn handle_session_command(
    cmd: SessionCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        SessionCommand::List => list(state, json).await,
        SessionCommand::History { id } => print_history(state, &id, json).await,
        SessionCommand::Clear { id } => clear(state, &id, json).await,
        SessionCommand::Cleanup => cleanup(state, json).await,
    }
}

async fn list(state: &AppState, json: bool) -> Result<()> {
    let store = state.orchestrator.store();
    let mut conversations = Vec::new();
    for id in store.conversation_ids() {
        if let Some(conversation) = store.get(&id).await {
            conversations.push(conversation);
        }
    }

    if json {
        let value: Vec<_> = conversations
            .iter()
            .map(|c| {
                serde_json::json!({
                    "id": c.id,
                    "messages": c.len(),
                    "exchanges": c.metadata.exchange_count,
                    "created_at": c.metadata.created_at,
                    "last_updated": c.metadata.last_updated,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if conversations.is_empty() {
        println!();
        println!(
            "  {} No conversations. Start one with: {}",
            style("i").blue().bold(),
            style("swyd chat --conversation <id>").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Conversation").fg(Color::White),
        Cell::new("Messages").fg(Color::White),
        Cell::new("Exchanges").fg(Color::White),
        Cell::new("Last Updated").fg(Color::White),
    ]);
    for c in &conversations {
        table.add_row(vec![
            Cell::new(&c.id),
            Cell::new(c.len()),
            Cell::new(c.metadata.exchange_count),
            Cell::new(c.metadata.last_updated.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }
    println!();
    println!("{table}");
    println!();
    Ok(())
}

pub async fn print_history(state: &AppState, id: &str, json: bool) -> Result<()> {
    let Some(history) = state.orchestrator.conversation_history(id).await else {
        anyhow::bail!("conversation '{id}' not found");
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    println!();
    for message in &history {
        let role = match message.role {
            MessageRole::System => style("system").magenta(),
            MessageRole::User => style("user").green(),
            MessageRole::Assistant => style("assistant").cyan(),
        };
        println!("  {:>9}  {}", role.bold(), truncate(&message.content, 200));
    }
    println!();
    Ok(())
}

async fn clear(state: &AppState, id: &str, json: bool) -> Result<()> {
    let existed = state.orchestrator.store().clear(id).await;
    if json {
        println!("{}", serde_json::json!({"conversation": id, "cleared": existed}));
    } else if existed {
        println!("  {} Conversation {} cleared", style("✓").green(), style(id).cyan());
    } else {
        println!("  {} No conversation {}", style("i").blue().bold(), style(id).cyan());
    }
    Ok(())
}

async fn cleanup(state: &AppState, json: bool) -> Result<()> {
    let removed = state.orchestrator.store().cleanup_idle().await;
    if json {
        println!("{}", serde_json::json!({"removed": removed}));
    } else {
        println!(
            "  {} Removed {} idle conversation(s)",
            style("✓").green(),
            removed.len()
        );
    }
    Ok(())
}
