//! Provider CLI commands: status, check, reset, metrics.
//!
//! Health and breaker state live in memory, so `status` shows what this
//! process has observed; `check` probes every provider first.

use anyhow::Result;
use chrono::Utc;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use switchyard_infra::llm::pricing::format_cost;
use switchyard_types::metrics::{CircuitStateKind, format_ago};

use super::truncate;
use crate::state::AppState;

#[derive(Subcommand, Debug)]
pub enum ProviderCommand {
    /// Show health, circuit breaker state and call counts of every provider.
    Status,

    /// Probe every provider now and show the result.
    Check,

    /// Close a provider's circuit breaker.
    Reset {
        /// Provider name.
        name: String,
    },

    /// Show invocation metrics of one or all providers.
    Metrics {
        /// Provider name; all providers when omitted.
        name: Option<String>,
    },
}

pub async fn handle_provider_command(
    cmd: ProviderCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        ProviderCommand::Status => print_status(state, json),
        ProviderCommand::Check => check(state, json).await,
        ProviderCommand::Reset { name } => reset(state, &name, json),
        ProviderCommand::Metrics { name } => metrics(state, name.as_deref(), json),
    }
}

fn table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header(names: &[&str]) -> Vec<Cell> {
    names.iter().map(|n| Cell::new(n).fg(Color::White)).collect()
}

pub fn print_status(state: &AppState, json: bool) -> Result<()> {
    let statuses = state.orchestrator.provider_status();
    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    let primary = state.orchestrator.primary();
    let now = Utc::now();
    let mut table = table();
    table.set_header(header(&[
        "Provider", "Model", "Health", "Circuit", "Probe Fails", "Last Error", "Checked",
        "Calls", "Failures",
    ]));

    for status in &statuses {
        let name = if status.name == primary {
            format!("{} *", status.name)
        } else {
            status.name.clone()
        };
        let health = if status.healthy {
            Cell::new("healthy").fg(Color::Green)
        } else {
            Cell::new("UNHEALTHY").fg(Color::Red)
        };
        let circuit = match status.circuit_state {
            CircuitStateKind::Closed => Cell::new("closed").fg(Color::Green),
            CircuitStateKind::Open => Cell::new("OPEN").fg(Color::Red),
            CircuitStateKind::Probing => Cell::new("probing").fg(Color::Yellow),
        };
        let checked = status
            .last_checked
            .map_or_else(|| "-".to_string(), |at| format_ago(at, now));
        table.add_row(vec![
            Cell::new(name),
            Cell::new(&status.model),
            health,
            circuit,
            Cell::new(status.consecutive_failures),
            Cell::new(truncate(status.last_error.as_deref().unwrap_or("-"), 40)),
            Cell::new(checked),
            Cell::new(status.total_calls),
            Cell::new(status.total_failures),
        ]);
    }

    println!();
    println!(
        "  {} ({} policy, * = primary)",
        style("Provider Status").bold(),
        state.orchestrator.policy()
    );
    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn check(state: &AppState, json: bool) -> Result<()> {
    let results = state.orchestrator.force_health_check().await;
    if json {
        let value: Vec<_> = results
            .iter()
            .map(|(name, available)| serde_json::json!({"provider": name, "available": available}))
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!();
    for (name, available) in &results {
        let mark = if *available {
            style("✓").green()
        } else {
            style("✗").red()
        };
        println!("  {mark} {name}");
    }
    println!();
    let healthy = state.orchestrator.healthy_providers();
    println!(
        "  {} of {} providers eligible: {}",
        healthy.len(),
        results.len(),
        if healthy.is_empty() {
            "-".to_string()
        } else {
            healthy.join(", ")
        }
    );
    println!();
    Ok(())
}

fn reset(state: &AppState, name: &str, json: bool) -> Result<()> {
    state.orchestrator.reset_circuit_breaker(name)?;
    if json {
        println!("{}", serde_json::json!({"provider": name, "circuit_state": "closed"}));
    } else {
        println!(
            "  {} Circuit breaker for {} closed",
            style("✓").green(),
            style(name).cyan()
        );
    }
    Ok(())
}

fn metrics(state: &AppState, name: Option<&str>, json: bool) -> Result<()> {
    let snapshots = state.orchestrator.get_metrics(name);
    if let (Some(name), true) = (name, snapshots.is_empty()) {
        anyhow::bail!("unknown provider '{name}'");
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
        return Ok(());
    }

    let mut table = table();
    table.set_header(header(&[
        "Provider", "Requests", "Success", "Avg Latency", "Recent", "Tokens", "Cost", "Score",
    ]));
    for m in &snapshots {
        table.add_row(vec![
            Cell::new(&m.provider),
            Cell::new(m.total_requests),
            Cell::new(format!("{:.0}%", m.success_rate * 100.0)),
            Cell::new(format!("{:.0}ms", m.average_latency_ms)),
            Cell::new(
                m.recent_average_latency_ms
                    .map_or_else(|| "-".to_string(), |ms| format!("{ms:.0}ms")),
            ),
            Cell::new(m.total_tokens),
            Cell::new(format_cost(m.total_cost)),
            Cell::new(format!("{:.2}", m.health_score)),
        ]);
    }
    println!();
    println!("{table}");
    println!();
    Ok(())
}
