//! `swyd chat`: one-shot or interactive inference through the orchestrator.
//!
//! With `--message` a single request is sent and the process exits. Without
//! it, lines are read from stdin until EOF or `/exit`; the conversation id
//! defaults to a fresh UUID v7 so history carries across turns.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use console::style;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};

use switchyard_core::llm::orchestrator::{InferenceRequest, InferenceResponse};
use switchyard_types::error::RouterError;

use crate::state::AppState;

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Message to send; omit to start an interactive session.
    #[arg(short, long)]
    pub message: Option<String>,

    /// Conversation id; history is kept and sent with every message.
    #[arg(short, long)]
    pub conversation: Option<String>,

    /// Send only to this provider, bypassing selection.
    #[arg(long)]
    pub provider: Option<String>,

    /// Parameter profile (creative, precise, balanced, or a configured one).
    #[arg(long)]
    pub profile: Option<String>,

    /// System message for the conversation.
    #[arg(long)]
    pub system: Option<String>,

    /// Generation parameter override, KEY=VALUE (VALUE parsed as JSON when possible).
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, Value)>,

    /// Overall request deadline in seconds.
    #[arg(long, value_name = "SECS")]
    pub deadline: Option<u64>,
}

/// Parse `key=value`; the value is JSON if it parses, else a plain string.
fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

impl ChatArgs {
    fn request(&self, message: &str, conversation: Option<&str>) -> InferenceRequest {
        let mut request = InferenceRequest::new(message);
        if let Some(id) = conversation {
            request = request.in_conversation(id);
        }
        if let Some(system) = &self.system {
            request = request.with_system(system);
        }
        if let Some(provider) = &self.provider {
            request = request.with_provider(provider);
        }
        if let Some(profile) = &self.profile {
            request = request.with_profile(profile);
        }
        for (key, value) in &self.params {
            request = request.with_param(key, value.clone());
        }
        if let Some(secs) = self.deadline {
            request = request.with_deadline(Duration::from_secs(secs));
        }
        request
    }
}

pub async fn run(state: &AppState, args: ChatArgs, json: bool) -> Result<()> {
    match args.message.clone() {
        Some(message) => {
            let request = args.request(&message, args.conversation.as_deref());
            let outcome = state.orchestrator.infer(request).await;
            print_outcome(outcome, json)
        }
        None => interactive(state, &args, json).await,
    }
}

async fn interactive(state: &AppState, args: &ChatArgs, json: bool) -> Result<()> {
    state.orchestrator.start();
    let conversation = args
        .conversation
        .clone()
        .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());

    if !json {
        println!();
        println!(
            "  {} conversation {} via {} ({})",
            style("swyd").bold().cyan(),
            style(&conversation).yellow(),
            style(state.orchestrator.primary()).green(),
            state.orchestrator.policy()
        );
        println!(
            "  {}",
            style("/history, /clear, /status, /exit").dim()
        );
        println!();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if !json {
            eprint!("{} ", style(">").bold().green());
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/exit" | "/quit" => break,
            "/history" => {
                super::session::print_history(state, &conversation, json).await?;
                continue;
            }
            "/clear" => {
                state.orchestrator.store().clear(&conversation).await;
                if !json {
                    println!("  {}", style("History cleared").dim());
                }
                continue;
            }
            "/status" => {
                super::provider::print_status(state, json)?;
                continue;
            }
            _ => {}
        }

        let outcome = state
            .orchestrator
            .infer(args.request(line, Some(&conversation)))
            .await;
        // A failed turn is reported and the session goes on.
        if let Err(e) = print_outcome(outcome, json) {
            eprintln!("  {} {e}", style("error:").red().bold());
        }
    }
    Ok(())
}

fn print_outcome(outcome: Result<InferenceResponse, RouterError>, json: bool) -> Result<()> {
    match outcome {
        Ok(response) => {
            if json {
                println!("{}", serde_json::to_string(&response_json(&response))?);
            } else {
                print_response(&response);
            }
            Ok(())
        }
        Err(err) => {
            if json {
                println!("{}", serde_json::to_string(&error_json(&err))?);
            } else {
                print_error_records(&err);
            }
            Err(err.into())
        }
    }
}

fn response_json(response: &InferenceResponse) -> Value {
    json!({
        "text": response.text,
        "provider": response.provider,
        "model": response.model,
        "usage": response.usage,
        "attempts": response.attempts,
        "latency_ms": response.latency.as_millis() as u64,
        "failover_warning": response.failover_warning,
        "optimization": response.optimization,
        "errors": response.errors,
    })
}

fn error_json(err: &RouterError) -> Value {
    json!({
        "error": err.to_string(),
        "records": err.records(),
    })
}

fn print_response(response: &InferenceResponse) {
    if let Some(warning) = &response.failover_warning {
        eprintln!("  {} {warning}", style("!").yellow().bold());
    }
    println!("{}", response.text);
    if let Some(optimization) = &response.optimization {
        eprintln!(
            "  {}",
            style(format!(
                "context optimized ({}): {} -> {} tokens",
                optimization.strategy, optimization.original_tokens, optimization.optimized_tokens
            ))
            .dim()
        );
    }
    tracing::debug!(
        provider = %response.provider,
        attempts = response.attempts,
        latency_ms = response.latency.as_millis() as u64,
        "response received"
    );
}

fn print_error_records(err: &RouterError) {
    for record in err.records() {
        eprintln!(
            "  {} {} {}",
            style(format!("[{}]", record.provider().unwrap_or("-"))).dim(),
            style(record.category()).red(),
            record.message()
        );
    }
}
