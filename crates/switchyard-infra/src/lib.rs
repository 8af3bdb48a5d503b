//! Infrastructure layer for switchyard.
//!
//! Contains implementations of the ports defined in `switchyard-core`:
//! HTTP providers (Ollama, OpenAI-compatible), SQLite conversation snapshots,
//! plus the TOML configuration loader and the default pricing table.

pub mod config;
pub mod llm;
pub mod sqlite;
