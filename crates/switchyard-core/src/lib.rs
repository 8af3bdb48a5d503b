//! Resilience core for switchyard.
//!
//! Provider selection, health tracking, circuit breaking, error
//! classification, retry/recovery, context-window budgeting and the
//! conversation store. Defines the ports (provider and snapshot traits) that
//! the infrastructure layer implements; depends only on `switchyard-types`,
//! never on `switchyard-infra` or any network/database crate.

pub mod chat;
pub mod context;
pub mod llm;
