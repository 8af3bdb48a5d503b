//! Observability for switchyard: tracing subscriber setup and teardown.

pub mod tracing_setup;
