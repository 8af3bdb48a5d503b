//! LlmProvider trait definition.
//!
//! The capability surface every backend implements: invoke a message list,
//! answer a cheap liveness probe, and describe its model configuration.

use std::future::Future;

use switchyard_types::error::BackendError;
use switchyard_types::llm::{Completion, GenerationParams, Message, ProviderDescriptor};

/// Trait for text-generation backends (Ollama, OpenAI-compatible, ...).
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). Wrap in
/// [`BoxLlmProvider`](super::box_provider::BoxLlmProvider) for dynamic dispatch.
///
/// Implementations live in switchyard-infra. Failures should use the typed
/// `BackendError` variants where the backend reports enough detail; free
/// text is classified by keyword as a last resort.
pub trait LlmProvider: Send + Sync {
    /// Stable name plus capability configuration.
    fn describe(&self) -> &ProviderDescriptor;

    /// Provider name (e.g., "ollama").
    fn name(&self) -> &str {
        &self.describe().name
    }

    /// Generate a completion for `messages` using already-resolved parameters.
    fn invoke(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> impl Future<Output = Result<Completion, BackendError>> + Send;

    /// Cheap liveness probe, independent of `invoke`.
    fn is_available(&self) -> impl Future<Output = bool> + Send;
}
