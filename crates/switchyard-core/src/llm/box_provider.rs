//! BoxLlmProvider -- object-safe dynamic dispatch wrapper for LlmProvider.
//!
//! 1. An object-safe `LlmProviderDyn` trait with boxed futures
//! 2. Blanket impl of `LlmProviderDyn` for all `T: LlmProvider`
//! 3. `BoxLlmProvider` wraps `Box<dyn LlmProviderDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use switchyard_types::error::BackendError;
use switchyard_types::llm::{Completion, GenerationParams, Message, ProviderDescriptor};

use super::provider::LlmProvider;

/// Object-safe version of [`LlmProvider`] with boxed futures.
pub trait LlmProviderDyn: Send + Sync {
    fn describe(&self) -> &ProviderDescriptor;

    fn invoke_boxed<'a>(
        &'a self,
        messages: &'a [Message],
        params: &'a GenerationParams,
    ) -> Pin<Box<dyn Future<Output = Result<Completion, BackendError>> + Send + 'a>>;

    fn is_available_boxed(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;
}

impl<T: LlmProvider> LlmProviderDyn for T {
    fn describe(&self) -> &ProviderDescriptor {
        LlmProvider::describe(self)
    }

    fn invoke_boxed<'a>(
        &'a self,
        messages: &'a [Message],
        params: &'a GenerationParams,
    ) -> Pin<Box<dyn Future<Output = Result<Completion, BackendError>> + Send + 'a>> {
        Box::pin(self.invoke(messages, params))
    }

    fn is_available_boxed(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(self.is_available())
    }
}

/// Type-erased provider for runtime provider selection.
///
/// `LlmProvider` uses RPITIT and cannot be a trait object directly; this
/// wrapper exposes the same methods over a `dyn LlmProviderDyn`.
pub struct BoxLlmProvider {
    inner: Box<dyn LlmProviderDyn + Send + Sync>,
}

impl BoxLlmProvider {
    /// Wrap a concrete `LlmProvider` in a type-erased box.
    pub fn new<T: LlmProvider + 'static>(provider: T) -> Self {
        Self {
            inner: Box::new(provider),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.describe().name
    }

    pub fn describe(&self) -> &ProviderDescriptor {
        self.inner.describe()
    }

    pub async fn invoke(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<Completion, BackendError> {
        self.inner.invoke_boxed(messages, params).await
    }

    pub async fn is_available(&self) -> bool {
        self.inner.is_available_boxed().await
    }
}

impl std::fmt::Debug for BoxLlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxLlmProvider")
            .field("name", &self.name())
            .field("model", &self.describe().model.model)
            .finish()
    }
}
