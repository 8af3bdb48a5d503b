//! Scripted provider used by unit tests across the crate.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use switchyard_types::error::BackendError;
use switchyard_types::llm::{
    Completion, GenerationParams, Message, ModelConfig, ParameterConstraint, ProviderDescriptor,
    ProviderType, Usage,
};

use super::provider::LlmProvider;

pub(crate) struct MockProvider {
    descriptor: ProviderDescriptor,
    script: Mutex<VecDeque<Result<Completion, BackendError>>>,
    fallback: Result<Completion, BackendError>,
    calls: Arc<AtomicUsize>,
    available: Arc<AtomicBool>,
    delay: Option<Duration>,
    seen: Arc<Mutex<Vec<(Vec<Message>, GenerationParams)>>>,
}

impl MockProvider {
    pub(crate) fn ok(name: &str) -> Self {
        Self::with_outcome(
            name,
            Ok(Completion {
                text: format!("Hello from {name}"),
                usage: Some(Usage {
                    input_tokens: 10,
                    output_tokens: 20,
                }),
            }),
        )
    }

    pub(crate) fn failing(name: &str, error: BackendError) -> Self {
        Self::with_outcome(name, Err(error))
    }

    fn with_outcome(name: &str, fallback: Result<Completion, BackendError>) -> Self {
        Self {
            descriptor: ProviderDescriptor {
                name: name.to_string(),
                provider_type: ProviderType::Ollama,
                model: ModelConfig::named(format!("{name}-model")),
            },
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: Arc::new(AtomicUsize::new(0)),
            available: Arc::new(AtomicBool::new(true)),
            delay: None,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Outcomes returned before falling back to the default one.
    pub(crate) fn with_script(self, script: Vec<Result<Completion, BackendError>>) -> Self {
        *self.script.lock() = script.into();
        self
    }

    pub(crate) fn with_model(mut self, model: &str) -> Self {
        self.descriptor.model.model = model.to_string();
        self
    }

    pub(crate) fn with_context_window(mut self, tokens: u32) -> Self {
        self.descriptor.model.context_window = tokens;
        self
    }

    pub(crate) fn with_constraint(mut self, param: &str, constraint: ParameterConstraint) -> Self {
        self.descriptor
            .model
            .constraints
            .insert(param.to_string(), constraint);
        self
    }

    pub(crate) fn with_cost(mut self, per_million: f64) -> Self {
        self.descriptor.model.cost_per_million_tokens = Some(per_million);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub(crate) fn availability(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.available)
    }

    pub(crate) fn seen(&self) -> Arc<Mutex<Vec<(Vec<Message>, GenerationParams)>>> {
        Arc::clone(&self.seen)
    }
}

impl LlmProvider for MockProvider {
    fn describe(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn invoke(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> impl Future<Output = Result<Completion, BackendError>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push((messages.to_vec(), params.clone()));
        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        let delay = self.delay;
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            outcome
        }
    }

    fn is_available(&self) -> impl Future<Output = bool> + Send {
        let available = self.available.load(Ordering::SeqCst);
        async move { available }
    }
}
