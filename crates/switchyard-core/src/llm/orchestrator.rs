//! Request orchestration across providers.
//!
//! One request runs `SELECT -> INVOKE -> (SUCCESS | FAIL)`:
//!
//! - SELECT: the explicit provider when the caller names one, otherwise the
//!   selection policy's choice over eligible providers followed by the
//!   configured primary and fallbacks.
//! - INVOKE: per candidate, attempts `1..=max_attempts`. Each failure is
//!   classified once, fed to metrics and the circuit breaker, run through
//!   the recovery registry, then retried, failed over, or aborted.
//! - Every attempt checks the request deadline first; a backoff that would
//!   cross it is not slept.
//!
//! Terminal failures carry every `ErrorRecord` collected along the way.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use switchyard_types::config::{RouterConfig, SelectionPolicy};
use switchyard_types::conversation::ContextOptimization;
use switchyard_types::error::{BackendError, ConfigError, ErrorCategory, ErrorRecord, RouterError};
use switchyard_types::llm::{GenerationParams, Message, Usage};
use switchyard_types::metrics::{CircuitStateKind, ProviderMetricsSnapshot, ProviderStatusInfo};

use super::box_provider::BoxLlmProvider;
use super::circuit_breaker::Permit;
use super::classify::classify;
use super::health::{HealthBoard, HealthMonitor};
use super::metrics::MetricsStore;
use super::params::resolve_params;
use super::recovery::{RecoveryAction, RecoveryContext, RecoveryRegistry};
use super::registry::ProviderRegistry;
use super::retry::RetryPolicy;
use super::selection::{SelectionContext, SelectionStrategy, strategy_for};
use crate::chat::store::ConversationStore;
use crate::context::estimator::TokenEstimator;

/// One inference request.
#[derive(Debug, Clone, Default)]
pub struct InferenceRequest {
    /// The new user message.
    pub message: String,
    /// Conversation to read history from and append the exchange to.
    pub conversation_id: Option<String>,
    /// System message. Stored on the conversation when one is given.
    pub system: Option<String>,
    /// Bypass selection and use exactly this provider.
    pub provider: Option<String>,
    /// Named parameter profile (`creative`, `precise`, `balanced`, ...).
    pub profile: Option<String>,
    pub params: GenerationParams,
    /// Overrides the configured request deadline.
    pub deadline: Option<Duration>,
}

impl InferenceRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn in_conversation(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key, value);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Result of a successful inference.
#[derive(Debug, Clone)]
pub struct InferenceResponse {
    pub text: String,
    /// Provider that produced the answer.
    pub provider: String,
    pub model: String,
    pub usage: Option<Usage>,
    /// Provider calls made, across all candidates.
    pub attempts: u32,
    pub latency: Duration,
    /// Set when a provider other than the primary answered.
    pub failover_warning: Option<String>,
    /// Set when appending the exchange triggered an optimization pass.
    pub optimization: Option<ContextOptimization>,
    /// Records of the attempts that failed before the answer.
    pub errors: Vec<ErrorRecord>,
}

/// Gives back a circuit breaker probe if the call is dropped mid-flight.
struct ProbeGuard<'a> {
    board: &'a HealthBoard,
    name: &'a str,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.board.release_probe(self.name);
        }
    }
}

/// How one candidate ended.
enum CandidateOutcome {
    Success(InferenceResponse),
    Fallback,
    Abort,
    DeadlineExceeded,
}

/// Composes provider selection, retries, recovery and the conversation
/// store into one request path. Construct once, share behind an `Arc`.
pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    board: Arc<HealthBoard>,
    metrics: MetricsStore,
    strategy: Box<dyn SelectionStrategy>,
    retry: RetryPolicy,
    recovery: RecoveryRegistry,
    estimator: TokenEstimator,
    store: Arc<ConversationStore>,
    /// Primary, fallbacks, then every other provider in registration order.
    chain: Vec<String>,
    primary: String,
    fallbacks: Vec<String>,
    request_timeout: Duration,
    request_deadline: Duration,
    health_interval: Duration,
    cleanup_interval: Duration,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Build with an in-memory conversation store.
    pub fn new(config: &RouterConfig, providers: Vec<BoxLlmProvider>) -> Result<Self, ConfigError> {
        let store = ConversationStore::new(&config.context, &config.sessions);
        Self::with_store(config, providers, store)
    }

    pub fn with_store(
        config: &RouterConfig,
        providers: Vec<BoxLlmProvider>,
        store: ConversationStore,
    ) -> Result<Self, ConfigError> {
        let mut registry = ProviderRegistry::new();
        for provider in providers {
            registry.register(provider);
        }
        let Some(first) = registry.names().first().map(|n| n.to_string()) else {
            return Err(ConfigError::Invalid("no providers registered".into()));
        };

        let primary = config.primary.clone().unwrap_or(first);
        for name in std::iter::once(&primary).chain(&config.fallbacks) {
            if !registry.contains(name) {
                return Err(ConfigError::Invalid(format!(
                    "provider '{name}' is configured but not registered"
                )));
            }
        }

        let mut chain = vec![primary.clone()];
        for name in config
            .fallbacks
            .iter()
            .map(String::as_str)
            .chain(registry.names())
        {
            if !chain.iter().any(|c| c == name) {
                chain.push(name.to_string());
            }
        }

        let board = HealthBoard::new(config.health.failure_threshold, config.circuit_breaker.clone());
        let metrics = MetricsStore::new();
        for provider in registry.iter() {
            board.register(provider.name());
            metrics.register(
                provider.name(),
                provider.describe().model.cost_per_million_tokens.unwrap_or(0.0),
            );
        }

        let estimator = *store.optimizer().estimator();
        tracing::info!(
            providers = registry.len(),
            primary = %primary,
            policy = %config.selection,
            "Orchestrator ready"
        );

        Ok(Self {
            registry: Arc::new(registry),
            board: Arc::new(board),
            metrics,
            strategy: strategy_for(config.selection),
            retry: RetryPolicy::new(config.retry.clone()),
            recovery: RecoveryRegistry::from_config(&config.recovery, estimator),
            estimator,
            store: Arc::new(store),
            chain,
            primary,
            fallbacks: config.fallbacks.clone(),
            request_timeout: config.request_timeout(),
            request_deadline: config.request_deadline(),
            health_interval: Duration::from_secs(config.health.check_interval_secs.max(1)),
            cleanup_interval: Duration::from_secs(config.sessions.cleanup_interval_secs.max(1)),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.strategy.policy()
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Start the health monitor and the idle-conversation cleanup loop.
    /// Calling it again while running is a no-op.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }
        let monitor = HealthMonitor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.board),
            self.health_interval,
        );
        tasks.push(monitor.spawn(self.cancel.child_token()));
        tasks.push(
            Arc::clone(&self.store).spawn_cleanup(self.cleanup_interval, self.cancel.child_token()),
        );
        tracing::info!(
            health_interval_secs = self.health_interval.as_secs(),
            cleanup_interval_secs = self.cleanup_interval.as_secs(),
            "Background tasks started"
        );
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }
        tracing::info!("Orchestrator shut down");
    }

    /// Serve one request end to end.
    pub async fn infer(&self, request: InferenceRequest) -> Result<InferenceResponse, RouterError> {
        let started = Instant::now();
        let deadline = started + request.deadline.unwrap_or(self.request_deadline);

        let mut messages = match &request.conversation_id {
            Some(id) => {
                if let Some(system) = &request.system {
                    self.store.set_system_message(id, system.clone()).await;
                }
                self.store.get_history(id).await.unwrap_or_default()
            }
            None => request.system.iter().map(Message::system).collect(),
        };
        messages.push(Message::user(request.message.clone()));

        let candidates = self.candidates(request.provider.as_deref())?;
        tracing::debug!(?candidates, "Candidates selected");

        let mut errors = Vec::new();
        let mut attempts = 0;
        for (index, name) in candidates.iter().enumerate() {
            let remaining = candidates.len() - index - 1;
            let outcome = self
                .run_candidate(
                    name,
                    remaining,
                    &request,
                    &mut messages,
                    &mut errors,
                    &mut attempts,
                    deadline,
                )
                .await?;
            match outcome {
                CandidateOutcome::Success(mut response) => {
                    response.latency = started.elapsed();
                    if let Some(id) = &request.conversation_id {
                        response.optimization = self
                            .store
                            .append_exchange(id, request.message.clone(), response.text.clone())
                            .await;
                    }
                    return Ok(response);
                }
                CandidateOutcome::Fallback => {
                    tracing::warn!(provider = %name, remaining, "Falling back to next provider");
                }
                CandidateOutcome::Abort => {
                    tracing::error!(provider = %name, errors = errors.len(), "Request aborted");
                    return Err(RouterError::Aborted {
                        provider: name.clone(),
                        errors,
                    });
                }
                CandidateOutcome::DeadlineExceeded => {
                    return Err(self.deadline_exceeded(started, errors));
                }
            }
        }

        tracing::error!(errors = errors.len(), "All providers failed");
        Err(RouterError::Exhausted { errors })
    }

    /// The attempt loop of one candidate.
    #[allow(clippy::too_many_arguments)]
    async fn run_candidate(
        &self,
        name: &str,
        remaining: usize,
        request: &InferenceRequest,
        messages: &mut Vec<Message>,
        errors: &mut Vec<ErrorRecord>,
        attempts: &mut u32,
        deadline: Instant,
    ) -> Result<CandidateOutcome, RouterError> {
        let Some(provider) = self.registry.get(name) else {
            return Err(RouterError::UnknownProvider(name.to_string()));
        };
        let descriptor = provider.describe();

        // Malformed parameters: surfaced before any network call, never retried.
        let params = resolve_params(&descriptor.model, request.profile.as_deref(), &request.params)
            .map_err(|record| RouterError::Validation {
                record: record.with_provider(name),
            })?;

        let mut timeout = self.request_timeout;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let now = Instant::now();
            if now >= deadline {
                return Ok(CandidateOutcome::DeadlineExceeded);
            }

            let Some(permit) = self.board.try_acquire(name) else {
                let state = self
                    .board
                    .breaker_state(name)
                    .unwrap_or(CircuitStateKind::Open);
                tracing::debug!(provider = %name, %state, "Circuit breaker rejected call");
                errors.push(
                    ErrorRecord::new(
                        ErrorCategory::Provider,
                        format!("circuit breaker for '{name}' rejected the call"),
                    )
                    .with_detail("circuit_state", state.to_string())
                    .with_provider(name)
                    .with_attempt(attempt),
                );
                return Ok(CandidateOutcome::Fallback);
            };
            let mut probe = ProbeGuard {
                board: &self.board,
                name,
                armed: permit == Permit::Probe,
            };

            *attempts += 1;
            let attempt_timeout = timeout.min(deadline.saturating_duration_since(now));
            let span = tracing::info_span!(
                "gen_ai.invoke",
                gen_ai.system = %descriptor.provider_type,
                gen_ai.request.model = %descriptor.model.model,
                provider = %name,
                attempt,
            );
            let call_started = Instant::now();
            let outcome = tokio::time::timeout(
                attempt_timeout,
                provider.invoke(messages.as_slice(), &params).instrument(span),
            )
            .await;
            let latency = call_started.elapsed();
            probe.armed = false;

            let error = match outcome {
                Ok(Ok(completion)) => {
                    let tokens = completion.usage.map_or_else(
                        || {
                            self.estimator.estimate_messages(messages.as_slice())
                                + self.estimator.estimate_text(&completion.text)
                        },
                        |usage| usage.total(),
                    );
                    self.metrics.record_success(name, latency, u64::from(tokens));
                    self.board.record_success(name);

                    let failover_warning = self.failover_warning(name);
                    if let Some(warning) = &failover_warning {
                        tracing::warn!(%warning, "Failover occurred");
                    }
                    tracing::info!(
                        provider = %name,
                        attempt,
                        latency_ms = latency.as_millis() as u64,
                        "Inference succeeded"
                    );
                    return Ok(CandidateOutcome::Success(InferenceResponse {
                        text: completion.text,
                        provider: name.to_string(),
                        model: descriptor.model.model.clone(),
                        usage: completion.usage,
                        attempts: *attempts,
                        latency,
                        failover_warning,
                        optimization: None,
                        errors: std::mem::take(errors),
                    }));
                }
                Ok(Err(error)) => error,
                Err(_) => BackendError::Timeout {
                    elapsed_ms: latency.as_millis() as u64,
                },
            };

            let record = classify(&error, name, attempt);
            self.metrics.record_failure(name, latency, &record);
            self.board.record_failure(name, &record);
            tracing::warn!(
                provider = %name,
                attempt,
                category = %record.category(),
                error = %record.message(),
                "Provider attempt failed"
            );

            let action = self.recovery.recover(
                &record,
                &RecoveryContext {
                    messages: messages.as_slice(),
                    context_window: descriptor.model.context_window,
                    current_timeout: timeout,
                },
            );
            let mut wait = None;
            let mut truncated = false;
            let mut force_fallback = false;
            match action {
                RecoveryAction::Truncate {
                    messages: shorter,
                    target_tokens,
                } => {
                    tracing::info!(
                        provider = %name,
                        from = messages.len(),
                        to = shorter.len(),
                        target_tokens,
                        "Truncated context after overflow"
                    );
                    *messages = shorter;
                    truncated = true;
                }
                RecoveryAction::Wait(delay) => wait = Some(delay),
                RecoveryAction::ExtendTimeout(extended) => {
                    tracing::debug!(
                        provider = %name,
                        timeout_ms = extended.as_millis() as u64,
                        "Extending attempt timeout"
                    );
                    timeout = extended;
                }
                RecoveryAction::Fallback => force_fallback = true,
                RecoveryAction::None => {}
            }

            let breaker_rejects = self.board.breaker_would_reject(name);
            let retry = !force_fallback
                && !breaker_rejects
                && (self.retry.should_retry(&record, attempt, breaker_rejects)
                    || (truncated && attempt < self.retry.max_attempts()));
            let mut deadline_blocked = false;
            if retry {
                let delay = if truncated {
                    Duration::ZERO
                } else {
                    wait.unwrap_or_else(|| self.retry.delay_for(attempt))
                };
                if Instant::now() + delay < deadline {
                    tracing::debug!(
                        provider = %name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying"
                    );
                    errors.push(record);
                    tokio::time::sleep(delay).await;
                    continue;
                }
                tracing::debug!(
                    provider = %name,
                    delay_ms = delay.as_millis() as u64,
                    "Backoff would cross the request deadline"
                );
                deadline_blocked = true;
            }

            let fallback = self
                .retry
                .should_fallback(&record, self.board.breaker_is_open(name), remaining)
                || (force_fallback && remaining > 0);
            let validation = record.category() == ErrorCategory::Validation;
            errors.push(record);
            return Ok(if fallback {
                CandidateOutcome::Fallback
            } else if deadline_blocked {
                CandidateOutcome::DeadlineExceeded
            } else if remaining == 0 && !validation {
                // Nothing left to fall back to; reported as exhaustion.
                CandidateOutcome::Fallback
            } else {
                CandidateOutcome::Abort
            });
        }
    }

    /// Ordered candidates for one request.
    fn candidates(&self, explicit: Option<&str>) -> Result<Vec<String>, RouterError> {
        if let Some(name) = explicit {
            if !self.registry.contains(name) {
                return Err(RouterError::UnknownProvider(name.to_string()));
            }
            return Ok(vec![name.to_string()]);
        }

        let eligible: Vec<String> = self
            .chain
            .iter()
            .filter(|name| self.board.is_eligible(name))
            .cloned()
            .collect();
        let selected = self.metrics.read(|metrics| {
            self.strategy.select(&SelectionContext {
                eligible: &eligible,
                metrics,
                now: Instant::now(),
            })
        });
        let Some(selected) = selected else {
            let errors = self.unavailable_records();
            tracing::error!(providers = self.chain.len(), "No eligible provider");
            return Err(RouterError::NoProviderAvailable { errors });
        };
        tracing::debug!(provider = %selected, policy = %self.strategy.policy(), "Provider selected");

        let mut candidates = vec![selected];
        for name in std::iter::once(&self.primary).chain(&self.fallbacks) {
            if !candidates.contains(name) && self.board.is_healthy(name) {
                candidates.push(name.clone());
            }
        }
        Ok(candidates)
    }

    fn unavailable_records(&self) -> Vec<ErrorRecord> {
        self.chain
            .iter()
            .map(|name| {
                let healthy = self.board.is_healthy(name);
                let state = self
                    .board
                    .breaker_state(name)
                    .unwrap_or(CircuitStateKind::Closed);
                ErrorRecord::new(
                    ErrorCategory::Provider,
                    format!("provider '{name}' is not eligible"),
                )
                .with_provider(name.as_str())
                .with_detail("healthy", healthy)
                .with_detail("circuit_state", state.to_string())
            })
            .collect()
    }

    fn deadline_exceeded(&self, started: Instant, mut errors: Vec<ErrorRecord>) -> RouterError {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        errors.push(
            ErrorRecord::new(ErrorCategory::Timeout, "request deadline exceeded")
                .with_detail("elapsed_ms", elapsed_ms),
        );
        tracing::error!(elapsed_ms, errors = errors.len(), "Request deadline exceeded");
        RouterError::DeadlineExceeded { elapsed_ms, errors }
    }

    /// Warning shown when a provider other than the primary answered.
    fn failover_warning(&self, used: &str) -> Option<String> {
        if used == self.primary {
            return None;
        }
        let mut parts = vec![format!("Switched to {used}")];
        let window = |name: &str| {
            self.registry
                .get(name)
                .map(|p| p.describe().model.context_window)
        };
        if let (Some(primary_window), Some(used_window)) =
            (window(self.primary.as_str()), window(used))
        {
            if used_window < primary_window {
                parts.push("Running on a smaller model -- responses may be less detailed".into());
            }
        }
        Some(parts.join(". "))
    }

    /// Metrics snapshots of one provider, or of all when `provider` is `None`.
    pub fn get_metrics(&self, provider: Option<&str>) -> Vec<ProviderMetricsSnapshot> {
        match provider {
            Some(name) => self.metrics.snapshot(name).into_iter().collect(),
            None => self.metrics.snapshots(),
        }
    }

    /// Providers currently eligible for selection, in chain order.
    pub fn healthy_providers(&self) -> Vec<String> {
        self.chain
            .iter()
            .filter(|name| self.board.is_eligible(name))
            .cloned()
            .collect()
    }

    /// Probe every provider now instead of waiting for the monitor.
    pub async fn force_health_check(&self) -> Vec<(String, bool)> {
        HealthMonitor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.board),
            self.health_interval,
        )
        .check_all()
        .await
    }

    pub fn reset_circuit_breaker(&self, provider: &str) -> Result<(), RouterError> {
        if self.board.reset_breaker(provider) {
            tracing::info!(provider = %provider, "Circuit breaker reset");
            Ok(())
        } else {
            Err(RouterError::UnknownProvider(provider.to_string()))
        }
    }

    pub async fn conversation_history(&self, id: &str) -> Option<Vec<Message>> {
        self.store.get_history(id).await
    }

    /// Health, breaker and call counts of every provider, in chain order.
    pub fn provider_status(&self) -> Vec<ProviderStatusInfo> {
        self.chain
            .iter()
            .filter_map(|name| {
                let provider = self.registry.get(name)?;
                let health = self.board.status(name).unwrap_or_default();
                let metrics = self.metrics.snapshot(name);
                Some(ProviderStatusInfo {
                    name: name.clone(),
                    model: provider.describe().model.model.clone(),
                    healthy: health.healthy,
                    circuit_state: self
                        .board
                        .breaker_state(name)
                        .unwrap_or(CircuitStateKind::Closed),
                    consecutive_failures: health.consecutive_failures,
                    last_error: health.last_error,
                    last_checked: health.last_checked,
                    total_calls: metrics.as_ref().map_or(0, |m| m.total_requests),
                    total_failures: metrics.as_ref().map_or(0, |m| m.failed_requests),
                })
            })
            .collect()
    }
}
