//! LLM provider implementations.
//!
//! Concrete [`LlmProvider`](switchyard_core::llm::provider::LlmProvider)
//! implementations over reqwest: a local Ollama server and any
//! OpenAI-compatible chat completions endpoint.
//!
//! Also provides the provider factory ([`create_provider`]) and the shared
//! mapping of HTTP and transport failures into [`BackendError`].

pub mod ollama;
pub mod openai_compat;
pub mod pricing;

use std::time::Duration;

use secrecy::SecretString;

use switchyard_core::llm::box_provider::BoxLlmProvider;
use switchyard_types::config::{ProviderConfig, RouterConfig};
use switchyard_types::error::{BackendError, ConfigError};
use switchyard_types::llm::{ProviderDescriptor, ProviderType};

use self::ollama::OllamaProvider;
use self::openai_compat::OpenAiCompatibleProvider;

/// Connect timeout of every provider client. Whole-request timeouts are
/// owned by the orchestrator.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout of a liveness probe.
pub(crate) const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a [`BoxLlmProvider`] from a [`ProviderConfig`].
///
/// Resolves the API key from the environment variable named by
/// `api_key_env` and fills in the default price when the config omits one.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] if the key variable is named but unset,
/// or if the HTTP client cannot be built.
pub fn create_provider(config: &ProviderConfig) -> Result<BoxLlmProvider, ConfigError> {
    let mut descriptor: ProviderDescriptor = config.descriptor();
    pricing::apply_default_pricing(&mut descriptor.model, config.provider_type);

    let api_key = match config.api_key_env.as_deref() {
        Some(var) => match std::env::var(var) {
            Ok(value) if !value.is_empty() => Some(SecretString::from(value)),
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}': environment variable {var} is not set",
                    config.name
                )));
            }
        },
        None => None,
    };

    let client = http_client()?;
    let provider = match config.provider_type {
        ProviderType::Ollama => {
            ollama::apply_default_mapping(&mut descriptor.model);
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| ollama::DEFAULT_BASE_URL.to_string());
            BoxLlmProvider::new(OllamaProvider::new(client, descriptor, base_url))
        }
        ProviderType::OpenAiCompatible => {
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| openai_compat::DEFAULT_BASE_URL.to_string());
            BoxLlmProvider::new(OpenAiCompatibleProvider::new(
                client, descriptor, base_url, api_key,
            ))
        }
    };
    tracing::debug!(
        provider = %config.name,
        provider_type = %config.provider_type,
        model = %config.model.model,
        "created provider"
    );
    Ok(provider)
}

/// Create every enabled provider of `config`, in config order.
pub fn create_providers(config: &RouterConfig) -> Result<Vec<BoxLlmProvider>, ConfigError> {
    config.enabled_providers().map(create_provider).collect()
}

fn http_client() -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| ConfigError::Invalid(format!("failed to create HTTP client: {e}")))
}

/// Map a reqwest transport failure.
pub(crate) fn map_transport_error(err: reqwest::Error, elapsed: Duration) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout {
            elapsed_ms: elapsed.as_millis() as u64,
        }
    } else if err.is_connect() {
        BackendError::Connection(err.to_string())
    } else if err.is_decode() {
        BackendError::Other(format!("failed to parse response: {err}"))
    } else {
        BackendError::Other(format!("HTTP request failed: {err}"))
    }
}

/// Turn a non-success response into a [`BackendError`].
///
/// 429 keeps the `Retry-After` hint; every other status is left to the
/// classifier, which also looks at the body.
pub(crate) async fn error_from_response(response: reqwest::Response) -> BackendError {
    let status = response.status().as_u16();
    let retry_after_ms = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = response.text().await.unwrap_or_default();
    match status {
        429 => BackendError::RateLimited { retry_after_ms },
        _ => BackendError::Http { status, body },
    }
}

/// Parse a `Retry-After` value given in (possibly fractional) seconds.
fn parse_retry_after(value: &str) -> Option<u64> {
    let secs: f64 = value.trim().parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| (secs * 1000.0) as u64)
}

/// Join a base URL and a path without doubling the slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
