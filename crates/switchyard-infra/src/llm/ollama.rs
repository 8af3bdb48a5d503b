//! OllamaProvider -- [`LlmProvider`] for a local Ollama server.
//!
//! Sends non-streaming requests to `/api/chat`. Generation parameters go in
//! the `options` object, already renamed through the model's
//! `parameter_mapping`. Ollama providers get `max_tokens -> num_predict`
//! unless the config maps it elsewhere.
//! Liveness is a `GET /api/tags`, which lists installed models and never
//! loads one.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;

use switchyard_core::llm::provider::LlmProvider;
use switchyard_types::error::BackendError;
use switchyard_types::llm::{
    Completion, GenerationParams, Message, MessageRole, ModelConfig, ProviderDescriptor, Usage,
};

use super::{PROBE_TIMEOUT, error_from_response, join_url, map_transport_error};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Generic parameter names Ollama spells differently.
const DEFAULT_PARAMETER_MAPPING: &[(&str, &str)] = &[("max_tokens", "num_predict")];

/// Add Ollama's parameter names to `model`. Entries already configured win.
pub fn apply_default_mapping(model: &mut ModelConfig) {
    for (generic, specific) in DEFAULT_PARAMETER_MAPPING {
        model
            .parameter_mapping
            .entry((*generic).to_string())
            .or_insert_with(|| (*specific).to_string());
    }
}

pub struct OllamaProvider {
    client: reqwest::Client,
    descriptor: ProviderDescriptor,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Map::is_empty")]
    options: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: MessageRole,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

/// Error body Ollama returns with 200 in some failure modes.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl OllamaProvider {
    pub fn new(client: reqwest::Client, descriptor: ProviderDescriptor, base_url: String) -> Self {
        Self {
            client,
            descriptor,
            base_url,
        }
    }

    fn build_request<'a>(
        &'a self,
        messages: &'a [Message],
        params: &GenerationParams,
    ) -> ChatRequest<'a> {
        let options = params
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        ChatRequest {
            model: &self.descriptor.model.model,
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role,
                    content: &m.content,
                })
                .collect(),
            stream: false,
            options,
        }
    }

    fn parse_response(body: &str) -> Result<Completion, BackendError> {
        if let Ok(err) = serde_json::from_str::<ErrorBody>(body) {
            return Err(BackendError::Other(err.error));
        }
        let response: ChatResponse = serde_json::from_str(body)
            .map_err(|e| BackendError::Other(format!("failed to parse response: {e}")))?;
        let usage = match (response.prompt_eval_count, response.eval_count) {
            (None, None) => None,
            (input, output) => Some(Usage {
                input_tokens: input.unwrap_or(0),
                output_tokens: output.unwrap_or(0),
            }),
        };
        Ok(Completion {
            text: response.message.content,
            usage,
        })
    }
}

impl LlmProvider for OllamaProvider {
    fn describe(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn invoke(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<Completion, BackendError> {
        let body = self.build_request(messages, params);
        let started = Instant::now();

        let response = self
            .client
            .post(join_url(&self.base_url, "/api/chat"))
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, started.elapsed()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let text = response
            .text()
            .await
            .map_err(|e| map_transport_error(e, started.elapsed()))?;
        Self::parse_response(&text)
    }

    async fn is_available(&self) -> bool {
        let result = self
            .client
            .get(join_url(&self.base_url, "/api/tags"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;
        match result {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                tracing::debug!(provider = %self.descriptor.name, "liveness probe failed: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchyard_core::llm::params::resolve_params;
    use switchyard_types::llm::{ModelConfig, ProviderType};

    fn provider(base_url: &str) -> OllamaProvider {
        let mut model = ModelConfig::named("llama3.2");
        apply_default_mapping(&mut model);
        OllamaProvider::new(
            reqwest::Client::new(),
            ProviderDescriptor {
                name: "local".into(),
                provider_type: ProviderType::Ollama,
                model,
            },
            base_url.to_string(),
        )
    }

    #[test]
    fn test_request_body_shape() {
        let p = provider(DEFAULT_BASE_URL);
        let messages = vec![Message::system("be brief"), Message::user("hi")];
        let overrides = GenerationParams::new()
            .with("temperature", 0.2)
            .with("max_tokens", 64);
        let params = resolve_params(&p.descriptor.model, None, &overrides).unwrap();
        let body = serde_json::to_value(p.build_request(&messages, &params)).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "llama3.2",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"}
                ],
                "stream": false,
                "options": {"temperature": 0.2, "num_predict": 64}
            })
        );
    }

    #[test]
    fn test_default_mapping_keeps_configured_entries() {
        let mut model = ModelConfig::named("llama3.2");
        apply_default_mapping(&mut model);
        assert_eq!(model.parameter_mapping["max_tokens"], "num_predict");

        let mut custom = ModelConfig::named("llama3.2");
        custom
            .parameter_mapping
            .insert("max_tokens".into(), "num_ctx".into());
        apply_default_mapping(&mut custom);
        assert_eq!(custom.parameter_mapping["max_tokens"], "num_ctx");
    }

    #[test]
    fn test_options_pass_through_unrenamed() {
        let p = provider(DEFAULT_BASE_URL);
        let messages = vec![Message::user("hi")];
        let params = GenerationParams::new().with("max_tokens", 8);
        let body = serde_json::to_value(p.build_request(&messages, &params)).unwrap();
        assert_eq!(body["options"], json!({"max_tokens": 8}));
    }

    #[test]
    fn test_empty_params_omit_options() {
        let p = provider(DEFAULT_BASE_URL);
        let messages = vec![Message::user("hi")];
        let body = serde_json::to_value(p.build_request(&messages, &GenerationParams::new())).unwrap();
        assert!(body.get("options").is_none());
    }

    #[test]
    fn test_parse_response_with_usage() {
        let body = r#"{"model":"llama3.2","message":{"role":"assistant","content":"Hello!"},
            "done":true,"prompt_eval_count":12,"eval_count":3}"#;
        let completion = OllamaProvider::parse_response(body).unwrap();
        assert_eq!(completion.text, "Hello!");
        assert_eq!(
            completion.usage,
            Some(Usage {
                input_tokens: 12,
                output_tokens: 3
            })
        );
    }

    #[test]
    fn test_parse_response_without_usage() {
        let body = r#"{"message":{"role":"assistant","content":"ok"},"done":true}"#;
        let completion = OllamaProvider::parse_response(body).unwrap();
        assert!(completion.usage.is_none());
    }

    #[test]
    fn test_parse_error_body() {
        let err = OllamaProvider::parse_response(r#"{"error":"model 'x' not found"}"#).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        // Port 9 (discard) is closed on any test machine.
        let p = provider("http://127.0.0.1:9");
        assert!(!p.is_available().await);
        let err = p
            .invoke(&[Message::user("hi")], &GenerationParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Connection(_)), "{err:?}");
    }
}
