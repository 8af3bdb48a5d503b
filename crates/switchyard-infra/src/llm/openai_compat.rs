//! OpenAiCompatibleProvider -- [`LlmProvider`] for any OpenAI-compatible API.
//!
//! Works with OpenAI and the many servers that mirror its chat completions
//! surface (vLLM, LM Studio, llama.cpp server, Groq, Mistral, ...). Resolved
//! generation parameters are merged into the request body as-is, so
//! provider-specific names come from `parameter_mapping`.
//!
//! The API key is wrapped in [`SecretString`] and is only exposed when
//! building the `Authorization` header. This type deliberately does not
//! derive `Debug`.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::time::Instant;

use switchyard_core::llm::provider::LlmProvider;
use switchyard_types::error::BackendError;
use switchyard_types::llm::{Completion, GenerationParams, Message, ProviderDescriptor, Usage};

use super::{PROBE_TIMEOUT, error_from_response, join_url, map_transport_error};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    descriptor: ProviderDescriptor,
    base_url: String,
    api_key: Option<SecretString>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        client: reqwest::Client,
        descriptor: ProviderDescriptor,
        base_url: String,
        api_key: Option<SecretString>,
    ) -> Self {
        Self {
            client,
            descriptor,
            base_url,
            api_key,
        }
    }

    fn build_body(&self, messages: &[Message], params: &GenerationParams) -> Value {
        let mut body = Map::new();
        for (key, value) in params.iter() {
            body.insert(key.clone(), value.clone());
        }
        body.insert("model".into(), json!(self.descriptor.model.model));
        body.insert(
            "messages".into(),
            messages
                .iter()
                .map(|m| json!({"role": m.role, "content": m.content}))
                .collect(),
        );
        body.insert("stream".into(), json!(false));
        Value::Object(body)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key.expose_secret()),
            None => request,
        }
    }

    fn parse_response(body: &str) -> Result<Completion, BackendError> {
        let completion: ChatCompletion = serde_json::from_str(body)
            .map_err(|e| BackendError::Other(format!("failed to parse response: {e}")))?;
        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BackendError::Other("response contained no choices".into()))?;
        Ok(Completion {
            text,
            usage: completion.usage.map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }
}

impl LlmProvider for OpenAiCompatibleProvider {
    fn describe(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn invoke(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<Completion, BackendError> {
        let body = self.build_body(messages, params);
        let started = Instant::now();

        let request = self
            .client
            .post(join_url(&self.base_url, "/chat/completions"))
            .json(&body);
        let response = self
            .authorize(request)
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
        let request = self
            .client
            .get(join_url(&self.base_url, "/models"))
            .timeout(PROBE_TIMEOUT);
        match self.authorize(request).send().await {
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
    use switchyard_types::llm::{ModelConfig, ProviderType};

    fn provider(base_url: &str) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new(
            reqwest::Client::new(),
            ProviderDescriptor {
                name: "cloud".into(),
                provider_type: ProviderType::OpenAiCompatible,
                model: ModelConfig::named("gpt-4o-mini"),
            },
            base_url.to_string(),
            Some(SecretString::from("sk-test".to_string())),
        )
    }

    #[test]
    fn test_body_merges_params() {
        let p = provider(DEFAULT_BASE_URL);
        let params = GenerationParams::new()
            .with("temperature", 0.7)
            .with("max_completion_tokens", 256);
        let body = p.build_body(&[Message::user("hi")], &params);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["max_completion_tokens"], 256);
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_params_cannot_override_model() {
        let p = provider(DEFAULT_BASE_URL);
        let params = GenerationParams::new().with("model", "other");
        let body = p.build_body(&[Message::user("hi")], &params);
        assert_eq!(body["model"], "gpt-4o-mini");
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"Hi there"},
            "finish_reason":"stop"}],"usage":{"prompt_tokens":9,"completion_tokens":2,"total_tokens":11}}"#;
        let completion = OpenAiCompatibleProvider::parse_response(body).unwrap();
        assert_eq!(completion.text, "Hi there");
        assert_eq!(completion.usage.unwrap().total(), 11);
    }

    #[test]
    fn test_parse_response_without_choices() {
        let err = OpenAiCompatibleProvider::parse_response(r#"{"choices":[]}"#).unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let p = provider("http://127.0.0.1:9/v1");
        assert!(!p.is_available().await);
        let err = p
            .invoke(&[Message::user("hi")], &GenerationParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Connection(_)), "{err:?}");
    }
}
