use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;
use waypoint_core::config::{LlmConfig, LlmProvider};

/// One deterministic text-completion call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub stop: Vec<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn deterministic(prompt: impl Into<String>, stop: Vec<String>, max_tokens: u32) -> Self {
        Self { prompt: prompt.into(), stop, temperature: 0.0, max_tokens }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("text generation transport failed: {0}")]
    Transport(String),
    #[error("text generation timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("text generation returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("text generation response could not be decoded: {0}")]
    Decode(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

/// Completion client for a self-hosted vLLM server, Ollama or an
/// OpenAI-compatible completions endpoint.
#[derive(Clone, Debug)]
pub struct HttpLlmClient {
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    timeout: Duration,
    client: Client,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| LlmError::Transport(format!("could not build http client: {error}")))?;

        Ok(Self {
            provider: config.provider,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            timeout,
            client,
        })
    }

    fn endpoint(&self) -> String {
        let path = match self.provider {
            LlmProvider::Vllm => "/generate",
            LlmProvider::Ollama => "/api/generate",
            LlmProvider::OpenAi => "/v1/completions",
        };
        format!("{}{path}", self.base_url)
    }

    fn payload(&self, request: &CompletionRequest) -> Value {
        match self.provider {
            LlmProvider::Vllm => json!({
                "prompt": request.prompt,
                "temperature": request.temperature,
                "stop": request.stop,
                "max_tokens": request.max_tokens,
            }),
            LlmProvider::Ollama => json!({
                "model": self.model,
                "prompt": request.prompt,
                "stream": false,
                "options": {
                    "temperature": request.temperature,
                    "stop": request.stop,
                    "num_predict": request.max_tokens,
                },
            }),
            LlmProvider::OpenAi => json!({
                "model": self.model,
                "prompt": request.prompt,
                "temperature": request.temperature,
                "stop": request.stop,
                "max_tokens": request.max_tokens,
            }),
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let mut call = self
            .client
            .post(self.endpoint())
            .header(header::CONTENT_TYPE, "application/json")
            .json(&self.payload(request));
        if let Some(api_key) = &self.api_key {
            call = call.bearer_auth(api_key.expose_secret());
        }

        let response = call.send().await.map_err(|error| {
            if error.is_timeout() {
                LlmError::Timeout { secs: self.timeout.as_secs() }
            } else {
                LlmError::Transport(error.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        let body: Value =
            response.json().await.map_err(|error| LlmError::Decode(error.to_string()))?;
        let text = completion_text(self.provider, &request.prompt, &body)?;
        debug!(provider = self.provider.as_str(), chars = text.len(), "completion received");
        Ok(text)
    }
}

/// Pulls the generated text out of a provider response. vLLM echoes the
/// prompt in front of the completion, so it is stripped here.
pub fn completion_text(
    provider: LlmProvider,
    prompt: &str,
    body: &Value,
) -> Result<String, LlmError> {
    let raw = match provider {
        LlmProvider::Vllm => body["text"][0].as_str(),
        LlmProvider::Ollama => body["response"].as_str(),
        LlmProvider::OpenAi => body["choices"][0]["text"].as_str(),
    }
    .ok_or_else(|| {
        LlmError::Decode(format!("{} response has no completion text", provider.as_str()))
    })?;

    Ok(raw.strip_prefix(prompt).unwrap_or(raw).to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use waypoint_core::config::{AppConfig, LlmProvider};

    use super::{completion_text, CompletionRequest, HttpLlmClient, LlmError};

    #[test]
    fn vllm_completion_strips_prompt_echo() {
        let body = json!({ "text": ["Q: \"Лечу в Сочи\"\nA: Destination: \"Сочи\""] });
        let text = completion_text(LlmProvider::Vllm, "Q: \"Лечу в Сочи\"\nA: Destination: \"", &body)
            .expect("text present");
        assert_eq!(text, "Сочи\"");
    }

    #[test]
    fn ollama_and_openai_shapes_are_read() {
        let ollama = json!({ "response": "KZN" });
        let openai = json!({ "choices": [{ "text": "MOW" }] });
        assert_eq!(completion_text(LlmProvider::Ollama, "p", &ollama).expect("ollama"), "KZN");
        assert_eq!(completion_text(LlmProvider::OpenAi, "p", &openai).expect("openai"), "MOW");
    }

    #[test]
    fn missing_text_is_a_decode_error() {
        let error = completion_text(LlmProvider::OpenAi, "p", &json!({ "choices": [] }))
            .expect_err("no choices");
        assert!(matches!(error, LlmError::Decode(_)));
    }

    #[test]
    fn payload_follows_provider_dialect() {
        let mut config = AppConfig::default().llm;
        let request = CompletionRequest::deterministic("prompt", vec!["\"".to_string()], 32);

        let vllm = HttpLlmClient::from_config(&config).expect("client");
        assert!(vllm.endpoint().ends_with("/generate"));
        assert_eq!(vllm.payload(&request)["temperature"], 0.0);
        assert!(vllm.payload(&request).get("model").is_none());

        config.provider = LlmProvider::Ollama;
        let ollama = HttpLlmClient::from_config(&config).expect("client");
        assert!(ollama.endpoint().ends_with("/api/generate"));
        assert_eq!(ollama.payload(&request)["options"]["num_predict"], 32);
        assert_eq!(ollama.payload(&request)["stream"], false);
    }
}
