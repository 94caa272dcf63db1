//! OpenAI-compatible HTTP model backend
//!
//! Lets a local inference server (llama.cpp, vLLM, Ollama, ...) stand in for
//! the on-device model. Sessions are stateless: the system prompt is resent
//! with every call.

use crate::capability::{Availability, LanguageModel, ModelSession, PromptOptions, PromptPart, SessionConfig, Summarizer};
use async_trait::async_trait;
use pageguard_core::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpBackendConfig {
    /// API root, e.g. `http://127.0.0.1:8080/v1`
    pub base_url: String,

    /// Model identifier sent with every request
    pub model: String,

    /// Bearer token, if the server wants one
    #[serde(default)]
    pub api_key: Option<String>,

    /// Offer a summarizer built on the same model
    #[serde(default = "default_true")]
    pub summarizer: bool,
}

fn default_true() -> bool {
    true
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/v1".to_string(),
            model: "gemma-3n".to_string(),
            api_key: None,
            summarizer: true,
        }
    }
}

#[derive(Clone)]
struct HttpClient {
    http: reqwest::Client,
    config: Arc<HttpBackendConfig>,
}

impl HttpClient {
    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| Error::config(format!("invalid api key: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn chat(&self, body: &Value, timeout: Option<Duration>) -> Result<String> {
        let mut request = self
            .http
            .post(self.url("chat/completions"))
            .headers(self.headers()?)
            .json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| Error::network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::classifier(format!(
                "model API error ({}): {}",
                status, error_text
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::parse(format!("malformed chat response: {}", e)))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::classifier("no response from model"))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// [`LanguageModel`] served over an OpenAI-compatible API
pub struct HttpLanguageModel {
    client: HttpClient,
}

impl HttpLanguageModel {
    pub fn new(config: HttpBackendConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(http: reqwest::Client, config: HttpBackendConfig) -> Self {
        Self {
            client: HttpClient {
                http,
                config: Arc::new(config),
            },
        }
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn availability(&self) -> Result<Availability> {
        let response = match self
            .client
            .http
            .get(self.client.url("models"))
            .headers(self.client.headers()?)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(status = %response.status(), "Model listing refused");
                return Ok(Availability::Unavailable);
            }
            Err(e) => {
                debug!("Model server unreachable: {}", e);
                return Ok(Availability::Unavailable);
            }
        };

        let models: ModelList = response
            .json()
            .await
            .map_err(|e| Error::parse(format!("malformed model list: {}", e)))?;

        if models.data.iter().any(|m| m.id == self.client.config.model) {
            Ok(Availability::Available)
        } else {
            Ok(Availability::Downloadable)
        }
    }

    async fn create_session(&self, config: &SessionConfig) -> Result<Arc<dyn ModelSession>> {
        Ok(Arc::new(HttpSession {
            client: self.client.clone(),
            system_prompt: config.system_prompt.clone(),
        }))
    }

    async fn create_summarizer(&self) -> Result<Option<Arc<dyn Summarizer>>> {
        if !self.client.config.summarizer {
            return Ok(None);
        }
        Ok(Some(Arc::new(HttpSummarizer {
            client: self.client.clone(),
        })))
    }

    fn name(&self) -> &str {
        &self.client.config.model
    }
}

/// Stateless chat session
pub struct HttpSession {
    client: HttpClient,
    system_prompt: String,
}

/// Render prompt parts as chat content parts
fn content_parts(parts: &[PromptPart]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| match part {
            PromptPart::Text(text) => json!({ "type": "text", "text": text }),
            PromptPart::Image(image) => json!({
                "type": "image_url",
                "image_url": { "url": image.encode() }
            }),
        })
        .collect()
}

#[async_trait]
impl ModelSession for HttpSession {
    async fn prompt(&self, parts: &[PromptPart], options: &PromptOptions) -> Result<String> {
        let mut body = json!({
            "model": self.client.config.model,
            "messages": [
                { "role": "system", "content": self.system_prompt },
                { "role": "user", "content": content_parts(parts) },
            ],
            "temperature": 0.0,
        });

        if let Some(schema) = &options.response_schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": { "name": "verdict", "strict": true, "schema": schema },
            });
        }

        debug!(model = %self.client.config.model, parts = parts.len(), "Chat request");
        self.client.chat(&body, options.timeout).await
    }
}

/// Summarizer built on the same chat endpoint
pub struct HttpSummarizer {
    client: HttpClient,
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(&self, text: &str, context: &str) -> Result<String> {
        let body = json!({
            "model": self.client.config.model,
            "messages": [
                { "role": "system", "content": "Write a concise key-points summary in plain text." },
                { "role": "user", "content": format!("{}:\n\n{}", context, text) },
            ],
            "temperature": 0.0,
        });
        self.client.chat(&body, None).await
    }
}
