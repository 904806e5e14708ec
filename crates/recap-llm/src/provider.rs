use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use recap_core::completion::{Completion, CompletionRequest, CompletionService, StopReason};
use recap_core::errors::CompletionError;

pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_API_VERSION: &str = "2023-06-01";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Wraps an API key with secrecy protection (zeroized on drop, redacted in Debug).
#[derive(Clone)]
pub struct ApiKey(pub SecretString);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(SecretString::from(key.into()))
    }

    /// Read the key from an environment variable, ignoring empty values.
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(Self::new)
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Connection settings for the Messages API backend.
#[derive(Clone, Debug)]
pub struct MessagesApiConfig {
    pub api_url: String,
    pub api_version: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl Default for MessagesApiConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            model: "claude-sonnet-4-5".to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Non-streaming completion backend over the Anthropic Messages API.
pub struct MessagesApiProvider {
    client: Client,
    key: ApiKey,
    config: MessagesApiConfig,
}

impl MessagesApiProvider {
    pub fn new(key: ApiKey, config: MessagesApiConfig) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CompletionError::NetworkError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, key, config })
    }
}

/// Build the JSON body for one request.
pub fn build_request_body(request: &CompletionRequest, default_model: &str) -> Value {
    let mut content: Vec<Value> = request
        .images
        .iter()
        .map(|url| json!({"type": "image", "source": {"type": "url", "url": url}}))
        .collect();
    content.push(json!({"type": "text", "text": request.prompt}));

    let mut body = json!({
        "model": request.model.as_deref().unwrap_or(default_model),
        "max_tokens": request.max_tokens,
        "messages": [{"role": "user", "content": content}],
    });
    if !request.system.is_empty() {
        body["system"] = Value::String(request.system.clone());
    }
    if let Some(t) = request.temperature {
        body["temperature"] = json!(t);
    }
    body
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    content: Vec<ApiBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Parse a successful response body into a completion.
pub fn parse_response(body: &str) -> Result<Completion, CompletionError> {
    let parsed: ApiResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;

    let text: String = parsed
        .content
        .iter()
        .filter(|b| b.kind == "text")
        .filter_map(|b| b.text.as_deref())
        .collect::<Vec<_>>()
        .join("");

    let stop_reason = parsed
        .stop_reason
        .as_deref()
        .map(StopReason::parse)
        .unwrap_or(StopReason::Other);

    Ok(Completion {
        text: text.trim().to_string(),
        stop_reason,
    })
}

fn classify_transport_error(e: reqwest::Error, timeout: Duration) -> CompletionError {
    if e.is_timeout() {
        CompletionError::Timeout(timeout)
    } else {
        CompletionError::NetworkError(e.to_string())
    }
}

#[async_trait]
impl CompletionService for MessagesApiProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip_all, fields(default_model = %self.config.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CompletionError> {
        let body = build_request_body(request, &self.config.model);

        let resp = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", self.key.0.expose_secret())
            .header("anthropic-version", &self.config.api_version)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(e, self.config.request_timeout))?;

        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        let text = resp
            .text()
            .await
            .map_err(|e| classify_transport_error(e, self.config.request_timeout))?;

        if !(200..300).contains(&status) {
            debug!(status, "completion request rejected");
            return Err(match CompletionError::from_status(status, text) {
                CompletionError::RateLimited { .. } => CompletionError::RateLimited { retry_after },
                other => other,
            });
        }

        parse_response(&text)?.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_has_system_and_text_block() {
        let req = CompletionRequest::new("be brief", "hello", 250);
        let body = build_request_body(&req, "model-a");
        assert_eq!(body["model"], "model-a");
        assert_eq!(body["max_tokens"], 250);
        assert_eq!(body["system"], "be brief");
        let content = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0]["text"], "hello");
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn body_puts_images_before_text() {
        let req = CompletionRequest::new("", "describe", 100)
            .with_images(vec!["https://cdn.example/a.jpg".into()])
            .with_model(Some("vision-model".into()));
        let body = build_request_body(&req, "model-a");
        assert_eq!(body["model"], "vision-model");
        assert!(body.get("system").is_none());
        let content = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[0]["source"]["url"], "https://cdn.example/a.jpg");
        assert_eq!(content[1]["type"], "text");
    }

    #[test]
    fn parse_joins_text_blocks() {
        let body = r#"{
            "content": [
                {"type": "text", "text": "Alice "},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "spoke. "}
            ],
            "stop_reason": "end_turn"
        }"#;
        let completion = parse_response(body).unwrap();
        assert_eq!(completion.text, "Alice spoke.");
        assert_eq!(completion.stop_reason, StopReason::EndTurn);
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = parse_response("not json").unwrap_err();
        assert!(matches!(err, CompletionError::MalformedResponse(_)));
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new("sk-secret");
        assert_eq!(format!("{key:?}"), "ApiKey([REDACTED])");
    }

    #[test]
    fn provider_reports_configured_model() {
        let provider =
            MessagesApiProvider::new(ApiKey::new("k"), MessagesApiConfig::default()).unwrap();
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.model(), "claude-sonnet-4-5");
    }

    /// Hits the real API. Enabled with `--features integration`; skipped
    /// when `ANTHROPIC_API_KEY` is unset.
    #[cfg(feature = "integration")]
    #[tokio::test]
    async fn live_completion_round_trip() {
        let Some(key) = ApiKey::from_env("ANTHROPIC_API_KEY") else {
            return;
        };
        let provider = MessagesApiProvider::new(key, MessagesApiConfig::default()).unwrap();
        let req = CompletionRequest::new("Reply with one word.", "Say hello.", 16);
        let completion = provider.complete(&req).await.unwrap();
        assert!(!completion.text.is_empty());
    }
}
