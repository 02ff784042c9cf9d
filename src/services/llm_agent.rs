use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::{self, Config};
use crate::error::AppError;

const ANTHROPIC_API_VERSION: &str = "2023-06-01";

/// "Send a prompt, get the reply text" as one call.
///
/// Implementations must report an unusable credential as
/// [`AppError::MissingCredential`] and every other failure as
/// [`AppError::RemoteFailure`].
#[async_trait]
pub trait AnalysisTransport: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, AppError>;
}

pub struct LlmAgent {
    client: Client,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl LlmAgent {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            model: config.model.clone(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            max_tokens: config.max_tokens,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

#[async_trait]
impl AnalysisTransport for LlmAgent {
    async fn complete(&self, prompt: &str) -> Result<String, AppError> {
        let api_key = config::api_key_from_env()?;

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
        };

        tracing::debug!("Sending request to {} (model {})", self.messages_url(), self.model);
        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Request to model API failed: {}", e);
                AppError::RemoteFailure(format!("Request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = remote_error_message(status, &body);
            tracing::error!("Model API returned {}: {}", status, message);
            return Err(AppError::RemoteFailure(message));
        }

        let reply: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AppError::RemoteFailure(format!("Failed to parse response: {}", e)))?;

        Ok(reply.text())
    }
}

/// Remote-provided `error.message` when the body has one, otherwise a
/// message built from the status code.
pub fn remote_error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .and_then(|detail| detail.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("API error: {}", status.as_u16()))
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

impl MessagesResponse {
    /// Concatenated text of every content block.
    fn text(self) -> String {
        self.content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_message_is_preferred() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(remote_error_message(StatusCode::SERVICE_UNAVAILABLE, body), "Overloaded");
    }

    #[test]
    fn status_message_is_the_fallback() {
        assert_eq!(remote_error_message(StatusCode::BAD_GATEWAY, "<html>"), "API error: 502");
        assert_eq!(
            remote_error_message(StatusCode::UNAUTHORIZED, r#"{"error":{"message":""}}"#),
            "API error: 401"
        );
    }

    #[test]
    fn reply_text_joins_blocks() {
        let reply: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"Hello "},{"type":"tool_use"},{"type":"text","text":"world"}]}"#,
        )
        .unwrap();
        assert_eq!(reply.text(), "Hello world");

        let empty: MessagesResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.text(), "");
    }

    #[test]
    fn request_body_has_expected_shape() {
        let request = MessagesRequest {
            model: "claude-sonnet-4-20250514",
            max_tokens: 1500,
            messages: vec![RequestMessage { role: "user", content: "hi" }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["max_tokens"], 1500);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn messages_url_ignores_trailing_slash() {
        let config = Config {
            api_base_url: "https://example.test/".to_string(),
            ..Config::default()
        };
        let agent = LlmAgent::new(&config).unwrap();
        assert_eq!(agent.messages_url(), "https://example.test/v1/messages");
    }
}
