//! Vision-model client: send one page image plus prompt, get the raw reply.
//!
//! [`ModelClient`] is the seam the page processor depends on. The bundled
//! [`AnthropicClient`] speaks the Messages API over `reqwest`; tests and
//! callers with their own gateway plug in any other implementation.
//!
//! Clients return `Err(ClientError)` for every transport-level problem
//! (timeout, network, non-2xx, undecodable body). They never panic, and the
//! processor turns each error into that page's failure record. There is no
//! retry: a failed call stays failed.

use crate::config::ConversionConfig;
use crate::error::Pdf2HtmlError;
use crate::pipeline::encode::ImageData;
use crate::pipeline::extract::reply_text;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// A successful reply from the model endpoint.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    /// `content[0].text`, or empty when the body has no text block.
    pub text: String,
    /// The full decoded reply body.
    pub body: serde_json::Value,
}

/// Transport-level failure of one model call.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("undecodable response body: {0}")]
    Decode(String),
}

/// Sends one image + prompt to a vision model.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn send(&self, image: &ImageData, prompt: &str) -> Result<ModelResponse, ClientError>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "model"
    }
}

// ── Messages API request body ────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct MessagesRequest<'a> {
    pub model: &'a str,
    pub max_tokens: usize,
    pub temperature: f32,
    pub messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
pub struct Message<'a> {
    pub role: &'static str,
    pub content: Vec<ContentBlock<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock<'a> {
    Text { text: &'a str },
    Image { source: ImageSource<'a> },
}

#[derive(Debug, Serialize)]
pub struct ImageSource<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub media_type: &'a str,
    pub data: &'a str,
}

/// Build the single-turn request: prompt text first, then the page image.
pub fn build_request<'a>(
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    image: &'a ImageData,
    prompt: &'a str,
) -> MessagesRequest<'a> {
    MessagesRequest {
        model,
        max_tokens,
        temperature,
        messages: vec![Message {
            role: "user",
            content: vec![
                ContentBlock::Text { text: prompt },
                ContentBlock::Image {
                    source: ImageSource {
                        kind: "base64",
                        media_type: &image.media_type,
                        data: &image.data,
                    },
                },
            ],
        }],
    }
}

/// Turn a decoded reply body into a [`ModelResponse`].
pub fn parse_response(body: serde_json::Value) -> ModelResponse {
    let text = match reply_text(&body) {
        Some(t) => t.to_string(),
        None => {
            warn!("Model reply has no content[0].text block");
            String::new()
        }
    };
    ModelResponse { text, body }
}

// ── Anthropic Messages API client ────────────────────────────────────────

/// [`ModelClient`] for the Anthropic Messages API.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    api_version: String,
    model: String,
    max_tokens: usize,
    temperature: f32,
    timeout: Duration,
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AnthropicClient {
    /// Build a client from the run configuration.
    ///
    /// Fails with [`Pdf2HtmlError::MissingApiKey`] before any request is
    /// made when the key is absent or a placeholder.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, Pdf2HtmlError> {
        let api_key = config.require_api_key()?.to_string();
        let http = reqwest::Client::builder()
            .timeout(config.api_timeout)
            .build()
            .map_err(|e| Pdf2HtmlError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key,
            api_version: config.api_version.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: config.api_timeout,
        })
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn send(&self, image: &ImageData, prompt: &str) -> Result<ModelResponse, ClientError> {
        let request = build_request(&self.model, self.max_tokens, self.temperature, image, prompt);

        let response = self
            .http
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::Timeout {
                        ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    ClientError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout {
                    ms: self.timeout.as_millis() as u64,
                }
            } else {
                ClientError::Decode(e.to_string())
            }
        })?;

        debug!(
            "Model reply: {} output tokens",
            body.pointer("/usage/output_tokens")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0)
        );

        Ok(parse_response(body))
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let image = ImageData::new("QUJD", "image/png");
        let req = build_request("claude-test", 4096, 0.1, &image, "recreate this");
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["model"], "claude-test");
        assert_eq!(json["max_tokens"], 4096);
        assert_eq!(json["messages"][0]["role"], "user");

        let content = &json["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[0]["text"], "recreate this");
        assert_eq!(content[1]["type"], "image");
        assert_eq!(content[1]["source"]["type"], "base64");
        assert_eq!(content[1]["source"]["media_type"], "image/png");
        assert_eq!(content[1]["source"]["data"], "QUJD");
    }

    #[test]
    fn parse_response_reads_text_and_keeps_body() {
        let body = serde_json::json!({
            "id": "msg_01",
            "content": [{ "type": "text", "text": "{\"output\": \"<html></html>\"}" }],
            "usage": { "input_tokens": 10, "output_tokens": 20 }
        });
        let resp = parse_response(body.clone());
        assert_eq!(resp.text, "{\"output\": \"<html></html>\"}");
        assert_eq!(resp.body, body);
    }

    #[test]
    fn parse_response_without_text_is_empty() {
        let resp = parse_response(serde_json::json!({ "content": [] }));
        assert!(resp.text.is_empty());
    }

    #[test]
    fn from_config_requires_api_key() {
        let config = ConversionConfig::default();
        assert!(matches!(
            AnthropicClient::from_config(&config),
            Err(Pdf2HtmlError::MissingApiKey)
        ));
    }

    #[test]
    fn from_config_with_key() {
        let config = ConversionConfig::builder()
            .api_key("sk-ant-test")
            .model("claude-x")
            .build()
            .unwrap();
        let client = AnthropicClient::from_config(&config).unwrap();
        assert_eq!(client.name(), "anthropic");
        assert!(!format!("{client:?}").contains("sk-ant-test"));
    }

    #[test]
    fn client_error_display() {
        let e = ClientError::Http {
            status: 529,
            body: "overloaded".into(),
        };
        assert_eq!(e.to_string(), "HTTP 529: overloaded");
        assert!(ClientError::Timeout { ms: 60_000 }.to_string().contains("60000ms"));
    }
}
