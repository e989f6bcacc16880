//! Transport for OpenAI-compatible chat completions.
//!
//! [`ChatTransport`] is the seam between the extractor and the network.
//! [`HttpChatTransport`] is the real implementation over `reqwest`; tests
//! substitute doubles that count calls or fail on demand.

use crate::api::wire::{ChatCompletionRequest, ChatCompletionResponse};
use crate::config::ApiExtractorConfig;
use crate::error::BoxError;
use crate::pipeline::postprocess::strip_surrogate_escapes;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Longest response-body excerpt kept in a [`TransportError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Failures while issuing a chat completion request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not build the HTTP client.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Connection, TLS, or timeout failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The body was not a chat completion response.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Any other transport-specific failure.
    #[error(transparent)]
    Other(BoxError),
}

/// Sends chat completion requests.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn create_chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, TransportError>;
}

/// [`ChatTransport`] over HTTPS with bearer-token auth.
#[derive(Clone)]
pub struct HttpChatTransport {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl fmt::Debug for HttpChatTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpChatTransport")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl HttpChatTransport {
    pub fn new(config: &ApiExtractorConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(TransportError::Client)?;
        Ok(Self {
            client,
            url: config.chat_completions_url(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn create_chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, TransportError> {
        debug!("POST {} (model {})", self.url, request.model);
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status,
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let parsed = serde_json::from_str(&strip_surrogate_escapes(&body))?;
        Ok(parsed)
    }
}

/// Cut `s` to at most `max` bytes on a char boundary.
fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}
