use actix_web::web::Bytes;
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use reqwest::Client;
use std::pin::Pin;

use super::CompletionRequest;
use crate::config::AppConfig;
use crate::errors::{GproError, GproResult};

/// Raw body of a streaming completion response
pub type ByteStream = Pin<Box<dyn Stream<Item = GproResult<Bytes>> + Send>>;

// Longest provider error body echoed back to the browser
const MAX_ERROR_BODY: usize = 300;

/// A chat-completion backend able to stream its response
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Whether credentials are present; an unconfigured provider is never called
    fn is_configured(&self) -> bool;

    /// Open one streaming completion request. Non-success statuses are errors.
    async fn open_stream(&self, request: &CompletionRequest) -> GproResult<ByteStream>;
}

/// OpenAI-compatible `/chat/completions` endpoint
pub struct OpenAiProvider {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl OpenAiProvider {
    pub fn new(config: &AppConfig) -> GproResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            url: config.provider_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn open_stream(&self, request: &CompletionRequest) -> GproResult<ByteStream> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GproError::Config("API key not configured".to_string()))?;

        tracing::debug!(url = %self.url, model = %request.model, messages = request.messages.len(), "Opening provider stream");

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GproError::Timeout("Provider did not respond in time".to_string())
                } else {
                    GproError::Upstream(format!("Failed to reach provider: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
            tracing::warn!(%status, "Provider rejected completion request: {}", excerpt);
            return Err(GproError::Upstream(format!("Provider returned HTTP {}", status.as_u16())));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(GproError::from))
            .boxed())
    }
}
