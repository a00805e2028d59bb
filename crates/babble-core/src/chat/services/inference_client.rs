use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::chat::models::Message;
use crate::storage::BoxFuture;

/// Generation cap sent with every request
pub const MAX_TOKENS: u32 = 1024;

/// Sampling temperature sent with every request
pub const TEMPERATURE: f32 = 0.5;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed stream: {0}")]
    Protocol(String),

    #[error("Endpoint reported an error: {0}")]
    Endpoint(String),

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

/// Streaming chat-completion request body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
}

impl ChatCompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            stream: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FragmentDelta {
    #[serde(default)]
    pub content: Option<String>,
}

/// One increment of a streamed reply. A fragment without content is a no-op tick.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StreamFragment {
    #[serde(default)]
    pub delta: Option<FragmentDelta>,
}

impl StreamFragment {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            delta: Some(FragmentDelta {
                content: Some(content.into()),
            }),
        }
    }

    pub fn content(&self) -> Option<&str> {
        self.delta.as_ref().and_then(|d| d.content.as_deref())
    }
}

/// Ordered, finite, non-restartable sequence of fragments
pub type FragmentStream = BoxStream<'static, Result<StreamFragment, StreamError>>;

/// Remote endpoint that streams a chat completion
pub trait InferenceEndpoint: Send + Sync + 'static {
    fn stream_chat(
        &self,
        request: ChatCompletionRequest,
        access_token: String,
    ) -> BoxFuture<'static, Result<FragmentStream, StreamError>>;
}

#[derive(Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<StreamFragment>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Map one SSE `data:` payload to a fragment
fn parse_chunk(data: &str) -> Result<StreamFragment, StreamError> {
    let payload: ChunkPayload = serde_json::from_str(data)
        .map_err(|e| StreamError::Protocol(format!("invalid chunk: {}", e)))?;

    if let Some(error) = payload.error {
        let message = match error {
            serde_json::Value::String(message) => message,
            other => other
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| other.to_string()),
        };
        return Err(StreamError::Endpoint(message));
    }

    Ok(payload.choices.into_iter().next().unwrap_or_default())
}

/// HTTP client for a chat-completions endpoint that streams Server-Sent Events
#[derive(Clone)]
pub struct HttpInferenceClient {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl HttpInferenceClient {
    pub fn new(
        base_url: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self, StreamError> {
        let base_url = base_url.into();
        let base_url = reqwest::Url::parse(&base_url)
            .map_err(|e| StreamError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self { client, base_url })
    }

    /// `<base>/models/<model>/v1/chat/completions`, with each `/`-separated
    /// part of the model id percent-encoded as its own path segment
    fn completions_url(&self, model: &str) -> Result<reqwest::Url, StreamError> {
        let parts: Vec<&str> = model.split('/').collect();
        if parts.iter().any(|p| p.is_empty() || *p == "." || *p == "..") {
            return Err(StreamError::InvalidUrl(format!(
                "model id {:?} has an empty or relative path segment",
                model
            )));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StreamError::InvalidUrl(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .push("models")
            .extend(parts)
            .extend(["v1", "chat", "completions"]);
        Ok(url)
    }
}

impl InferenceEndpoint for HttpInferenceClient {
    fn stream_chat(
        &self,
        request: ChatCompletionRequest,
        access_token: String,
    ) -> BoxFuture<'static, Result<FragmentStream, StreamError>> {
        let client = self.client.clone();
        let url = self.completions_url(&request.model);

        Box::pin(async move {
            let url = url?;
            debug!(url = %url, messages = request.messages.len(), "Opening completion stream");

            let response = client
                .post(url)
                .bearer_auth(access_token)
                .json(&request)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                warn!(status = status.as_u16(), "Completion request rejected");
                return Err(StreamError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let mut events = Box::pin(response.bytes_stream().eventsource());

            let stream = async_stream::stream! {
                while let Some(event) = events.next().await {
                    match event {
                        Ok(event) => {
                            let data = event.data.trim();
                            if data == "[DONE]" {
                                break;
                            }
                            if data.is_empty() {
                                continue;
                            }
                            match parse_chunk(data) {
                                Ok(fragment) => yield Ok(fragment),
                                Err(e) => {
                                    yield Err(e);
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            yield Err(StreamError::Protocol(e.to_string()));
                            break;
                        }
                    }
                }
            };

            Ok(Box::pin(stream) as FragmentStream)
        })
    }
}
