pub mod provider;
pub mod sse;

#[cfg(test)]
pub(crate) mod fake;

use actix_web::web::Bytes;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;

use crate::errors::{GproError, GproResult};
use crate::models::{ChatTurn, Persona, Role};
pub use provider::{ByteStream, CompletionProvider, OpenAiProvider};
use sse::{ProviderFrame, SseDecoder};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful coding assistant.";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_PENALTY: f64 = 0.3;
pub const MAX_TOKENS: u32 = 4000;

const RELAY_CHANNEL_CAPACITY: usize = 32;

/// Browser request body for the relay endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    /// Slug of an active persona whose AI settings should be used
    #[serde(default)]
    pub persona: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

/// Model and sampling parameters, either defaults or a persona's own
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionSettings {
    pub model: String,
    pub system_prompt: Option<String>,
    pub temperature: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl CompletionSettings {
    pub fn defaults(model: &str) -> Self {
        Self {
            model: model.to_string(),
            system_prompt: None,
            temperature: DEFAULT_TEMPERATURE,
            frequency_penalty: DEFAULT_PENALTY,
            presence_penalty: DEFAULT_PENALTY,
        }
    }

    pub fn from_persona(persona: &Persona, fallback_model: &str) -> Self {
        let model = if persona.api_model.trim().is_empty() {
            fallback_model.to_string()
        } else {
            persona.api_model.clone()
        };
        Self {
            model,
            system_prompt: Some(persona.system_prompt.clone()).filter(|p| !p.trim().is_empty()),
            temperature: persona.temperature,
            frequency_penalty: persona.frequency_penalty,
            presence_penalty: persona.presence_penalty,
        }
    }
}

/// Outbound provider payload
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub stream: bool,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl CompletionRequest {
    /// Validate the browser request and assemble the provider payload:
    /// system prompt, the last `history_limit` turns, then the new prompt.
    pub fn build(request: &RelayRequest, settings: &CompletionSettings, history_limit: usize) -> GproResult<Self> {
        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(GproError::Validation("No prompt provided".to_string()));
        }

        let system_prompt = request
            .system_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .or(settings.system_prompt.as_deref())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);

        let skip = request.history.len().saturating_sub(history_limit);
        let mut messages = Vec::with_capacity(request.history.len() - skip + 2);
        messages.push(ChatMessage::new("system", system_prompt));
        for turn in &request.history[skip..] {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(ChatMessage::new(role, &turn.content));
        }
        messages.push(ChatMessage::new("user", prompt));

        Ok(Self {
            model: settings.model.clone(),
            messages,
            temperature: settings.temperature,
            max_tokens: MAX_TOKENS,
            stream: true,
            frequency_penalty: settings.frequency_penalty,
            presence_penalty: settings.presence_penalty,
        })
    }
}

/// Event delivered to the browser
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Content(String),
    Done,
    Error(String),
}

impl RelayEvent {
    /// One self-contained `data:` frame
    pub fn to_sse_frame(&self) -> Bytes {
        let payload = match self {
            RelayEvent::Content(content) => json!({ "content": content }),
            RelayEvent::Done => json!({ "done": true }),
            RelayEvent::Error(message) => json!({ "error": message }),
        };
        Bytes::from(format!("data: {}\n\n", payload))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Dispatched,
    Streaming,
    Completed,
    Failed,
}

enum Step {
    Continue,
    Finish(RelayState),
}

struct Relay {
    tx: mpsc::Sender<RelayEvent>,
    state: RelayState,
    send_timeout: Duration,
}

impl Relay {
    fn transition(&mut self, next: RelayState) {
        tracing::debug!(from = ?self.state, to = ?next, "Relay state change");
        self.state = next;
    }

    // A failed send means the browser is gone or has stopped reading
    async fn emit(&self, event: RelayEvent) -> bool {
        match self.tx.send_timeout(event, self.send_timeout).await {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(_)) => {
                tracing::warn!("Browser stopped reading, abandoning relay");
                false
            }
            Err(SendTimeoutError::Closed(_)) => false,
        }
    }

    async fn fail(&mut self, message: String) -> RelayState {
        tracing::warn!("Relay failed: {}", message);
        // Nobody to tell if the browser already left
        let _ = self.emit(RelayEvent::Error(message)).await;
        self.transition(RelayState::Failed);
        self.state
    }

    async fn forward(&mut self, frame: ProviderFrame) -> Step {
        match frame {
            ProviderFrame::Content(text) => {
                if self.emit(RelayEvent::Content(text)).await {
                    Step::Continue
                } else {
                    tracing::info!("Browser disconnected, closing provider stream");
                    self.transition(RelayState::Failed);
                    Step::Finish(self.state)
                }
            }
            ProviderFrame::Done => {
                let _ = self.emit(RelayEvent::Done).await;
                self.transition(RelayState::Completed);
                Step::Finish(self.state)
            }
            ProviderFrame::Failure(message) => Step::Finish(self.fail(message).await),
        }
    }
}

/// Drive one request through `Idle -> Dispatched -> Streaming -> Completed | Failed`,
/// sending browser events on `tx`. Returns the terminal state.
///
/// - Opens exactly one provider stream, never retries
/// - Each content fragment is sent as soon as its line is decoded
/// - A gap longer than `stall_timeout` between chunks fails the relay, as
///   does a browser that stops reading for that long
/// - Returning drops the provider stream, which closes its connection
pub async fn run_relay(
    provider: Arc<dyn CompletionProvider>,
    request: CompletionRequest,
    stall_timeout: Duration,
    tx: mpsc::Sender<RelayEvent>,
) -> RelayState {
    let mut relay = Relay {
        tx,
        state: RelayState::Idle,
        send_timeout: stall_timeout,
    };
    relay.transition(RelayState::Dispatched);

    let mut stream = match timeout(stall_timeout, provider.open_stream(&request)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return relay.fail(e.public_message()).await,
        Err(_) => return relay.fail("Provider did not respond in time".to_string()).await,
    };
    relay.transition(RelayState::Streaming);

    let mut decoder = SseDecoder::new();
    loop {
        let chunk = match timeout(stall_timeout, stream.next()).await {
            Ok(chunk) => chunk,
            Err(_) => return relay.fail("Provider stream stalled".to_string()).await,
        };

        let (frames, finished) = match chunk {
            Some(Ok(bytes)) => (decoder.push(&bytes), false),
            Some(Err(e)) => {
                return relay
                    .fail(format!("Provider connection failed: {}", e.public_message()))
                    .await;
            }
            None => (decoder.finish(), true),
        };

        for frame in frames {
            if let Step::Finish(state) = relay.forward(frame).await {
                return state;
            }
        }

        if finished {
            return relay.fail("Provider stream ended unexpectedly".to_string()).await;
        }
        // Keep-alives and dropped frames send nothing, so check the receiver directly
        if relay.tx.is_closed() {
            tracing::info!("Browser disconnected, closing provider stream");
            relay.transition(RelayState::Failed);
            return relay.state;
        }
    }
}

/// Spawn a relay task and return the browser-side event stream.
pub fn spawn_relay(
    provider: Arc<dyn CompletionProvider>,
    request: CompletionRequest,
    stall_timeout: Duration,
) -> ReceiverStream<RelayEvent> {
    let (tx, rx) = mpsc::channel(RELAY_CHANNEL_CAPACITY);
    let relay_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("relay", %relay_id, model = %request.model);

    tokio::spawn(
        async move {
            let started = std::time::Instant::now();
            let state = run_relay(provider, request, stall_timeout, tx).await;
            tracing::info!(?state, elapsed_ms = started.elapsed().as_millis() as u64, "Relay finished");
        }
        .instrument(span),
    );

    ReceiverStream::new(rx)
}
