use actix_web::web::Bytes;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{ByteStream, CompletionProvider, CompletionRequest};
use crate::errors::{GproError, GproResult};

pub(crate) fn content_chunk(text: &str) -> Bytes {
    Bytes::from(format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"delta": {"content": text}}]})
    ))
}

pub(crate) fn done_chunk() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

pub(crate) enum Script {
    /// Yield these chunks, then end
    Chunks(Vec<GproResult<Bytes>>),
    /// Yield these chunks, then never produce anything again
    ChunksThenStall(Vec<Bytes>),
    /// Produce content chunks forever, counting how many were pulled
    Endless,
    /// Fail before any body is read
    Reject(String),
}

/// Scripted provider recording every request it receives
pub(crate) struct FakeProvider {
    script: Mutex<Option<Script>>,
    configured: bool,
    pub calls: AtomicUsize,
    pub pulled: Arc<AtomicUsize>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeProvider {
    pub fn new(script: Script) -> Self {
        Self {
            script: Mutex::new(Some(script)),
            configured: true,
            calls: AtomicUsize::new(0),
            pulled: Arc::new(AtomicUsize::new(0)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new(Script::Chunks(Vec::new()))
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for FakeProvider {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn open_stream(&self, request: &CompletionRequest) -> GproResult<ByteStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        let script = self
            .script
            .lock()
            .take()
            .ok_or_else(|| GproError::Upstream("script already used".to_string()))?;

        match script {
            Script::Chunks(chunks) => Ok(stream::iter(chunks).boxed()),
            Script::ChunksThenStall(chunks) => Ok(stream::iter(chunks.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed()),
            Script::Endless => {
                let pulled = self.pulled.clone();
                Ok(stream::repeat_with(move || {
                    pulled.fetch_add(1, Ordering::SeqCst);
                    Ok(content_chunk("tick"))
                })
                .boxed())
            }
            Script::Reject(message) => Err(GproError::Upstream(message)),
        }
    }
}
