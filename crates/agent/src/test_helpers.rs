//! Shared test helpers for agent tests.

use async_trait::async_trait;
use moltyclaw_core::action::ActionHandler;
use moltyclaw_core::error::{ActionError, ProviderError};
use moltyclaw_core::message::Message;
use moltyclaw_core::provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// One scripted provider reaction.
#[derive(Clone)]
pub enum Scripted {
    /// Stream these fragments, then finish
    Text(Vec<String>),
    /// Refuse to open the stream
    Fail(ProviderError),
    /// Open the stream and never send anything
    Hang,
}

/// A whole response delivered as a single fragment.
pub fn text(response: &str) -> Scripted {
    Scripted::Text(vec![response.to_string()])
}

/// A response delivered in fragments of `size` characters.
pub fn chunked(response: &str, size: usize) -> Scripted {
    let chars: Vec<char> = response.chars().collect();
    Scripted::Text(chars.chunks(size).map(|c| c.iter().collect()).collect())
}

/// A mock provider that streams a sequence of scripted responses.
///
/// Each call to `stream` uses the next response in the queue.
/// Panics if more calls are made than responses provided.
pub struct SequentialMockProvider {
    responses: Vec<Scripted>,
    call_count: Mutex<usize>,
    pub seen: Mutex<Vec<Vec<Message>>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<Scripted>) -> Self {
        Self {
            responses,
            call_count: Mutex::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    /// Messages sent on the given call (0-based).
    pub fn request(&self, call: usize) -> Vec<Message> {
        self.seen.lock().unwrap()[call].clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let index = {
            let mut count = self.call_count.lock().unwrap();
            *count += 1;
            *count - 1
        };
        self.seen.lock().unwrap().push(request.messages);

        let Some(response) = self.responses.get(index).cloned() else {
            panic!(
                "SequentialMockProvider: no more responses (call #{index}, have {})",
                self.responses.len()
            );
        };

        let (tx, rx) = mpsc::channel(64);
        match response {
            Scripted::Fail(e) => return Err(e),
            Scripted::Hang => {
                tokio::spawn(async move {
                    let _keep_open = tx;
                    std::future::pending::<()>().await;
                });
            }
            Scripted::Text(fragments) => {
                tokio::spawn(async move {
                    for f in fragments {
                        if tx.send(Ok(StreamChunk::text(f))).await.is_err() {
                            return;
                        }
                    }
                    let _ = tx.send(Ok(StreamChunk::done())).await;
                });
            }
        }
        Ok(rx)
    }
}

/// Handler that answers `"{name} got: {param}"` and remembers every param.
pub struct RecordingHandler {
    name: String,
    pub params: Arc<Mutex<Vec<String>>>,
}

impl RecordingHandler {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            params: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl ActionHandler for RecordingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Records its input"
    }

    fn param_hint(&self) -> &str {
        "anything"
    }

    async fn execute(&self, param: &str) -> Result<String, ActionError> {
        self.params.lock().unwrap().push(param.to_string());
        Ok(format!("{} got: {param}", self.name))
    }
}
