//! Mock providers shared by this crate's tests.

use async_trait::async_trait;
use moltyclaw_core::error::ProviderError;
use moltyclaw_core::message::Message;
use moltyclaw_core::provider::*;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// One scripted reaction to a `stream()` call.
#[derive(Clone)]
pub enum Step {
    /// Open successfully and emit these fragments, then `done`
    Fragments(Vec<&'static str>),
    /// Fail while opening
    OpenError(ProviderError),
    /// Open, then emit an error as the first item
    FirstItemError(ProviderError),
    /// Open, emit these fragments, then fail mid-stream
    BreakAfter(Vec<&'static str>, ProviderError),
    /// Never answer
    Hang,
}

/// A provider that replays a script, one step per call. The last step repeats.
pub struct ScriptedProvider {
    name: String,
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    call_count: Mutex<usize>,
    pub seen: Mutex<Vec<Vec<Message>>>,
    pub models: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(name: &str, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps: Mutex::new(steps.into()),
            last: Mutex::new(None),
            call_count: Mutex::new(0),
            seen: Mutex::new(Vec::new()),
            models: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        *self.call_count.lock().unwrap() += 1;
        self.models.lock().unwrap().push(request.model);
        self.seen.lock().unwrap().push(request.messages);

        let step = {
            let next = self.steps.lock().unwrap().pop_front();
            let mut last = self.last.lock().unwrap();
            match next {
                Some(step) => {
                    *last = Some(step.clone());
                    step
                }
                None => last.clone().unwrap_or(Step::Fragments(vec![])),
            }
        };

        let (tx, rx) = mpsc::channel(16);
        match step {
            Step::OpenError(e) => return Err(e),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!()
            }
            Step::Fragments(fragments) => {
                tokio::spawn(async move {
                    for f in fragments {
                        let _ = tx.send(Ok(StreamChunk::text(f))).await;
                    }
                    let _ = tx.send(Ok(StreamChunk::done())).await;
                });
            }
            Step::FirstItemError(e) => {
                tokio::spawn(async move {
                    let _ = tx.send(Err(e)).await;
                });
            }
            Step::BreakAfter(fragments, e) => {
                tokio::spawn(async move {
                    for f in fragments {
                        let _ = tx.send(Ok(StreamChunk::text(f))).await;
                    }
                    let _ = tx.send(Err(e)).await;
                });
            }
        }
        Ok(rx)
    }
}

pub fn test_request() -> ProviderRequest {
    ProviderRequest::new("test", vec![Message::system("sys"), Message::user("hello")])
}

/// Drain a stream into text, or the first error.
pub async fn collect(mut rx: ChunkReceiver) -> Result<String, ProviderError> {
    let mut text = String::new();
    while let Some(item) = rx.recv().await {
        let chunk = item?;
        if let Some(c) = chunk.content {
            text.push_str(&c);
        }
        if chunk.done {
            break;
        }
    }
    Ok(text)
}
