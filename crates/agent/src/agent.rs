//! The turn controller.
//!
//! One `ask` runs as an explicit state machine:
//!
//! ```text
//! INIT ──> STREAMING ──> DISPATCH ──> STREAMING ──> ... ──> FINAL
//!              │                                            ^
//!              └── malformed command: diagnostic turn ──────┘ (back to STREAMING)
//! ```
//!
//! `INIT` appends the user turn, rebuilds the system turn and, when the
//! conversation is too large, opens a silent compaction cycle that runs
//! through the same states before the real turn continues.

use crate::command::{Parsed, is_silent, parse_command};
use crate::compactor::{Compaction, Compactor};
use crate::demux::StreamDemux;
use crate::markers::{Attachment, extract_attachments, strip_markers};
use crate::prompt::{ActionCatalog, PromptParts, base_instructions, build_system_prompt};
use chrono::Utc;
use moltyclaw_config::{AgentSettings, AppConfig};
use moltyclaw_core::action::{ActionRegistry, Command};
use moltyclaw_core::error::ProviderError;
use moltyclaw_core::event::{DomainEvent, EventBus};
use moltyclaw_core::memory::MemoryStore;
use moltyclaw_core::message::{Conversation, EMPTY_PLACEHOLDER, Message};
use moltyclaw_core::provider::{Provider, ProviderRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

/// Text returned when the model chose to stay silent.
pub const ACKNOWLEDGED: &str = "Done.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyKind {
    /// The model's final answer
    Answer,
    /// The model replied with the silence token
    Acknowledged,
    /// Provider failure or timeout; `text` holds the error
    Failed,
}

/// What an `ask` hands back to the front-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub kind: ReplyKind,
    /// User-facing text, markers removed
    pub text: String,
    /// Text before marker removal
    pub raw: String,
    pub attachments: Vec<Attachment>,
}

impl Reply {
    pub fn answer(visible: impl Into<String>) -> Self {
        let raw = visible.into();
        Self {
            kind: ReplyKind::Answer,
            text: strip_markers(&raw),
            attachments: extract_attachments(&raw),
            raw,
        }
    }

    pub fn acknowledged() -> Self {
        Self {
            kind: ReplyKind::Acknowledged,
            text: ACKNOWLEDGED.into(),
            raw: ACKNOWLEDGED.into(),
            attachments: Vec::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: ReplyKind::Failed,
            text: message.clone(),
            raw: message,
            attachments: Vec::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.kind == ReplyKind::Failed
    }
}

/// Per-ask switches and optional live outputs.
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    /// Background ask: nothing is forwarded to the sinks
    pub silent: bool,
    /// Receives visible text fragments as they stream
    pub stream_sink: Option<mpsc::UnboundedSender<String>>,
    /// Receives a short label for every dispatched action
    pub action_sink: Option<mpsc::UnboundedSender<String>>,
}

impl AskOptions {
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    pub fn with_stream_sink(mut self, sink: mpsc::UnboundedSender<String>) -> Self {
        self.stream_sink = Some(sink);
        self
    }

    pub fn with_action_sink(mut self, sink: mpsc::UnboundedSender<String>) -> Self {
        self.action_sink = Some(sink);
        self
    }
}

enum TurnState {
    Init(String),
    Streaming,
    Dispatch(Command),
    Final(Reply),
}

/// A conversational agent: one conversation, one provider chain, one registry.
///
/// Cloning is cheap and every clone talks to the same conversation. Asks are
/// serialized; a second `ask` waits until the first has finished.
#[derive(Clone)]
pub struct Agent {
    provider: Arc<dyn Provider>,
    registry: Arc<ActionRegistry>,
    memory: Arc<dyn MemoryStore>,
    event_bus: Arc<EventBus>,
    settings: AgentSettings,
    compactor: Compactor,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    conversation: Arc<Mutex<Conversation>>,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<ActionRegistry>,
        memory: Arc<dyn MemoryStore>,
        model: impl Into<String>,
        settings: AgentSettings,
    ) -> Self {
        let conversation = Conversation::new(base_instructions(&settings.name));
        Self {
            provider,
            registry,
            memory,
            event_bus: Arc::new(EventBus::default()),
            compactor: Compactor::from_settings(&settings),
            settings,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            conversation: Arc::new(Mutex::new(conversation)),
        }
    }

    /// Build an agent with model parameters and settings taken from the config.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        registry: Arc<ActionRegistry>,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        Self::new(provider, registry, memory, &config.default_model, config.agent.clone())
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per model response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    /// A snapshot of the conversation. Waits for a running ask to finish.
    pub async fn conversation(&self) -> Conversation {
        self.conversation.lock().await.clone()
    }

    /// Run a command directly, bypassing the model and the conversation.
    pub async fn run_action(&self, command: &Command) -> String {
        info!(action = %command.action(), "Direct action");
        self.registry.dispatch(command).await
    }

    /// Process one external message and return the final reply.
    ///
    /// The turn runs on its own task: if the caller gives up (drops this
    /// future or the ask timeout fires) the turn still runs to completion so
    /// the conversation never ends on an unanswered command.
    pub async fn ask(&self, text: impl Into<String>, options: AskOptions) -> Reply {
        let agent = self.clone();
        let text = text.into();
        let task = tokio::spawn(async move {
            let mut conversation = agent.conversation.lock().await;
            agent.run_turn(&mut conversation, text, &options).await
        });

        let joined = match self.settings.ask_timeout_secs {
            0 => task.await,
            secs => match tokio::time::timeout(Duration::from_secs(secs), task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(timeout_secs = secs, "Ask timed out, turn continues in background");
                    let message = format!("Error: no answer within {secs}s");
                    self.publish_error("ask", &message);
                    return Reply::failed(message);
                }
            },
        };

        match joined {
            Ok(reply) => reply,
            Err(e) => {
                let message = format!("Error: the turn was aborted: {e}");
                self.publish_error("ask", &message);
                Reply::failed(message)
            }
        }
    }

    async fn run_turn(&self, conversation: &mut Conversation, input: String, options: &AskOptions) -> Reply {
        info!(
            conversation_id = %conversation.id,
            messages = conversation.len(),
            silent = options.silent,
            "Processing ask"
        );

        let mut state = TurnState::Init(input);
        let mut compaction: Option<Compaction> = None;
        let mut cycles: u32 = 0;

        loop {
            // The compaction cycle never reaches the caller
            let silent = options.silent || compaction.is_some();

            state = match state {
                TurnState::Init(text) => {
                    conversation.push(Message::user(text));
                    self.refresh_system(conversation).await;
                    if self.compactor.should_compact(conversation) {
                        compaction = self.compactor.begin(conversation);
                    }
                    TurnState::Streaming
                }
                TurnState::Streaming => {
                    cycles += 1;
                    debug!(conversation_id = %conversation.id, cycle = cycles, "Streaming");
                    self.stream_response(conversation, options, silent).await
                }
                TurnState::Dispatch(command) => {
                    self.dispatch(conversation, &command, options, silent).await;
                    TurnState::Streaming
                }
                TurnState::Final(reply) => {
                    if let Some(done) = compaction.take() {
                        if reply.is_failed() {
                            warn!(error = %reply.text, "Compaction turn failed, truncating anyway");
                        }
                        let before = done.chars_before();
                        let after = self.compactor.finish(conversation, done);
                        self.event_bus.publish(DomainEvent::ConversationCompacted {
                            conversation_id: conversation.id.to_string(),
                            chars_before: before,
                            chars_after: after,
                            timestamp: Utc::now(),
                        });
                        TurnState::Streaming
                    } else {
                        if !reply.is_failed() {
                            self.event_bus.publish(DomainEvent::ResponseGenerated {
                                conversation_id: conversation.id.to_string(),
                                provider: self.provider.name().to_string(),
                                cycles,
                                timestamp: Utc::now(),
                            });
                        }
                        return reply;
                    }
                }
            };
        }
    }

    /// Rebuild the system turn from memory and the current action catalog.
    async fn refresh_system(&self, conversation: &mut Conversation) {
        let tools = self.registry.refresh_external().await;
        if tools > 0 {
            debug!(tools, "External tool catalog refreshed");
        }

        let long_term = self.memory.load_long_term().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load long-term memory");
            String::new()
        });
        let persona = self.memory.load_persona().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load persona");
            None
        });
        let catalog = ActionCatalog::from_registry(&self.registry).await;

        conversation.set_system(build_system_prompt(&PromptParts {
            agent_name: &self.settings.name,
            persona: persona.as_deref(),
            long_term: &long_term,
            long_term_chars: self.settings.long_term_excerpt_chars,
            catalog: &catalog,
        }));
    }

    /// STREAMING: one provider call, demultiplexed, then decide what comes next.
    async fn stream_response(
        &self,
        conversation: &mut Conversation,
        options: &AskOptions,
        silent: bool,
    ) -> TurnState {
        let mut request = ProviderRequest::new(&self.model, conversation.messages().to_vec());
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;

        let mut rx = match self.provider.stream(request).await {
            Ok(rx) => rx,
            Err(e) => return TurnState::Final(self.provider_failure(e)),
        };

        let mut demux = StreamDemux::new();
        while let Some(item) = rx.recv().await {
            match item {
                Ok(chunk) => {
                    if let Some(text) = chunk.content.as_deref() {
                        let shown = demux.feed(text);
                        emit(&options.stream_sink, shown, silent);
                    }
                    if chunk.done {
                        break;
                    }
                }
                // Partial output is dropped with the failed attempt
                Err(e) => return TurnState::Final(self.provider_failure(e)),
            }
        }
        let tail = demux.finish();
        emit(&options.stream_sink, tail, silent);

        let (raw, visible) = demux.into_parts();
        let stored = if raw.trim().is_empty() { EMPTY_PLACEHOLDER.to_string() } else { raw.clone() };
        conversation.push(Message::assistant(stored));

        if is_silent(&raw) {
            debug!("Model chose silence");
            return TurnState::Final(Reply::acknowledged());
        }

        match parse_command(&raw) {
            Parsed::Command(command) => TurnState::Dispatch(command),
            Parsed::Malformed { payload, reason } => {
                warn!(reason = %reason, "Unreadable command block");
                conversation.push(Message::diagnostic(&format!("{reason} in block: {payload}")));
                TurnState::Streaming
            }
            Parsed::None => TurnState::Final(Reply::answer(visible.trim())),
        }
    }

    /// DISPATCH: run the command and append its result before the next call.
    async fn dispatch(
        &self,
        conversation: &mut Conversation,
        command: &Command,
        options: &AskOptions,
        silent: bool,
    ) {
        let label = command.label();
        emit(&options.action_sink, label.clone(), silent);

        let start = Instant::now();
        let result = self.registry.dispatch(command).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        self.event_bus.publish(DomainEvent::ActionDispatched {
            action: command.action().to_string(),
            label,
            duration_ms,
            timestamp: Utc::now(),
        });

        conversation.push(Message::action_result(command.action(), &result));
    }

    fn provider_failure(&self, error: ProviderError) -> Reply {
        warn!(provider = %self.provider.name(), error = %error, "Provider failed");
        let message = format!("Error communicating with the model provider: {error}");
        self.publish_error("provider", &message);
        Reply::failed(message)
    }

    fn publish_error(&self, context: &str, message: &str) {
        self.event_bus.publish(DomainEvent::ErrorOccurred {
            context: context.to_string(),
            error_message: message.to_string(),
            timestamp: Utc::now(),
        });
    }
}

fn emit(sink: &Option<mpsc::UnboundedSender<String>>, text: String, silent: bool) {
    if silent || text.is_empty() {
        return;
    }
    if let Some(sink) = sink {
        // A front-end that stopped listening does not stop the turn
        let _ = sink.send(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compactor::COMPACTION_INSTRUCTION;
    use crate::test_helpers::*;
    use moltyclaw_core::message::Role;
    use moltyclaw_memory::InMemoryStore;

    fn settings() -> AgentSettings {
        AgentSettings::default()
    }

    fn agent_with(
        provider: Arc<SequentialMockProvider>,
        registry: ActionRegistry,
        memory: Arc<InMemoryStore>,
        settings: AgentSettings,
    ) -> Agent {
        Agent::new(provider, Arc::new(registry), memory, "mock-model", settings)
    }

    fn simple_agent(responses: Vec<Scripted>) -> (Agent, Arc<SequentialMockProvider>) {
        let provider = Arc::new(SequentialMockProvider::new(responses));
        let agent = agent_with(
            provider.clone(),
            ActionRegistry::new(),
            Arc::new(InMemoryStore::new()),
            settings(),
        );
        (agent, provider)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn simple_text_response() {
        let (agent, provider) = simple_agent(vec![text("Hello! How can I help?")]);

        let reply = agent.ask("Hello!", AskOptions::default()).await;
        assert_eq!(reply.kind, ReplyKind::Answer);
        assert_eq!(reply.text, "Hello! How can I help?");

        // System + User + Assistant = 3 messages
        let conv = agent.conversation().await;
        assert_eq!(conv.len(), 3);
        assert_eq!(conv.messages()[1].role, Role::User);
        assert_eq!(conv.messages()[2].role, Role::Assistant);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn fresh_agents_append_the_same_turns() {
        for _ in 0..2 {
            let (agent, _) = simple_agent(vec![text("hi")]);
            let before = agent.conversation().await.len();
            agent.ask("hello", AskOptions::default()).await;
            assert_eq!(agent.conversation().await.len() - before, 2);
        }
    }

    #[tokio::test]
    async fn tool_call_is_hidden_dispatched_and_followed_up() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            chunked(r#"Sure! <tool>{"action":"DDG_SEARCH","param":"rain today"}</tool>"#, 3),
            text("Yes, rain after 3pm."),
        ]));
        let search = RecordingHandler::new("DDG_SEARCH");
        let params = search.params.clone();
        let mut registry = ActionRegistry::new();
        registry.register(Box::new(search));
        let agent = agent_with(provider.clone(), registry, Arc::new(InMemoryStore::new()), settings());

        let (stream_tx, mut stream_rx) = mpsc::unbounded_channel();
        let (action_tx, mut action_rx) = mpsc::unbounded_channel();
        let options = AskOptions::default()
            .with_stream_sink(stream_tx)
            .with_action_sink(action_tx);

        let reply = agent.ask("Will it rain?", options).await;
        assert_eq!(reply.text, "Yes, rain after 3pm.");
        assert_eq!(provider.call_count(), 2);
        assert_eq!(*params.lock().unwrap(), vec!["rain today".to_string()]);

        let streamed = drain(&mut stream_rx).concat();
        assert_eq!(streamed, "Sure! Yes, rain after 3pm.");
        assert!(!streamed.contains("<tool>"));
        assert_eq!(drain(&mut action_rx), vec!["DDG_SEARCH: rain today".to_string()]);

        let conv = agent.conversation().await;
        let history = conv.history();
        assert_eq!(history.len(), 4);
        assert!(history[1].content.contains("<tool>"));
        assert_eq!(history[2].content, "[SYSTEM: Result DDG_SEARCH] -> DDG_SEARCH got: rain today");
        assert_eq!(history[2].role, Role::User);

        // The follow-up call saw the result
        assert_eq!(provider.request(1).last().unwrap().content, history[2].content);
    }

    #[tokio::test]
    async fn malformed_command_gets_a_diagnostic_turn() {
        let (agent, provider) = simple_agent(vec![
            text("<tool>{action: CMD}</tool>"),
            text("Sorry, here is the answer."),
        ]);

        let reply = agent.ask("do it", AskOptions::default()).await;
        assert_eq!(reply.kind, ReplyKind::Answer);
        assert_eq!(reply.text, "Sorry, here is the answer.");
        assert_eq!(provider.call_count(), 2);

        let conv = agent.conversation().await;
        let diagnostic = &conv.history()[2];
        assert_eq!(diagnostic.role, Role::User);
        assert!(diagnostic.content.starts_with("[SYSTEM: ERROR]"));
        assert!(diagnostic.content.contains("{action: CMD}"));
        assert!(!reply.text.contains("SYSTEM"));
    }

    #[tokio::test]
    async fn unknown_action_is_reported_to_the_model() {
        let (agent, _) = simple_agent(vec![
            text(r#"<tool>{"action":"FLY","param":"moon"}</tool>"#),
            text("I cannot fly."),
        ]);

        let reply = agent.ask("fly me", AskOptions::default()).await;
        assert_eq!(reply.text, "I cannot fly.");
        let conv = agent.conversation().await;
        assert!(conv.history()[2].content.contains("Unknown action 'FLY'"));
    }

    #[tokio::test]
    async fn silence_token_acknowledges() {
        let (agent, _) = simple_agent(vec![text("NO_REPLY")]);
        let reply = agent.ask("background ping", AskOptions::silent()).await;
        assert_eq!(reply.kind, ReplyKind::Acknowledged);
        assert_eq!(reply.text, ACKNOWLEDGED);

        // The assistant turn is still recorded
        let conv = agent.conversation().await;
        assert_eq!(conv.last().unwrap().content, "NO_REPLY");
    }

    #[tokio::test]
    async fn silent_ask_streams_nothing() {
        let (agent, _) = simple_agent(vec![text("quiet answer")]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reply = agent
            .ask("ping", AskOptions::silent().with_stream_sink(tx))
            .await;
        assert_eq!(reply.text, "quiet answer");
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn provider_failure_keeps_user_turn_only() {
        let (agent, _) = simple_agent(vec![Scripted::Fail(ProviderError::Network("down".into()))]);

        let reply = agent.ask("hello?", AskOptions::default()).await;
        assert_eq!(reply.kind, ReplyKind::Failed);
        assert!(reply.text.contains("down"));

        let conv = agent.conversation().await;
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.last().unwrap().content, "hello?");
    }

    #[tokio::test]
    async fn empty_response_is_stored_as_placeholder() {
        let (agent, _) = simple_agent(vec![text("")]);
        let reply = agent.ask("hm", AskOptions::default()).await;
        assert_eq!(reply.text, "");
        assert_eq!(agent.conversation().await.last().unwrap().content, EMPTY_PLACEHOLDER);
    }

    #[tokio::test]
    async fn markers_become_attachments() {
        let (agent, _) = simple_agent(vec![text("Here you go [SCREENSHOT_TAKEN: /tmp/shot.png]")]);
        let reply = agent.ask("screenshot please", AskOptions::default()).await;
        assert_eq!(reply.text, "Here you go");
        assert!(reply.raw.contains("[SCREENSHOT_TAKEN: /tmp/shot.png]"));
        assert_eq!(reply.attachments.len(), 1);
        assert_eq!(reply.attachments[0].path, "/tmp/shot.png");
    }

    #[tokio::test]
    async fn system_turn_carries_memory_and_catalog() {
        let provider = Arc::new(SequentialMockProvider::new(vec![text("ok")]));
        let memory = Arc::new(InMemoryStore::new().with_persona("Dry humour."));
        memory.set_long_term("- The user's cat is called Miso").await;
        let mut registry = ActionRegistry::new();
        registry.register(Box::new(RecordingHandler::new("CMD")));
        let agent = agent_with(provider.clone(), registry, memory, settings());

        agent.ask("hi", AskOptions::default()).await;

        let system = &provider.request(0)[0];
        assert_eq!(system.role, Role::System);
        assert!(system.content.contains("Miso"));
        assert!(system.content.contains("Dry humour."));
        assert!(system.content.contains("\"CMD\""));
        assert_eq!(agent.conversation().await.system().content, system.content);
    }

    #[tokio::test]
    async fn concurrent_asks_are_serialized() {
        let (agent, _) = simple_agent(vec![text("first"), text("second")]);
        let (a, b) = tokio::join!(
            agent.ask("one", AskOptions::default()),
            agent.ask("two", AskOptions::default()),
        );
        assert_eq!(a.kind, ReplyKind::Answer);
        assert_eq!(b.kind, ReplyKind::Answer);

        let conv = agent.conversation().await;
        let roles: Vec<Role> = conv.history().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
    }

    #[tokio::test(start_paused = true)]
    async fn ask_timeout_is_an_error_reply() {
        let provider = Arc::new(SequentialMockProvider::new(vec![Scripted::Hang]));
        let mut s = settings();
        s.ask_timeout_secs = 5;
        let agent = agent_with(provider, ActionRegistry::new(), Arc::new(InMemoryStore::new()), s);

        let reply = agent.ask("hello", AskOptions::default()).await;
        assert_eq!(reply.kind, ReplyKind::Failed);
        assert!(reply.text.contains("5s"));
    }

    #[tokio::test]
    async fn compaction_keeps_pending_turn_and_memory_writes() {
        let memory = Arc::new(InMemoryStore::new());
        let saver = RecordingHandler::new("MEMORY_SAVE_LONG_TERM");
        let saved = saver.params.clone();
        let mut registry = ActionRegistry::new();
        registry.register(Box::new(saver));

        let long = "x".repeat(500);
        let provider = Arc::new(SequentialMockProvider::new(vec![
            // Three ordinary asks to grow the conversation
            text(&format!("a1 {long}")),
            text(&format!("a2 {long}")),
            text(&format!("a3 {long}")),
            // Compaction: save something, then stay silent
            text(r#"<tool>{"action":"MEMORY_SAVE_LONG_TERM","param":"likes long answers"}</tool>"#),
            text("NO_REPLY"),
            // The real answer to the pending question
            text("final answer"),
        ]));

        let mut s = settings();
        s.compaction_threshold_chars = 2000;
        let agent = agent_with(provider.clone(), registry, memory, s);

        for q in ["q1", "q2", "q3"] {
            agent.ask(q, AskOptions::default()).await;
        }
        let before = agent.conversation().await;
        assert!(before.char_volume() > 2000);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let pending = "the question that must survive  ";
        let reply = agent
            .ask(pending, AskOptions::default().with_stream_sink(tx))
            .await;

        assert_eq!(reply.text, "final answer");
        assert_eq!(provider.call_count(), 6);
        assert_eq!(*saved.lock().unwrap(), vec!["likes long answers".to_string()]);
        // Nothing from the compaction cycle reached the caller
        assert_eq!(drain(&mut rx).concat(), "final answer");

        // The compaction cycle saw the instruction, not the pending turn
        let inner = provider.request(3);
        assert_eq!(inner.last().unwrap().content, COMPACTION_INSTRUCTION);
        assert!(inner.iter().all(|m| m.content != pending));

        // system + 4 recent + pending + answer
        let conv = agent.conversation().await;
        assert_eq!(conv.len(), 1 + 4 + 1 + 1);
        assert_eq!(conv.messages()[5].content, pending);
        assert_eq!(conv.messages()[1].content, "q2");
        assert!(conv.history().iter().all(|m| m.content != COMPACTION_INSTRUCTION));
        assert_eq!(provider.request(5)[5].content, pending);
    }
}
