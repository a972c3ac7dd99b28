//! Message and Conversation domain types.
//!
//! A conversation is the only state the turn loop carries between provider
//! calls: caller text becomes a user turn, every model response becomes an
//! assistant turn and every action result comes back as a synthetic user turn
//! carrying the [`SYSTEM_MARKER`] prefix.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix that marks a user-role turn as produced by the runtime rather than a person.
pub const SYSTEM_MARKER: &str = "[SYSTEM:";

/// Stand-in for content that would otherwise be empty when sent to a provider.
pub const EMPTY_PLACEHOLDER: &str = "(empty)";

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (identity, protocol, memory, catalog)
    System,
    /// The end user, or the runtime speaking on the user's side
    User,
    /// The model
    Assistant,
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content.into())
    }

    /// The synthetic user turn that feeds an action result back to the model.
    pub fn action_result(action: &str, result: &str) -> Self {
        Self::user(format!("{SYSTEM_MARKER} Result {action}] -> {result}"))
    }

    /// The synthetic user turn asking the model to fix an unreadable command.
    pub fn diagnostic(reason: &str) -> Self {
        Self::user(format!(
            "{SYSTEM_MARKER} ERROR] The <tool> block could not be read: {reason}. \
             Reply again with a valid JSON object such as \
             {{\"action\": \"NAME\", \"param\": \"value\"}}."
        ))
    }

    /// Whether this turn was synthesized by the runtime.
    pub fn is_system_origin(&self) -> bool {
        self.role == Role::User && self.content.starts_with(SYSTEM_MARKER)
    }

    /// Character count of the content (not bytes).
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// An ordered conversation whose first turn is always the single system turn.
///
/// The system turn is rebuilt in place with [`Conversation::set_system`];
/// [`Conversation::push`], [`Conversation::pop`] and
/// [`Conversation::truncate`] never remove or duplicate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ConversationRecord")]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    messages: Vec<Message>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

/// Unchecked wire form of a [`Conversation`].
#[derive(Deserialize)]
struct ConversationRecord {
    id: ConversationId,
    messages: Vec<Message>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ConversationRecord> for Conversation {
    type Error = String;

    fn try_from(record: ConversationRecord) -> Result<Self, Self::Error> {
        let Some((first, rest)) = record.messages.split_first() else {
            return Err("conversation has no system turn".into());
        };
        if first.role != Role::System {
            return Err(format!("conversation starts with a {:?} turn, not the system turn", first.role));
        }
        if rest.iter().any(|m| m.role == Role::System) {
            return Err("conversation holds more than one system turn".into());
        }
        Ok(Self {
            id: record.id,
            messages: record.messages,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

impl Conversation {
    /// Create a conversation holding only the system turn.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            messages: vec![Message::system(system_prompt)],
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the content of the system turn.
    pub fn set_system(&mut self, content: impl Into<String>) {
        self.messages[0].content = content.into();
        self.updated_at = Utc::now();
    }

    /// The system turn.
    pub fn system(&self) -> &Message {
        &self.messages[0]
    }

    /// Append a turn. A system message rebuilds the system turn instead.
    pub fn push(&mut self, message: Message) {
        if message.role == Role::System {
            self.set_system(message.content);
            return;
        }
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Remove and return the last non-system turn.
    pub fn pop(&mut self) -> Option<Message> {
        if self.messages.len() <= 1 {
            return None;
        }
        self.messages.pop()
    }

    /// Shorten to `len` turns, never dropping the system turn.
    pub fn truncate(&mut self, len: usize) {
        self.messages.truncate(len.max(1));
    }

    /// Every turn, system first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Every turn after the system turn.
    pub fn history(&self) -> &[Message] {
        &self.messages[1..]
    }

    /// Replace everything after the system turn.
    pub fn replace_history(&mut self, history: Vec<Message>) {
        self.messages.truncate(1);
        self.messages.extend(history.into_iter().filter(|m| m.role != Role::System));
        self.updated_at = Utc::now();
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of turns including the system turn.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always false: the system turn is permanent.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Total character volume across every turn, system included.
    pub fn char_volume(&self) -> usize {
        self.messages.iter().map(Message::char_len).sum()
    }
}
