//! Conversation compaction.
//!
//! When the conversation grows past a character budget, the model gets one
//! silent turn to save what matters through the memory actions. Afterwards
//! the conversation is cut back to the system turn plus the last few turns,
//! and the user turn that triggered the ask is put back exactly as it was.
//!
//! The inner turn itself is run by the agent; this module owns the
//! bookkeeping around it.

use moltyclaw_config::AgentSettings;
use moltyclaw_core::message::{Conversation, Message, SYSTEM_MARKER};
use tracing::{debug, info};

/// Marker appended to old action results that were cut short.
pub const TRUNCATION_MARKER: &str = "\n... [RESULT TRUNCATED BY THE SYSTEM TO SAVE MEMORY]";

pub const COMPACTION_INSTRUCTION: &str = "The session has reached its context limit. You MUST store ALL \
CRUCIAL KNOWLEDGE learned in this session using MEMORY_SAVE_LONG_TERM or MEMORY_SAVE_DAILY. If there \
is nothing important to keep long term, reply only and purely with the text: NO_REPLY.";

#[derive(Debug, Clone)]
pub struct Compactor {
    threshold_chars: usize,
    keep_recent: usize,
    truncated_result_chars: usize,
}

/// State held across the inner silent turn.
#[derive(Debug)]
pub struct Compaction {
    /// The in-flight user turn, detached untouched
    pending: Message,
    /// Conversation length once the pending turn was detached
    base_len: usize,
    chars_before: usize,
}

impl Compaction {
    pub fn chars_before(&self) -> usize {
        self.chars_before
    }
}

impl Compactor {
    pub fn new(threshold_chars: usize, keep_recent: usize, truncated_result_chars: usize) -> Self {
        Self {
            threshold_chars,
            keep_recent,
            truncated_result_chars,
        }
    }

    pub fn from_settings(settings: &AgentSettings) -> Self {
        Self::new(
            settings.compaction_threshold_chars,
            settings.keep_recent_turns,
            settings.truncated_result_chars,
        )
    }

    pub fn should_compact(&self, conversation: &Conversation) -> bool {
        conversation.char_volume() > self.threshold_chars
    }

    /// Detach the pending turn and queue the save-or-stay-silent instruction.
    ///
    /// Returns `None` when there is nothing after the system turn to detach.
    pub fn begin(&self, conversation: &mut Conversation) -> Option<Compaction> {
        let chars_before = conversation.char_volume();
        let pending = conversation.pop()?;
        let base_len = conversation.len();
        conversation.push(Message::user(COMPACTION_INSTRUCTION));
        info!(chars = chars_before, "Compacting conversation");
        Some(Compaction {
            pending,
            base_len,
            chars_before,
        })
    }

    /// Drop the inner turn, keep the recent tail and reattach the pending turn.
    ///
    /// Returns the character volume after compaction.
    pub fn finish(&self, conversation: &mut Conversation, compaction: Compaction) -> usize {
        conversation.truncate(compaction.base_len);

        let history = conversation.history();
        let start = history.len().saturating_sub(self.keep_recent);
        let kept: Vec<Message> = history[start..]
            .iter()
            .cloned()
            .map(|m| self.shorten(m))
            .collect();

        conversation.replace_history(kept);
        conversation.push(compaction.pending);

        let after = conversation.char_volume();
        debug!(
            before = compaction.chars_before,
            after,
            turns = conversation.len(),
            "Conversation compacted"
        );
        after
    }

    fn shorten(&self, mut message: Message) -> Message {
        if message.content.contains(SYSTEM_MARKER)
            && message.content.chars().count() > self.truncated_result_chars
        {
            let mut cut: String = message.content.chars().take(self.truncated_result_chars).collect();
            cut.push_str(TRUNCATION_MARKER);
            message.content = cut;
        }
        message
    }
}
