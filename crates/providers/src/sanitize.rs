//! Message cleanup applied before every provider call.
//!
//! Some backends reject empty turns or two consecutive turns from the same
//! role. Both situations arise naturally in the turn loop (an empty model
//! reply, an action result right after a user message), so the request is
//! normalized here instead of at every call site.

use moltyclaw_core::message::{EMPTY_PLACEHOLDER, Message, Role};

/// Replace empty content with a placeholder and merge consecutive same-role
/// non-system turns, joining their contents with a newline.
pub fn sanitize(messages: &[Message]) -> Vec<Message> {
    let mut out: Vec<Message> = Vec::with_capacity(messages.len());

    for message in messages {
        let content = if message.content.trim().is_empty() {
            EMPTY_PLACEHOLDER.to_string()
        } else {
            message.content.clone()
        };

        match out.last_mut() {
            Some(prev) if prev.role == message.role && message.role != Role::System => {
                prev.content.push('\n');
                prev.content.push_str(&content);
            }
            _ => {
                let mut cleaned = message.clone();
                cleaned.content = content;
                out.push(cleaned);
            }
        }
    }

    out
}
