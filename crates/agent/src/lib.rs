//! The agent turn loop — the heart of MoltyClaw.
//!
//! Every ask follows the same cycle:
//!
//! 1. **Receive** a user message and rebuild the system turn
//!    (persona + long-term memory + action catalog)
//! 2. **Compact** the conversation first if it grew too large
//! 3. **Stream** the model response, hiding any `<tool>` block from the user
//! 4. **If a command is embedded**: dispatch it, append the result, stream again
//! 5. **Otherwise**: return the visible text as the reply
//!
//! There is no iteration cap; provider failure or the ask timeout ends a turn.

pub mod agent;
pub mod command;
pub mod compactor;
pub mod demux;
pub mod markers;
pub mod prompt;

#[cfg(test)]
mod test_helpers;

pub use agent::{ACKNOWLEDGED, Agent, AskOptions, Reply, ReplyKind};
pub use command::{Parsed, SILENCE_TOKEN, is_silent, parse_command};
pub use compactor::Compactor;
pub use demux::StreamDemux;
pub use markers::{Attachment, AttachmentKind};
pub use prompt::{ActionCatalog, build_system_prompt};
