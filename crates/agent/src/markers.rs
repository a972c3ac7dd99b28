//! Out-of-band result markers.
//!
//! Some actions produce files the front-end should deliver: a screenshot
//! (`[SCREENSHOT_TAKEN: /path/shot.png]`) or a synthesized voice reply
//! (`[AUDIO_REPLY: /path/reply.mp3]`). The markers are removed from the text
//! shown to the user and surfaced as [`Attachment`]s instead.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(SCREENSHOT_TAKEN|AUDIO_REPLY):\s*([^\]]*?)\s*\]").expect("Invalid marker pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub path: String,
}

/// Every marker in `text`, in order of appearance.
pub fn extract_attachments(text: &str) -> Vec<Attachment> {
    MARKER_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let kind = match caps.get(1)?.as_str() {
                "SCREENSHOT_TAKEN" => AttachmentKind::Image,
                _ => AttachmentKind::Audio,
            };
            let path = caps.get(2)?.as_str().to_string();
            (!path.is_empty()).then_some(Attachment { kind, path })
        })
        .collect()
}

/// `text` with every marker removed and the result trimmed.
pub fn strip_markers(text: &str) -> String {
    MARKER_RE.replace_all(text, "").trim().to_string()
}
