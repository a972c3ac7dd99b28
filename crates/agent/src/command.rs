//! Command extraction from a complete model response.
//!
//! A response may carry a command inside `<tool>...</tool>`:
//!
//! ```text
//! Let me check. <tool>{"action": "CMD", "param": "uptime"}</tool>
//! <tool>{"action": "MCP_TOOL", "server": "github", "tool": "list_issues", "params": {"repo": "x"}}</tool>
//! ```
//!
//! The payload may be wrapped in a ```json fence. Only the first well-formed
//! block is honored.

use crate::demux::{CLOSE_TAG, OPEN_TAG};
use moltyclaw_core::action::{Command, EXTERNAL_ACTION};
use regex_lite::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Literal the model emits to end a turn without answering.
pub const SILENCE_TOKEN: &str = "NO_REPLY";

static BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<tool>(.*?)</tool>").expect("Invalid tool block pattern"));

/// Outcome of inspecting a response for a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    /// No `<tool>` block at all.
    None,
    Command(Command),
    /// A block exists but no payload in it could be read.
    Malformed { payload: String, reason: String },
}

/// True when the response asks to stay silent.
pub fn is_silent(raw: &str) -> bool {
    raw.contains(SILENCE_TOKEN)
}

/// Find the command in a raw response.
pub fn parse_command(raw: &str) -> Parsed {
    let payloads = block_payloads(raw);
    let mut first_failure = None;

    for payload in payloads {
        match decode(payload) {
            Ok(command) => return Parsed::Command(command),
            Err(reason) => {
                if first_failure.is_none() {
                    first_failure = Some(Parsed::Malformed {
                        payload: payload.trim().to_string(),
                        reason,
                    });
                }
            }
        }
    }

    first_failure.unwrap_or(Parsed::None)
}

/// Payloads of every closed block, then the tail of an unterminated one.
fn block_payloads(raw: &str) -> Vec<&str> {
    let mut payloads = Vec::new();
    let mut consumed = 0;
    for caps in BLOCK_RE.captures_iter(raw) {
        if let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) {
            payloads.push(inner.as_str());
            consumed = whole.end();
        }
    }

    let rest = &raw[consumed..];
    if let Some(start) = rest.find(OPEN_TAG) {
        let tail = &rest[start + OPEN_TAG.len()..];
        // A stray close tag cannot follow here; the regex would have paired it
        let tail = tail.strip_suffix(CLOSE_TAG).unwrap_or(tail);
        payloads.push(tail);
    }
    payloads
}

fn strip_fence(payload: &str) -> &str {
    let mut s = payload.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

fn decode(payload: &str) -> Result<Command, String> {
    let json = strip_fence(payload);
    if json.is_empty() {
        return Err("the block is empty".into());
    }

    let value: Value = serde_json::from_str(json).map_err(|e| e.to_string())?;
    let Value::Object(map) = value else {
        return Err("expected a JSON object".into());
    };

    let action = match map.get("action") {
        Some(Value::String(a)) if !a.trim().is_empty() => a.trim().to_string(),
        Some(_) => return Err("'action' must be a non-empty string".into()),
        None => return Err("missing 'action'".into()),
    };

    if action == EXTERNAL_ACTION {
        let field = |name: &str| match map.get(name) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            _ => Err(format!("{EXTERNAL_ACTION} requires a non-empty '{name}'")),
        };
        let server = field("server")?;
        let tool = field("tool")?;
        let params = match map.get("params") {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(p) => p.clone(),
        };
        return Ok(Command::External { server, tool, params });
    }

    let param = match map.get("param") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    Ok(Command::Builtin { action, param })
}
