//! System turn assembly.
//!
//! The system turn is rebuilt from scratch on every external ask:
//! base instructions, persona, an excerpt of long-term memory and the
//! current action catalog. Nothing is patched in place.

use moltyclaw_core::action::{ActionRegistry, EXTERNAL_ACTION, ExternalTool};
use std::fmt::Write;

/// One built-in action as the model sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub name: String,
    pub description: String,
    pub param_hint: String,
}

/// Everything the model is allowed to call right now.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionCatalog {
    pub builtin: Vec<CatalogEntry>,
    pub external: Vec<ExternalTool>,
}

impl ActionCatalog {
    /// Snapshot the registry, external catalog included.
    pub async fn from_registry(registry: &ActionRegistry) -> Self {
        let builtin = registry
            .handlers()
            .map(|h| CatalogEntry {
                name: h.name().to_string(),
                description: h.description().to_string(),
                param_hint: h.param_hint().to_string(),
            })
            .collect();
        Self {
            builtin,
            external: registry.external_tools().await,
        }
    }
}

/// Inputs of the system turn.
#[derive(Debug, Clone, Copy)]
pub struct PromptParts<'a> {
    pub agent_name: &'a str,
    pub persona: Option<&'a str>,
    pub long_term: &'a str,
    /// Characters of long-term memory included
    pub long_term_chars: usize,
    pub catalog: &'a ActionCatalog,
}

pub fn base_instructions(agent_name: &str) -> String {
    format!(
        "You are {agent_name}, an autonomous assistant that can act on the user's machine and accounts.\n\
         \n\
         To use an action, put exactly one JSON object inside a tool block anywhere in your reply:\n\
         <tool>{{\"action\": \"ACTION_NAME\", \"param\": \"value\"}}</tool>\n\
         The block is hidden from the user. The result comes back in the next message as \
         \"[SYSTEM: Result ACTION_NAME] -> ...\" and you continue from there.\n\
         \n\
         Rules:\n\
         - Use only ONE action per reply, then wait for its result.\n\
         - When you have the final answer, reply with plain text and no tool block.\n\
         - Memory searches tell you which files matched; read them with MEMORY_GET.\n\
         - In background turns where nothing needs saying, reply with {silence} and nothing else.",
        silence = crate::command::SILENCE_TOKEN,
    )
}

fn render_catalog(catalog: &ActionCatalog) -> String {
    let mut out = String::from("Available actions:\n");
    for entry in &catalog.builtin {
        let _ = writeln!(out, "\"{}\" (param: \"{}\") - {}", entry.name, entry.param_hint, entry.description);
    }

    if !catalog.external.is_empty() {
        let _ = writeln!(
            out,
            "\nExternal tools, called as <tool>{{\"action\": \"{EXTERNAL_ACTION}\", \"server\": \"SERVER\", \"tool\": \"TOOL\", \"params\": {{...}}}}</tool>:"
        );
        for tool in &catalog.external {
            let _ = writeln!(
                out,
                "- server \"{}\", tool \"{}\": {} | params schema: {}",
                tool.server, tool.name, tool.description, tool.input_schema
            );
        }
    }
    out
}

/// Build the complete system turn content.
pub fn build_system_prompt(parts: &PromptParts<'_>) -> String {
    let mut prompt = base_instructions(parts.agent_name);

    if let Some(persona) = parts.persona.map(str::trim).filter(|p| !p.is_empty()) {
        let _ = write!(prompt, "\n\n--- PERSONA ---\n{persona}");
    }

    let excerpt: String = parts.long_term.chars().take(parts.long_term_chars).collect();
    if !excerpt.trim().is_empty() {
        let _ = write!(
            prompt,
            "\n\n--- LONG-TERM MEMORY ---\n{}\n[Use the facts above implicitly and naturally. Do not mention that you are reading them from memory.]",
            excerpt.trim_end()
        );
    }

    prompt.push_str("\n\n");
    prompt.push_str(&render_catalog(parts.catalog));
    prompt.trim_end().to_string()
}
