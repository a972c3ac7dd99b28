//! Memory trait — the agent's persistent notebook.
//!
//! Two kinds of memory exist: a long-term store of facts the model chose to
//! keep (read back into every system turn) and dated daily journals. A persona
//! document describing who the agent is sits beside them.
//!
//! The turn loop only reads (`load_long_term`, `load_persona`); writes happen
//! exclusively through memory actions the model requests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::MemoryError;

/// One matching line from a memory search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryHit {
    /// Relative path of the file the line came from (e.g. "MEMORY.md")
    pub source: String,

    /// 1-based line number
    pub line: usize,

    /// The matching line, possibly shortened
    pub excerpt: String,
}

/// The core MemoryStore trait.
///
/// Implementations: markdown files on disk, in-memory (for testing).
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The backend name (e.g., "markdown", "in_memory").
    fn name(&self) -> &str;

    /// Full long-term memory text; empty when nothing was saved yet.
    async fn load_long_term(&self) -> std::result::Result<String, MemoryError>;

    /// Persona text; `None` when no persona is configured.
    async fn load_persona(&self) -> std::result::Result<Option<String>, MemoryError>;

    /// Append a fact to long-term memory.
    async fn save_long_term(&self, text: &str) -> std::result::Result<(), MemoryError>;

    /// Append an entry to today's journal. Returns the journal's relative path.
    async fn save_daily(&self, text: &str) -> std::result::Result<String, MemoryError>;

    /// Case-insensitive line search across long-term memory and journals.
    async fn search(&self, query: &str, limit: usize) -> std::result::Result<Vec<MemoryHit>, MemoryError>;

    /// Read a memory file by relative path, capped at `max_chars` characters.
    async fn get(&self, path: &str, max_chars: usize) -> std::result::Result<String, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_hit_serialization() {
        let hit = MemoryHit {
            source: "MEMORY.md".into(),
            line: 3,
            excerpt: "- The user prefers Rust".into(),
        };
        let json = serde_json::to_string(&hit).unwrap();
        assert!(json.contains("MEMORY.md"));
        assert!(json.contains("prefers Rust"));
    }
}
