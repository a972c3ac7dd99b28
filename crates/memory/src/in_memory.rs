//! In-memory store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Local;
use moltyclaw_core::error::MemoryError;
use moltyclaw_core::memory::{MemoryHit, MemoryStore};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use crate::scan::{daily_line, long_term_entry, scan_lines};

const LONG_TERM: &str = "MEMORY.md";

/// A memory store that keeps every "file" in a map keyed by relative path.
pub struct InMemoryStore {
    files: RwLock<BTreeMap<String, String>>,
    persona: Option<String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(BTreeMap::new()),
            persona: None,
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    /// Seed long-term memory with raw content.
    pub async fn set_long_term(&self, content: impl Into<String>) {
        self.files.write().await.insert(LONG_TERM.into(), content.into());
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str { "in_memory" }

    async fn load_long_term(&self) -> Result<String, MemoryError> {
        Ok(self.files.read().await.get(LONG_TERM).cloned().unwrap_or_default())
    }

    async fn load_persona(&self) -> Result<Option<String>, MemoryError> {
        Ok(self.persona.clone())
    }

    async fn save_long_term(&self, text: &str) -> Result<(), MemoryError> {
        self.files
            .write()
            .await
            .entry(LONG_TERM.into())
            .or_default()
            .push_str(&long_term_entry(text));
        Ok(())
    }

    async fn save_daily(&self, text: &str) -> Result<String, MemoryError> {
        let now = Local::now();
        let path = format!("memory/{}.md", now.format("%Y-%m-%d"));
        self.files
            .write()
            .await
            .entry(path.clone())
            .or_default()
            .push_str(&daily_line(&now.time(), text));
        Ok(path)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryHit>, MemoryError> {
        let query_lower = query.trim().to_lowercase();
        if query_lower.is_empty() {
            return Ok(Vec::new());
        }
        let files = self.files.read().await;
        let mut hits = Vec::new();
        // Long-term first, then journals in date order
        if let Some(content) = files.get(LONG_TERM) {
            scan_lines(LONG_TERM, content, &query_lower, limit, &mut hits);
        }
        for (path, content) in files.iter().filter(|(p, _)| p.as_str() != LONG_TERM) {
            scan_lines(path, content, &query_lower, limit, &mut hits);
        }
        Ok(hits)
    }

    async fn get(&self, path: &str, max_chars: usize) -> Result<String, MemoryError> {
        self.files
            .read()
            .await
            .get(path.trim())
            .map(|c| c.chars().take(max_chars).collect())
            .ok_or_else(|| MemoryError::NotFound(path.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_and_search() {
        let mem = InMemoryStore::new();
        mem.save_long_term("The user prefers Rust").await.unwrap();
        let daily = mem.save_daily("Rust meetup tonight").await.unwrap();
        assert!(daily.starts_with("memory/"));

        let hits = mem.search("rust", 15).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source, "MEMORY.md");
        assert_eq!(hits[1].source, daily);
    }

    #[tokio::test]
    async fn get_and_persona() {
        let mem = InMemoryStore::new().with_persona("Witty");
        mem.set_long_term("- fact").await;
        assert_eq!(mem.get("MEMORY.md", 3).await.unwrap(), "- f");
        assert!(mem.get("nope.md", 3).await.is_err());
        assert_eq!(mem.load_persona().await.unwrap().as_deref(), Some("Witty"));
    }
}
