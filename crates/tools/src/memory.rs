//! Memory actions — the only way the model writes to its notebook.
//!
//! All four share one [`MemoryStore`]; storage failures come back as
//! `ActionError::ExecutionFailed` so the model sees what went wrong.

use async_trait::async_trait;
use moltyclaw_core::action::ActionHandler;
use moltyclaw_core::error::{ActionError, MemoryError};
use moltyclaw_core::memory::MemoryStore;
use std::sync::Arc;

/// Most search hits reported to the model.
pub const SEARCH_LIMIT: usize = 15;

/// Most characters returned by MEMORY_GET.
pub const GET_MAX_CHARS: usize = 3000;

fn require_text(action: &str, param: &str) -> Result<(), ActionError> {
    if param.trim().is_empty() {
        return Err(ActionError::InvalidParam {
            action: action.into(),
            reason: "nothing to work with, param is empty".into(),
        });
    }
    Ok(())
}

fn storage_failure(action: &str, err: MemoryError) -> ActionError {
    ActionError::ExecutionFailed {
        action: action.into(),
        reason: err.to_string(),
    }
}

pub struct SaveLongTermAction {
    store: Arc<dyn MemoryStore>,
}

impl SaveLongTermAction {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ActionHandler for SaveLongTermAction {
    fn name(&self) -> &str {
        "MEMORY_SAVE_LONG_TERM"
    }

    fn description(&self) -> &str {
        "Store a durable fact in long-term memory (MEMORY.md)"
    }

    fn param_hint(&self) -> &str {
        "the fact to remember"
    }

    async fn execute(&self, param: &str) -> Result<String, ActionError> {
        require_text(self.name(), param)?;
        self.store
            .save_long_term(param.trim())
            .await
            .map_err(|e| storage_failure(self.name(), e))?;
        Ok("Saved to long-term memory (MEMORY.md).".into())
    }
}

pub struct SaveDailyAction {
    store: Arc<dyn MemoryStore>,
}

impl SaveDailyAction {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ActionHandler for SaveDailyAction {
    fn name(&self) -> &str {
        "MEMORY_SAVE_DAILY"
    }

    fn description(&self) -> &str {
        "Record an event in today's journal"
    }

    fn param_hint(&self) -> &str {
        "what happened"
    }

    async fn execute(&self, param: &str) -> Result<String, ActionError> {
        require_text(self.name(), param)?;
        let path = self
            .store
            .save_daily(param.trim())
            .await
            .map_err(|e| storage_failure(self.name(), e))?;
        Ok(format!("Saved to daily journal ({path})."))
    }
}

pub struct SearchAction {
    store: Arc<dyn MemoryStore>,
}

impl SearchAction {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ActionHandler for SearchAction {
    fn name(&self) -> &str {
        "MEMORY_SEARCH"
    }

    fn description(&self) -> &str {
        "Search long-term memory and journals for a keyword"
    }

    fn param_hint(&self) -> &str {
        "keyword, e.g. project"
    }

    async fn execute(&self, param: &str) -> Result<String, ActionError> {
        require_text(self.name(), param)?;
        let hits = self
            .store
            .search(param.trim(), SEARCH_LIMIT)
            .await
            .map_err(|e| storage_failure(self.name(), e))?;

        if hits.is_empty() {
            return Ok(format!("Nothing found in memory for '{}'.", param.trim()));
        }

        let lines: Vec<String> = hits
            .iter()
            .map(|h| format!("- {} (line {}): {}", h.source, h.line, h.excerpt))
            .collect();
        Ok(format!(
            "Found in:\n{}\n\nUse MEMORY_GET with the file name to read more.",
            lines.join("\n")
        ))
    }
}

pub struct GetAction {
    store: Arc<dyn MemoryStore>,
}

impl GetAction {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ActionHandler for GetAction {
    fn name(&self) -> &str {
        "MEMORY_GET"
    }

    fn description(&self) -> &str {
        "Read a memory file returned by MEMORY_SEARCH"
    }

    fn param_hint(&self) -> &str {
        "relative path, e.g. memory/2026-01-31.md"
    }

    async fn execute(&self, param: &str) -> Result<String, ActionError> {
        require_text(self.name(), param)?;
        match self.store.get(param.trim(), GET_MAX_CHARS).await {
            Ok(content) if content.trim().is_empty() => Ok(format!("{} is empty.", param.trim())),
            Ok(content) => Ok(content),
            Err(MemoryError::NotFound(path)) => Ok(format!("File not found: {path}")),
            Err(e) => Err(storage_failure(self.name(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moltyclaw_memory::InMemoryStore;

    fn store() -> Arc<dyn MemoryStore> {
        Arc::new(InMemoryStore::new())
    }

    #[tokio::test]
    async fn save_then_search_then_get() {
        let store = store();
        SaveLongTermAction::new(store.clone())
            .execute("Ana's birthday is in May")
            .await
            .unwrap();

        let found = SearchAction::new(store.clone()).execute("birthday").await.unwrap();
        assert!(found.starts_with("Found in:\n- MEMORY.md (line 2): - Ana's birthday is in May"));
        assert!(found.ends_with("Use MEMORY_GET with the file name to read more."));

        let content = GetAction::new(store).execute("MEMORY.md").await.unwrap();
        assert!(content.contains("Ana's birthday"));
    }

    #[tokio::test]
    async fn daily_reports_path() {
        let out = SaveDailyAction::new(store()).execute("Shipped the release").await.unwrap();
        assert!(out.starts_with("Saved to daily journal (memory/"));
    }

    #[tokio::test]
    async fn search_without_hits() {
        let out = SearchAction::new(store()).execute("nothing").await.unwrap();
        assert_eq!(out, "Nothing found in memory for 'nothing'.");
    }

    #[tokio::test]
    async fn get_missing_file() {
        let out = GetAction::new(store()).execute("memory/none.md").await.unwrap();
        assert_eq!(out, "File not found: memory/none.md");
    }

    #[tokio::test]
    async fn empty_param_rejected() {
        let result = SaveLongTermAction::new(store()).execute(" ").await;
        assert!(matches!(result, Err(ActionError::InvalidParam { .. })));
    }
}
