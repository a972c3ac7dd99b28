//! Markdown memory store — plain files a human can read and edit.
//!
//! Layout under the memory root:
//!
//! ```text
//! MEMORY.md              long-term facts, one "- fact" bullet per entry
//! SOUL.md                persona (optional, never written by the agent)
//! memory/YYYY-MM-DD.md   daily journals, "[HH:MM:SS] entry" lines
//! ```

use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveTime};
use moltyclaw_config::MemoryConfig;
use moltyclaw_core::error::MemoryError;
use moltyclaw_core::memory::{MemoryHit, MemoryStore};
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use crate::scan::{daily_line, long_term_entry, scan_lines};

/// A file-backed memory store.
///
/// Appends are serialized through one lock so two writers never interleave
/// inside a file.
pub struct MarkdownMemory {
    root: PathBuf,
    long_term_file: String,
    persona_file: String,
    daily_dir: String,
    write_lock: Mutex<()>,
}

impl MarkdownMemory {
    /// Create a store rooted at `root` with the default file names.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::from_config(&MemoryConfig {
            root: Some(root.into()),
            ..MemoryConfig::default()
        })
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        let root = config.root_dir();
        debug!(root = %root.display(), "Markdown memory store");
        Self {
            root,
            long_term_file: config.long_term_file.clone(),
            persona_file: config.persona_file.clone(),
            daily_dir: config.daily_dir.clone(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn daily_relative(&self, date: NaiveDate) -> String {
        format!("{}/{}.md", self.daily_dir, date.format("%Y-%m-%d"))
    }

    /// Resolve a caller-supplied relative path, refusing anything outside the root.
    fn resolve(&self, relative: &str) -> Result<PathBuf, MemoryError> {
        let path = Path::new(relative.trim());
        let escapes = path.components().any(|c| {
            matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_))
        });
        if relative.trim().is_empty() || escapes {
            return Err(MemoryError::AccessDenied(format!(
                "'{relative}' is not a path inside the memory directory"
            )));
        }
        Ok(self.root.join(path))
    }

    async fn append(&self, relative: &str, text: &str) -> Result<(), MemoryError> {
        let path = self.root.join(relative);
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MemoryError::Storage(format!("Failed to create memory directory: {e}"))
            })?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Read a file, treating "does not exist" as `None`.
    async fn read_optional(&self, relative: &str) -> Result<Option<String>, MemoryError> {
        match tokio::fs::read_to_string(self.root.join(relative)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Journal file names (relative), oldest first.
    async fn daily_files(&self) -> Result<Vec<String>, MemoryError> {
        let dir = self.root.join(&self.daily_dir);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".md") {
                names.push(format!("{}/{}", self.daily_dir, name));
            }
        }
        names.sort();
        Ok(names)
    }

    pub(crate) async fn save_daily_at(
        &self,
        date: NaiveDate,
        time: NaiveTime,
        text: &str,
    ) -> Result<String, MemoryError> {
        let relative = self.daily_relative(date);
        self.append(&relative, &daily_line(&time, text)).await?;
        debug!(file = %relative, "Daily memory saved");
        Ok(relative)
    }
}

#[async_trait]
impl MemoryStore for MarkdownMemory {
    fn name(&self) -> &str {
        "markdown"
    }

    async fn load_long_term(&self) -> Result<String, MemoryError> {
        Ok(self.read_optional(&self.long_term_file).await?.unwrap_or_default())
    }

    async fn load_persona(&self) -> Result<Option<String>, MemoryError> {
        Ok(self
            .read_optional(&self.persona_file)
            .await?
            .filter(|p| !p.trim().is_empty()))
    }

    async fn save_long_term(&self, text: &str) -> Result<(), MemoryError> {
        self.append(&self.long_term_file, &long_term_entry(text)).await?;
        debug!(file = %self.long_term_file, "Long-term memory saved");
        Ok(())
    }

    async fn save_daily(&self, text: &str) -> Result<String, MemoryError> {
        let now = Local::now();
        self.save_daily_at(now.date_naive(), now.time(), text).await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryHit>, MemoryError> {
        let query_lower = query.trim().to_lowercase();
        if query_lower.is_empty() {
            return Ok(Vec::new());
        }

        let mut sources = vec![self.long_term_file.clone()];
        sources.extend(self.daily_files().await?);

        let mut hits = Vec::new();
        for source in sources {
            if hits.len() >= limit {
                break;
            }
            match self.read_optional(&source).await {
                Ok(Some(content)) => scan_lines(&source, &content, &query_lower, limit, &mut hits),
                Ok(None) => {}
                Err(e) => warn!(file = %source, error = %e, "Skipping unreadable memory file"),
            }
        }
        Ok(hits)
    }

    async fn get(&self, path: &str, max_chars: usize) -> Result<String, MemoryError> {
        let full = self.resolve(path)?;
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => Ok(content.chars().take(max_chars).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(MemoryError::NotFound(path.trim().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
