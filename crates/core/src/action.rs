//! Action protocol — what the model may ask the runtime to do.
//!
//! The model requests an action by embedding a JSON command in its response.
//! A [`Command`] names either a built-in [`ActionHandler`] or a tool exposed by
//! an [`ExternalToolSource`]. The [`ActionRegistry`] routes each command to
//! exactly one of them and always answers with plain result text: unknown
//! actions and handler failures are reported to the model, never raised.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use crate::error::ActionError;

/// Action name of the nested command form routed to external tool sources.
pub const EXTERNAL_ACTION: &str = "MCP_TOOL";

const LABEL_MAX_CHARS: usize = 80;

/// A validated command extracted from a model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// `{"action": "...", "param": "..."}`
    Builtin { action: String, param: String },

    /// `{"action": "MCP_TOOL", "server": "...", "tool": "...", "params": {...}}`
    External {
        server: String,
        tool: String,
        params: serde_json::Value,
    },
}

impl Command {
    pub fn builtin(action: impl Into<String>, param: impl Into<String>) -> Self {
        Self::Builtin {
            action: action.into(),
            param: param.into(),
        }
    }

    /// The action name used as the result prefix.
    pub fn action(&self) -> &str {
        match self {
            Self::Builtin { action, .. } => action,
            Self::External { .. } => EXTERNAL_ACTION,
        }
    }

    /// A short one-line description for progress displays (e.g. "CMD: ls -la").
    pub fn label(&self) -> String {
        let label = match self {
            Self::Builtin { action, param } if param.is_empty() => action.clone(),
            Self::Builtin { action, param } => format!("{action}: {param}"),
            Self::External { server, tool, .. } => format!("{EXTERNAL_ACTION}: {server}/{tool}"),
        };
        let first_line = label.lines().next().unwrap_or_default();
        if first_line.chars().count() > LABEL_MAX_CHARS {
            let cut: String = first_line.chars().take(LABEL_MAX_CHARS).collect();
            format!("{cut}…")
        } else {
            first_line.to_string()
        }
    }
}

/// A built-in capability the model can invoke by name.
///
/// Each handler owns one action name. Handlers receive the raw `param` string
/// and decide themselves how to interpret it (plain text, `a | b | c` fields,
/// a path, ...).
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// The action name the model uses (e.g., "CMD", "MEMORY_SAVE_DAILY").
    fn name(&self) -> &str;

    /// What the action does (shown to the model).
    fn description(&self) -> &str;

    /// How `param` should look (shown to the model).
    fn param_hint(&self) -> &str;

    /// Run the action.
    async fn execute(&self, param: &str) -> std::result::Result<String, ActionError>;
}

/// A tool advertised by an external source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalTool {
    /// The source (server) that owns the tool
    pub server: String,

    /// Tool name within that server
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// JSON Schema for `params`
    #[serde(default)]
    pub input_schema: serde_json::Value,
}

/// A server that contributes extra tools at runtime (e.g. an MCP server).
///
/// Discovery transport is the source's business; the registry only lists and
/// calls.
#[async_trait]
pub trait ExternalToolSource: Send + Sync {
    /// The server name commands refer to.
    fn name(&self) -> &str;

    async fn list_tools(&self) -> std::result::Result<Vec<ExternalTool>, ActionError>;

    async fn call_tool(
        &self,
        tool: &str,
        params: serde_json::Value,
    ) -> std::result::Result<String, ActionError>;
}

/// Routes commands to handlers and external sources.
pub struct ActionRegistry {
    handlers: BTreeMap<String, Box<dyn ActionHandler>>,
    sources: BTreeMap<String, Arc<dyn ExternalToolSource>>,
    catalog: RwLock<Vec<ExternalTool>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
            sources: BTreeMap::new(),
            catalog: RwLock::new(Vec::new()),
        }
    }

    /// Register a handler. Replaces any existing handler with the same name.
    pub fn register(&mut self, handler: Box<dyn ActionHandler>) {
        let name = handler.name().to_string();
        self.handlers.insert(name, handler);
    }

    /// Register an external tool source under its own name.
    pub fn register_source(&mut self, source: Arc<dyn ExternalToolSource>) {
        let name = source.name().to_string();
        self.sources.insert(name, source);
    }

    /// Get a handler by action name.
    pub fn get(&self, action: &str) -> Option<&dyn ActionHandler> {
        self.handlers.get(action).map(|h| h.as_ref())
    }

    /// Built-in handlers in name order.
    pub fn handlers(&self) -> impl Iterator<Item = &dyn ActionHandler> {
        self.handlers.values().map(|h| h.as_ref())
    }

    /// All action names the model may use, in name order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        if !self.sources.is_empty() {
            names.push(EXTERNAL_ACTION);
        }
        names
    }

    pub fn has_sources(&self) -> bool {
        !self.sources.is_empty()
    }

    /// Re-list tools from every external source.
    ///
    /// A source that fails to answer contributes nothing this round; the
    /// others still refresh. Returns the number of tools now cataloged.
    pub async fn refresh_external(&self) -> usize {
        if self.sources.is_empty() {
            return 0;
        }

        let mut tools = Vec::new();
        for (name, source) in &self.sources {
            match source.list_tools().await {
                Ok(listed) => {
                    debug!(server = %name, count = listed.len(), "External tools listed");
                    tools.extend(listed);
                }
                Err(e) => {
                    warn!(server = %name, error = %e, "External tool listing failed");
                }
            }
        }

        let count = tools.len();
        *self.catalog.write().await = tools;
        count
    }

    /// The external tools seen by the last refresh.
    pub async fn external_tools(&self) -> Vec<ExternalTool> {
        self.catalog.read().await.clone()
    }

    /// Execute a command and return its result text.
    ///
    /// Exactly one handler or source is invoked. Nothing is retried.
    pub async fn dispatch(&self, command: &Command) -> String {
        match command {
            Command::Builtin { action, param } => {
                let Some(handler) = self.handlers.get(action) else {
                    warn!(action = %action, "Unknown action requested");
                    return format!(
                        "Unknown action '{action}'. Available actions: {}",
                        self.names().join(", ")
                    );
                };
                info!(action = %action, "Dispatching action");
                match handler.execute(param).await {
                    Ok(output) => output,
                    Err(e) => {
                        warn!(action = %action, error = %e, "Action failed");
                        format!("Error: {e}")
                    }
                }
            }
            Command::External { server, tool, params } => {
                let Some(source) = self.sources.get(server) else {
                    warn!(server = %server, "Unknown external server requested");
                    let known: Vec<&str> = self.sources.keys().map(|s| s.as_str()).collect();
                    return format!(
                        "Unknown MCP server '{server}'. Available servers: {}",
                        if known.is_empty() { "none".to_string() } else { known.join(", ") }
                    );
                };
                info!(server = %server, tool = %tool, "Dispatching external tool");
                match source.call_tool(tool, params.clone()).await {
                    Ok(output) => output,
                    Err(e) => {
                        warn!(server = %server, tool = %tool, error = %e, "External tool failed");
                        format!("Error: {e}")
                    }
                }
            }
        }
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct EchoHandler;

    #[async_trait]
    impl ActionHandler for EchoHandler {
        fn name(&self) -> &str { "ECHO" }
        fn description(&self) -> &str { "Echoes back the param" }
        fn param_hint(&self) -> &str { "text" }
        async fn execute(&self, param: &str) -> std::result::Result<String, ActionError> {
            Ok(param.to_string())
        }
    }

    struct BrokenHandler;

    #[async_trait]
    impl ActionHandler for BrokenHandler {
        fn name(&self) -> &str { "BROKEN" }
        fn description(&self) -> &str { "Always fails" }
        fn param_hint(&self) -> &str { "" }
        async fn execute(&self, _param: &str) -> std::result::Result<String, ActionError> {
            Err(ActionError::ExecutionFailed {
                action: "BROKEN".into(),
                reason: "disk on fire".into(),
            })
        }
    }

    struct MockSource {
        calls: Mutex<Vec<(String, serde_json::Value)>>,
        fail_listing: bool,
    }

    impl MockSource {
        fn new(fail_listing: bool) -> Self {
            Self { calls: Mutex::new(Vec::new()), fail_listing }
        }
    }

    #[async_trait]
    impl ExternalToolSource for MockSource {
        fn name(&self) -> &str { "files" }

        async fn list_tools(&self) -> std::result::Result<Vec<ExternalTool>, ActionError> {
            if self.fail_listing {
                return Err(ActionError::External {
                    server: "files".into(),
                    reason: "not running".into(),
                });
            }
            Ok(vec![ExternalTool {
                server: "files".into(),
                name: "read_file".into(),
                description: "Read a file".into(),
                input_schema: serde_json::json!({"type": "object"}),
            }])
        }

        async fn call_tool(
            &self,
            tool: &str,
            params: serde_json::Value,
        ) -> std::result::Result<String, ActionError> {
            self.calls.lock().unwrap().push((tool.to_string(), params));
            Ok("file contents".into())
        }
    }

    fn registry() -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        registry.register(Box::new(EchoHandler));
        registry.register(Box::new(BrokenHandler));
        registry
    }

    #[test]
    fn registry_register_and_lookup() {
        let registry = registry();
        assert!(registry.get("ECHO").is_some());
        assert!(registry.get("NOPE").is_none());
        assert_eq!(registry.names(), vec!["BROKEN", "ECHO"]);
    }

    #[tokio::test]
    async fn dispatch_builtin() {
        let out = registry().dispatch(&Command::builtin("ECHO", "hello world")).await;
        assert_eq!(out, "hello world");
    }

    #[tokio::test]
    async fn handler_error_becomes_text() {
        let out = registry().dispatch(&Command::builtin("BROKEN", "")).await;
        assert!(out.starts_with("Error:"));
        assert!(out.contains("disk on fire"));
    }

    #[tokio::test]
    async fn unknown_action_lists_available() {
        let out = registry().dispatch(&Command::builtin("FLY", "to the moon")).await;
        assert!(out.contains("Unknown action 'FLY'"));
        assert!(out.contains("ECHO"));
    }

    #[tokio::test]
    async fn external_command_routes_to_source() {
        let source = Arc::new(MockSource::new(false));
        let mut registry = registry();
        registry.register_source(source.clone());
        assert!(registry.names().contains(&EXTERNAL_ACTION));

        let out = registry
            .dispatch(&Command::External {
                server: "files".into(),
                tool: "read_file".into(),
                params: serde_json::json!({"path": "/tmp/a"}),
            })
            .await;
        assert_eq!(out, "file contents");

        let calls = source.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "read_file");
        assert_eq!(calls[0].1["path"], "/tmp/a");
    }

    #[tokio::test]
    async fn unknown_server_is_reported() {
        let out = registry()
            .dispatch(&Command::External {
                server: "ghost".into(),
                tool: "x".into(),
                params: serde_json::Value::Null,
            })
            .await;
        assert!(out.contains("Unknown MCP server 'ghost'"));
        assert!(out.contains("none"));
    }

    #[tokio::test]
    async fn refresh_external_builds_catalog() {
        let mut registry = registry();
        registry.register_source(Arc::new(MockSource::new(false)));
        assert!(registry.external_tools().await.is_empty());

        assert_eq!(registry.refresh_external().await, 1);
        let tools = registry.external_tools().await;
        assert_eq!(tools[0].name, "read_file");
        assert_eq!(tools[0].server, "files");
    }

    #[tokio::test]
    async fn failing_source_contributes_nothing() {
        let mut registry = registry();
        registry.register_source(Arc::new(MockSource::new(true)));
        assert_eq!(registry.refresh_external().await, 0);
    }

    #[test]
    fn labels_are_single_line_and_bounded() {
        assert_eq!(Command::builtin("CMD", "ls -la").label(), "CMD: ls -la");
        assert_eq!(Command::builtin("SCREENSHOT", "").label(), "SCREENSHOT");

        let long = Command::builtin("CMD", "x".repeat(200));
        assert!(long.label().chars().count() <= LABEL_MAX_CHARS + 1);

        let multi = Command::builtin("MEMORY_SAVE_DAILY", "line one\nline two");
        assert_eq!(multi.label(), "MEMORY_SAVE_DAILY: line one");

        let ext = Command::External {
            server: "files".into(),
            tool: "read_file".into(),
            params: serde_json::Value::Null,
        };
        assert_eq!(ext.action(), "MCP_TOOL");
        assert_eq!(ext.label(), "MCP_TOOL: files/read_file");
    }
}
