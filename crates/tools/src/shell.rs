//! CMD action — execute system commands.
//!
//! Supports command allowlisting and a timeout.

use async_trait::async_trait;
use moltyclaw_config::ShellConfig;
use moltyclaw_core::action::ActionHandler;
use moltyclaw_core::error::ActionError;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Reported when a command succeeds without printing anything.
pub const EMPTY_SUCCESS: &str = "Command executed successfully.";

/// Execute shell commands with safety constraints.
pub struct ShellAction {
    /// If non-empty, only these commands are allowed.
    allowed_commands: Vec<String>,
    timeout: Duration,
}

impl ShellAction {
    pub fn new(allowed_commands: Vec<String>, timeout: Duration) -> Self {
        Self {
            allowed_commands,
            timeout,
        }
    }

    pub fn from_config(config: &ShellConfig) -> Self {
        Self::new(
            config.allowed_commands.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn is_command_allowed(&self, command: &str) -> bool {
        if self.allowed_commands.is_empty() {
            return true; // No allowlist = all commands allowed
        }

        // Extract the base command (first word)
        let base_cmd = command.split_whitespace().next().unwrap_or("").trim();

        self.allowed_commands.iter().any(|a| a == base_cmd)
    }
}

#[async_trait]
impl ActionHandler for ShellAction {
    fn name(&self) -> &str {
        "CMD"
    }

    fn description(&self) -> &str {
        "Run a shell command on the host and return its output"
    }

    fn param_hint(&self) -> &str {
        "the command line, e.g. ls -la"
    }

    async fn execute(&self, param: &str) -> Result<String, ActionError> {
        let command = param.trim();
        if command.is_empty() {
            return Err(ActionError::InvalidParam {
                action: "CMD".into(),
                reason: "empty command".into(),
            });
        }

        if !self.is_command_allowed(command) {
            return Err(ActionError::ExecutionFailed {
                action: "CMD".into(),
                reason: format!(
                    "Command '{}' not in allowlist",
                    command.split_whitespace().next().unwrap_or("")
                ),
            });
        }

        debug!(command = %command, "Executing shell command");

        let mut process = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        process.kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, process.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ActionError::ExecutionFailed {
                    action: "CMD".into(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ActionError::Timeout {
                    action: "CMD".into(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            return Ok(format!("Error (code {code}):\n{stderr}"));
        }

        if stdout.is_empty() {
            Ok(EMPTY_SUCCESS.to_string())
        } else {
            Ok(stdout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(allowed: &[&str]) -> ShellAction {
        ShellAction::new(
            allowed.iter().map(|s| s.to_string()).collect(),
            Duration::from_secs(10),
        )
    }

    #[test]
    fn allowlist_check() {
        let action = shell(&["ls", "cat", "git"]);
        assert!(action.is_command_allowed("ls -la"));
        assert!(action.is_command_allowed("cat file.txt"));
        assert!(action.is_command_allowed("git status"));
        assert!(!action.is_command_allowed("rm -rf /"));
        assert!(!action.is_command_allowed("sudo something"));
    }

    #[test]
    fn empty_allowlist_allows_all() {
        assert!(shell(&[]).is_command_allowed("anything goes"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_echo() {
        let out = shell(&[]).execute("echo hello").await.unwrap();
        assert_eq!(out, "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn silent_success_is_confirmed() {
        let out = shell(&[]).execute("true").await.unwrap();
        assert_eq!(out, EMPTY_SUCCESS);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failure_reports_code_and_stderr() {
        let out = shell(&[]).execute("echo oops >&2; exit 3").await.unwrap();
        assert_eq!(out, "Error (code 3):\noops");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_command_times_out() {
        let action = ShellAction::new(vec![], Duration::from_millis(100));
        let result = action.execute("sleep 5").await;
        assert!(matches!(result, Err(ActionError::Timeout { .. })));
    }

    #[tokio::test]
    async fn blocked_command() {
        let result = shell(&["ls"]).execute("rm -rf /").await;
        assert!(matches!(result, Err(ActionError::ExecutionFailed { .. })));
    }

    #[tokio::test]
    async fn empty_command_is_invalid() {
        let result = shell(&[]).execute("   ").await;
        assert!(matches!(result, Err(ActionError::InvalidParam { .. })));
    }
}
