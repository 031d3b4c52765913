use std::process::Output;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::AgentError;

/// How a slave reaches the Claude CLI.
#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    /// Executable to run. `claude` unless overridden for testing.
    pub program: String,
    pub model: String,
    /// Upper bound on one invocation. The orchestrator's task deadline may
    /// cut it shorter.
    pub timeout: Duration,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self::new("claude-3-5-haiku-latest", Duration::from_secs(30))
    }
}

impl ClaudeCliConfig {
    pub fn new(model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: "claude".to_string(),
            model: model.into(),
            timeout,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Print-mode arguments for one research prompt.
    fn args<'a>(&'a self, system_prompt: &'a str, user_prompt: &'a str) -> [&'a str; 8] {
        [
            "-p",
            user_prompt,
            "--system-prompt",
            system_prompt,
            "--model",
            self.model.as_str(),
            "--output-format",
            "text",
        ]
    }
}

/// Run the CLI once and return its stdout.
///
/// The child is spawned with `kill_on_drop`, so a timeout or a fired
/// `cancel` token also kills the process.
pub async fn invoke_claude(
    system_prompt: &str,
    user_prompt: &str,
    config: &ClaudeCliConfig,
    cancel: &CancellationToken,
) -> Result<String, AgentError> {
    debug!(program = %config.program, model = %config.model, "Invoking claude CLI");

    let mut command = Command::new(&config.program);
    command
        .args(config.args(system_prompt, user_prompt))
        .kill_on_drop(true);

    let waited = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(AgentError::Cancelled),
        waited = tokio::time::timeout(config.timeout, command.output()) => waited,
    };

    let output = waited
        .map_err(|_| AgentError::Timeout(config.timeout.as_millis() as u64))?
        .map_err(|e| AgentError::Cli(format!("Failed to spawn {}: {e}", config.program)))?;

    stdout_of(output)
}

fn stdout_of(output: Output) -> Result<String, AgentError> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(status = %output.status, stderr = %stderr, "Claude CLI failed");
        return Err(AgentError::Cli(format!("exit {}: {}", output.status, stderr.trim())));
    }

    let text = String::from_utf8_lossy(&output.stdout).into_owned();
    if text.trim().is_empty() {
        return Err(AgentError::Cli("empty response".to_string()));
    }
    Ok(text)
}

/// Whether `program --version` runs successfully.
pub async fn check_cli_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
