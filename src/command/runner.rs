//! External command execution.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::utils::command_line;

/// Exit code reported when a command never produced one (launch failure,
/// timeout, killed by signal).
pub const NO_EXIT_CODE: i32 = -1;

/// Captured result of one OS command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `exit_code == 0`.
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    /// Build an output from an exit code and captured streams.
    pub fn from_exit(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            success: exit_code == 0,
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Output for a command that could not be run at all.
    pub fn launch_failure(message: impl Into<String>) -> Self {
        Self::from_exit(NO_EXIT_CODE, String::new(), message)
    }

    /// Best description of why the command failed.
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        format!("exit code {}", self.exit_code)
    }
}

/// Runs OS commands on behalf of an engine.
///
/// Implementations never fail: a missing binary, an I/O error or a timeout all
/// come back as an unsuccessful [`CommandOutput`]. Interpreting the output is
/// left to the caller.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> CommandOutput;
}

/// Runs commands as child processes with a per-command timeout.
#[derive(Debug, Clone)]
pub struct SystemCommandRunner {
    timeout: Duration,
}

impl SystemCommandRunner {
    /// Create a runner that gives up on commands after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> CommandOutput {
        let line = command_line(program, args);
        crate::debug_log!("Running: {}", line);

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => CommandOutput::from_exit(
                output.status.code().unwrap_or(NO_EXIT_CODE),
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr),
            ),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                CommandOutput::launch_failure(format!("{}: command not found", program))
            }
            Ok(Err(e)) => CommandOutput::launch_failure(format!("failed to run {}: {}", program, e)),
            Err(_) => CommandOutput::launch_failure(format!(
                "{} timed out after {}ms",
                program,
                self.timeout.as_millis()
            )),
        };

        if output.success {
            crate::trace_log!("Command succeeded: {}", line);
        } else {
            tracing::debug!(
                "Command failed (exit {}): {}: {}",
                output.exit_code,
                line,
                output.error_text()
            );
        }

        output
    }
}
