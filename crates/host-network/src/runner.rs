//! Command execution
//!
//! Everything the applier does goes through [`CommandRunner`], so tests can
//! swap the real `ip` binary for [`FakeIpRoute2`](crate::FakeIpRoute2).

use crate::error::NetworkError;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Default timeout for a single `ip` invocation
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of one command invocation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Runs `ip` subcommands
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `ip <args...>` and returns its output. A non-zero exit is not an error here.
    async fn run(&self, args: &[&str]) -> Result<CommandOutput, NetworkError>;
}

/// Runs the real `ip` binary
#[derive(Debug, Clone)]
pub struct IpCommand {
    program: String,
    timeout: Duration,
}

impl Default for IpCommand {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl IpCommand {
    /// `ip` from `PATH` with the given per-command timeout
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "ip".to_string(),
            timeout,
        }
    }

    /// Uses a different binary, e.g. an absolute path
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait::async_trait]
impl CommandRunner for IpCommand {
    async fn run(&self, args: &[&str]) -> Result<CommandOutput, NetworkError> {
        let command = format!("{} {}", self.program, args.join(" "));
        debug!("Executing: {}", command);

        let child = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_elapsed| NetworkError::Timeout {
                command: command.clone(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|source| NetworkError::Io {
                command: command.clone(),
                source,
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output() {
        let out = CommandOutput {
            code: Some(1),
            stdout: "a\n".to_string(),
            stderr: "b\n".to_string(),
        };
        assert!(!out.success());
        assert_eq!(out.combined(), "a\nb\n");
    }

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let runner = IpCommand::default().with_program("/nonexistent/ip");
        let err = runner.run(&["link", "show"]).await.unwrap_err();
        assert!(matches!(err, NetworkError::Io { .. }));
    }
}
