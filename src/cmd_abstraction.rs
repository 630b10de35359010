//! Command execution abstraction.
//!
//! Every host mutation goes through the [`CommandExecutor`] trait so the
//! compilers and drivers can be exercised without touching the real packet
//! filter. The real implementation uses `tokio::process`, which suspends only
//! the calling task while the external tool runs.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::process::Command;
use tracing::debug;

use crate::error::{ControlError, ControlResult};

#[cfg(test)]
use mockall::automock;

/// Output from command execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output from the command
    pub stdout: String,
    /// Standard error from the command
    pub stderr: String,
    /// Whether the command succeeded (exit code 0)
    pub success: bool,
    /// The exit code, if available
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn ok() -> Self {
        Self {
            success: true,
            code: Some(0),
            ..Default::default()
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            success: false,
            code: Some(code),
            ..Default::default()
        }
    }

    /// Diagnostic text: stderr, or stdout when the tool reports errors there
    /// (netsh and `net` write their failures to stdout).
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// A single external command: program plus arguments, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Trait for command execution, allowing dependency injection for testing.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute a command with the given arguments and capture its output.
    ///
    /// Only a failure to start the process is an `Err`; a non-zero exit is
    /// reported through [`CommandOutput::success`].
    async fn execute(&self, cmd: &str, args: &[String]) -> std::io::Result<CommandOutput>;
}

/// Real implementation of CommandExecutor that runs actual system commands.
#[derive(Debug, Clone, Default)]
pub struct RealCommandExecutor;

impl RealCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for RealCommandExecutor {
    async fn execute(&self, cmd: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        let output = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

/// Executor that records every invocation and answers from a script.
///
/// With an empty script every command succeeds, which makes it the dry-run
/// executor used by `--dry-run` on the CLI.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<Invocation>>,
    responses: Mutex<VecDeque<CommandOutput>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outputs returned in order; once exhausted, commands succeed.
    pub fn with_responses(responses: impl IntoIterator<Item = CommandOutput>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(responses.into_iter().collect()),
        }
    }

    pub fn push_response(&self, output: CommandOutput) {
        if let Ok(mut guard) = self.responses.lock() {
            guard.push_back(output);
        }
    }

    /// Invocations seen so far, in issue order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Number of recorded invocations whose program and first args match.
    pub fn count_matching(&self, program: &str, leading: &[&str]) -> usize {
        self.calls()
            .iter()
            .filter(|inv| {
                inv.program == program
                    && inv.args.len() >= leading.len()
                    && inv.args.iter().zip(leading).all(|(a, b)| a == b)
            })
            .count()
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutor {
    async fn execute(&self, cmd: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        if let Ok(mut guard) = self.calls.lock() {
            guard.push(Invocation::new(cmd, args.iter().cloned()));
        }
        let scripted = self.responses.lock().ok().and_then(|mut g| g.pop_front());
        Ok(scripted.unwrap_or_else(CommandOutput::ok))
    }
}

/// Run one invocation and turn a non-zero exit into a [`ControlError`]
/// carrying the tool's raw diagnostic text.
pub async fn run_checked(
    executor: &dyn CommandExecutor,
    invocation: &Invocation,
) -> ControlResult<CommandOutput> {
    debug!("exec: {}", invocation);
    let output = executor
        .execute(&invocation.program, &invocation.args)
        .await
        .map_err(|e| ControlError::CommandExecution {
            program: invocation.program.clone(),
            stderr: e.to_string(),
            code: None,
        })?;

    if output.success {
        Ok(output)
    } else {
        Err(ControlError::CommandExecution {
            program: invocation.program.clone(),
            stderr: output.diagnostic().to_string(),
            code: output.code,
        })
    }
}

/// Run a sequence strictly in order, aborting on the first failure.
pub async fn run_sequence(
    executor: &dyn CommandExecutor,
    invocations: &[Invocation],
) -> ControlResult<()> {
    for invocation in invocations {
        run_checked(executor, invocation).await?;
    }
    Ok(())
}

/// Helper function to convert a slice of &str to Vec<String>.
#[cfg(test)]
fn args_to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}
