use crate::daemon::DaemonHandle;
use fleetbench_common::{FleetError, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// A command line handed to `bash -c` verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    text: String,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            text: program.into(),
        }
    }

    /// Append one argument, separated by a single space
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.text.push(' ');
        self.text.push_str(arg.as_ref());
        self
    }

    /// Prepend text that must run before the program, e.g. env assignments
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.text.insert_str(0, prefix);
        self
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl std::fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Result of a command that ran to completion
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Executes the storage daemon and coordinator commands
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. A non-zero exit is an `ExternalCommand` error
    /// carrying the command text and everything it printed.
    async fn run(&self, command: &ShellCommand) -> Result<CommandOutput>;

    /// Start a long-running daemon in the background, appending its output
    /// to `log_path`
    fn spawn(&self, command: &ShellCommand, label: &str, log_path: &Path) -> Result<DaemonHandle>;
}

/// Runs commands through `bash -c` so the shell-escaped JSON values reach
/// the daemons unchanged
#[derive(Debug, Clone, Default)]
pub struct BashRunner;

impl BashRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(text: &ShellCommand) -> Command {
        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(text.as_str());
        cmd
    }
}

#[async_trait::async_trait]
impl CommandRunner for BashRunner {
    async fn run(&self, command: &ShellCommand) -> Result<CommandOutput> {
        debug!("Running: {}", command);

        let output = Self::command(command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| FleetError::ExternalCommand {
                command: command.to_string(),
                status: "failed to start".to_string(),
                output: e.to_string(),
            })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !output.status.success() {
            return Err(FleetError::ExternalCommand {
                command: command.to_string(),
                status: output.status.to_string(),
                output: format!("{}{}", result.stdout, result.stderr),
            });
        }

        Ok(result)
    }

    fn spawn(&self, command: &ShellCommand, label: &str, log_path: &Path) -> Result<DaemonHandle> {
        debug!("Launching {}: {}", label, command);

        let log = OpenOptions::new().create(true).append(true).open(log_path)?;
        let err_log = log.try_clone()?;

        let mut child = Self::command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(err_log))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FleetError::ExternalCommand {
                command: command.to_string(),
                status: "failed to start".to_string(),
                output: e.to_string(),
            })?;

        Ok(DaemonHandle::supervise(label, async move {
            child.wait().await.map(|status| status.code())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::DaemonState;

    #[test]
    fn test_shell_command_building() {
        let cmd = ShellCommand::new("ipfs")
            .arg("-c")
            .arg("/tmp/node_0/ipfs-ab")
            .arg("init");
        assert_eq!(cmd.as_str(), "ipfs -c /tmp/node_0/ipfs-ab init");

        let prefixed = ShellCommand::new("svc").arg("init").with_prefix("A=\"1\" ");
        assert_eq!(prefixed.to_string(), "A=\"1\" svc init");
    }

    #[tokio::test]
    async fn test_bash_runner_captures_output() {
        let output = BashRunner::new()
            .run(&ShellCommand::new("echo").arg("hello"))
            .await
            .unwrap();
        assert_eq!(output.code, Some(0));
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_bash_runner_failure_carries_command() {
        let cmd = ShellCommand::new("echo").arg("boom").arg("1>&2;").arg("exit 3");
        let err = BashRunner::new().run(&cmd).await.unwrap_err();
        match err {
            FleetError::ExternalCommand { command, output, .. } => {
                assert_eq!(command, cmd.to_string());
                assert!(output.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_bash_runner_env_prefix_reaches_program() {
        let cmd = ShellCommand::new("printenv")
            .arg("CLUSTER_SECRET")
            .with_prefix("CLUSTER_SECRET=\"s3cr3t\" ");
        let output = BashRunner::new().run(&cmd).await.unwrap();
        assert_eq!(output.stdout.trim(), "s3cr3t");
    }

    #[tokio::test]
    async fn test_bash_runner_spawn_observes_exit() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("daemon.log");
        let handle = BashRunner::new()
            .spawn(&ShellCommand::new("echo").arg("up;").arg("exit 7"), "short-lived", &log)
            .unwrap();

        assert_eq!(handle.wait_exit().await, DaemonState::Exited { code: Some(7) });
        let logged = std::fs::read_to_string(&log).unwrap();
        assert!(logged.contains("up"));
    }
}
