//! Command execution utilities for collectors

use crate::CollectError;
use async_trait::async_trait;
use lv_config::{LvConfig, RemoteConfig};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Command executor for running external tools
#[derive(Debug, Clone)]
pub struct Executor {
    /// SSH configuration for remote execution
    ssh_config: Option<SshConfig>,
}

/// SSH configuration for remote machines
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub host: String,
    pub user: String,
    pub key_path: Option<String>,
}

impl From<&RemoteConfig> for SshConfig {
    fn from(remote: &RemoteConfig) -> Self {
        Self {
            host: remote.host.clone(),
            user: remote.user.clone(),
            key_path: remote.key_path.clone(),
        }
    }
}

/// Output from command execution
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl Executor {
    /// Create a local executor
    pub fn local() -> Self {
        Self { ssh_config: None }
    }

    /// Create a remote executor with SSH config
    pub fn remote(config: SshConfig) -> Self {
        Self {
            ssh_config: Some(config),
        }
    }

    /// Local or remote depending on `[remote]`
    pub fn from_config(config: &LvConfig) -> Self {
        match &config.remote {
            Some(remote) => Self::remote(remote.into()),
            None => Self::local(),
        }
    }

    /// Check if a tool is available
    #[instrument(skip(self))]
    pub async fn check_tool(&self, tool: &str) -> Result<bool, CollectError> {
        let probe = format!("command -v {}", shell_quote(tool));
        match self
            .run("sh", &["-c".to_string(), probe], Duration::from_secs(5))
            .await
        {
            Ok(output) => Ok(output.exit_code == 0),
            Err(_) => Ok(false),
        }
    }

    /// Run a program with timeout
    #[instrument(skip(self))]
    pub async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, CollectError> {
        let output = match &self.ssh_config {
            None => self.run_local(program, args, timeout).await?,
            Some(ssh) => self.run_remote(program, args, timeout, ssh).await?,
        };
        Ok(output)
    }

    /// Run a program with timeout, returning stdout on success
    pub async fn run_checked(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<String, CollectError> {
        let output = self.run(program, args, timeout).await?;
        if output.exit_code != 0 {
            return Err(CollectError::ExecutionError(format!(
                "{program} failed with exit code {}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    async fn run_local(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, CollectError> {
        debug!(program = %program, ?args, "Running local command");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CollectError::ToolNotFound(program.to_string())
            } else {
                CollectError::IoError(e)
            }
        })?;

        wait_with_timeout(child, timeout).await
    }

    async fn run_remote(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
        ssh: &SshConfig,
    ) -> Result<CommandOutput, CollectError> {
        debug!(program = %program, host = %ssh.host, "Running remote command");

        let mut ssh_cmd = Command::new("ssh");

        // Add key if specified
        if let Some(key) = &ssh.key_path {
            ssh_cmd.arg("-i").arg(key);
        }

        ssh_cmd
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", timeout.as_secs().max(5)));

        ssh_cmd
            .arg(format!("{}@{}", ssh.user, ssh.host))
            .arg(remote_command(program, args))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = ssh_cmd.spawn()?;

        wait_with_timeout(child, timeout).await
    }
}

async fn wait_with_timeout(
    child: tokio::process::Child,
    timeout: Duration,
) -> Result<CommandOutput, CollectError> {
    // Dropping the future on timeout drops the child, which kills it
    let result = tokio::time::timeout(timeout, child.wait_with_output()).await;

    match result {
        Ok(Ok(output)) => Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        }),
        Ok(Err(e)) => Err(CollectError::IoError(e)),
        Err(_) => Err(CollectError::Timeout(timeout)),
    }
}

/// Command line handed to the remote shell, every word quoted
pub fn remote_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quote a word for a POSIX shell
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=+@,%".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Runs virsh against a connection URI and returns its stdout
#[async_trait]
pub trait VirshRunner: Send + Sync {
    /// Run `virsh -c <uri> <args...>`
    async fn execute(&self, uri: &str, args: &[String]) -> Result<String, CollectError>;

    /// Whether virsh can be invoked at all
    async fn is_available(&self) -> bool {
        true
    }
}

/// Production runner spawning the real virsh binary
#[derive(Debug, Clone)]
pub struct VirshCommand {
    executor: Executor,
    virsh_path: String,
    timeout: Duration,
}

impl VirshCommand {
    pub fn new(executor: Executor, virsh_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            executor,
            virsh_path: virsh_path.into(),
            timeout,
        }
    }

    pub fn from_config(config: &LvConfig) -> Self {
        Self::new(
            Executor::from_config(config),
            config.libvirt.virsh_path.clone(),
            config.libvirt.timeout(),
        )
    }

    /// Full argument vector for one invocation
    fn command_args(uri: &str, args: &[String]) -> Vec<String> {
        let mut full = Vec::with_capacity(args.len() + 2);
        full.push("-c".to_string());
        full.push(uri.to_string());
        full.extend(args.iter().cloned());
        full
    }
}

#[async_trait]
impl VirshRunner for VirshCommand {
    async fn execute(&self, uri: &str, args: &[String]) -> Result<String, CollectError> {
        let full = Self::command_args(uri, args);
        self.executor
            .run_checked(&self.virsh_path, &full, self.timeout)
            .await
    }

    async fn is_available(&self) -> bool {
        self.executor
            .check_tool(&self.virsh_path)
            .await
            .unwrap_or(false)
    }
}
