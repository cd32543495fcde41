//! Spawning the git toolchain.

use std::pin::Pin;
use std::process::Stdio;

use anyhow::{Context, bail};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::process::Command;

/// Readable stdout of a running git process.
pub type GitOutput = Pin<Box<dyn AsyncRead + Send>>;

/// One git invocation: arguments after `git`, extra environment and the
/// bytes to feed on stdin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GitCommand {
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub input: Option<Bytes>,
}

impl GitCommand {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn input(mut self, input: Bytes) -> Self {
        self.input = Some(input);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Starts the command and hands back its stdout without waiting for exit.
    async fn spawn(&self, command: GitCommand) -> anyhow::Result<GitOutput>;

    /// Runs the command to completion; a non-zero exit is an error.
    async fn run(&self, command: GitCommand) -> anyhow::Result<Vec<u8>>;
}

/// Runs the real `git` binary.
#[derive(Debug, Clone)]
pub struct GitProcessRunner {
    program: String,
}

impl Default for GitProcessRunner {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
        }
    }
}

impl GitProcessRunner {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, command: &GitCommand) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&command.args);
        cmd.envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd
    }
}

#[async_trait]
impl CommandRunner for GitProcessRunner {
    async fn spawn(&self, command: GitCommand) -> anyhow::Result<GitOutput> {
        tracing::debug!(args = ?command.args, "executing git");
        let mut cmd = self.command(&command);
        cmd.stdout(Stdio::piped());
        cmd.stdin(if command.input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program))?;
        let stdout = child.stdout.take().context("missing git stdout")?;

        if let Some(input) = command.input {
            let mut stdin = child.stdin.take().context("missing git stdin")?;
            // Written from its own task so a large request cannot block on a
            // full stdout pipe nobody is draining yet.
            tokio::spawn(async move {
                if let Err(err) = stdin.write_all(&input).await {
                    tracing::warn!(error = %err, "failed to write request body to git");
                }
            });
        }

        let args = command.args;
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {}
                Ok(status) => tracing::warn!(?args, %status, "git exited unsuccessfully"),
                Err(err) => tracing::warn!(?args, error = %err, "failed to wait for git"),
            }
        });

        Ok(Box::pin(stdout))
    }

    async fn run(&self, command: GitCommand) -> anyhow::Result<Vec<u8>> {
        tracing::debug!(args = ?command.args, "executing git (waiting)");
        let mut cmd = self.command(&command);
        cmd.stdin(Stdio::null());
        let output = cmd
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.program))?;
        if !output.status.success() {
            bail!(
                "git {} failed with {}: {}",
                command.args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.stdout)
    }
}
