//! Transport layer for talking to tool servers.
//!
//! The stdio transport spawns the server as a child process and exchanges
//! newline-delimited JSON over its stdin/stdout. A [`Launcher`] turns a
//! resolved [`LaunchSpec`] into a boxed [`Transport`], which lets sessions be
//! driven by in-memory doubles in tests.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use mcpchat_core::ServerConfig;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::error::{McpError, TransportError};

/// Command name that is looked up on `PATH` before spawning.
pub const PACKAGE_RUNNER: &str = "npx";

/// Trait for MCP transport implementations.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one message; the transport adds framing.
    async fn send(&mut self, message: &str) -> Result<(), TransportError>;

    /// Receive the next message.
    async fn receive(&mut self) -> Result<String, TransportError>;

    /// Close the transport. Calling it again is a no-op.
    async fn close(&mut self) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;
}

/// Starts a transport for a resolved server command.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn Transport>, TransportError>;
}

/// A server command ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Applied on top of the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl LaunchSpec {
    /// Resolve a configured command. `npx` must be found on `PATH`; other
    /// commands are passed through for the OS to resolve at spawn time.
    pub fn resolve(config: &ServerConfig) -> Result<Self, McpError> {
        let command = config.command.trim();
        if command.is_empty() {
            return Err(McpError::configuration("server command is empty"));
        }

        let program = if command == PACKAGE_RUNNER {
            which::which(command).map_err(|e| {
                McpError::configuration(format!("'{}' not found on PATH: {}", command, e))
            })?
        } else {
            PathBuf::from(command)
        };

        Ok(Self {
            program,
            args: config.args.clone(),
            env: config.env.clone().unwrap_or_default(),
        })
    }
}

/// Launches servers as child processes over stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioLauncher;

#[async_trait]
impl Launcher for StdioLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn Transport>, TransportError> {
        let transport = StdioTransport::spawn(spec).await?;
        Ok(Box::new(transport))
    }
}

/// Standard I/O transport for MCP servers.
pub struct StdioTransport {
    child: Child,
    /// Taken on close so the server sees EOF before it is signalled.
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    connected: bool,
}

impl StdioTransport {
    /// Spawn the server process described by `spec`.
    pub async fn spawn(spec: &LaunchSpec) -> Result<Self, TransportError> {
        debug!(
            program = %spec.program.display(),
            args = ?spec.args,
            env_overrides = spec.env.len(),
            "Spawning MCP server process"
        );

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(TransportError::SpawnFailed)?;

        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::SpawnFailed(std::io::Error::other("Failed to capture stdin"))
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::SpawnFailed(std::io::Error::other("Failed to capture stdout"))
        })?;

        debug!(pid = ?child.id(), "MCP server process spawned");

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            connected: true,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn terminate(&mut self) -> Result<(), TransportError> {
        let Some(pid) = self.child.id() else {
            // Already reaped.
            return Ok(());
        };

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            debug!(pid, "Sending SIGTERM to MCP server");
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);

            tokio::select! {
                status = self.child.wait() => {
                    debug!(?status, "MCP server exited");
                    return Ok(());
                }
                _ = tokio::time::sleep(tokio::time::Duration::from_secs(2)) => {
                    warn!(pid, "MCP server did not exit after SIGTERM, killing");
                }
            }
        }

        self.child.kill().await.map_err(TransportError::TerminateFailed)
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        let stdin = match (self.connected, self.stdin.as_mut()) {
            (true, Some(stdin)) => stdin,
            _ => return Err(TransportError::NotConnected),
        };

        debug!(raw = message, "Sending message to MCP server");

        stdin
            .write_all(message.as_bytes())
            .await
            .map_err(TransportError::WriteError)?;
        stdin.write_all(b"\n").await.map_err(TransportError::WriteError)?;
        stdin.flush().await.map_err(TransportError::WriteError)?;

        Ok(())
    }

    async fn receive(&mut self) -> Result<String, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        loop {
            let mut line = String::new();
            let bytes_read = self
                .stdout
                .read_line(&mut line)
                .await
                .map_err(TransportError::ReadError)?;

            if bytes_read == 0 {
                self.connected = false;
                return Err(TransportError::ConnectionClosed);
            }

            let message = line.trim_end();
            if message.is_empty() {
                continue;
            }

            debug!(raw = message, "Received message from MCP server");
            return Ok(message.to_string());
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.stdin.is_none() && !self.connected {
            return Ok(());
        }

        debug!("Closing MCP server transport");
        self.connected = false;
        // Release in reverse order: session input first, then the process.
        drop(self.stdin.take());
        self.terminate().await
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
