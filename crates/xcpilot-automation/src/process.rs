use crate::{AutomationError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// A subprocess invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    /// Redirect stdout to this file (detached captures only).
    pub stdout_path: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl ProcessRequest {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            stdout_path: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout_path = Some(path.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// Seam between the strategies and the host's processes.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run to completion, aborting (and killing the child) if `cancel` fires.
    async fn run(&self, request: ProcessRequest, cancel: &CancellationToken)
    -> Result<ProcessOutput>;

    /// Start a background process and return its pid without waiting.
    async fn spawn_detached(&self, request: ProcessRequest) -> Result<u32>;

    /// Resolve a program name to a path on the host, if installed.
    async fn locate(&self, program: &str) -> Option<PathBuf>;
}

/// `tokio::process` backed runner used outside tests
#[derive(Debug, Default, Clone)]
pub struct SystemProcessRunner;

impl SystemProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(
        &self,
        request: ProcessRequest,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput> {
        if cancel.is_cancelled() {
            return Err(AutomationError::Cancelled);
        }

        tracing::debug!(command = %request.display(), "Spawning process");

        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if request.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| AutomationError::Spawn {
            program: request.program.clone(),
            source: e,
        })?;

        if let Some(input) = &request.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).await?;
                stdin.shutdown().await?;
            }
        }

        let wait = child.wait_with_output();
        let output = match request.timeout {
            Some(limit) => tokio::select! {
                result = tokio::time::timeout(limit, wait) => match result {
                    Ok(output) => output?,
                    Err(_) => {
                        return Err(AutomationError::Timeout {
                            program: request.program.clone(),
                            seconds: limit.as_secs(),
                        });
                    }
                },
                _ = cancel.cancelled() => return Err(AutomationError::Cancelled),
            },
            None => tokio::select! {
                output = wait => output?,
                _ = cancel.cancelled() => return Err(AutomationError::Cancelled),
            },
        };

        let output = ProcessOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        tracing::debug!(program = %request.program, status = ?output.status, "Process exited");
        Ok(output)
    }

    async fn spawn_detached(&self, request: ProcessRequest) -> Result<u32> {
        tracing::info!(command = %request.display(), "Starting background process");

        let stdout = match &request.stdout_path {
            Some(path) => Stdio::from(std::fs::File::create(path)?),
            None => Stdio::null(),
        };

        let child = Command::new(&request.program)
            .args(&request.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| AutomationError::Spawn {
                program: request.program.clone(),
                source: e,
            })?;

        // Dropping the handle leaves the process running; tokio reaps it.
        child.id().ok_or_else(|| AutomationError::Spawn {
            program: request.program.clone(),
            source: std::io::Error::other("process exited before its pid was read"),
        })
    }

    async fn locate(&self, program: &str) -> Option<PathBuf> {
        if program.contains('/') {
            let path = Path::new(program);
            return path.exists().then(|| path.to_path_buf());
        }

        let output = Command::new("which")
            .arg(program)
            .stdin(Stdio::null())
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            return None;
        }

        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!path.is_empty()).then(|| PathBuf::from(path))
    }
}

/// Quote a string for embedding as one argument in a POSIX shell command line.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}
