//! GPU vendor diagnostic tool invocation with a bounded wait.

use std::io::ErrorKind;
use std::process::ExitStatus;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Child;
use tokio::process::Command;
use tokio::runtime::Builder;
use tokio::time::timeout;

/// Result of running the diagnostic tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    /// The program could not be found.
    NotFound,
    /// Spawn error, non-zero exit, or termination by signal (`code` is `None`).
    Failed { code: Option<i32> },
    /// The tool did not finish within the timeout and was killed.
    TimedOut,
    /// The tool exited successfully without printing anything.
    Empty,
    /// The tool exited successfully; `stdout` is trimmed.
    Succeeded { stdout: String },
}

/// A bounded external call reporting GPUs.
pub trait DiagnosticTool: Send + Sync {
    fn query(&self) -> ToolOutcome;
}

/// Runs a program and waits at most `timeout` for it and its output.
///
/// On Unix the program leads its own process group, so a timeout also kills
/// anything it started.
#[derive(Debug, Clone)]
pub struct CommandTool {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandTool {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    fn spawn(&self) -> std::io::Result<Child> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        command.spawn()
    }

    async fn run(&self) -> ToolOutcome {
        let mut child = match self.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("{} not found", self.program);
                return ToolOutcome::NotFound;
            }
            Err(e) => {
                tracing::debug!("failed to spawn {}: {e}", self.program);
                return ToolOutcome::Failed { code: None };
            }
        };

        let result = timeout(self.timeout, collect(&mut child)).await;
        match result {
            Ok(Ok((status, stdout))) => classify(&self.program, status, &stdout),
            Ok(Err(e)) => {
                tracing::debug!("failed to wait for {}: {e}", self.program);
                terminate(&mut child).await;
                ToolOutcome::Failed { code: None }
            }
            Err(_) => {
                tracing::debug!("{} timed out after {:?}", self.program, self.timeout);
                terminate(&mut child).await;
                ToolOutcome::TimedOut
            }
        }
    }
}

impl DiagnosticTool for CommandTool {
    fn query(&self) -> ToolOutcome {
        let runtime = match Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::debug!("failed to start runtime for {}: {e}", self.program);
                return ToolOutcome::Failed { code: None };
            }
        };
        runtime.block_on(self.run())
    }
}

/// Reads stdout to its end, then reaps the child.
///
/// A grandchild inheriting the pipe keeps the read open after the tool exits.
async fn collect(child: &mut Child) -> std::io::Result<(ExitStatus, Vec<u8>)> {
    let mut stdout = Vec::new();
    if let Some(mut pipe) = child.stdout.take() {
        pipe.read_to_end(&mut stdout).await?;
    }
    let status = child.wait().await?;
    Ok((status, stdout))
}

fn classify(program: &str, status: ExitStatus, stdout: &[u8]) -> ToolOutcome {
    if !status.success() {
        tracing::debug!("{program} exited with {status}");
        return ToolOutcome::Failed {
            code: status.code(),
        };
    }

    let stdout = String::from_utf8_lossy(stdout).trim().to_string();
    if stdout.is_empty() {
        ToolOutcome::Empty
    } else {
        ToolOutcome::Succeeded { stdout }
    }
}

/// Kills the tool's process group (Unix) and the tool itself, then reaps it.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: plain syscall; the group id is the still unreaped leader's pid.
        if unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) } != 0 {
            tracing::debug!(
                "failed to kill process group {pid}: {}",
                std::io::Error::last_os_error()
            );
        }
    }

    if let Err(e) = child.kill().await {
        tracing::debug!("failed to kill diagnostic tool: {e}");
    }
}
