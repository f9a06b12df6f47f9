//! External command execution
//!
//! Every stage shells out through [`CommandRunner`]. A non-zero exit is an
//! ordinary [`CommandOutcome`]; only a failure to start the process is an
//! error.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::DeployerError;

/// Default cap on captured stdout/stderr, per stream
pub const DEFAULT_OUTPUT_CAP: usize = 64 * 1024;

/// A program invocation. Arguments are passed as argv, never through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            timeout: Duration::from_secs(600),
        }
    }

    /// Build from an argv vector; `None` when it is empty
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.iter().cloned()))
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Human readable form for logs and messages
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished (or killed) process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    /// `None` when the process was killed by a signal or timed out
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration: Duration,
}

impl CommandOutcome {
    pub fn exited(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    pub fn timed_out(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: true,
            ..Default::default()
        }
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion or timeout
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandOutcome, DeployerError>;
}

/// [`CommandRunner`] that spawns real child processes
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    output_cap: usize,
    drain_grace: Duration,
}

impl ProcessRunner {
    pub fn new(output_cap: usize) -> Self {
        Self {
            output_cap,
            drain_grace: Duration::from_secs(2),
        }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_CAP)
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandOutcome, DeployerError> {
        if let Some(dir) = &cmd.cwd {
            let is_dir = tokio::fs::metadata(dir)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            if !is_dir {
                return Err(DeployerError::SpawnError(format!(
                    "working directory {} does not exist",
                    dir.display()
                )));
            }
        }

        debug!("Running command: {}", cmd.display());
        let started = Instant::now();

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group; a timeout kills the whole group.
        #[cfg(unix)]
        command.process_group(0);
        if let Some(dir) = &cmd.cwd {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| DeployerError::SpawnError(format!("{}: {}", cmd.program, e)))?;
        let pid = child.id();

        let stdout_buf = SharedOutput::default();
        let stderr_buf = SharedOutput::default();
        let stdout_task = tokio::spawn(read_capped(
            child.stdout.take(),
            self.output_cap,
            stdout_buf.clone(),
        ));
        let stderr_task = tokio::spawn(read_capped(
            child.stderr.take(),
            self.output_cap,
            stderr_buf.clone(),
        ));

        let (exit_code, timed_out) = match tokio::time::timeout(cmd.timeout, child.wait()).await {
            Ok(status) => (status?.code(), false),
            Err(_) => {
                warn!(
                    "Command timed out after {:?}, killing: {}",
                    cmd.timeout,
                    cmd.display()
                );
                kill_process_tree(&mut child, pid).await;
                (None, true)
            }
        };

        let stdout =
            collect_output(stdout_task, &stdout_buf, self.output_cap, self.drain_grace).await;
        let mut stderr =
            collect_output(stderr_task, &stderr_buf, self.output_cap, self.drain_grace).await;
        if timed_out {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!("Command timed out after {:?}", cmd.timeout));
        }

        let duration = started.elapsed();
        debug!(
            "Command finished in {:?} (exit code {:?}): {}",
            duration,
            exit_code,
            cmd.display()
        );

        Ok(CommandOutcome {
            exit_code,
            stdout,
            stderr,
            timed_out,
            duration,
        })
    }
}

/// Kill the child and every process in its group, then reap the child
async fn kill_process_tree(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) {
        // SAFETY: killpg only sends a signal; the group id is the child's pid.
        let rc = unsafe { libc::killpg(pid, libc::SIGKILL) };
        if rc != 0 {
            debug!(
                "killpg({}) failed: {}",
                pid,
                std::io::Error::last_os_error()
            );
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    if let Err(e) = child.kill().await {
        warn!("Failed to kill timed out command: {}", e);
    }
}

/// Tail of a stream, with the count of bytes dropped from the front
#[derive(Debug, Default)]
struct CappedOutput {
    bytes: Vec<u8>,
    dropped: usize,
}

impl CappedOutput {
    fn push(&mut self, chunk: &[u8], cap: usize) {
        self.bytes.extend_from_slice(chunk);
        // Trim lazily so the buffer never exceeds twice the cap.
        if self.bytes.len() > cap.saturating_mul(2) {
            self.trim(cap);
        }
    }

    fn trim(&mut self, cap: usize) {
        if self.bytes.len() > cap {
            let excess = self.bytes.len() - cap;
            self.bytes.drain(..excess);
            self.dropped += excess;
        }
    }

    fn render(self) -> String {
        let text = String::from_utf8_lossy(&self.bytes);
        if self.dropped > 0 {
            format!("[... {} bytes truncated ...]\n{}", self.dropped, text)
        } else {
            text.into_owned()
        }
    }
}

/// Capture buffer shared between a reader task and the runner
type SharedOutput = Arc<Mutex<CappedOutput>>;

fn lock(buf: &SharedOutput) -> MutexGuard<'_, CappedOutput> {
    buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn read_capped<R>(reader: Option<R>, cap: usize, buf: SharedOutput)
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return;
    };

    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => lock(&buf).push(&chunk[..n], cap),
        }
    }
}

/// Wait for a reader to hit EOF, then take whatever it captured.
/// A reader still blocked after `grace` is aborted; its partial output is kept.
async fn collect_output(
    mut task: JoinHandle<()>,
    buf: &SharedOutput,
    cap: usize,
    grace: Duration,
) -> String {
    match tokio::time::timeout(grace, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Output reader task failed: {}", e),
        Err(_) => {
            // Something outside the process group still holds the pipe open.
            task.abort();
        }
    }

    let mut output = std::mem::take(&mut *lock(buf));
    output.trim(cap);
    output.render()
}
