//! External tool invocation with wall-clock budgets.
//!
//! Every compiler, converter, simulator build and simulator run goes through
//! the [`ToolRunner`] seam. It provides:
//! 1. **Invocation Model:** Program, arguments, working directory, timeout and output disposition.
//! 2. **Supervision:** Spawn, drain pipes, poll for exit, kill on timeout.
//! 3. **Capture:** Standard error is always retained verbatim for failure records.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::constants::{DRAIN_GRACE, POLL_INTERVAL};
use super::error::ToolError;

/// Where the output streams of an invocation go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputSink {
    /// Capture stdout and stderr into memory.
    Capture,
    /// Write stdout and stderr, interleaved, to the given file.
    LogFile(PathBuf),
}

/// One external program invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    /// Program to run (bare name resolved via `PATH`, or a path).
    pub program: PathBuf,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Working directory; inherits the harness's when `None`.
    pub cwd: Option<PathBuf>,
    /// Wall-clock budget.
    pub timeout: Duration,
    /// Output disposition.
    pub sink: OutputSink,
}

impl Invocation {
    /// Creates an invocation with captured output.
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout,
            sink: OutputSink::Capture,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends a path argument.
    #[must_use]
    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Sends stdout and stderr to a log file instead of capturing them.
    #[must_use]
    pub fn log_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.sink = OutputSink::LogFile(path.into());
        self
    }

    /// Returns the program name for messages.
    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Returns the value following the first occurrence of `flag`, if any.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for a in &self.args {
            write!(f, " {a}")?;
        }
        Ok(())
    }
}

/// Outcome of a program that ran to completion within its budget.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; `None` when terminated by a signal.
    pub code: Option<i32>,
    /// Captured stdout (empty when logged to a file).
    pub stdout: Vec<u8>,
    /// Captured stderr, lossily decoded (empty when logged to a file).
    pub stderr: String,
}

impl ToolOutput {
    /// Returns `true` for a zero exit code.
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Returns stdout decoded as UTF-8 (lossy).
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Seam for running external programs.
///
/// Implementations must honor [`Invocation::timeout`] and report an exceeded
/// budget as [`ToolError::TimedOut`].
pub trait ToolRunner: Send + Sync {
    /// Runs the invocation to completion.
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError>;
}

impl fmt::Debug for dyn ToolRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn ToolRunner")
    }
}

/// [`ToolRunner`] backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    fn spawn(invocation: &Invocation) -> Result<Child, ToolError> {
        let program = invocation.program_name();
        let mut cmd = Command::new(&invocation.program);
        let _ = cmd.args(&invocation.args).stdin(Stdio::null());
        if let Some(dir) = &invocation.cwd {
            let _ = cmd.current_dir(dir);
        }
        match &invocation.sink {
            OutputSink::Capture => {
                let _ = cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
            OutputSink::LogFile(path) => {
                let log = File::create(path).map_err(|source| ToolError::Io {
                    program: program.clone(),
                    source,
                })?;
                let err = log.try_clone().map_err(|source| ToolError::Io {
                    program: program.clone(),
                    source,
                })?;
                let _ = cmd.stdout(log).stderr(err);
            }
        }
        cmd.spawn()
            .map_err(|source| ToolError::Spawn { program, source })
    }
}

type Shared = Arc<Mutex<Vec<u8>>>;

/// Copies a child stream into a shared buffer on a helper thread.
///
/// The buffer is readable while the thread is still running, so a killed
/// child whose pipe is held open by a grandchild cannot block the caller.
fn drain<R: Read + Send + 'static>(stream: Option<R>) -> (Shared, Option<JoinHandle<()>>) {
    let buf: Shared = Arc::new(Mutex::new(Vec::new()));
    let handle = stream.map(|mut s| {
        let sink = Arc::clone(&buf);
        thread::spawn(move || {
            let mut chunk = [0u8; 4096];
            while let Ok(n) = s.read(&mut chunk) {
                if n == 0 {
                    break;
                }
                if let Ok(mut b) = sink.lock() {
                    b.extend_from_slice(&chunk[..n]);
                }
            }
        })
    });
    (buf, handle)
}

/// Waits up to [`DRAIN_GRACE`] for the stream threads to see end of file.
///
/// A background grandchild can keep the pipes open after the child exits;
/// its threads are detached and the output captured so far is used.
fn join_drains(program: &str, handles: [Option<JoinHandle<()>>; 2]) {
    let deadline = Instant::now() + DRAIN_GRACE;
    let mut pending: Vec<JoinHandle<()>> = handles.into_iter().flatten().collect();
    while !pending.is_empty() && Instant::now() < deadline {
        let (done, rest): (Vec<_>, Vec<_>) = pending.into_iter().partition(JoinHandle::is_finished);
        for t in done {
            if t.join().is_err() {
                tracing::warn!(program, "output reader panicked");
            }
        }
        pending = rest;
        if !pending.is_empty() {
            thread::sleep(POLL_INTERVAL);
        }
    }
    if !pending.is_empty() {
        tracing::warn!(
            program,
            open = pending.len(),
            "output pipes still open after exit; keeping partial output"
        );
    }
}

fn snapshot(buf: &Shared) -> Vec<u8> {
    buf.lock().map(|b| b.clone()).unwrap_or_default()
}

impl ToolRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
        let program = invocation.program_name();
        tracing::debug!(command = %invocation, "spawning");

        let mut child = Self::spawn(invocation)?;
        let (stdout, out_thread) = drain(child.stdout.take());
        let (stderr, err_thread) = drain(child.stderr.take());
        let start = Instant::now();

        loop {
            let polled = child.try_wait().map_err(|source| ToolError::Io {
                program: program.clone(),
                source,
            })?;
            if let Some(status) = polled {
                join_drains(&program, [out_thread, err_thread]);
                return Ok(ToolOutput {
                    code: status.code(),
                    stdout: snapshot(&stdout),
                    stderr: String::from_utf8_lossy(&snapshot(&stderr)).into_owned(),
                });
            }
            if start.elapsed() >= invocation.timeout {
                let _ = child.kill();
                let _ = child.wait();
                let captured = String::from_utf8_lossy(&snapshot(&stderr)).into_owned();
                tracing::warn!(program = %program, timeout = ?invocation.timeout, "killed after timeout");
                return Err(ToolError::TimedOut {
                    program,
                    after: invocation.timeout,
                    stderr: captured,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}
