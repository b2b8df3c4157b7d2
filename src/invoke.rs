//! Subprocess execution.
//!
//! Runs one external program to completion with three kinds of stdout
//! routing ([`StdoutMode`]) and an optional stdin stream. Stdin is fed and
//! stderr is drained on scoped threads while stdout is handled on the caller's
//! thread, so a tool that fills one pipe while we block on another cannot
//! deadlock the run.
//!
//! There is no timeout: a hung tool hangs the caller.

use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
    /// Non-zero exit. The message carries the captured stderr.
    #[error("{program}: {status}. {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

impl InvokeError {
    /// Captured stderr of a failed run.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            InvokeError::Failed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// Where the child's stdout goes.
pub enum StdoutMode<'a> {
    /// `/dev/null`.
    Discard,
    /// Buffered into [`InvocationResult::stdout`].
    Capture,
    /// Streamed into a caller-provided writer as it is produced.
    Sink(&'a mut dyn Write),
}

impl std::fmt::Debug for StdoutMode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StdoutMode::Discard => f.write_str("Discard"),
            StdoutMode::Capture => f.write_str("Capture"),
            StdoutMode::Sink(_) => f.write_str("Sink"),
        }
    }
}

/// One run of one program. Built fresh per run and consumed by [`run`].
pub struct Invocation<'a> {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub stdin: Option<&'a mut (dyn Read + Send)>,
    pub stdout: StdoutMode<'a>,
    pub working_dir: Option<PathBuf>,
}

impl<'a> Invocation<'a> {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            stdout: StdoutMode::Discard,
            working_dir: None,
        }
    }
}

#[derive(Debug)]
pub struct InvocationResult {
    pub status: ExitStatus,
    /// Empty unless stdout was [`StdoutMode::Capture`]d.
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl InvocationResult {
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Run `invocation` to completion.
///
/// A non-zero exit is reported as [`InvokeError::Failed`] with stderr
/// attached.
pub fn run(invocation: Invocation<'_>) -> Result<InvocationResult, InvokeError> {
    let Invocation {
        program,
        args,
        stdin,
        stdout,
        working_dir,
    } = invocation;
    let name = program.display().to_string();
    let io_err = |source: io::Error| InvokeError::Io {
        program: name.clone(),
        source,
    };

    debug!(program = %name, ?args, stdin = stdin.is_some(), ?stdout, "running");

    let mut cmd = Command::new(&program);
    cmd.args(&args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(match stdout {
            StdoutMode::Discard => Stdio::null(),
            StdoutMode::Capture | StdoutMode::Sink(_) => Stdio::piped(),
        })
        .stderr(Stdio::piped());
    if let Some(dir) = &working_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|source| InvokeError::Spawn {
        program: name.clone(),
        source,
    })?;

    let stdin_pipe = child.stdin.take();
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let (fed, captured, stderr) = std::thread::scope(|s| {
        let feeder = match (stdin, stdin_pipe) {
            (Some(reader), Some(mut pipe)) => Some(s.spawn(move || {
                let copied = io::copy(reader, &mut pipe);
                // Closing stdin signals end of input
                drop(pipe);
                copied
            })),
            _ => None,
        };
        let drainer = stderr_pipe.map(|mut pipe| {
            s.spawn(move || {
                let mut buf = Vec::new();
                pipe.read_to_end(&mut buf).map(|_| buf)
            })
        });

        let mut captured = Vec::new();
        let out = match (stdout, stdout_pipe) {
            (StdoutMode::Capture, Some(mut pipe)) => pipe.read_to_end(&mut captured).map(|_| ()),
            (StdoutMode::Sink(sink), Some(mut pipe)) => {
                io::copy(&mut pipe, sink).and_then(|_| sink.flush())
            }
            _ => Ok(()),
        };

        let fed = feeder
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked")))
            })
            .transpose();
        let stderr = drainer
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(io::Error::other("stderr reader panicked")))
            })
            .transpose();

        (fed, out.map(|_| captured), stderr)
    });

    let status = child.wait().map_err(io_err)?;
    let stderr = stderr.map_err(io_err)?.unwrap_or_default();

    let result = InvocationResult {
        status,
        stdout: Vec::new(),
        stderr,
    };

    if !status.success() {
        return Err(InvokeError::Failed {
            program: name,
            status,
            stderr: result.stderr_text(),
        });
    }

    // A tool may exit before reading all of stdin; that only matters when it
    // also failed, which was reported above.
    match fed {
        Err(e) if e.kind() != io::ErrorKind::BrokenPipe => return Err(io_err(e)),
        _ => {}
    }
    let stdout = captured.map_err(io_err)?;

    debug!(program = %name, status = %status, stdout_bytes = stdout.len(), "finished");
    Ok(InvocationResult { stdout, ..result })
}
