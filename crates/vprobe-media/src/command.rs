//! External tool command builder and runner.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};

/// Builder for an external tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    /// Program name or path
    program: String,
    /// Arguments in order
    args: Vec<String>,
}

impl ToolCommand {
    /// Create a new command for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a path argument.
    pub fn path_arg(self, path: impl AsRef<Path>) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        self.args.clone()
    }
}

/// Which output the caller wants back as [`ToolOutput::text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCapture {
    /// Standard output only
    Stdout,
    /// Standard output and standard error interleaved in arrival order
    Combined,
}

/// Captured result of a finished tool run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Output selected by [`OutputCapture`]
    pub text: String,
    /// Standard error on its own, for failure reporting
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Output kept while a tool runs: the requested text plus stderr for error reporting.
struct CapturedStreams {
    capture: OutputCapture,
    text: Vec<u8>,
    stderr: Vec<u8>,
}

impl CapturedStreams {
    fn new(capture: OutputCapture) -> Self {
        Self {
            capture,
            text: Vec::new(),
            stderr: Vec::new(),
        }
    }

    fn push(&mut self, stream: Stream, chunk: &[u8]) {
        if stream == Stream::Stderr {
            self.stderr.extend_from_slice(chunk);
        }
        if stream == Stream::Stdout || self.capture == OutputCapture::Combined {
            self.text.extend_from_slice(chunk);
        }
    }
}

/// Runner for tool commands with output capture and cancellation.
pub struct ToolRunner {
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl Default for ToolRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self { cancel_rx: None }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Run a command to completion and capture its output.
    ///
    /// A non-zero exit is not an error here; callers inspect [`ToolOutput::success`]
    /// and map it to their own failure variant.
    pub async fn run(&self, cmd: &ToolCommand, capture: OutputCapture) -> MediaResult<ToolOutput> {
        if self.is_cancelled() {
            return Err(MediaError::Cancelled);
        }

        let args = cmd.build_args();
        debug!("Running {} {}", cmd.program(), args.join(" "));

        let mut child = Command::new(cmd.program())
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("stderr not captured"))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let stdout_task = tokio::spawn(pump(stdout, Stream::Stdout, tx.clone()));
        let stderr_task = tokio::spawn(pump(stderr, Stream::Stderr, tx));

        let status = self.wait_for_completion(&mut child).await;

        let streams = drain(rx, [stdout_task, stderr_task], capture).await;
        let status = status?;
        let streams = streams?;

        Ok(ToolOutput {
            text: String::from_utf8_lossy(&streams.text).into_owned(),
            stderr: String::from_utf8_lossy(&streams.stderr).into_owned(),
            exit_code: status.code(),
            success: status.success(),
        })
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Wait for child process, killing it if cancellation is signalled first.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<ExitStatus> {
        let Some(mut cancel_rx) = self.cancel_rx.clone() else {
            return Ok(child.wait().await?);
        };

        tokio::select! {
            status = child.wait() => return Ok(status?),
            _ = cancelled(&mut cancel_rx) => {}
        }

        info!("Tool run cancelled, killing process");
        let _ = child.kill().await;
        Err(MediaError::Cancelled)
    }
}

/// Collect everything the pumps forward, then surface any read failure.
///
/// A pump that stops on a read error leaves the output truncated, so its
/// error fails the whole run.
async fn drain(
    mut rx: mpsc::UnboundedReceiver<(Stream, Vec<u8>)>,
    pumps: [JoinHandle<std::io::Result<()>>; 2],
    capture: OutputCapture,
) -> MediaResult<CapturedStreams> {
    // Both pumps finish once the child's pipes close
    let mut streams = CapturedStreams::new(capture);
    while let Some((stream, chunk)) = rx.recv().await {
        streams.push(stream, &chunk);
    }
    for pump in pumps {
        pump.await
            .map_err(|e| MediaError::internal(format!("output reader task failed: {}", e)))??;
    }
    Ok(streams)
}

/// Forward a child pipe to the collector line by line.
async fn pump<R>(reader: R, stream: Stream, tx: mpsc::UnboundedSender<(Stream, Vec<u8>)>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    loop {
        let mut chunk = Vec::new();
        if reader.read_until(b'\n', &mut chunk).await? == 0 {
            return Ok(());
        }
        if tx.send((stream, chunk)).is_err() {
            return Ok(());
        }
    }
}

/// Resolve once the cancellation flag flips to `true`.
///
/// Never resolves if the sender is dropped without cancelling.
pub async fn cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    loop {
        if *cancel_rx.borrow_and_update() {
            return;
        }
        if cancel_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Locate a tool on `PATH` (or verify an explicit path).
pub fn locate_tool(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}
