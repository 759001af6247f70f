//! [`IoCommand`]: a single external command plus its standard-stream redirections, the
//! ergonomic entry point most callers reach for first.
//!
//! Grounded on the teacher's `builder.rs`/`exec.rs` `Exec` type — same
//! `.stdin()`/`.stdout()`/`.stderr()`/`.arg()`/`.args()` builder surface, same
//! `.capture()`/streaming convenience methods — rebuilt over [`crate::CommandCore`] and
//! [`crate::pump::StreamPump`] instead of synchronous `fork`/`exec`.

use std::process::Stdio;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, instrument};

use tokio::process::{ChildStderr, ChildStdin, ChildStdout};

use crate::command::{CancelHandle, CommandCore, CommandResult, State, StreamCapture};
use crate::error::{Error, Result, StdStream};
use crate::options::{Options, Shell};
use crate::process::PlatformProcess;
use crate::pump::{PumpMode, StreamPump};
use crate::redirection::{Endpoint, Redirection};

/// A single external command: program, arguments, and the three standard-stream
/// redirections, plus the lifecycle [`Options`] that govern it once started.
pub struct IoCommand {
    program: String,
    args: Vec<String>,
    opts: Options,
    stdin: Redirection,
    stdout: Redirection,
    stderr: Redirection,
    stream_stdin: bool,
    stream_stdout: bool,
    stream_stderr: bool,
}

impl IoCommand {
    /// Starts building a command that runs `program` directly (no shell involved).
    pub fn new(program: impl Into<String>) -> Self {
        IoCommand {
            program: program.into(),
            args: Vec::new(),
            opts: Options::default(),
            stdin: Redirection::Inherit,
            stdout: Redirection::Inherit,
            stderr: Redirection::Inherit,
            stream_stdin: false,
            stream_stdout: false,
            stream_stderr: false,
        }
    }

    /// Starts building a command that runs `command_line` through the platform shell
    /// (`sh -c` on Unix, `cmd /C` on Windows).
    pub fn shell(command_line: impl Into<String>) -> Self {
        let (shell, flag) = Shell::invocation();
        let mut cmd = IoCommand::new(shell);
        cmd.args = vec![flag.to_string(), command_line.into()];
        cmd
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replaces the lifecycle options wholesale (e.g. one loaded via [`crate::config::load`]).
    pub fn with_options(mut self, opts: Options) -> Self {
        self.opts = opts;
        self
    }

    /// Sets stdin's redirection.
    pub fn stdin(mut self, redirection: impl Into<Redirection>) -> Self {
        self.stdin = redirection.into();
        self
    }

    /// Sets stdout's redirection.
    pub fn stdout(mut self, redirection: impl Into<Redirection>) -> Self {
        self.stdout = redirection.into();
        self
    }

    /// Sets stderr's redirection.
    pub fn stderr(mut self, redirection: impl Into<Redirection>) -> Self {
        self.stderr = redirection.into();
        self
    }

    /// Merges stderr into stdout (`2>&1`).
    pub fn merge_stderr(mut self) -> Self {
        self.stderr = Redirection::Merge;
        self
    }

    /// Convenience for the common case of wanting both stdout and stderr captured into
    /// [`CommandResult`] rather than inherited from the parent.
    pub fn capture(mut self) -> Self {
        self.stdout = Redirection::Pipe;
        self.stderr = Redirection::Pipe;
        self
    }

    /// Opens a pipe for stdin but hands the raw write end to the caller instead of wiring it
    /// to a pump, via [`RunningCommand::take_stdin`]. For interactive, line-at-a-time writers
    /// rather than a single pre-built [`Endpoint`].
    pub fn stream_stdin(mut self) -> Self {
        self.stdin = Redirection::Pipe;
        self.stream_stdin = true;
        self
    }

    /// Opens a pipe for stdout but hands the raw read end to the caller instead of buffering
    /// it, via [`RunningCommand::take_stdout`]. The stream is not buffered internally, so the
    /// caller must keep reading it to avoid stalling the child on a full pipe.
    pub fn stream_stdout(mut self) -> Self {
        self.stdout = Redirection::Pipe;
        self.stream_stdout = true;
        self
    }

    /// Opens a pipe for stderr but hands the raw read end to the caller instead of buffering
    /// it, via [`RunningCommand::take_stderr`]. Not compatible with [`Self::merge_stderr`].
    pub fn stream_stderr(mut self) -> Self {
        self.stderr = Redirection::Pipe;
        self.stream_stderr = true;
        self
    }

    /// Breaks the command into `(program, args, stderr redirection)`, discarding its own
    /// stdin/stdout since [`crate::PipelineCommand`] controls those for every stage but
    /// the first/last. Used when an `IoCommand` becomes one stage of a pipeline.
    pub(crate) fn into_parts(self) -> (String, Vec<String>, Redirection) {
        (self.program, self.args, self.stderr)
    }

    fn stdio_for(redirection: &Redirection) -> Stdio {
        match redirection {
            Redirection::Inherit => Stdio::inherit(),
            Redirection::Pipe => Stdio::piped(),
            Redirection::Merge => Stdio::piped(),
            Redirection::Null => Stdio::null(),
            Redirection::To(Endpoint::FilePath(_)) => Stdio::piped(),
            Redirection::To(_) => Stdio::piped(),
        }
    }

    /// Spawns the process and starts whatever stream pumps its redirections call for, but
    /// does not wait for it to finish. Returns a live [`RunningCommand`].
    #[instrument(skip(self), fields(program = %self.program))]
    pub async fn start(self) -> Result<RunningCommand> {
        let stdin_stdio = Self::stdio_for(&self.stdin);
        let stdout_stdio = Self::stdio_for(&self.stdout);
        let stderr_stdio = if matches!(self.stderr, Redirection::Merge) {
            Stdio::piped()
        } else {
            Self::stdio_for(&self.stderr)
        };

        let merge_stderr = matches!(self.stderr, Redirection::Merge);
        let stdout_description = self.stdout.describe();
        let stderr_description = if merge_stderr {
            Redirection::Merge.describe()
        } else {
            self.stderr.describe()
        };

        let process = PlatformProcess::spawn(
            &self.program,
            &self.args,
            &self.opts,
            stdin_stdio,
            stdout_stdio,
            stderr_stdio,
        )
        .map_err(|e| {
            tracing::warn!(
                program = %self.program,
                resolved = ?crate::process::resolve_on_path(&self.program),
                "failed to spawn process"
            );
            Error::SpawnFailed(e)
        })?;
        debug!(pid = process.pid(), "process started");

        let (child_stdin, child_stdout, child_stderr) = process.take_stdio().await;

        let mut pumps = Vec::new();
        let stdout_buf = Arc::new(AsyncMutex::new(Vec::new()));
        let stderr_buf = Arc::new(AsyncMutex::new(Vec::new()));
        let mut live_stdin = None;
        let mut live_stdout = None;
        let mut live_stderr = None;

        if let Some(stdin_pipe) = child_stdin {
            if self.stream_stdin {
                live_stdin = Some(stdin_pipe);
            } else {
                match self.stdin {
                    Redirection::To(endpoint) => {
                        pumps.push(StreamPump::spawn_from_endpoint(endpoint, stdin_pipe));
                    }
                    _ => drop(stdin_pipe),
                }
            }
        }

        let stdout_captured = matches!(self.stdout, Redirection::Pipe) && !self.stream_stdout;
        if let Some(stdout_pipe) = child_stdout {
            if self.stream_stdout {
                live_stdout = Some(stdout_pipe);
            } else {
                pumps.push(
                    wire_output(
                        StdStream::Stdout,
                        stdout_pipe,
                        self.stdout,
                        Arc::clone(&stdout_buf),
                        self.opts.max_buffered_bytes,
                    )
                    .await?,
                );
            }
        }

        let stderr_captured =
            !merge_stderr && matches!(self.stderr, Redirection::Pipe) && !self.stream_stderr;
        if let Some(stderr_pipe) = child_stderr {
            if self.stream_stderr {
                live_stderr = Some(stderr_pipe);
            } else if merge_stderr {
                pumps.push(StreamPump::spawn_into_collection(
                    StdStream::Stderr,
                    stderr_pipe,
                    Arc::clone(&stdout_buf),
                    self.opts.max_buffered_bytes,
                ));
            } else {
                pumps.push(
                    wire_output(
                        StdStream::Stderr,
                        stderr_pipe,
                        self.stderr,
                        Arc::clone(&stderr_buf),
                        self.opts.max_buffered_bytes,
                    )
                    .await?,
                );
            }
        }

        let stdout_description = if self.stream_stdout {
            "a caller-held live stream".to_string()
        } else {
            stdout_description
        };
        let stderr_description = if self.stream_stderr {
            "a caller-held live stream".to_string()
        } else {
            stderr_description
        };

        let core = CommandCore::new(process, &self.opts);
        Ok(RunningCommand {
            core,
            pumps,
            stdout_buf,
            stdout_captured,
            stdout_description,
            stderr_buf,
            stderr_captured,
            stderr_description,
            live_stdin,
            live_stdout,
            live_stderr,
        })
    }

    /// Spawns the process, waits for it to finish, and returns the full
    /// [`CommandResult`] including any captured output.
    pub async fn join(self) -> Result<CommandResult> {
        self.start().await?.join().await
    }
}

/// Spawns the pump that drains `pipe` according to `redirection`, routing its bytes to
/// `internal_buf` only when `redirection` is [`Redirection::Pipe`] — every other shape hands
/// the bytes to an external sink, so the eventual [`CommandResult`] reports that stream as
/// [`StreamCapture::Redirected`] instead.
pub(crate) async fn wire_output<R>(
    which: StdStream,
    pipe: R,
    redirection: Redirection,
    internal_buf: Arc<AsyncMutex<Vec<u8>>>,
    max_buffered_bytes: Option<usize>,
) -> Result<StreamPump>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    Ok(match redirection {
        Redirection::Pipe => {
            StreamPump::spawn_into_collection(which, pipe, internal_buf, max_buffered_bytes)
        }
        Redirection::To(Endpoint::Writer(writer)) => {
            StreamPump::spawn(which, pipe, writer, PumpMode::PassThrough)
        }
        Redirection::To(Endpoint::Collection(collection)) => {
            StreamPump::spawn_into_collection(which, pipe, collection, max_buffered_bytes)
        }
        Redirection::To(Endpoint::FilePath(path)) => {
            let file = tokio::fs::File::create(&path)
                .await
                .map_err(Error::PumpSinkFailed)?;
            StreamPump::spawn(which, pipe, Box::pin(file), PumpMode::PassThrough)
        }
        Redirection::To(other) => {
            debug!(?which, endpoint = ?other, "source-only endpoint used as an output sink, discarding");
            StreamPump::spawn_discard(which, pipe)
        }
        Redirection::Inherit | Redirection::Null | Redirection::Merge => {
            StreamPump::spawn_discard(which, pipe)
        }
    })
}

/// A spawned [`IoCommand`] that is running (or has just finished) along with its output
/// pumps.
pub struct RunningCommand {
    core: CommandCore,
    pumps: Vec<StreamPump>,
    stdout_buf: Arc<AsyncMutex<Vec<u8>>>,
    stdout_captured: bool,
    stdout_description: String,
    stderr_buf: Arc<AsyncMutex<Vec<u8>>>,
    stderr_captured: bool,
    stderr_description: String,
    live_stdin: Option<ChildStdin>,
    live_stdout: Option<ChildStdout>,
    live_stderr: Option<ChildStderr>,
}

impl RunningCommand {
    /// The underlying process handle.
    pub fn process(&self) -> &PlatformProcess {
        self.core.process()
    }

    /// A handle the caller can use to cancel this command.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.core.cancel_handle()
    }

    /// Takes the live stdin handle, if [`IoCommand::stream_stdin`] was requested. Can only be
    /// taken once; a second call fails with [`Error::StreamRedirected`].
    pub fn take_stdin(&mut self) -> Result<ChildStdin> {
        self.live_stdin
            .take()
            .ok_or_else(|| Error::StreamRedirected {
                stream: StdStream::Stdin,
                destination: "not requested as a live stream, or already taken".into(),
            })
    }

    /// Takes the live stdout handle, if [`IoCommand::stream_stdout`] was requested. Can only
    /// be taken once; a second call fails with [`Error::StreamRedirected`].
    pub fn take_stdout(&mut self) -> Result<ChildStdout> {
        self.live_stdout
            .take()
            .ok_or_else(|| Error::StreamRedirected {
                stream: StdStream::Stdout,
                destination: "not requested as a live stream, or already taken".into(),
            })
    }

    /// Takes the live stderr handle, if [`IoCommand::stream_stderr`] was requested. Can only
    /// be taken once; a second call fails with [`Error::StreamRedirected`].
    pub fn take_stderr(&mut self) -> Result<ChildStderr> {
        self.live_stderr
            .take()
            .ok_or_else(|| Error::StreamRedirected {
                stream: StdStream::Stderr,
                destination: "not requested as a live stream, or already taken".into(),
            })
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> State {
        self.core.state().await
    }

    /// Forcibly kills the underlying process. Idempotent.
    pub async fn kill(&self) -> Result<()> {
        self.core.kill().await
    }

    /// Waits for the process and all of its pumps to finish, returning the full result.
    /// On timeout or cancellation, aborts the pumps (their partial output up to that point
    /// is still returned) rather than waiting for pipes that may never close.
    pub async fn join(self) -> Result<CommandResult> {
        let wait_result = self.core.wait().await;

        let (state, exit_status) = match wait_result {
            Ok((state, status)) => (state, Some(status)),
            Err(e @ (Error::TimedOut | Error::Cancelled)) => {
                for pump in &self.pumps {
                    pump.abort();
                }
                let status = self.core.process().exit_status().await;
                let state = if matches!(e, Error::TimedOut) {
                    State::TimedOut
                } else {
                    State::Cancelled
                };
                (state, status)
            }
            Err(e) => return Err(e),
        };

        for pump in self.pumps {
            let _ = pump.join().await;
        }

        let stdout = if self.stdout_captured {
            StreamCapture::Captured(self.stdout_buf.lock().await.clone())
        } else {
            StreamCapture::Redirected(self.stdout_description)
        };
        let stderr = if self.stderr_captured {
            StreamCapture::Captured(self.stderr_buf.lock().await.clone())
        } else {
            StreamCapture::Redirected(self.stderr_description)
        };

        Ok(CommandResult {
            state,
            exit_status,
            stdout,
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IoCommand {
        IoCommand::new(env!("CARGO_BIN_EXE_sample"))
    }

    #[tokio::test]
    async fn capture_collects_stdout_and_stderr_separately() {
        let result = sample()
            .arg("echo-both")
            .arg("out-line")
            .arg("err-line")
            .capture()
            .join()
            .await
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout_str().unwrap().trim(), "out-line");
        assert_eq!(result.stderr_str().unwrap().trim(), "err-line");
    }

    #[tokio::test]
    async fn uncaptured_stdout_reports_redirected() {
        let result = sample()
            .arg("echo-both")
            .arg("out-line")
            .arg("err-line")
            .join()
            .await
            .unwrap();
        assert!(result.stdout_str().is_err());
    }

    #[tokio::test]
    async fn merge_stderr_folds_into_stdout_buffer() {
        let result = sample()
            .arg("echo-both")
            .arg("out-line")
            .arg("err-line")
            .merge_stderr()
            .stdout(Redirection::Pipe)
            .join()
            .await
            .unwrap();
        let combined = result.stdout_str().unwrap();
        assert!(combined.contains("out-line"));
        assert!(combined.contains("err-line"));
    }

    #[tokio::test]
    async fn redirect_stdout_to_file_writes_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let result = sample()
            .arg("echo-both")
            .arg("to-file")
            .arg("ignored")
            .stdout(Endpoint::FilePath(path.clone()))
            .join()
            .await
            .unwrap();
        assert!(result.success());
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.contains("to-file"));
    }

    #[tokio::test]
    async fn kill_stops_a_long_running_process() {
        let running = sample().arg("sleep").arg("5000").start().await.unwrap();
        running.kill().await.unwrap();
        let result = running.join().await.unwrap();
        assert!(!result.success());
    }

    #[tokio::test]
    async fn stream_stdin_and_stdout_allow_interactive_line_exchange() {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        let mut running = sample()
            .arg("pipe")
            .stream_stdin()
            .stream_stdout()
            .start()
            .await
            .unwrap();

        let mut stdin = running.take_stdin().unwrap();
        let stdout = running.take_stdout().unwrap();
        let mut lines = BufReader::new(stdout).lines();

        stdin.write_all(b"first\n").await.unwrap();
        stdin.flush().await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("first"));

        stdin.write_all(b"second\n").await.unwrap();
        stdin.flush().await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("second"));

        drop(stdin);
        assert_eq!(lines.next_line().await.unwrap(), None);

        let result = running.join().await.unwrap();
        assert!(result.success());
        assert!(matches!(result.stdout, StreamCapture::Redirected(_)));
    }

    #[tokio::test]
    async fn take_stdout_fails_when_not_requested_as_a_live_stream() {
        let mut running = sample()
            .arg("echo-both")
            .arg("a")
            .arg("b")
            .capture()
            .start()
            .await
            .unwrap();
        assert!(running.take_stdout().is_err());
        running.kill().await.unwrap();
        let _ = running.join().await;
    }
}
