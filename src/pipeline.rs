//! [`PipelineCommand`]: two or more commands chained stdout-to-stdin, shell-pipeline style.
//!
//! Grounded on the teacher's `builder.rs`/`pipeline.rs` `impl BitOr for Exec -> Pipeline`
//! and the `Job` field-drop-order discipline (`job.rs`): pipe ends are dropped before the
//! process handles that own their far end, so a child gets EOF on its stdin before
//! anything waits on it to exit — the ordering that makes pipeline teardown deadlock-free.
//! Intermediate stdout-to-stdin links are wired directly, process to process, without
//! routing bytes through a [`crate::pump::StreamPump`]; only the pipeline's own external
//! stdin/stdout/stderr touch a pump.

use std::ops::BitOr;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::command::{CancelHandle, CommandCore, CommandResult, State, StreamCapture};
use crate::error::{Error, Result, StdStream};
use crate::io_command::IoCommand;
use crate::options::Options;
use crate::process::PlatformProcess;
use crate::pump::StreamPump;
use crate::redirection::Redirection;

/// A single command within a [`PipelineCommand`], carrying only what the pipeline doesn't
/// already control (program, args, and this command's own stderr redirection — stdin/
/// stdout are wired by the pipeline itself for every command but the first/last).
struct Stage {
    program: String,
    args: Vec<String>,
    stderr: Redirection,
}

/// A chain of commands whose stdout/stdin are connected pairwise, like a shell pipeline.
#[must_use]
pub struct PipelineCommand {
    stages: Vec<Stage>,
    stdin: Redirection,
    stdout: Redirection,
    opts: Options,
    stream_stdin: bool,
    stream_stdout: bool,
}

impl PipelineCommand {
    /// Starts a pipeline from a single command (use `|` or [`pipe`](Self::pipe) to add
    /// more).
    pub fn new(first: IoCommandSpec) -> Self {
        PipelineCommand {
            stages: vec![first.into_stage()],
            stdin: Redirection::Inherit,
            stdout: Redirection::Inherit,
            opts: Options::default(),
            stream_stdin: false,
            stream_stdout: false,
        }
    }

    /// Appends another command to the pipeline.
    pub fn pipe(mut self, cmd: IoCommandSpec) -> Self {
        self.stages.push(cmd.into_stage());
        self
    }

    /// Sets how the first command's stdin is fed.
    pub fn stdin(mut self, redirection: impl Into<Redirection>) -> Self {
        self.stdin = redirection.into();
        self
    }

    /// Sets how the last command's stdout is captured.
    pub fn stdout(mut self, redirection: impl Into<Redirection>) -> Self {
        self.stdout = redirection.into();
        self
    }

    /// Replaces the lifecycle options applied to the whole pipeline (a single timeout/
    /// cancellation covers every stage).
    pub fn with_options(mut self, opts: Options) -> Self {
        self.opts = opts;
        self
    }

    /// Opens a pipe for the first stage's stdin but hands the raw write end to the caller
    /// via [`RunningPipeline::take_stdin`] instead of wiring it to a pump or `Endpoint`.
    pub fn stream_stdin(mut self) -> Self {
        self.stdin = Redirection::Pipe;
        self.stream_stdin = true;
        self
    }

    /// Opens a pipe for the last stage's stdout but hands the raw read end to the caller
    /// via [`RunningPipeline::take_stdout`] instead of buffering it.
    pub fn stream_stdout(mut self) -> Self {
        self.stdout = Redirection::Pipe;
        self.stream_stdout = true;
        self
    }

    /// Spawns every stage, wiring each command's stdout directly into the next command's
    /// stdin, and returns a handle for the running pipeline.
    pub async fn start(self) -> Result<RunningPipeline> {
        if self.stages.is_empty() {
            return Err(Error::Io(std::io::Error::other(
                "pipeline has no commands",
            )));
        }

        let last_idx = self.stages.len() - 1;
        let mut processes = Vec::with_capacity(self.stages.len());
        let mut pumps = Vec::new();
        let stdout_buf = Arc::new(AsyncMutex::new(Vec::new()));
        let stdout_captured = matches!(self.stdout, Redirection::Pipe) && !self.stream_stdout;
        let stdout_description = if self.stream_stdout {
            "a caller-held live stream".to_string()
        } else {
            self.stdout.describe()
        };
        let mut stage_stderr_bufs: Vec<Arc<AsyncMutex<Vec<u8>>>> =
            Vec::with_capacity(self.stages.len());
        let mut stage_stderr_captured: Vec<bool> = Vec::with_capacity(self.stages.len());
        let mut stage_stderr_descriptions: Vec<String> = Vec::with_capacity(self.stages.len());
        let mut live_stdin: Option<ChildStdin> = None;
        let mut live_stdout: Option<ChildStdout> = None;

        let mut next_stdin: Option<Stdio> = match &self.stdin {
            Redirection::To(_) => Some(Stdio::piped()),
            Redirection::Null => Some(Stdio::null()),
            Redirection::Inherit => Some(Stdio::inherit()),
            Redirection::Pipe | Redirection::Merge => Some(Stdio::piped()),
        };
        let mut pending_stdin_endpoint = match self.stdin {
            Redirection::To(endpoint) => Some(endpoint),
            _ => None,
        };

        for (idx, stage) in self.stages.into_iter().enumerate() {
            let is_last = idx == last_idx;
            let stdin_stdio = next_stdin.take().unwrap_or(Stdio::inherit());
            let stdout_stdio = if is_last {
                match &self.stdout {
                    Redirection::Inherit => Stdio::inherit(),
                    Redirection::Null => Stdio::null(),
                    _ => Stdio::piped(),
                }
            } else {
                Stdio::piped()
            };
            let stderr_stdio = match stage.stderr {
                Redirection::Inherit => Stdio::inherit(),
                Redirection::Null => Stdio::null(),
                _ => Stdio::piped(),
            };

            let process = PlatformProcess::spawn(
                &stage.program,
                &stage.args,
                &self.opts,
                stdin_stdio,
                stdout_stdio,
                stderr_stdio,
            )
            .map_err(Error::SpawnFailed)?;
            debug!(pid = process.pid(), stage = idx, "pipeline stage started");

            let (child_stdin, child_stdout, child_stderr) = process.take_stdio().await;

            if idx == 0 {
                if self.stream_stdin {
                    live_stdin = child_stdin;
                } else if let (Some(pipe), Some(endpoint)) =
                    (child_stdin, pending_stdin_endpoint.take())
                {
                    pumps.push(StreamPump::spawn_from_endpoint(endpoint, pipe));
                } else if let Some(pipe) = child_stdin {
                    drop(pipe);
                }
            } else {
                drop(child_stdin);
            }

            let stage_stderr_buf = Arc::new(AsyncMutex::new(Vec::new()));
            let stage_stderr_captured_flag = matches!(stage.stderr, Redirection::Pipe);
            let stage_stderr_description = stage.stderr.describe();
            if let Some(pipe) = child_stderr {
                match stage.stderr {
                    Redirection::Inherit | Redirection::Null => {}
                    _ => pumps.push(crate::io_command::wire_output(
                        StdStream::Stderr,
                        pipe,
                        stage.stderr,
                        Arc::clone(&stage_stderr_buf),
                        self.opts.max_buffered_bytes,
                    )
                    .await?),
                }
            }
            stage_stderr_bufs.push(stage_stderr_buf);
            stage_stderr_captured.push(stage_stderr_captured_flag);
            stage_stderr_descriptions.push(stage_stderr_description);

            if is_last {
                if let Some(pipe) = child_stdout {
                    if self.stream_stdout {
                        live_stdout = Some(pipe);
                    } else {
                        match &self.stdout {
                            Redirection::Inherit | Redirection::Null => {}
                            _ => pumps.push(StreamPump::spawn_into_collection(
                                StdStream::Stdout,
                                pipe,
                                Arc::clone(&stdout_buf),
                                self.opts.max_buffered_bytes,
                            )),
                        }
                    }
                }
            } else if let Some(pipe) = child_stdout {
                next_stdin = Some(
                    Stdio::try_from(pipe)
                        .map_err(|e| Error::Io(std::io::Error::other(e)))?,
                );
            }

            processes.push(process);
        }

        let tail = processes.last().cloned().expect("non-empty pipeline");
        let core = CommandCore::new(tail, &self.opts);
        Ok(RunningPipeline {
            core,
            upstream: processes,
            pumps,
            stdout_buf,
            stdout_captured,
            stdout_description,
            stage_stderr_bufs,
            stage_stderr_captured,
            stage_stderr_descriptions,
            live_stdin,
            live_stdout,
        })
    }

    /// Spawns the pipeline and waits for every stage to finish, reporting the last
    /// command's exit status as the pipeline's own (matching shell `$?` semantics).
    pub async fn join(self) -> Result<PipelineResult> {
        self.start().await?.join().await
    }
}

/// Anything that can seed one stage of a [`PipelineCommand`]: an [`IoCommand`], or a bare
/// program name via `.into()`.
pub struct IoCommandSpec(IoCommand);

impl IoCommandSpec {
    fn into_stage(self) -> Stage {
        let (program, args, stderr) = self.0.into_parts();
        Stage {
            program,
            args,
            stderr,
        }
    }
}

impl From<IoCommand> for IoCommandSpec {
    fn from(cmd: IoCommand) -> Self {
        IoCommandSpec(cmd)
    }
}

impl BitOr<IoCommand> for IoCommand {
    type Output = PipelineCommand;

    fn bitor(self, rhs: IoCommand) -> PipelineCommand {
        PipelineCommand::new(self.into()).pipe(rhs.into())
    }
}

impl BitOr<IoCommand> for PipelineCommand {
    type Output = PipelineCommand;

    fn bitor(self, rhs: IoCommand) -> PipelineCommand {
        self.pipe(rhs.into())
    }
}

/// A spawned [`PipelineCommand`].
///
/// Field order matters: `pumps` and the intermediate pipe ends embedded in `upstream` are
/// dropped before `core` (which owns the tail process), so every upstream child sees EOF
/// on its stdin before anything waits on the downstream processes to exit.
pub struct RunningPipeline {
    pumps: Vec<StreamPump>,
    upstream: Vec<PlatformProcess>,
    core: CommandCore,
    stdout_buf: Arc<AsyncMutex<Vec<u8>>>,
    stdout_captured: bool,
    stdout_description: String,
    stage_stderr_bufs: Vec<Arc<AsyncMutex<Vec<u8>>>>,
    stage_stderr_captured: Vec<bool>,
    stage_stderr_descriptions: Vec<String>,
    live_stdin: Option<ChildStdin>,
    live_stdout: Option<ChildStdout>,
}

/// A finished [`PipelineCommand`] run: the tail stage's result (matching shell `$?`
/// semantics) plus every stage's own stderr, kept separate rather than merged together
/// across stages.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// The last stage's state, exit status, and captured stdout/stderr.
    pub tail: CommandResult,
    /// Each stage's own stderr, in pipeline order (including the tail stage's, duplicated
    /// from `tail.stderr` for convenience).
    pub stage_stderr: Vec<StreamCapture>,
}

impl RunningPipeline {
    /// A handle the caller can use to cancel the whole pipeline.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.core.cancel_handle()
    }

    /// Takes the first stage's live stdin handle, if [`PipelineCommand::stream_stdin`] was
    /// requested. Can only be taken once.
    pub fn take_stdin(&mut self) -> Result<ChildStdin> {
        self.live_stdin
            .take()
            .ok_or_else(|| Error::StreamRedirected {
                stream: StdStream::Stdin,
                destination: "not requested as a live stream, or already taken".into(),
            })
    }

    /// Takes the last stage's live stdout handle, if [`PipelineCommand::stream_stdout`] was
    /// requested. Can only be taken once.
    pub fn take_stdout(&mut self) -> Result<ChildStdout> {
        self.live_stdout
            .take()
            .ok_or_else(|| Error::StreamRedirected {
                stream: StdStream::Stdout,
                destination: "not requested as a live stream, or already taken".into(),
            })
    }

    /// Kills every stage, leaf-to-root (tail first, then upstream in reverse), and waits
    /// for each stage's process to actually finish before returning.
    pub async fn kill(&self) -> Result<()> {
        self.core.kill().await?;
        for process in self.upstream.iter().rev() {
            process.kill().await.map_err(Error::Io)?;
        }
        Ok(())
    }

    /// Waits for every stage to finish and returns the tail command's result, with the
    /// pipeline's captured stdout attached, along with every stage's own stderr.
    ///
    /// The tail's timeout/cancellation race (driven by `self.core`) is awaited first,
    /// rather than blocking on the upstream stages up front: an upstream stage that never
    /// closes its own stdout on its own (e.g. it isn't reading/writing anything the
    /// downstream stage's exit would break) must not be able to stall a pipeline timeout
    /// that only the tail stage is wired to race.
    pub async fn join(self) -> Result<PipelineResult> {
        let non_tail = &self.upstream[..self.upstream.len().saturating_sub(1)];

        let wait_result = self.core.wait().await;
        let (state, exit_status) = match wait_result {
            Ok((state, status)) => (state, Some(status)),
            Err(e @ (Error::TimedOut | Error::Cancelled)) => {
                for pump in &self.pumps {
                    pump.abort();
                }
                // The tail was killed; upstream stages won't necessarily notice (they may
                // not be reading/writing anything broken by the tail's exit), so kill them
                // too rather than leaving them to run unbounded.
                for process in non_tail {
                    let _ = process.kill().await;
                }
                let state = if matches!(e, Error::TimedOut) {
                    State::TimedOut
                } else {
                    State::Cancelled
                };
                (state, self.core.process().exit_status().await)
            }
            Err(e) => return Err(e),
        };

        for process in non_tail {
            let _ = process.wait().await;
        }

        for pump in self.pumps {
            let _ = pump.join().await;
        }

        let stdout = if self.stdout_captured {
            StreamCapture::Captured(self.stdout_buf.lock().await.clone())
        } else {
            StreamCapture::Redirected(self.stdout_description)
        };

        let mut stage_stderr = Vec::with_capacity(self.stage_stderr_bufs.len());
        for ((buf, captured), description) in self
            .stage_stderr_bufs
            .iter()
            .zip(self.stage_stderr_captured.iter())
            .zip(self.stage_stderr_descriptions.into_iter())
        {
            stage_stderr.push(if *captured {
                StreamCapture::Captured(buf.lock().await.clone())
            } else {
                StreamCapture::Redirected(description)
            });
        }
        let stderr = stage_stderr.last().cloned().unwrap_or(StreamCapture::Redirected(
            "pipeline has no stages".into(),
        ));

        Ok(PipelineResult {
            tail: CommandResult {
                state,
                exit_status,
                stdout,
                stderr,
            },
            stage_stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redirection::Endpoint;

    fn sample() -> IoCommand {
        IoCommand::new(env!("CARGO_BIN_EXE_sample"))
    }

    #[tokio::test]
    async fn two_stage_pipeline_carries_bytes_through() {
        let pipeline = sample().arg("echo") | sample().arg("pipe");
        let result = pipeline
            .stdin(Endpoint::Bytes(b"line one\nline two\n".to_vec()))
            .stdout(Redirection::Pipe)
            .join()
            .await
            .unwrap();
        assert!(result.tail.success());
        assert_eq!(result.tail.stdout_str().unwrap(), "line one\nline two\n");
    }

    #[tokio::test]
    async fn stage_stderr_is_kept_separate_per_stage() {
        let pipeline = PipelineCommand::new(sample().arg("exit").arg("0").into())
            .pipe(sample().arg("exit").arg("3").into());
        let result = pipeline.join().await.unwrap();
        assert_eq!(result.stage_stderr.len(), 2);
        assert!(!result.tail.success());
    }

    #[tokio::test]
    async fn tail_exit_status_matches_shell_dollar_question_semantics() {
        let pipeline = sample().arg("exit").arg("5") | sample().arg("exit").arg("0");
        let result = pipeline.join().await.unwrap();
        assert!(result.tail.success());
    }

    #[tokio::test]
    async fn kill_tears_down_every_stage() {
        let pipeline = sample().arg("sleep").arg("5000") | sample().arg("sleep").arg("5000");
        let running = pipeline.start().await.unwrap();
        running.kill().await.unwrap();
        let result = running.join().await.unwrap();
        assert!(!result.tail.success());
    }

    #[tokio::test]
    async fn stream_stdin_and_stdout_expose_the_endpoint_stages_live() {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        let pipeline = (sample().arg("pipe") | sample().arg("pipe"))
            .stream_stdin()
            .stream_stdout();
        let mut running = pipeline.start().await.unwrap();

        let mut stdin = running.take_stdin().unwrap();
        let stdout = running.take_stdout().unwrap();
        let mut lines = BufReader::new(stdout).lines();

        stdin.write_all(b"through both stages\n").await.unwrap();
        stdin.flush().await.unwrap();
        assert_eq!(
            lines.next_line().await.unwrap().as_deref(),
            Some("through both stages")
        );

        drop(stdin);
        let result = running.join().await.unwrap();
        assert!(result.tail.success());
        assert!(matches!(result.tail.stdout, StreamCapture::Redirected(_)));
    }
}
