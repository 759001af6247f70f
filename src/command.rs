//! [`CommandCore`]: the state machine driving a single spawned process from creation
//! through to an exactly-once-reported terminal result.
//!
//! Grounded on the teacher's unwired `Job` (lifecycle orchestration owning a `Process` plus
//! its pipes in deadlock-safe drop order) and `ProcessState` (`process.rs`), reworked into
//! an explicit state machine per the specification's component design, with timeout/
//! cancellation racing layered on top using `tokio::select!`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, warn};

use crate::error::{Error, Result, StdStream};
use crate::options::Options;
use crate::process::{ExitStatus, PlatformProcess};

/// Lifecycle state of a [`CommandCore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Constructed but not yet spawned.
    Created,
    /// Spawned and not yet known to have finished.
    Running,
    /// Exited on its own.
    Exited,
    /// Killed by this crate (timeout, cancellation, or an explicit `.kill()`).
    Killed,
    /// Timed out and was escalated to a kill.
    TimedOut,
    /// Cancelled via the caller's cancellation token and was escalated to a kill.
    Cancelled,
    /// The platform refused to start the process.
    FailedToStart,
}

/// What became of one standard stream's bytes once the command finished.
///
/// A stream is [`Captured`](StreamCapture::Captured) when nothing but this crate's own
/// buffering pump ever touched it; it is [`Redirected`](StreamCapture::Redirected) once a
/// caller pointed it at an external sink (a file, an inherited console, a caller-supplied
/// writer, `/dev/null`, or the other stream via a stderr merge) — at that point the bytes
/// went wherever the caller asked, and the "captured text" view is gone for good.
#[derive(Debug, Clone)]
pub enum StreamCapture {
    /// Bytes buffered by this crate, available for read-back.
    Captured(Vec<u8>),
    /// Bytes were sent to `destination` instead; reading the captured view fails.
    Redirected(String),
}

impl StreamCapture {
    /// Borrows the captured bytes, or fails with [`Error::StreamRedirected`] naming `which`.
    pub fn bytes(&self, which: StdStream) -> Result<&[u8]> {
        match self {
            StreamCapture::Captured(b) => Ok(b),
            StreamCapture::Redirected(destination) => Err(Error::StreamRedirected {
                stream: which,
                destination: destination.clone(),
            }),
        }
    }

    /// Decodes the captured bytes as UTF-8 (lossily), or fails the same way as
    /// [`bytes`](Self::bytes).
    pub fn text(&self, which: StdStream) -> Result<String> {
        self.bytes(which)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

/// The terminal outcome of a [`CommandCore`] run.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Final lifecycle state.
    pub state: State,
    /// Exit status, if the process ever actually ran.
    pub exit_status: Option<ExitStatus>,
    /// What happened to stdout.
    pub stdout: StreamCapture,
    /// What happened to stderr.
    pub stderr: StreamCapture,
}

impl CommandResult {
    /// True if the process ran to completion with exit code 0 and was not forcibly killed.
    pub fn success(&self) -> bool {
        matches!(self.state, State::Exited) && self.exit_status.is_some_and(|s| s.success())
    }

    /// Captured stdout bytes, or [`Error::StreamRedirected`] if stdout was sent elsewhere.
    pub fn stdout_bytes(&self) -> Result<&[u8]> {
        self.stdout.bytes(StdStream::Stdout)
    }

    /// Captured stderr bytes, or [`Error::StreamRedirected`] if stderr was sent elsewhere.
    pub fn stderr_bytes(&self) -> Result<&[u8]> {
        self.stderr.bytes(StdStream::Stderr)
    }

    /// Stdout captured as UTF-8 (lossily), or [`Error::StreamRedirected`].
    pub fn stdout_str(&self) -> Result<String> {
        self.stdout.text(StdStream::Stdout)
    }

    /// Stderr captured as UTF-8 (lossily), or [`Error::StreamRedirected`].
    pub fn stderr_str(&self) -> Result<String> {
        self.stderr.text(StdStream::Stderr)
    }
}

/// Drives one process from spawn to terminal result.
///
/// `CommandCore` guarantees the result future completes *exactly once* regardless of which
/// of natural exit, timeout, or cancellation wins the race — the losers are folded away
/// per the precedence order documented on [`Error::precedence`].
pub struct CommandCore {
    state: Arc<Mutex<State>>,
    process: PlatformProcess,
    kill_timeout: Duration,
    timeout: Option<Duration>,
    throw_on_error: bool,
    cancel: CancelHandle,
}

impl CommandCore {
    /// Builds a core driving `process` under `opts`. If `opts.cancellation` already carries
    /// a [`CancelHandle`] (the caller built one before spawning, per the specification's
    /// "already-cancelled token at spawn time" case), it is adopted as-is — including
    /// whatever cancellation request was already recorded on it — rather than replaced with
    /// a fresh one. `tokio::sync::Notify` buffers a `notify_one()` call that arrives before
    /// anyone is `notified().await`-ing, so a token cancelled before this call still fires
    /// correctly the first time [`CommandCore::wait`] is awaited.
    pub(crate) fn new(process: PlatformProcess, opts: &Options) -> Self {
        CommandCore {
            state: Arc::new(Mutex::new(State::Running)),
            process,
            kill_timeout: opts.effective_kill_timeout(),
            timeout: opts.timeout,
            throw_on_error: opts.throw_on_error,
            cancel: opts.cancellation.clone().unwrap_or_default(),
        }
    }

    /// A token the caller can use to request cancellation; fires the same teardown path as
    /// a timeout, but reports [`State::Cancelled`] / [`Error::Cancelled`] instead.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Forcibly kills the underlying process. Idempotent: a no-op on an already-exited
    /// process. Does not itself drive `wait()`'s state transition (the caller's in-flight
    /// `wait()` call, if any, observes the death and reports [`State::Killed`] once it next
    /// polls); this just requests the termination.
    pub async fn kill(&self) -> Result<()> {
        self.process.kill().await.map_err(Error::Io)
    }

    /// The process handle this core is driving.
    pub fn process(&self) -> &PlatformProcess {
        &self.process
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> State {
        *self.state.lock().await
    }

    /// Drives the process to completion, racing natural exit against the configured
    /// timeout and the cancellation token, escalating to a kill with `kill_timeout` grace
    /// once either fires. Returns the resulting state and exit status (capture of
    /// stdout/stderr is layered on by [`crate::IoCommand`], which owns the pumps).
    pub async fn wait(&self) -> Result<(State, ExitStatus)> {
        let natural = self.process.wait();
        tokio::pin!(natural);

        let timeout_fut = async {
            match self.timeout {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(timeout_fut);

        let cancel_fut = self.cancel.notify.notified();
        tokio::pin!(cancel_fut);

        // Evaluated top-to-bottom rather than picking a ready branch at random, so that when
        // a cancellation and a natural exit become ready in the same poll, the precedence
        // order documented on `Error::precedence` is honored deterministically instead of
        // depending on `select!`'s default fairness.
        tokio::select! {
            biased;

            _ = &mut cancel_fut => {
                warn!(pid = self.process.pid(), "command cancelled, escalating to kill");
                self.escalate_kill(&mut natural).await?;
                self.set_state(State::Cancelled).await;
                Err(Error::Cancelled)
            }
            _ = &mut timeout_fut => {
                warn!(pid = self.process.pid(), "command timed out, escalating to kill");
                self.escalate_kill(&mut natural).await?;
                self.set_state(State::TimedOut).await;
                Err(Error::TimedOut)
            }
            res = &mut natural => {
                let status = res.map_err(Error::Io)?;
                let state = if status.was_forced() { State::Killed } else { State::Exited };
                self.set_state(state).await;
                if self.throw_on_error && !status.success() && !status.was_forced() {
                    if let Some(code) = status.code() {
                        return Err(Error::ErrorExitCode { code });
                    }
                }
                Ok((state, status))
            }
        }
    }

    async fn escalate_kill(
        &self,
        natural: &mut (impl std::future::Future<Output = std::io::Result<ExitStatus>> + Unpin),
    ) -> Result<ExitStatus> {
        self.process.terminate().await.map_err(Error::Io)?;
        match tokio::time::timeout(self.kill_timeout, &mut *natural).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_elapsed) => {
                error!(pid = self.process.pid(), "grace period elapsed, forcing kill");
                self.process.kill().await.map_err(Error::Io)?;
                self.process.wait().await.map_err(Error::Io)
            }
        }
    }

    async fn set_state(&self, new: State) {
        let mut state = self.state.lock().await;
        debug!(pid = self.process.pid(), ?new, "command state transition");
        *state = new;
    }
}

/// A cloneable cancellation token, constructible before a command is even built so it can be
/// handed to [`Options::cancellation`] and still observe a cancel requested prior to spawn.
#[derive(Clone)]
pub struct CancelHandle {
    notify: Arc<Notify>,
    flag: Arc<std::sync::atomic::AtomicBool>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        CancelHandle {
            notify: Arc::new(Notify::new()),
            flag: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }
}

impl CancelHandle {
    /// Creates a fresh, not-yet-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent; calling it more than once, or after the command
    /// has already finished, has no effect. Safe to call before the command behind this
    /// token has even been spawned.
    pub fn cancel(&self) {
        self.flag.store(true, std::sync::atomic::Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// True if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// The underlying notifier, for other modules (e.g. [`crate::attach`]) that need to
    /// race their own `wait()` against this same cancellation token.
    pub(crate) fn notify(&self) -> &Notify {
        &self.notify
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::PlatformProcess;
    use std::process::Stdio;
    use std::time::Duration;

    fn spawn_sleep(opts: &Options, millis: u64) -> PlatformProcess {
        PlatformProcess::spawn(
            env!("CARGO_BIN_EXE_sample"),
            &["sleep".to_string(), millis.to_string()],
            opts,
            Stdio::null(),
            Stdio::null(),
            Stdio::null(),
        )
        .expect("spawn sample sleep")
    }

    #[tokio::test]
    async fn natural_exit_reports_exited() {
        let opts = Options::new();
        let process = spawn_sleep(&opts, 10);
        let core = CommandCore::new(process, &opts);
        let (state, status) = core.wait().await.unwrap();
        assert_eq!(state, State::Exited);
        assert!(status.success());
    }

    #[tokio::test]
    async fn timeout_escalates_to_kill_and_reports_timed_out() {
        let opts = Options::new().timeout(Duration::from_millis(20));
        let process = spawn_sleep(&opts, 5_000);
        let core = CommandCore::new(process, &opts);
        let err = core.wait().await.unwrap_err();
        assert!(matches!(err, Error::TimedOut));
        assert_eq!(core.state().await, State::TimedOut);
    }

    #[tokio::test]
    async fn cancellation_requested_before_spawn_is_still_observed() {
        let cancel = CancelHandle::new();
        cancel.cancel();
        let opts = Options {
            cancellation: Some(cancel),
            ..Options::new()
        };
        let process = spawn_sleep(&opts, 5_000);
        let core = CommandCore::new(process, &opts);
        let err = core.wait().await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(core.state().await, State::Cancelled);
    }

    #[tokio::test]
    async fn explicit_kill_reports_killed_not_exited() {
        let opts = Options::new();
        let process = spawn_sleep(&opts, 5_000);
        let core = CommandCore::new(process, &opts);
        core.kill().await.unwrap();
        let (state, status) = core.wait().await.unwrap();
        assert_eq!(state, State::Killed);
        assert!(status.was_forced());
        assert!(!status.success());
    }

    #[tokio::test]
    async fn throw_on_error_reports_non_zero_exit_as_error() {
        let opts = Options::new().throw_on_error(true);
        let process = PlatformProcess::spawn(
            env!("CARGO_BIN_EXE_sample"),
            &["exit".to_string(), "7".to_string()],
            &opts,
            Stdio::null(),
            Stdio::null(),
            Stdio::null(),
        )
        .unwrap();
        let core = CommandCore::new(process, &opts);
        let err = core.wait().await.unwrap_err();
        assert!(matches!(err, Error::ErrorExitCode { code: 7 }));
    }

    #[test]
    fn error_precedence_prefers_cancelled_over_timed_out() {
        let a = Error::TimedOut;
        let b = Error::Cancelled;
        assert!(matches!(a.prefer(b), Error::Cancelled));
    }

    #[test]
    fn stream_capture_redirected_fails_with_destination() {
        let cap = StreamCapture::Redirected("a file".into());
        let err = cap.bytes(StdStream::Stdout).unwrap_err();
        match err {
            Error::StreamRedirected { stream, destination } => {
                assert_eq!(stream, StdStream::Stdout);
                assert_eq!(destination, "a file");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn stream_capture_captured_decodes_as_utf8() {
        let cap = StreamCapture::Captured(b"hello".to_vec());
        assert_eq!(cap.text(StdStream::Stdout).unwrap(), "hello");
    }
}
