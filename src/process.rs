//! [`PlatformProcess`]: the thin async wrapper around a spawned child that the rest of the
//! crate builds on.
//!
//! Grounded on the teacher's unwired `Process`/`InnerProcess` redesign (same shared,
//! cheaply-cloneable handle shape, same per-OS `ExitStatus` semantics), reimplemented on
//! top of `tokio::process::Child` instead of raw `fork`/`waitpid`/`CreateProcess` calls.

use std::fmt;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::process::{Child, Command as TokioCommand};
use tokio::sync::Mutex;

use crate::options::Options;

/// Cross-platform exit status.
///
/// Wraps [`std::process::ExitStatus`] and additionally distinguishes a status that was
/// synthesized because this crate forced the child to die (timeout/cancel/explicit
/// `.kill()`) from one the child reported on its own. On Unix a forced kill is reported as
/// exit code 137 (`128 + SIGKILL`); on Windows it is reported as exit code `-1`, matching
/// what `TerminateProcess` produces when no other code was already set.
#[derive(Debug, Clone, Copy)]
pub struct ExitStatus {
    inner: Option<std::process::ExitStatus>,
    forced: bool,
}

impl ExitStatus {
    pub(crate) fn from_native(inner: std::process::ExitStatus) -> Self {
        ExitStatus {
            inner: Some(inner),
            forced: false,
        }
    }

    pub(crate) fn forced_kill() -> Self {
        ExitStatus {
            inner: None,
            forced: true,
        }
    }

    /// An exit status for a process known to have finished whose real status could not be
    /// retrieved (e.g. an attached, non-child pid reaped by its actual parent first).
    pub(crate) fn undetermined() -> Self {
        ExitStatus {
            inner: None,
            forced: false,
        }
    }

    /// Builds an `ExitStatus` from a raw Windows exit code, as returned by
    /// `GetExitCodeProcess` for a pid this crate did not spawn itself (see
    /// [`crate::attach::AttachedCommand`]). Preserves the caller's signed interpretation: a
    /// child that called `ExitProcess((UINT)-1)` is reported as exit code `-1`, not
    /// `0xFFFFFFFF`.
    #[cfg(windows)]
    pub(crate) fn from_raw_code(code: u32) -> Self {
        use std::os::windows::process::ExitStatusExt;
        ExitStatus {
            inner: Some(std::process::ExitStatus::from_raw(code)),
            forced: false,
        }
    }

    /// True if the process exited with status 0 and was not forcibly killed.
    pub fn success(&self) -> bool {
        !self.forced && self.inner.is_some_and(|s| s.success())
    }

    /// True if this crate forced the process to terminate (timeout, cancellation, or an
    /// explicit kill), rather than the process exiting on its own.
    pub fn was_forced(&self) -> bool {
        self.forced
    }

    /// The process's exit code, synthesizing 137 (Unix) / -1 (Windows) for a forced kill.
    pub fn code(&self) -> Option<i32> {
        if self.forced {
            return Some(Self::forced_kill_code());
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(s) = self.inner {
                if let Some(code) = s.code() {
                    return Some(code);
                }
                if let Some(sig) = s.signal() {
                    return Some(128 + sig);
                }
            }
            None
        }
        #[cfg(not(unix))]
        {
            self.inner.and_then(|s| s.code())
        }
    }

    /// The signal that killed the process, if any (always `None` on Windows).
    pub fn signal(&self) -> Option<i32> {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if self.forced {
                return Some(libc::SIGKILL);
            }
            self.inner.and_then(|s| s.signal())
        }
        #[cfg(not(unix))]
        {
            None
        }
    }

    #[cfg(unix)]
    fn forced_kill_code() -> i32 {
        128 + libc::SIGKILL
    }

    #[cfg(not(unix))]
    fn forced_kill_code() -> i32 {
        -1
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.forced {
            return write!(f, "killed (forced)");
        }
        match self.inner {
            Some(s) => write!(f, "{}", s),
            None => write!(f, "undetermined exit status"),
        }
    }
}

/// A handle to a running or finished child process.
///
/// Unlike `tokio::process::Child`, every method here takes `&self`, so a `PlatformProcess`
/// can be shared (it is cheaply `Clone`, backed by an `Arc`) between the [`crate::pump`]
/// tasks, the timeout racer, and the [`crate::Signaler`] without handing out `&mut`
/// access to any one of them exclusively.
#[derive(Clone)]
pub struct PlatformProcess(Arc<Inner>);

struct Inner {
    pid: u32,
    child: Mutex<Option<Child>>,
    exit_status: Mutex<Option<ExitStatus>>,
    detached: AtomicBool,
}

impl PlatformProcess {
    /// Spawns `program` with the given `args` under `opts`, wiring `stdin`/`stdout`/`stderr`
    /// to the given [`Stdio`] values (the caller, typically [`crate::IoCommand`], decides
    /// those from the command's [`crate::Redirection`] set).
    pub fn spawn(
        program: &str,
        args: &[String],
        opts: &Options,
        stdin: Stdio,
        stdout: Stdio,
        stderr: Stdio,
    ) -> io::Result<PlatformProcess> {
        let mut cmd = TokioCommand::new(program);
        cmd.args(args).stdin(stdin).stdout(stdout).stderr(stderr);
        if let Some(cwd) = &opts.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &opts.env {
            cmd.env(k, v);
        }
        #[cfg(unix)]
        if opts.detached {
            unsafe {
                cmd.pre_exec(|| {
                    if libc::setsid() == -1 {
                        return Err(io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }
        #[cfg(windows)]
        if opts.detached {
            use std::os::windows::process::CommandExt;
            const DETACHED_PROCESS: u32 = 0x00000008;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
            cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
        }
        // Kill on drop would race with our own detach bookkeeping; we manage the
        // lifetime explicitly instead.
        cmd.kill_on_drop(false);

        let child = cmd.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| io::Error::other("spawned child has no pid (already reaped?)"))?;
        let proc = PlatformProcess(Arc::new(Inner {
            pid,
            child: Mutex::new(Some(child)),
            exit_status: Mutex::new(None),
            detached: AtomicBool::new(opts.detached),
        }));
        Ok(proc)
    }

    /// Returns the process ID.
    pub fn pid(&self) -> u32 {
        self.0.pid
    }

    /// Takes ownership of the child's stdin/stdout/stderr handles, leaving `None` in their
    /// place. Must be called (at most once) right after [`spawn`](Self::spawn), before any
    /// wait/kill call, so [`crate::pump::StreamPump`] tasks can take the pipe ends.
    pub async fn take_stdio(
        &self,
    ) -> (
        Option<tokio::process::ChildStdin>,
        Option<tokio::process::ChildStdout>,
        Option<tokio::process::ChildStderr>,
    ) {
        let mut guard = self.0.child.lock().await;
        match guard.as_mut() {
            Some(child) => (child.stdin.take(), child.stdout.take(), child.stderr.take()),
            None => (None, None, None),
        }
    }

    /// Returns the exit status, if the process is already known to have finished. Does not
    /// block or poll; use [`wait`](Self::wait) to actually drive completion.
    pub async fn exit_status(&self) -> Option<ExitStatus> {
        *self.0.exit_status.lock().await
    }

    /// Waits for the process to finish and returns its exit status.
    pub async fn wait(&self) -> io::Result<ExitStatus> {
        if let Some(status) = *self.0.exit_status.lock().await {
            return Ok(status);
        }
        let mut guard = self.0.child.lock().await;
        let child = guard
            .as_mut()
            .ok_or_else(|| io::Error::other("process handle already consumed"))?;
        let native = child.wait().await?;
        let status = ExitStatus::from_native(native);
        *self.0.exit_status.lock().await = Some(status);
        Ok(status)
    }

    /// Polls for completion without blocking.
    pub async fn try_wait(&self) -> io::Result<Option<ExitStatus>> {
        if let Some(status) = *self.0.exit_status.lock().await {
            return Ok(Some(status));
        }
        let mut guard = self.0.child.lock().await;
        let child = guard
            .as_mut()
            .ok_or_else(|| io::Error::other("process handle already consumed"))?;
        match child.try_wait()? {
            Some(native) => {
                let status = ExitStatus::from_native(native);
                *self.0.exit_status.lock().await = Some(status);
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }

    /// Sends a graceful termination request (`SIGTERM` on Unix, `TerminateProcess` on
    /// Windows — Windows has no graceful-vs-forceful distinction at the process-kill
    /// level, only at the console-event level handled by [`crate::Signaler`]).
    pub async fn terminate(&self) -> io::Result<()> {
        if self.exit_status().await.is_some() {
            return Ok(());
        }
        #[cfg(unix)]
        {
            crate::signal::kill_raw(self.0.pid, libc::SIGTERM)
        }
        #[cfg(windows)]
        {
            self.kill().await
        }
    }

    /// Forcibly kills the process (`SIGKILL` on Unix, `TerminateProcess` on Windows) and
    /// records the resulting status as [`ExitStatus::forced_kill`].
    ///
    /// Delivers the kill by pid rather than through the `Child` handle's own
    /// `start_kill`, deliberately: [`wait`](Self::wait) holds the handle's lock for the
    /// full duration of its blocking wait, so a `start_kill` routed through the same lock
    /// would queue up behind any in-flight `wait()` call and could never fire while one was
    /// outstanding — exactly backwards for a method whose job is to interrupt that wait.
    pub async fn kill(&self) -> io::Result<()> {
        if self.exit_status().await.is_some() {
            return Ok(());
        }
        #[cfg(unix)]
        {
            crate::signal::kill_raw(self.0.pid, libc::SIGKILL)?;
        }
        #[cfg(windows)]
        {
            let handle = crate::win32::open_process_for_terminate(self.0.pid)?;
            // -1 as the exit code, matching what TerminateProcess conventionally reports
            // and what `ExitStatus::forced_kill_code` synthesizes for a forced kill.
            crate::win32::TerminateProcess(&handle, 0xFFFF_FFFFu32)?;
        }
        let _ = self.wait().await;
        // `wait()` just recorded whatever native status the OS reported for the reaped
        // child (never a success for a real kill, but never carrying `forced: true`
        // either). Overwrite it unconditionally so `was_forced()` reflects that *this
        // crate* ended the process, regardless of what the native status looked like.
        *self.0.exit_status.lock().await = Some(ExitStatus::forced_kill());
        Ok(())
    }

    /// Marks the process as detached: dropping the last `PlatformProcess` handle will not
    /// wait for it to finish.
    pub fn detach(&self) {
        self.0.detached.store(true, Ordering::Relaxed);
    }
}

impl fmt::Debug for PlatformProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformProcess")
            .field("pid", &self.0.pid)
            .field("detached", &self.0.detached.load(Ordering::Relaxed))
            .finish()
    }
}

/// Resolves `program` to an absolute path the way a shell would (via `PATH`), used by
/// diagnostics that want to log the fully-resolved executable rather than the bare name.
pub(crate) fn resolve_on_path(program: &str) -> Option<std::path::PathBuf> {
    if Path::new(program).is_absolute() {
        return Some(Path::new(program).to_owned());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
