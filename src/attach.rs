//! [`AttachedCommand`]: reconnecting to a process this crate did not itself spawn.
//!
//! The teacher never reconstructs a `Process` from a bare pid — every `Process` it builds
//! comes straight out of a `fork`/`CreateProcess` call it just made. Attaching to an
//! already-running pid is new code, authored in the same idiom as `process.rs`'s per-OS
//! `os_wait`/`os_terminate` split: poll-based waiting on Unix (there is no portable way to
//! block until an unrelated pid exits without owning it as a child), `OpenProcess` +
//! `WaitForSingleObject` on Windows (which *does* work for unrelated processes, since
//! Windows process handles are not tied to parentage the way Unix `wait()` is).
//!
//! Timeout and cancellation race the same way [`crate::CommandCore::wait`] races them, per
//! §4.8's "timeout runs from the moment of attach" — the clock starts at `try_attach`, not
//! at the first `wait()` call, exactly mirroring a freshly spawned command.

use std::time::Duration;

use tracing::{debug, warn};

use crate::command::{CancelHandle, State};
use crate::error::{Error, Result};
use crate::options::Options;
use crate::process::ExitStatus;
use crate::signal::Signaler;

/// A handle to a process this crate discovered by pid rather than spawned itself.
///
/// Unlike [`crate::PlatformProcess`], an `AttachedCommand` cannot assume it is the
/// process's parent, so waiting for it is necessarily a polling operation on Unix. Its
/// standard streams are always closed (the OS gives a non-parent no way to redirect them
/// post-hoc); only `wait`/`kill`/`try_signal` and pid access are meaningful.
pub struct AttachedCommand {
    pid: u32,
    timeout: Option<Duration>,
    kill_timeout: Duration,
    cancel: CancelHandle,
}

impl AttachedCommand {
    /// Attempts to attach to the process identified by `pid`, applying `opts`'s timeout and
    /// cancellation token (if any) starting now. Fails if no such process exists.
    pub async fn try_attach(pid: u32, opts: &Options) -> Result<AttachedCommand> {
        if !process_exists(pid)? {
            return Err(Error::Io(std::io::Error::from(
                std::io::ErrorKind::NotFound,
            )));
        }
        debug!(pid, "attached to external process");
        Ok(AttachedCommand {
            pid,
            timeout: opts.timeout,
            kill_timeout: opts.effective_kill_timeout(),
            cancel: opts.cancellation.clone().unwrap_or_default(),
        })
    }

    /// The process ID this handle refers to.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// A token the caller can use to request cancellation of this attached wait.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Polls for completion without blocking.
    pub async fn try_wait(&self) -> Result<Option<ExitStatus>> {
        if process_exists(self.pid)? {
            Ok(None)
        } else {
            Ok(Some(ExitStatus::undetermined()))
        }
    }

    /// Waits for the process to exit, racing the timeout/cancellation configured at
    /// [`try_attach`](Self::try_attach) the same way [`crate::CommandCore::wait`] does:
    /// whichever of natural exit, timeout, or cancellation fires first wins, escalating to
    /// a [`crate::Signaler`] kill on the latter two.
    pub async fn wait(&self) -> Result<(State, ExitStatus)> {
        let natural = self.poll_until_exit();
        tokio::pin!(natural);

        let timeout_fut = async {
            match self.timeout {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(timeout_fut);

        let cancel_fut = self.cancel.notify().notified();
        tokio::pin!(cancel_fut);

        tokio::select! {
            biased;

            _ = &mut cancel_fut => {
                warn!(pid = self.pid, "attached wait cancelled, escalating to kill");
                self.escalate_kill(&mut natural).await?;
                Err(Error::Cancelled)
            }
            _ = &mut timeout_fut => {
                warn!(pid = self.pid, "attached wait timed out, escalating to kill");
                self.escalate_kill(&mut natural).await?;
                Err(Error::TimedOut)
            }
            status = &mut natural => {
                Ok((State::Exited, status?))
            }
        }
    }

    async fn escalate_kill(
        &self,
        natural: &mut (impl std::future::Future<Output = Result<ExitStatus>> + Unpin),
    ) -> Result<ExitStatus> {
        let signaler = Signaler::new(self.pid);
        let _ = signaler.terminate().await;
        match tokio::time::timeout(self.kill_timeout, &mut *natural).await {
            Ok(status) => status,
            Err(_elapsed) => {
                let _ = signaler.kill().await;
                natural.await
            }
        }
    }

    async fn poll_until_exit(&self) -> Result<ExitStatus> {
        #[cfg(windows)]
        {
            self.wait_windows().await
        }
        #[cfg(unix)]
        {
            let mut delay = Duration::from_millis(5);
            loop {
                if let Some(status) = self.try_wait().await? {
                    return Ok(status);
                }
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_millis(200));
            }
        }
    }

    /// Sends a termination request via [`crate::Signaler`].
    pub async fn terminate(&self) -> Result<()> {
        Signaler::new(self.pid).terminate().await
    }

    /// Forcibly kills the process via [`crate::Signaler`].
    pub async fn kill(&self) -> Result<()> {
        Signaler::new(self.pid).kill().await
    }

    /// Attempts to deliver `signal` to the attached process.
    pub async fn try_signal(&self, signal: crate::signal::Signal) -> bool {
        Signaler::new(self.pid).try_signal(signal).await
    }

    #[cfg(windows)]
    async fn wait_windows(&self) -> Result<ExitStatus> {
        use crate::win32;
        let pid = self.pid;
        tokio::task::spawn_blocking(move || {
            let handle = win32::open_process_for_wait(pid)?;
            win32::wait_for_exit(&handle)
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }
}

#[cfg(unix)]
fn process_exists(pid: u32) -> Result<bool> {
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if rc == 0 {
        Ok(true)
    } else {
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ESRCH) => Ok(false),
            Some(libc::EPERM) => Ok(true), // exists, just not ours to signal
            _ => Err(Error::Io(err)),
        }
    }
}

#[cfg(windows)]
fn process_exists(pid: u32) -> Result<bool> {
    crate::win32::process_exists(pid).map_err(Error::Io)
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn attach_wait_and_kill_a_process_this_crate_did_not_spawn() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();

        let attached = AttachedCommand::try_attach(pid, &Options::new()).await.unwrap();
        assert_eq!(attached.pid(), pid);
        assert!(attached.try_wait().await.unwrap().is_none());

        attached.kill().await.unwrap();
        let status = child.wait().await.unwrap();
        assert!(!status.success());

        let (state, reported) = attached.wait().await.unwrap();
        assert_eq!(state, State::Exited);
        assert!(!reported.success());
    }

    #[tokio::test]
    async fn try_attach_to_a_nonexistent_pid_fails() {
        let err = AttachedCommand::try_attach(u32::MAX - 1, &Options::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn timeout_escalates_to_kill_and_reports_timed_out() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();

        let opts = Options::new().timeout(Duration::from_millis(50));
        let attached = AttachedCommand::try_attach(pid, &opts).await.unwrap();
        let err = attached.wait().await.unwrap_err();
        assert!(matches!(err, Error::TimedOut));

        let status = child.wait().await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn cancellation_requested_before_wait_is_still_observed() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();

        let cancel = CancelHandle::new();
        cancel.cancel();
        let opts = Options {
            cancellation: Some(cancel),
            ..Options::new()
        };
        let attached = AttachedCommand::try_attach(pid, &opts).await.unwrap();
        let err = attached.wait().await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        let status = child.wait().await.unwrap();
        assert!(!status.success());
    }
}
