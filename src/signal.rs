//! Portable, best-effort delivery of Ctrl-C/Ctrl-Break (Windows) or raw signals (Unix) to a
//! process — whether or not this crate spawned it itself.
//!
//! Grounded on the teacher's `posix.rs::kill` for the Unix path. The Windows two-case
//! console-control algorithm in the specification has no teacher precedent at all — the
//! teacher never implements Ctrl-C delivery, only process creation and pipes — so it is
//! newly authored directly against `winapi`, reusing the `Handle` RAII wrapper already
//! established in `win32.rs`.

use std::io;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A signal this crate knows how to deliver portably.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Ctrl-C on Windows; `SIGINT` on Unix.
    ControlC,
    /// Ctrl-Break on Windows; `SIGQUIT` on Unix (Unix has no Ctrl-Break equivalent, so the
    /// nearest conventional terminal signal is used).
    ControlBreak,
    /// A raw Unix signal number. Always reports `false` on Windows.
    Unix(i32),
}

#[cfg(unix)]
impl Signal {
    fn to_unix_signum(self) -> i32 {
        match self {
            Signal::ControlC => libc::SIGINT,
            Signal::ControlBreak => libc::SIGQUIT,
            Signal::Unix(n) => n,
        }
    }
}

/// Sends a raw Unix signal to `pid`. Used directly by [`crate::process::PlatformProcess`]
/// for graceful termination (`SIGTERM`) before this module's richer [`Signaler`] is needed.
#[cfg(unix)]
pub(crate) fn kill_raw(pid: u32, sig: i32) -> io::Result<()> {
    let rc = unsafe { libc::kill(pid as libc::pid_t, sig) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Best-effort, portable signal delivery to a single pid, matching `trySignalAsync`.
///
/// Construction is cheap (just a pid); every method is `&self` so a `Signaler` can be
/// shared freely.
pub struct Signaler {
    pid: u32,
}

impl Signaler {
    /// Targets the process identified by `pid`.
    pub fn new(pid: u32) -> Self {
        Signaler { pid }
    }

    /// Sends a graceful termination request: `SIGTERM` on Unix. Windows has no
    /// forceful/graceful distinction below `TerminateProcess`, so this is equivalent to
    /// [`Signaler::kill`] there.
    pub async fn terminate(&self) -> Result<()> {
        #[cfg(unix)]
        {
            kill_raw(self.pid, libc::SIGTERM).map_err(Error::Io)
        }
        #[cfg(windows)]
        {
            self.kill().await
        }
    }

    /// Forcibly kills the process (`SIGKILL` on Unix; `TerminateProcess` on Windows).
    pub async fn kill(&self) -> Result<()> {
        #[cfg(unix)]
        {
            kill_raw(self.pid, libc::SIGKILL).map_err(Error::Io)
        }
        #[cfg(windows)]
        {
            let handle = crate::win32::open_process_for_terminate(self.pid).map_err(Error::Io)?;
            crate::win32::TerminateProcess(&handle, 0xFFFF_FFFFu32).map_err(Error::Io)
        }
    }

    /// Attempts to deliver `signal`. Never fails the caller: every failure mode in §4.7/§7
    /// (missing permission, no such process, handler install failure, timeout waiting for
    /// the handler to observe the event) collapses to `false`.
    pub async fn try_signal(&self, signal: Signal) -> bool {
        #[cfg(unix)]
        {
            kill_raw(self.pid, signal.to_unix_signum()).is_ok()
        }
        #[cfg(windows)]
        {
            self.try_signal_windows(signal).await
        }
    }
}

#[cfg(windows)]
mod windows_delivery {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;
    use winapi::shared::minwindef::{FALSE, TRUE};
    use winapi::um::wincon::{CTRL_BREAK_EVENT, CTRL_C_EVENT};

    /// Serializes every console-control delivery process-wide: installing a temporary
    /// handler and mutating global console state must never race with another caller doing
    /// the same thing concurrently.
    static SIGNAL_PERMIT: AsyncMutex<()> = AsyncMutex::const_new(());

    static HANDLER_TARGET_PID: AtomicU32 = AtomicU32::new(0);
    static HANDLER_OBSERVED: AtomicBool = AtomicBool::new(false);

    /// Installed only while a same-console signal is in flight (under [`SIGNAL_PERMIT`]).
    /// Swallows the event for our own process unless the target pid *is* our own process,
    /// in which case it lets the default action (process termination) proceed.
    unsafe extern "system" fn console_ctrl_handler(_ctrl_type: u32) -> i32 {
        HANDLER_OBSERVED.store(true, Ordering::SeqCst);
        if HANDLER_TARGET_PID.load(Ordering::SeqCst) == std::process::id() {
            FALSE
        } else {
            TRUE
        }
    }

    impl Signaler {
        pub(super) async fn try_signal_windows(&self, signal: Signal) -> bool {
            let event = match signal {
                Signal::ControlC => CTRL_C_EVENT,
                Signal::ControlBreak => CTRL_BREAK_EVENT,
                Signal::Unix(_) => return false,
            };

            let _permit = SIGNAL_PERMIT.lock().await;

            if self.shares_our_console() {
                self.signal_same_console(event).await
            } else {
                self.signal_cross_console(event).await
            }
        }

        fn shares_our_console(&self) -> bool {
            use winapi::um::wincon::GetConsoleProcessList;
            let mut buf = [0u32; 64];
            let count = unsafe { GetConsoleProcessList(buf.as_mut_ptr(), buf.len() as u32) };
            if count == 0 {
                // No console, or the call failed outright: fall back to the cross-console
                // path, which is safe (if slower) even when we did share a console.
                return false;
            }
            let n = (count as usize).min(buf.len());
            buf[..n].contains(&self.pid)
        }

        async fn signal_same_console(&self, event: u32) -> bool {
            HANDLER_TARGET_PID.store(self.pid, Ordering::SeqCst);
            HANDLER_OBSERVED.store(false, Ordering::SeqCst);

            let installed =
                unsafe { winapi::um::wincon::SetConsoleCtrlHandler(Some(console_ctrl_handler), TRUE) };
            if installed == 0 {
                warn!(pid = self.pid, "failed to install console-control handler");
                return false;
            }

            let sent = crate::win32::generate_console_ctrl_event(event, 0).is_ok();
            if sent {
                let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
                while !HANDLER_OBSERVED.load(Ordering::SeqCst) && tokio::time::Instant::now() < deadline
                {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }

            unsafe { winapi::um::wincon::SetConsoleCtrlHandler(Some(console_ctrl_handler), FALSE) };
            let observed = HANDLER_OBSERVED.load(Ordering::SeqCst);
            debug!(pid = self.pid, sent, observed, "same-console signal delivery");
            sent && observed
        }

        async fn signal_cross_console(&self, event: u32) -> bool {
            let event_name = match event {
                x if x == CTRL_C_EVENT => "ctrl-c",
                x if x == CTRL_BREAK_EVENT => "ctrl-break",
                _ => return false,
            };
            let helper = match locate_helper() {
                Some(path) => path,
                None => {
                    warn!("signal-helper executable not found, cannot signal across consoles");
                    return false;
                }
            };
            match tokio::process::Command::new(helper)
                .arg(self.pid.to_string())
                .arg(event_name)
                .status()
                .await
            {
                Ok(status) => status.success(),
                Err(e) => {
                    warn!(error = %e, "failed to run signal-helper");
                    false
                }
            }
        }
    }

    /// Finds the companion `signal-helper` binary: an explicit override via
    /// `CMDKIT_SIGNAL_HELPER`, or the same directory as the running executable — the
    /// side-by-side fallback the design notes call for when embedding a resource isn't
    /// available.
    fn locate_helper() -> Option<std::path::PathBuf> {
        if let Ok(path) = std::env::var("CMDKIT_SIGNAL_HELPER") {
            return Some(std::path::PathBuf::from(path));
        }
        let exe = std::env::current_exe().ok()?;
        let dir = exe.parent()?;
        let candidate = dir.join("signal-helper.exe");
        candidate.is_file().then_some(candidate)
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn terminate_and_kill_a_real_child() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();
        let signaler = Signaler::new(pid);
        assert!(signaler.kill().await.is_ok());
        let status = child.wait().await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn try_signal_on_a_dead_pid_reports_failure_not_panic() {
        // An implausibly large pid should not exist; kill(2) returns ESRCH.
        let signaler = Signaler::new(u32::MAX - 1);
        let ok = signaler.try_signal(Signal::ControlC).await;
        assert!(!ok);
    }
}
