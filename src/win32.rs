#![allow(non_snake_case, non_camel_case_types)]
//! Windows-only helpers layered on `winapi`: the `Handle` RAII wrapper, blocking
//! wait/exit-code/terminate calls for a pid this crate did not necessarily spawn itself
//! ([`crate::attach::AttachedCommand`]), and the console-control-event primitives
//! [`crate::signal::Signaler`]'s same-console delivery path needs.
//!
//! `tokio::process::Child` covers spawning and async waiting for processes this crate
//! itself starts, so the raw `CreateProcessW`/overlapped-pipe machinery the teacher's
//! synchronous fork used is not needed here — only the pieces that operate on a pid found
//! after the fact, which `tokio::process` has no API for.

use std::io::{Error, Result};
use std::os::windows::io::{AsRawHandle, FromRawHandle, RawHandle};
use std::time::{Duration, Instant};

use winapi::shared::minwindef::{BOOL, FALSE};
use winapi::shared::winerror::{WAIT_TIMEOUT};
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::winbase::{INFINITE, WAIT_ABANDONED, WAIT_FAILED, WAIT_OBJECT_0};
use winapi::um::{processthreadsapi, synchapi};

pub use winapi::shared::winerror::ERROR_ACCESS_DENIED;
pub const STILL_ACTIVE: u32 = 259;

#[derive(Debug)]
pub struct Handle(RawHandle);

unsafe impl Send for Handle {}
unsafe impl Sync for Handle {}

impl Drop for Handle {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.as_raw_handle());
        }
    }
}

impl AsRawHandle for Handle {
    fn as_raw_handle(&self) -> RawHandle {
        self.0
    }
}

impl FromRawHandle for Handle {
    unsafe fn from_raw_handle(handle: RawHandle) -> Handle {
        Handle(handle)
    }
}

fn check(status: BOOL) -> Result<()> {
    if status != 0 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

fn check_handle(raw_handle: RawHandle) -> Result<RawHandle> {
    if raw_handle != INVALID_HANDLE_VALUE {
        Ok(raw_handle)
    } else {
        Err(Error::last_os_error())
    }
}

#[allow(clippy::upper_case_acronyms)]
pub enum WaitEvent {
    OBJECT_0,
    ABANDONED,
    TIMEOUT,
}

pub fn WaitForSingleObject(handle: &Handle, mut timeout: Option<Duration>) -> Result<WaitEvent> {
    let deadline = timeout.map(|timeout| Instant::now() + timeout);

    let result = loop {
        // Allow timeouts greater than 50 days by clamping the timeout and looping.
        let (timeout_ms, overflow) = timeout
            .map(|timeout| {
                let timeout = timeout.as_millis();
                if timeout < INFINITE as u128 {
                    (timeout as u32, false)
                } else {
                    (INFINITE - 1, true)
                }
            })
            .unwrap_or((INFINITE, false));

        let result = unsafe { synchapi::WaitForSingleObject(handle.as_raw_handle(), timeout_ms) };
        if result != WAIT_TIMEOUT || !overflow {
            break result;
        }
        let deadline = deadline.unwrap();
        let now = Instant::now();
        if now >= deadline {
            break WAIT_TIMEOUT;
        }
        timeout = Some(deadline - now);
    };

    if result == WAIT_OBJECT_0 {
        Ok(WaitEvent::OBJECT_0)
    } else if result == WAIT_ABANDONED {
        Ok(WaitEvent::ABANDONED)
    } else if result == WAIT_TIMEOUT {
        Ok(WaitEvent::TIMEOUT)
    } else if result == WAIT_FAILED {
        Err(Error::last_os_error())
    } else {
        panic!("WaitForSingleObject returned {}", result);
    }
}

pub fn GetExitCodeProcess(handle: &Handle) -> Result<u32> {
    let mut exit_code = 0u32;
    check(unsafe {
        processthreadsapi::GetExitCodeProcess(handle.as_raw_handle(), &mut exit_code as *mut u32)
    })?;
    Ok(exit_code)
}

pub fn TerminateProcess(handle: &Handle, exit_code: u32) -> Result<()> {
    check(unsafe { processthreadsapi::TerminateProcess(handle.as_raw_handle(), exit_code) })
}

/// Opens a handle suitable for waiting on an arbitrary (not-necessarily-child) pid, the way
/// [`crate::attach::AttachedCommand`] needs to. `PROCESS_QUERY_LIMITED_INFORMATION |
/// SYNCHRONIZE` is the minimal access mask `WaitForSingleObject`/`GetExitCodeProcess`
/// require.
pub fn open_process_for_wait(pid: u32) -> Result<Handle> {
    use winapi::um::winnt::{PROCESS_QUERY_LIMITED_INFORMATION, SYNCHRONIZE};
    let raw = check_handle(unsafe {
        processthreadsapi::OpenProcess(
            PROCESS_QUERY_LIMITED_INFORMATION | SYNCHRONIZE,
            FALSE,
            pid,
        )
    })?;
    Ok(unsafe { Handle::from_raw_handle(raw) })
}

/// Opens a handle suitable for sending signals (`TerminateProcess`), per
/// [`crate::signal::Signaler`].
pub fn open_process_for_terminate(pid: u32) -> Result<Handle> {
    use winapi::um::winnt::PROCESS_TERMINATE;
    let raw = check_handle(unsafe { processthreadsapi::OpenProcess(PROCESS_TERMINATE, FALSE, pid) })?;
    Ok(unsafe { Handle::from_raw_handle(raw) })
}

/// Blocks until `handle`'s process exits and returns its exit status.
pub fn wait_for_exit(handle: &Handle) -> crate::error::Result<crate::process::ExitStatus> {
    WaitForSingleObject(handle, None).map_err(crate::error::Error::Io)?;
    let code = GetExitCodeProcess(handle).map_err(crate::error::Error::Io)?;
    Ok(crate::process::ExitStatus::from_raw_code(code))
}

/// True if a process with this pid currently exists (whether or not we have permission to
/// fully query it).
pub fn process_exists(pid: u32) -> Result<bool> {
    match open_process_for_wait(pid) {
        Ok(handle) => {
            let code = GetExitCodeProcess(&handle)?;
            Ok(code == STILL_ACTIVE)
        }
        Err(e) if e.raw_os_error() == Some(ERROR_ACCESS_DENIED as i32) => Ok(true),
        Err(e) => Err(e),
    }
}

/// Sends a Ctrl event to the console group `target_pgid` (0 means "this process's own
/// console group").
pub fn generate_console_ctrl_event(event: u32, target_pgid: u32) -> Result<()> {
    check(unsafe { winapi::um::wincon::GenerateConsoleCtrlEvent(event, target_pgid) })
}
