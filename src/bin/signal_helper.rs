//! Windows-only helper: attaches to a target process's console and raises a console-control
//! event from inside it, for [`crate::signal::Signaler`]'s cross-console delivery case (a
//! process cannot raise a console-control event into a console it is not attached to).
//!
//! Usage: `signal-helper <pid> <ctrl-c|ctrl-break>`
//!
//! Exit code 0 means the event was raised successfully; any other code means failure (no
//! console, `AttachConsole` failed, or an unrecognized event name).

#[cfg(windows)]
fn main() {
    std::process::exit(run() as i32);
}

#[cfg(windows)]
fn run() -> u8 {
    use winapi::um::wincon::{
        AttachConsole, FreeConsole, GenerateConsoleCtrlEvent, CTRL_BREAK_EVENT, CTRL_C_EVENT,
    };

    let mut args = std::env::args().skip(1);
    let pid: u32 = match args.next().and_then(|s| s.parse().ok()) {
        Some(pid) => pid,
        None => return 1,
    };
    let event = match args.next().as_deref() {
        Some("ctrl-c") => CTRL_C_EVENT,
        Some("ctrl-break") => CTRL_BREAK_EVENT,
        _ => return 1,
    };

    unsafe {
        // Detach from whatever console we inherited, then attach to the target's.
        FreeConsole();
        if AttachConsole(pid) == 0 {
            return 1;
        }
        let ok = GenerateConsoleCtrlEvent(event, 0) != 0;
        FreeConsole();
        if ok {
            0
        } else {
            1
        }
    }
}

#[cfg(not(windows))]
fn main() {
    eprintln!("signal-helper is only meaningful on Windows");
    std::process::exit(1);
}
