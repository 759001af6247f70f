//! Test-fixture executable driven by the integration tests.
//!
//! Subcommands:
//!   sample echo                   copy stdin to stdout verbatim
//!   sample echo-both <out> <err>  write <out> to stdout and <err> to stderr
//!   sample exit <code>            exit immediately with <code>
//!   sample sleep <millis>         sleep for <millis> milliseconds, then exit 0
//!   sample pipe                   copy stdin to stdout line by line, flushing after each line

use std::io::{self, BufRead, Read, Write};
use std::process::ExitCode;
use std::time::Duration;

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("echo") => {
            let mut buf = Vec::new();
            if io::stdin().read_to_end(&mut buf).is_err() {
                return ExitCode::FAILURE;
            }
            let _ = io::stdout().write_all(&buf);
            ExitCode::SUCCESS
        }
        Some("echo-both") => {
            let out = args.next().unwrap_or_default();
            let err = args.next().unwrap_or_default();
            println!("{out}");
            eprintln!("{err}");
            ExitCode::SUCCESS
        }
        Some("exit") => {
            let code: u8 = args.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            ExitCode::from(code)
        }
        Some("sleep") => {
            let millis: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            std::thread::sleep(Duration::from_millis(millis));
            ExitCode::SUCCESS
        }
        Some("pipe") => {
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(l) => l,
                    Err(_) => break,
                };
                if writeln!(stdout, "{line}").is_err() || stdout.flush().is_err() {
                    break;
                }
            }
            ExitCode::SUCCESS
        }
        other => {
            eprintln!("sample: unknown subcommand {other:?}");
            ExitCode::FAILURE
        }
    }
}
