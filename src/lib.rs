//! Execution and interaction with external processes, built on `tokio`.
//!
//! The entry points are [`IoCommand`], a single external command with redirectable
//! standard streams, and [`PipelineCommand`], two or more commands chained stdout-to-stdin
//! like a shell pipeline. Both are builders: `start()` them to get a live handle, or
//! `join()` the builder directly to drive the command to completion and collect its
//! [`CommandResult`].
//!
//! Compared to `std::process`, this crate adds:
//!
//! * Async spawn/wait built on `tokio::process`, so a command's lifecycle sits naturally
//!   alongside the rest of an async application instead of blocking a thread.
//!
//! * A `timeout` and a cooperative [`CancelHandle`] that race a command's natural exit,
//!   escalating through a graceful terminate-then-kill sequence when either fires first.
//!
//! * Redirection targets beyond inherit/pipe/null: an in-memory buffer, a file, pre-split
//!   lines, or a caller-supplied async reader/writer (see [`Redirection`] and [`Endpoint`]).
//!
//! * OS-level pipelines via the `|` operator, connecting one command's stdout pipe directly
//!   into the next command's stdin pipe without looping bytes through userspace.
//!
//! * [`AttachedCommand`], for waiting on or signaling a process this crate did not itself
//!   spawn, and a cross-platform [`Signaler`] (`SIGTERM`/`SIGKILL` on Unix, console-control
//!   events and `TerminateProcess` on Windows).
//!
//! # Examples
//!
//! Capture a command's output:
//!
//! ```no_run
//! # async fn run() -> cmdkit::Result<()> {
//! let result = cmdkit::IoCommand::new("echo").arg("hi").capture().join().await?;
//! assert!(result.success());
//! println!("{}", result.stdout_str()?);
//! # Ok(())
//! # }
//! ```
//!
//! Pipe two commands together:
//!
//! ```no_run
//! # async fn run() -> cmdkit::Result<()> {
//! let result = (cmdkit::IoCommand::new("find").arg(".") | cmdkit::IoCommand::new("sort"))
//!     .stdout(cmdkit::Redirection::Pipe)
//!     .join()
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod attach;
mod command;
mod config;
mod error;
mod io_command;
mod options;
mod pipeline;
mod process;
mod pump;
mod quote;
mod redirection;
mod signal;
#[cfg(windows)]
mod win32;

pub use attach::AttachedCommand;
pub use command::{CancelHandle, CommandCore, CommandResult, State, StreamCapture};
pub use config::{load as load_config, FileConfig};
pub use error::{Error, Result, StdStream};
pub use io_command::{IoCommand, RunningCommand};
pub use options::{Options, Shell};
pub use pipeline::{IoCommandSpec, PipelineCommand, PipelineResult, RunningPipeline};
pub use process::{ExitStatus, PlatformProcess};
pub use quote::{ArgumentSyntax, UnixQuoter, WindowsQuoter};
pub use redirection::{Endpoint, Redirection};
pub use signal::{Signal, Signaler};
