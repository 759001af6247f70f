//! Crate-level error type.
//!
//! Every fallible operation in this crate returns [`Result<T>`], whose error variant is
//! [`Error`]. The taxonomy mirrors what can actually go wrong when driving a child process
//! through its lifecycle: a failure to start, a non-zero exit under `throw_on_error`, a
//! timeout, external cancellation, a misuse of a redirected/disposed stream, a failure on an
//! operator-attached pump endpoint, and the catch-all I/O error.

use std::io;
use thiserror::Error;

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while spawning, driving, or tearing down a [`crate::Command`].
#[derive(Error, Debug)]
pub enum Error {
    /// The platform refused to start the process (missing executable, permission denied, ...).
    #[error("failed to start process: {0}")]
    SpawnFailed(#[source] io::Error),

    /// `throw_on_error` was set and the process exited with a non-zero code.
    #[error("command exited with non-zero status: {code}")]
    ErrorExitCode {
        /// The exit code the child reported.
        code: i32,
    },

    /// The configured timeout elapsed before the command finished.
    #[error("command timed out")]
    TimedOut,

    /// The caller's cancellation token fired while the command was still running.
    #[error("command was cancelled")]
    Cancelled,

    /// An attempt was made to reach a standard stream that was redirected elsewhere.
    #[error("standard {stream} was redirected to {destination} and is not accessible here")]
    StreamRedirected {
        /// Which of stdin/stdout/stderr was requested.
        stream: StdStream,
        /// Human-readable description of the sink/source it was redirected to.
        destination: String,
    },

    /// An attempt was made to use a stream handle after it was closed.
    #[error("standard {0} has already been disposed")]
    StreamDisposed(StdStream),

    /// An operator-attached source (`redirect_from`, pipeline input, ...) failed to produce
    /// bytes.
    #[error("pump source failed: {0}")]
    PumpSourceFailed(#[source] io::Error),

    /// An operator-attached sink (`redirect_to`, captured collection, ...) failed to accept
    /// bytes.
    #[error("pump sink failed: {0}")]
    PumpSinkFailed(#[source] io::Error),

    /// A plain I/O error with no more specific classification.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Which standard stream an error pertains to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdStream {
    /// Standard input.
    Stdin,
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl std::fmt::Display for StdStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StdStream::Stdin => "input",
            StdStream::Stdout => "output",
            StdStream::Stderr => "error",
        };
        f.write_str(s)
    }
}

impl Error {
    /// Ranks terminal-state errors by the precedence table in the design notes:
    /// `SpawnFailed > Cancelled > TimedOut > ErrorExitCode > pump errors > natural exit`.
    ///
    /// Lower numbers win. Used when more than one failure mode becomes true for the same
    /// command at roughly the same time (e.g. a timeout firing while a pump is already
    /// failing).
    pub(crate) fn precedence(&self) -> u8 {
        match self {
            Error::SpawnFailed(_) => 0,
            Error::Cancelled => 1,
            Error::TimedOut => 2,
            Error::ErrorExitCode { .. } => 3,
            Error::PumpSourceFailed(_) | Error::PumpSinkFailed(_) => 4,
            Error::StreamRedirected { .. }
            | Error::StreamDisposed(_)
            | Error::Io(_) => 5,
        }
    }

    /// Keeps whichever of `self`/`other` has higher precedence (lower rank wins), consuming
    /// `other`. Used to fold concurrent terminal-reason candidates into one.
    pub(crate) fn prefer(self, other: Error) -> Error {
        if other.precedence() < self.precedence() {
            other
        } else {
            self
        }
    }
}
