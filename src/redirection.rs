//! Redirection targets for a command's standard streams.
//!
//! A [`Redirection`] says what a single standard stream (stdin, stdout, or stderr) is
//! connected to. Rather than expose the endpoint as a trait object, the concrete shapes a
//! caller can attach are enumerated in [`Endpoint`] — a sealed, tagged variant. This keeps
//! the common cases (bytes, text, a file path) free of dynamic dispatch and keeps the
//! pipeline wiring in `pipeline.rs` able to match on a closed set of cases instead of
//! threading trait objects through `StreamPump`.

use std::path::PathBuf;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

/// What a single standard stream is connected to.
#[derive(Default)]
pub enum Redirection {
    /// Inherit the parent's stream (the default for stdout/stderr).
    #[default]
    Inherit,
    /// Create an anonymous pipe and let the [`crate::CommandCore`] own the near end.
    Pipe,
    /// Merge this stream into another (stderr into stdout, mirroring the shell's `2>&1`).
    Merge,
    /// Connect the stream to `/dev/null` (or `NUL` on Windows).
    Null,
    /// Connect to a concrete, caller-supplied [`Endpoint`].
    To(Endpoint),
}

impl Redirection {
    /// Human-readable description of where the stream went, for
    /// [`crate::Error::StreamRedirected`] messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            Redirection::Inherit => "the parent process's own stream".into(),
            Redirection::Pipe => "an internally buffered pipe".into(),
            Redirection::Merge => "the other standard stream (merged)".into(),
            Redirection::Null => "the null device".into(),
            Redirection::To(endpoint) => endpoint.describe(),
        }
    }
}

impl From<Endpoint> for Redirection {
    fn from(endpoint: Endpoint) -> Self {
        Redirection::To(endpoint)
    }
}

impl std::fmt::Debug for Redirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Redirection::Inherit => f.write_str("Inherit"),
            Redirection::Pipe => f.write_str("Pipe"),
            Redirection::Merge => f.write_str("Merge"),
            Redirection::Null => f.write_str("Null"),
            Redirection::To(e) => f.debug_tuple("To").field(e).finish(),
        }
    }
}

/// A concrete data source or sink a standard stream can be bound to.
///
/// Every variant here corresponds to one shape of data a caller is likely to already have
/// lying around: a byte buffer, a string, pre-split lines, a file on disk, or an
/// already-open async reader/writer. `Collection` is the write-side counterpart used by
/// `.capture()`-style helpers to accumulate bytes into an in-memory buffer that the caller
/// can read back out after the command finishes.
pub enum Endpoint {
    /// Feed/collect raw bytes.
    Bytes(Vec<u8>),
    /// Feed/collect UTF-8 text.
    Text(String),
    /// Feed pre-split lines, writing a trailing newline after each.
    Lines(Vec<String>),
    /// Read from, or truncate-and-write to, a file at this path.
    FilePath(PathBuf),
    /// Read from a caller-supplied async reader.
    Reader(Pin<Box<dyn AsyncRead + Send>>),
    /// Write to a caller-supplied async writer.
    Writer(Pin<Box<dyn AsyncWrite + Send>>),
    /// Accumulate written bytes into a shared, caller-readable buffer.
    Collection(std::sync::Arc<tokio::sync::Mutex<Vec<u8>>>),
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Endpoint::Text(s) => f.debug_tuple("Text").field(&s.len()).finish(),
            Endpoint::Lines(l) => f.debug_tuple("Lines").field(&l.len()).finish(),
            Endpoint::FilePath(p) => f.debug_tuple("FilePath").field(p).finish(),
            Endpoint::Reader(_) => f.write_str("Reader(..)"),
            Endpoint::Writer(_) => f.write_str("Writer(..)"),
            Endpoint::Collection(_) => f.write_str("Collection(..)"),
        }
    }
}

impl Endpoint {
    /// Renders a short description for use in [`crate::Error::StreamRedirected`] messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            Endpoint::Bytes(_) => "an in-memory byte buffer".into(),
            Endpoint::Text(_) => "an in-memory string".into(),
            Endpoint::Lines(_) => "an in-memory line buffer".into(),
            Endpoint::FilePath(p) => format!("file {}", p.display()),
            Endpoint::Reader(_) => "a caller-supplied reader".into(),
            Endpoint::Writer(_) => "a caller-supplied writer".into(),
            Endpoint::Collection(_) => "a captured collection".into(),
        }
    }
}

impl From<Vec<u8>> for Endpoint {
    fn from(v: Vec<u8>) -> Self {
        Endpoint::Bytes(v)
    }
}

impl From<String> for Endpoint {
    fn from(v: String) -> Self {
        Endpoint::Text(v)
    }
}

impl From<PathBuf> for Endpoint {
    fn from(v: PathBuf) -> Self {
        Endpoint::FilePath(v)
    }
}
