//! Builder-level policy knobs shared by [`crate::IoCommand`] and [`crate::PipelineCommand`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Lifecycle and environment policy for a single command or a whole pipeline.
///
/// `Options` is deliberately a plain data struct rather than a builder with private fields:
/// [`crate::config::load`] constructs one from layered defaults/file/explicit-override
/// sources and then hands it to [`crate::IoCommand::with_options`] or
/// [`crate::PipelineCommand::with_options`] verbatim.
#[derive(Debug, Clone)]
pub struct Options {
    /// Wall-clock budget for the command to finish on its own. `None` means no timeout.
    pub timeout: Option<Duration>,
    /// Grace period between sending a terminate request and escalating to a forced kill,
    /// once a timeout, cancellation, or explicit `.kill()` has fired. `None` means the
    /// built-in default ([`DEFAULT_KILL_TIMEOUT`]) — kept as an `Option`, like `timeout`,
    /// so [`Options::merged_with`] can tell "never set" apart from "explicitly set to the
    /// default" and let an underlying layer's value show through.
    pub kill_timeout: Option<Duration>,
    /// When true, a non-zero exit code is reported as [`crate::Error::ErrorExitCode`]
    /// instead of being folded into a successful [`crate::CommandResult`].
    pub throw_on_error: bool,
    /// Upper bound on bytes a buffering [`crate::pump::StreamPump`] will hold before
    /// applying backpressure to the child. `None` means unbounded.
    pub max_buffered_bytes: Option<usize>,
    /// Working directory for the spawned process. `None` inherits the parent's cwd.
    pub cwd: Option<PathBuf>,
    /// Environment variables to set in addition to (or overriding) the inherited
    /// environment.
    pub env: HashMap<String, String>,
    /// When true, start the process detached from the parent's job/process-group so it
    /// outlives the command handle.
    pub detached: bool,
    /// An externally-constructed cancellation token to drive this command, letting a caller
    /// request cancellation before the command is even spawned. `None` makes
    /// [`crate::command::CommandCore`] mint a fresh one of its own.
    pub cancellation: Option<crate::command::CancelHandle>,
}

/// The kill grace period used when [`Options::kill_timeout`] is left unset.
pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(5);

impl Default for Options {
    fn default() -> Self {
        Options {
            timeout: None,
            kill_timeout: None,
            throw_on_error: false,
            max_buffered_bytes: None,
            cwd: None,
            env: HashMap::new(),
            detached: false,
            cancellation: None,
        }
    }
}

impl Options {
    /// Starts from the built-in defaults.
    pub fn new() -> Self {
        Options::default()
    }

    /// Right-biased overlay: every field `other` sets explicitly wins over `self`'s value.
    /// `env` is merged key-by-key rather than replaced wholesale.
    pub fn merged_with(mut self, other: Options) -> Self {
        self.timeout = other.timeout.or(self.timeout);
        self.kill_timeout = other.kill_timeout.or(self.kill_timeout);
        self.throw_on_error = other.throw_on_error || self.throw_on_error;
        self.max_buffered_bytes = other.max_buffered_bytes.or(self.max_buffered_bytes);
        self.cwd = other.cwd.or(self.cwd);
        for (k, v) in other.env {
            self.env.insert(k, v);
        }
        self.detached = other.detached || self.detached;
        self.cancellation = other.cancellation.or(self.cancellation);
        self
    }

    /// Sets the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the kill grace period.
    pub fn kill_timeout(mut self, timeout: Duration) -> Self {
        self.kill_timeout = Some(timeout);
        self
    }

    /// The kill grace period that will actually apply, falling back to
    /// [`DEFAULT_KILL_TIMEOUT`] if unset.
    pub fn effective_kill_timeout(&self) -> Duration {
        self.kill_timeout.unwrap_or(DEFAULT_KILL_TIMEOUT)
    }

    /// Enables throw-on-error.
    pub fn throw_on_error(mut self, yes: bool) -> Self {
        self.throw_on_error = yes;
        self
    }

    /// Sets the buffered-bytes cap.
    pub fn max_buffered_bytes(mut self, bytes: usize) -> Self {
        self.max_buffered_bytes = Some(bytes);
        self
    }

    /// Sets the working directory.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Sets an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Marks the command as detached.
    pub fn detached(mut self, yes: bool) -> Self {
        self.detached = yes;
        self
    }
}

/// A factory for shell commands that all start from the same [`Options`].
///
/// `Shell` is functional rather than a mutable builder: [`with_options`](Self::with_options)
/// consumes nothing and returns a new, independent `Shell`, leaving the original untouched —
/// the same immutable-after-construction discipline `Options` itself follows.
#[derive(Debug, Clone, Default)]
pub struct Shell {
    opts: Options,
}

impl Shell {
    /// A shell carrying the built-in default `Options`.
    pub fn new() -> Self {
        Shell::default()
    }

    /// Returns a new `Shell` that applies `opts` to every command it produces from here on.
    /// Does not affect `self`.
    pub fn with_options(&self, opts: Options) -> Self {
        Shell { opts }
    }

    /// The `Options` this shell applies to commands it produces.
    pub fn options(&self) -> &Options {
        &self.opts
    }

    /// Builds an [`crate::IoCommand`] that runs `command_line` through the platform shell,
    /// pre-configured with this shell's `Options`.
    pub fn command(&self, command_line: impl Into<String>) -> crate::io_command::IoCommand {
        crate::io_command::IoCommand::shell(command_line).with_options(self.opts.clone())
    }

    /// Returns the platform's shell invocation prefix (`["sh", "-c"]` on Unix,
    /// `["cmd", "/C"]` on Windows) used by [`crate::IoCommand::shell`].
    pub(crate) fn invocation() -> (&'static str, &'static str) {
        if cfg!(windows) {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_with_is_right_biased_but_merges_env_key_by_key() {
        let base = Options::new()
            .throw_on_error(false)
            .env("KEEP", "base")
            .env("OVERRIDE_ME", "base")
            .cwd("/base");
        let override_opts = Options::new()
            .throw_on_error(true)
            .env("OVERRIDE_ME", "override")
            .timeout(Duration::from_secs(1));

        let merged = base.merged_with(override_opts);
        assert!(merged.throw_on_error);
        assert_eq!(merged.timeout, Some(Duration::from_secs(1)));
        assert_eq!(merged.cwd, Some(PathBuf::from("/base")));
        assert_eq!(merged.env.get("KEEP").map(String::as_str), Some("base"));
        assert_eq!(
            merged.env.get("OVERRIDE_ME").map(String::as_str),
            Some("override")
        );
    }

    #[test]
    fn merged_with_lets_an_unset_override_fall_through_to_the_base_kill_timeout() {
        let base = Options::new().kill_timeout(Duration::from_secs(30));
        let override_opts = Options::new().throw_on_error(true);

        let merged = base.merged_with(override_opts);
        assert_eq!(merged.kill_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn with_options_does_not_mutate_the_original_shell() {
        let base = Shell::new();
        let tweaked = base.with_options(Options::new().throw_on_error(true));
        assert!(!base.options().throw_on_error);
        assert!(tweaked.options().throw_on_error);
    }

    #[test]
    fn shell_command_carries_its_options_onto_the_built_command() {
        let shell = Shell::new().with_options(Options::new().cwd("/tmp"));
        let (program, args, _stderr) = shell.command("echo hi").into_parts();
        let _ = (program, args);
    }
}
