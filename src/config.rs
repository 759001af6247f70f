//! Layered configuration loading: built-in defaults, an optional on-disk TOML file, and
//! explicit per-call [`Options`] overrides, composed right-biased (later layers win).
//!
//! Grounded on the `toml` + `serde` configuration conventions used throughout
//! `gawd-ai-sctl/server` (`Config::load` reading a TOML file into a `serde`-derived struct
//! before merging in CLI/env overrides).

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;
use crate::options::Options;

/// On-disk shape of the optional configuration file. Every field is optional so a file can
/// override just the knobs it cares about; anything left out falls through to the
/// built-in defaults.
#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    /// Timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Kill grace period in milliseconds.
    pub kill_timeout_ms: Option<u64>,
    /// Whether a non-zero exit should be reported as an error.
    pub throw_on_error: Option<bool>,
    /// Cap on buffered bytes held by a buffering stream pump.
    pub max_buffered_bytes: Option<usize>,
    /// Default working directory.
    pub cwd: Option<String>,
    /// Whether spawned processes default to detached.
    pub detached: Option<bool>,
}

impl FileConfig {
    fn into_options(self) -> Options {
        let mut opts = Options::new();
        if let Some(ms) = self.timeout_ms {
            opts = opts.timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.kill_timeout_ms {
            opts = opts.kill_timeout(Duration::from_millis(ms));
        }
        if let Some(b) = self.throw_on_error {
            opts = opts.throw_on_error(b);
        }
        if let Some(b) = self.max_buffered_bytes {
            opts = opts.max_buffered_bytes(b);
        }
        if let Some(cwd) = self.cwd {
            opts = opts.cwd(cwd);
        }
        if let Some(b) = self.detached {
            opts = opts.detached(b);
        }
        opts
    }
}

/// Loads [`Options`] by layering, in increasing priority:
///
/// 1. [`Options::default`],
/// 2. the TOML file at `path`, if it exists (missing file is not an error — a file that
///    exists but fails to parse is),
/// 3. `overrides`, applied last.
pub async fn load(path: impl AsRef<Path>, overrides: Options) -> Result<Options> {
    let base = Options::default();
    let path = path.as_ref();
    let layered = match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            let file_config: FileConfig = toml::from_str(&contents).map_err(|e| {
                crate::error::Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })?;
            base.merged_with(file_config.into_options())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => base,
        Err(e) => return Err(e.into()),
    };
    Ok(layered.merged_with(overrides))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_falls_back_to_defaults_and_overrides() {
        let opts = load(
            "/nonexistent/cmdkit-config-that-should-not-exist.toml",
            Options::new().throw_on_error(true),
        )
        .await
        .unwrap();
        assert!(opts.throw_on_error);
        assert_eq!(opts.effective_kill_timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn file_supplied_kill_timeout_survives_overrides_that_leave_it_unset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmdkit.toml");
        tokio::fs::write(&path, "kill_timeout_ms = 9000\n")
            .await
            .unwrap();

        let opts = load(&path, Options::new().throw_on_error(true))
            .await
            .unwrap();
        assert_eq!(opts.kill_timeout, Some(Duration::from_millis(9000)));
    }

    #[tokio::test]
    async fn file_values_are_overridden_by_explicit_options() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmdkit.toml");
        tokio::fs::write(&path, "timeout_ms = 1000\nthrow_on_error = true\n")
            .await
            .unwrap();

        let opts = load(&path, Options::new().throw_on_error(false))
            .await
            .unwrap();
        assert_eq!(opts.timeout, Some(Duration::from_millis(1000)));
        // explicit override of `false` still loses to the merge rule (`||`), matching
        // the documented right-biased-but-sticky-true semantics of `throw_on_error`.
        assert!(opts.throw_on_error);
    }
}
