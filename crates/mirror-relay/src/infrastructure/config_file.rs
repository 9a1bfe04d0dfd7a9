//! Optional TOML configuration file.
//!
//! Every key is optional; a missing key leaves the built-in default (or a
//! value supplied through the environment or CLI) untouched.
//!
//! ```toml
//! ws_bind = "127.0.0.1"
//! ws_port = 3000
//! debugger_url = "ws://127.0.0.1:9222"
//! region = "editor"            # or any CSS selector, e.g. "#workbench"
//! fps = 5
//! write_timeout_ms = 500
//! region_wait_ms = 500
//! max_inflight_actions = 8
//! drain_timeout_ms = 1000
//!
//! [resolver]
//! title_markers = ["my electron app"]
//! denylist = ["DevTools"]
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use mirror_core::{CaptureRegion, ResolverPolicy};

/// Failures loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// The file overlay.  Keys mirror the CLI flags, plus a few settings that
/// are only tunable here.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub ws_bind: Option<String>,
    pub ws_port: Option<u16>,
    pub debugger_url: Option<String>,
    pub region: Option<CaptureRegion>,
    pub fps: Option<u64>,
    pub write_timeout_ms: Option<u64>,
    pub region_wait_ms: Option<u64>,
    pub max_inflight_actions: Option<usize>,
    pub drain_timeout_ms: Option<u64>,
    /// Replaces the target-selection heuristics.  Lists omitted inside the
    /// table keep their defaults.
    pub resolver: Option<ResolverPolicy>,
}

impl FileConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on syntax errors, type mismatches, or
    /// unknown keys.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Parse`] as for [`FileConfig::parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
