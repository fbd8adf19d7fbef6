//! Execution configuration.
//!
//! Settings are read from TOML; every field is optional and falls back to its
//! default.
//!
//! ```toml
//! cast_errors_fatal = true
//! taps_enabled = false
//! max_warnings = 16
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};

/// Per-execution settings carried by a [`QueryContext`](crate::QueryContext).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Abort on the first cast failure instead of recording a warning and
    /// yielding NULL.
    #[serde(default)]
    pub cast_errors_fatal: bool,

    /// Record timing taps around cursor `open`/`next`.
    #[serde(default)]
    pub taps_enabled: bool,

    /// Maximum number of warnings kept per execution; later ones are dropped.
    #[serde(default = "default_max_warnings")]
    pub max_warnings: usize,
}

fn default_max_warnings() -> usize {
    64
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            cast_errors_fatal: false,
            taps_enabled: false,
            max_warnings: default_max_warnings(),
        }
    }
}

impl ExecutionConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| QueryError::configuration(format!("invalid execution config: {}", e)))
    }

    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            QueryError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), ?config, "loaded execution config");
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| QueryError::configuration(format!("cannot serialize config: {}", e)))
    }

    pub fn with_cast_errors_fatal(mut self, fatal: bool) -> Self {
        self.cast_errors_fatal = fatal;
        self
    }

    pub fn with_taps(mut self, enabled: bool) -> Self {
        self.taps_enabled = enabled;
        self
    }
}
