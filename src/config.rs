//! Configuration for the Scrutiny CLI, read from `scrutiny.toml`.
//!
//! All fields have working defaults, so a missing file is fine. Settings
//! are layered: file values first, then CLI flags override.
//!
//! # Configuration File Format
//!
//! ```toml
//! [oracle]
//! cmd = "claude"
//! args = ["--print"]
//! timeout_secs = 300
//!
//! [review]
//! parallel = true
//!
//! [storage]
//! data_dir = ".scrutiny"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Oracle adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// External command to invoke for oracle phases.
    pub cmd: String,
    pub args: Vec<String>,
    /// Per-invocation timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            cmd: "claude".to_string(),
            args: vec!["--print".to_string()],
            timeout_secs: 300,
        }
    }
}

/// Review orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Fan the four reconciliation invocations out concurrently.
    pub parallel: bool,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self { parallel: true }
    }
}

/// Storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding records and evidence blobs.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".scrutiny"),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrutinyConfig {
    pub oracle: OracleConfig,
    pub review: ReviewConfig,
    pub storage: StorageConfig,
}

impl ScrutinyConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load from a file if it exists, falling back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn records_dir(&self) -> PathBuf {
        self.storage.data_dir.join("records")
    }

    pub fn evidence_dir(&self) -> PathBuf {
        self.storage.data_dir.join("evidence")
    }
}
