//! Engine configuration via `graphtx.toml`
//!
//! All keys are optional; a missing key takes its default. A commented
//! default file can be written next to the application's data with
//! [`EngineConfig::write_default_if_missing`].

use graphtx_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name used by applications that keep one next to their data.
pub const CONFIG_FILE_NAME: &str = "graphtx.toml";

/// Default name of the background worker thread.
pub const DEFAULT_WORKER_THREAD_NAME: &str = "graphtx-bg-worker";

/// Engine configuration loaded from `graphtx.toml`.
///
/// # Example
///
/// ```toml
/// joining = true
/// patch_deleted_from_indexes = true
/// drain_on_shutdown = false
/// worker_thread_name = "graphtx-bg-worker"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Nested transactional calls join the enclosing transaction.
    #[serde(default = "default_true")]
    pub joining: bool,
    /// Register the deferred index maintainer on open.
    #[serde(default = "default_true")]
    pub patch_deleted_from_indexes: bool,
    /// Run every queued job before the worker stops on shutdown.
    #[serde(default)]
    pub drain_on_shutdown: bool,
    /// Name of the background worker thread.
    #[serde(default = "default_worker_thread_name")]
    pub worker_thread_name: String,
}

fn default_true() -> bool {
    true
}

fn default_worker_thread_name() -> String {
    DEFAULT_WORKER_THREAD_NAME.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            joining: true,
            patch_deleted_from_indexes: true,
            drain_on_shutdown: false,
            worker_thread_name: default_worker_thread_name(),
        }
    }
}

impl EngineConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# graphtx engine configuration
#
# Nested transactional calls join the enclosing transaction (default: true).
# When false, every call opens its own transaction.
joining = true

# Remove deleted nodes and relationships from every index in a follow-up
# background transaction (default: true).
patch_deleted_from_indexes = true

# Run all queued background jobs before shutting down (default: false).
# When false, jobs still queued at shutdown are dropped.
drain_on_shutdown = false

# Name of the background worker thread.
worker_thread_name = "graphtx-bg-worker"
"#
    }

    /// Check values that parse but cannot be used.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an empty worker thread name.
    pub fn validate(&self) -> Result<()> {
        if self.worker_thread_name.trim().is_empty() {
            return Err(Error::Config(
                "worker_thread_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the text does not parse or fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{} ('{}')", msg, path.display())),
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
