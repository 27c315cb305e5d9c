//! Runtime tunables for the update helper.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration, read from `config.toml` in the helper home.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperConfig {
    /// Download read size in bytes; cancellation is checked once per chunk.
    pub chunk_size: usize,
    /// When the server sends no length, a liveness progress event is emitted
    /// every `chunk_size * unknown_length_ping_chunks` bytes.
    pub unknown_length_ping_chunks: u64,
    /// TCP connect timeout for the download request. `0` disables it.
    pub connect_timeout_secs: u64,
    /// `User-Agent` header sent with the download request.
    pub user_agent: String,
    /// Largest inbound frame accepted before the stream is declared broken.
    pub max_frame_bytes: usize,
    /// How long shutdown waits for a running update to wind down.
    pub shutdown_grace_secs: u64,
    /// Parent of the per-attempt scratch directory. System temp dir when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            unknown_length_ping_chunks: 20,
            connect_timeout_secs: 30,
            user_agent: "cjt-helper-updater".to_owned(),
            max_frame_bytes: 64 * 1024 * 1024,
            shutdown_grace_secs: 5,
            scratch_dir: None,
        }
    }
}

impl HelperConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::HelperError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, or defaults when the file is absent.
    ///
    /// A broken file is logged and ignored; the host must always get a
    /// working helper.
    #[must_use]
    pub fn load_or_default() -> Self {
        let path = crate::helper_dirs::config_file();
        if !path.exists() {
            return Self::default();
        }
        match Self::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring invalid config");
                Self::default()
            }
        }
    }

    /// Reject values that would stall or break the pipeline.
    ///
    /// # Errors
    ///
    /// Returns a config error naming the offending field.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.chunk_size == 0 {
            return Err(crate::error::HelperError::Config(
                "chunk_size must be greater than zero".to_owned(),
            ));
        }
        if self.unknown_length_ping_chunks == 0 {
            return Err(crate::error::HelperError::Config(
                "unknown_length_ping_chunks must be greater than zero".to_owned(),
            ));
        }
        if self.max_frame_bytes == 0 {
            return Err(crate::error::HelperError::Config(
                "max_frame_bytes must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }

    /// Connect timeout, if enabled.
    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_secs > 0).then(|| Duration::from_secs(self.connect_timeout_secs))
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Byte cadence of the liveness ping for downloads of unknown length.
    #[must_use]
    pub fn ping_interval_bytes(&self) -> u64 {
        (self.chunk_size as u64).saturating_mul(self.unknown_length_ping_chunks)
    }
}
