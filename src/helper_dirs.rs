//! Well-known filesystem locations for the helper.
//!
//! Everything lives under a single helper home directory, `~/.cjt-helper`
//! by default:
//!
//! | Purpose | Path |
//! |---------|------|
//! | Safe root for directory cleaning | `~/.cjt-helper/` |
//! | Default update target | `~/.cjt-helper/auto-update/` |
//! | Side-channel log | `~/.cjt-helper/auto-update.log` |
//! | Optional config | `~/.cjt-helper/config.toml` |
//!
//! # Environment Overrides
//!
//! - `CJT_HELPER_HOME` overrides [`helper_home`] (and therefore every path
//!   derived from it).

use std::path::PathBuf;

/// Name of the helper home directory under the user's home.
pub const HELPER_DIR_NAME: &str = ".cjt-helper";

/// Directory base name that may always be cleaned, wherever it lives.
///
/// This is the folder the browser extension is installed into.
pub const ALLOWED_DIR_NAME: &str = "cjt-helper";

/// The user's home directory, falling back to the temp dir when unknown.
#[must_use]
pub fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(std::env::temp_dir)
}

/// Helper home directory. Override with `CJT_HELPER_HOME`.
#[must_use]
pub fn helper_home() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("CJT_HELPER_HOME") {
        return PathBuf::from(override_dir);
    }
    home_dir().join(HELPER_DIR_NAME)
}

/// Root under which existing directories may be wiped before extraction.
///
/// Recomputed on every call, never cached.
#[must_use]
pub fn safe_root() -> PathBuf {
    helper_home()
}

/// Target used when `start_update` does not name one.
#[must_use]
pub fn default_target_dir() -> PathBuf {
    helper_home().join("auto-update")
}

/// Append-only side-channel log file.
#[must_use]
pub fn log_file() -> PathBuf {
    helper_home().join("auto-update.log")
}

/// Optional TOML config file.
#[must_use]
pub fn config_file() -> PathBuf {
    helper_home().join("config.toml")
}
