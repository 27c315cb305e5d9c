//! Wire shapes exchanged with the browser extension.
//!
//! Inbound frames carry a [`Command`] tagged by `cmd`; outbound frames carry
//! a [`StatusMessage`] tagged by `status`.

use crate::error::{HelperError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reply text for an unrecognised `cmd`.
pub const UNKNOWN_COMMAND_TEXT: &str = "unknown command";

/// Reply text for `start_update` without a usable `downloadUrl`.
pub const MISSING_URL_TEXT: &str = "missing download URL";

/// Reply text when `start_update` arrives while another update runs.
pub const ALREADY_RUNNING_TEXT: &str = "an update is already running";

/// Acknowledgement sent for `cancel_update`.
pub const CANCEL_ACK_TEXT: &str = "cancel request sent";

/// Commands accepted from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    StartUpdate {
        #[serde(
            rename = "downloadUrl",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        download_url: Option<String>,
        #[serde(rename = "targetDir", default, skip_serializing_if = "Option::is_none")]
        target_dir: Option<String>,
    },
    CancelUpdate,
    CheckInstallDir {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
}

impl Command {
    /// Wire names of every command, in the order they are documented.
    pub const NAMES: [&'static str; 3] = ["start_update", "cancel_update", "check_install_dir"];

    /// Interpret a decoded frame body as a command.
    ///
    /// # Errors
    ///
    /// Returns [`HelperError::Command`] with [`UNKNOWN_COMMAND_TEXT`] when the
    /// `cmd` field is absent or unrecognised, or a description of the bad
    /// field when a known command is malformed.
    pub fn from_value(value: Value) -> Result<Self> {
        let name = value.get("cmd").and_then(Value::as_str).map(str::to_owned);
        match name.as_deref() {
            Some(name) if Self::NAMES.contains(&name) => serde_json::from_value(value)
                .map_err(|e| HelperError::Command(format!("invalid {name} command: {e}"))),
            _ => Err(HelperError::Command(UNKNOWN_COMMAND_TEXT.to_owned())),
        }
    }

    /// Render command name to wire format.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartUpdate { .. } => "start_update",
            Self::CancelUpdate => "cancel_update",
            Self::CheckInstallDir { .. } => "check_install_dir",
        }
    }
}

/// Pipeline phase reported by progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Download,
    Extract,
}

/// Status frames sent to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusMessage {
    Progress {
        phase: Phase,
        percent: u8,
        text: String,
    },
    Log {
        text: String,
    },
    Complete {
        path: String,
    },
    Canceled {
        text: String,
    },
    Error {
        text: String,
    },
    CheckInstallDir {
        ok: bool,
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
}

impl StatusMessage {
    pub fn log(text: impl Into<String>) -> Self {
        Self::Log { text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::Error { text: text.into() }
    }

    pub fn canceled(text: impl Into<String>) -> Self {
        Self::Canceled { text: text.into() }
    }

    pub fn complete(path: impl Into<String>) -> Self {
        Self::Complete { path: path.into() }
    }

    /// Download progress with a known total.
    #[must_use]
    pub fn download_percent(percent: u8) -> Self {
        Self::Progress {
            phase: Phase::Download,
            percent,
            text: format!("downloading update ({percent}%)"),
        }
    }

    /// Liveness ping for downloads whose size the server did not declare.
    #[must_use]
    pub fn download_ping() -> Self {
        Self::Progress {
            phase: Phase::Download,
            percent: 0,
            text: "downloading update...".to_owned(),
        }
    }

    #[must_use]
    pub fn extract_percent(percent: u8) -> Self {
        Self::Progress {
            phase: Phase::Extract,
            percent,
            text: format!("extracting update ({percent}%)"),
        }
    }

    /// Reply to `check_install_dir`.
    pub fn install_dir(ok: bool, path: impl Into<String>, text: Option<String>) -> Self {
        Self::CheckInstallDir {
            ok,
            path: path.into(),
            text,
        }
    }

    /// Returns `true` for statuses that end an update attempt.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete { .. } | Self::Canceled { .. } | Self::Error { .. }
        )
    }
}
