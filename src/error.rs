//! Error types for the update helper.

/// Reason carried by the `canceled` status.
pub const CANCELED_TEXT: &str = "update canceled";

/// Top-level error type for the native messaging helper.
#[derive(Debug, thiserror::Error)]
pub enum HelperError {
    /// The inbound frame stream broke its length-prefix contract.
    ///
    /// The channel can no longer be trusted, so this is fatal for the process.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A command was missing a field or could not be understood.
    #[error("{0}")]
    Command(String),

    /// Fetching the update archive failed.
    #[error("download failed: {0}")]
    Download(String),

    /// Reading or unpacking the update archive failed.
    #[error("extract failed: {0}")]
    Extract(String),

    /// Clearing the previous install out of the target directory failed.
    #[error("failed to clean target directory: {0}")]
    Cleanup(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Outbound status channel closed or could not be written.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The update was canceled at a checkpoint. Not a failure.
    #[error("{0}")]
    Canceled(String),
}

impl HelperError {
    /// The cancellation sentinel raised at a checkpoint.
    #[must_use]
    pub fn canceled() -> Self {
        Self::Canceled(CANCELED_TEXT.to_owned())
    }

    /// Returns `true` for the cooperative-cancellation outcome.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled(_))
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, HelperError>;
