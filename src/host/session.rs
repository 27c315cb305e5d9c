//! Framed stdin/stdout session with the browser extension.
//!
//! Reads one [`Command`] per frame from stdin and answers with
//! [`StatusMessage`] frames on stdout. Update work runs in the background,
//! so `cancel_update` is always read promptly.
//!
//! Stdout is exclusively reserved for frames; all diagnostic output (tracing,
//! logs) must be routed to stderr or the log file.

use crate::config::HelperConfig;
use crate::error::Result;
use crate::host::contract::{CANCEL_ACK_TEXT, Command, StatusMessage};
use crate::host::frame::{FrameReader, FrameWriter};
use crate::host::status::{StatusSink, forward_statuses, status_channel};
use crate::update::guard::{CleanPolicy, validate_install_dir};
use crate::update::manager::{UpdateManager, UpdateRequest};
use crate::update::transport::Transport;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// Everything a session needs besides its two streams.
pub struct SessionOptions {
    pub transport: Arc<dyn Transport>,
    pub config: HelperConfig,
    /// Fixed cleaning policy; `None` derives it from the helper home.
    pub clean_policy: Option<CleanPolicy>,
}

/// Run a session over the process's stdin and stdout.
///
/// # Errors
///
/// Returns a protocol error if stdin breaks the framing contract.
pub async fn run_stdio_session(options: SessionOptions) -> Result<()> {
    run_session(tokio::io::stdin(), tokio::io::stdout(), options).await
}

/// Run a session until `reader` reaches end of stream.
///
/// On exit any running update is canceled and given
/// [`HelperConfig::shutdown_grace`] to report, and queued frames are
/// flushed.
///
/// # Errors
///
/// Returns a protocol error if the inbound stream breaks the framing
/// contract; every other failure is reported to the host as a status frame.
pub async fn run_session<R, W>(reader: R, writer: W, options: SessionOptions) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let SessionOptions {
        transport,
        config,
        clean_policy,
    } = options;
    let grace = config.shutdown_grace();
    let max_frame_bytes = config.max_frame_bytes;

    let (sink, rx) = status_channel();
    let forwarder = tokio::spawn(forward_statuses(rx, FrameWriter::new(writer)));

    let manager = match clean_policy {
        Some(policy) => UpdateManager::with_clean_policy(transport, sink.clone(), config, policy),
        None => UpdateManager::new(transport, sink.clone(), config),
    };

    let result = read_commands(FrameReader::new(reader, max_frame_bytes), &manager, &sink).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "inbound stream is broken; shutting down");
    }

    manager.shutdown(grace).await;
    drop(manager);
    drop(sink);
    match tokio::time::timeout(grace, forwarder).await {
        Ok(Ok(written)) => tracing::debug!(frames = written, "status forwarder finished"),
        Ok(Err(e)) => tracing::warn!(error = %e, "status forwarder panicked"),
        Err(_) => tracing::warn!("status forwarder did not drain before shutdown"),
    }

    result
}

async fn read_commands<R>(
    mut reader: FrameReader<R>,
    manager: &UpdateManager,
    sink: &StatusSink,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        let Some(value) = reader.read_frame().await? else {
            tracing::info!("stdin closed (EOF); ending session");
            return Ok(());
        };

        match Command::from_value(value) {
            Ok(command) => dispatch(command, manager, sink).await,
            Err(e) => {
                tracing::warn!(error = %e, "rejecting command");
                sink.send(StatusMessage::error(e.to_string()));
            }
        }
    }
}

async fn dispatch(command: Command, manager: &UpdateManager, sink: &StatusSink) {
    tracing::debug!(cmd = command.name(), "command received");
    match command {
        Command::StartUpdate {
            download_url,
            target_dir,
        } => {
            let started = match UpdateRequest::from_fields(download_url, target_dir.as_deref()) {
                Ok(request) => manager.try_start(request).await.map(|_| ()),
                Err(e) => Err(e),
            };
            if let Err(e) = started {
                tracing::warn!(error = %e, "start_update rejected");
                sink.send(StatusMessage::error(e.to_string()));
            }
        }
        Command::CancelUpdate => {
            let was_running = manager.request_cancel().await;
            tracing::info!(was_running, "cancel_update: received");
            sink.send(StatusMessage::log(CANCEL_ACK_TEXT));
        }
        Command::CheckInstallDir { path } => {
            let check = validate_install_dir(path.as_deref().unwrap_or_default());
            tracing::info!(path = %check.path, ok = check.is_ok(), "check_install_dir");
            sink.send(StatusMessage::install_dir(
                check.is_ok(),
                check.path,
                check.problem.map(str::to_owned),
            ));
        }
    }
}
