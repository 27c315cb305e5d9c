//! Outbound status queue.
//!
//! The session loop and the background update both push [`StatusMessage`]s
//! into a [`StatusSink`]; a single forwarder drains the queue into the
//! frame writer, so frames leave in the order they were queued.

use crate::host::contract::StatusMessage;
use crate::host::frame::FrameWriter;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

/// Cloneable, non-blocking handle for emitting status frames.
///
/// Usable from async tasks and from the blocking pool alike.
#[derive(Debug, Clone)]
pub struct StatusSink {
    tx: mpsc::UnboundedSender<StatusMessage>,
}

impl StatusSink {
    /// Queue a status frame. Dropped with a debug log once the forwarder
    /// has gone away.
    pub fn send(&self, status: StatusMessage) {
        if self.tx.send(status).is_err() {
            tracing::debug!("status channel closed; dropping status frame");
        }
    }
}

/// Create a sink and the receiver its frames arrive on.
#[must_use]
pub fn status_channel() -> (StatusSink, mpsc::UnboundedReceiver<StatusMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (StatusSink { tx }, rx)
}

/// Write every queued status as a frame until all sinks are dropped or the
/// output breaks. Returns the number of frames written.
pub async fn forward_statuses<W>(
    mut rx: mpsc::UnboundedReceiver<StatusMessage>,
    writer: FrameWriter<W>,
) -> usize
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while let Some(status) = rx.recv().await {
        if let Err(e) = writer.write_frame(&status).await {
            tracing::warn!(error = %e, "failed to write status frame; stopping forwarder");
            break;
        }
        written += 1;
    }
    written
}
