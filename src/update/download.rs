//! Streaming archive download with progress and cancellation checkpoints.

use crate::config::HelperConfig;
use crate::error::{HelperError, Result};
use crate::update::transport::Transport;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Progress reported while the body streams to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadProgress {
    /// Whole-number percentage of a body with a declared length.
    ///
    /// Values never decrease and are never repeated.
    Percent(u8),
    /// Periodic liveness signal for a body of unknown length.
    Pulse { downloaded: u64 },
}

/// Download `url` into `dest`, returning the number of bytes written.
///
/// Cancellation is checked before every chunk read and while waiting on
/// one; a canceled download returns [`HelperError::Canceled`] and leaves
/// the partial file for the caller's temp-dir cleanup.
///
/// # Errors
///
/// Returns a download error if the request, a body read, or a file write
/// fails.
pub async fn download<F>(
    transport: &dyn Transport,
    url: &str,
    dest: &Path,
    cancel: &CancellationToken,
    config: &HelperConfig,
    mut on_progress: F,
) -> Result<u64>
where
    F: FnMut(DownloadProgress),
{
    let stream = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(HelperError::canceled()),
        opened = transport.open(url) => opened?,
    };
    let total = stream.total.filter(|&total| total > 0);
    let mut body = stream.body;

    let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
        HelperError::Download(format!("cannot create temp file {}: {e}", dest.display()))
    })?;

    let ping_interval = config.ping_interval_bytes().max(1);
    let mut buf = vec![0u8; config.chunk_size.max(1)];
    let mut downloaded: u64 = 0;
    let mut last_percent: Option<u8> = None;
    let mut last_ping: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(HelperError::canceled());
        }
        let n = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(HelperError::canceled()),
            read = fill_chunk(&mut body, &mut buf) => {
                read.map_err(|e| HelperError::Download(format!("read failed: {e}")))?
            }
        };
        if n == 0 {
            break;
        }

        file.write_all(&buf[..n])
            .await
            .map_err(|e| HelperError::Download(format!("write failed: {e}")))?;
        downloaded += n as u64;

        match total {
            Some(total) => {
                let percent = percent_of(downloaded, total);
                if last_percent != Some(percent) {
                    last_percent = Some(percent);
                    on_progress(DownloadProgress::Percent(percent));
                }
            }
            None => {
                let pings = downloaded / ping_interval;
                if pings > last_ping {
                    last_ping = pings;
                    on_progress(DownloadProgress::Pulse { downloaded });
                }
            }
        }
    }

    file.flush()
        .await
        .map_err(|e| HelperError::Download(format!("write failed: {e}")))?;

    tracing::info!(url, bytes = downloaded, "download finished");
    Ok(downloaded)
}

/// `floor(done * 100 / total)`, capped at 100 for bodies longer than declared.
fn percent_of(done: u64, total: u64) -> u8 {
    let percent = u128::from(done) * 100 / u128::from(total);
    u8::try_from(percent.min(100)).unwrap_or(100)
}

/// Read until `buf` is full or the stream ends.
async fn fill_chunk<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
