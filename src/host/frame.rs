//! Length-prefixed JSON framing over a byte stream.
//!
//! Each frame is a 4-byte little-endian body length followed by that many
//! bytes of UTF-8 JSON. This is the browser native-messaging wire format.

use crate::error::{HelperError, Result};
use serde::Serialize;
use serde_json::Value;
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Encode a payload as a complete frame (prefix + JSON body).
///
/// # Errors
///
/// Returns a channel error if the payload cannot be serialized or its body
/// does not fit in a `u32` length.
pub fn encode_frame<T: Serialize>(payload: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(payload)
        .map_err(|e| HelperError::Channel(format!("failed to serialize frame: {e}")))?;
    let len = u32::try_from(body.len())
        .map_err(|_| HelperError::Channel(format!("frame too large: {} bytes", body.len())))?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + body.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Reads frames from the inbound stream.
pub struct FrameReader<R> {
    inner: R,
    max_frame_bytes: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame_bytes: usize) -> Self {
        Self {
            inner,
            max_frame_bytes,
        }
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` at end of stream: no bytes, a short length prefix,
    /// or a zero-length frame all mean the host has gone away.
    ///
    /// # Errors
    ///
    /// Returns [`HelperError::Protocol`] when the body is shorter than its
    /// declared length, exceeds the configured limit, or is not JSON. The
    /// stream cannot be resynchronised after any of these.
    pub async fn read_frame(&mut self) -> Result<Option<Value>> {
        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        let mut filled = 0;
        while filled < LENGTH_PREFIX_LEN {
            let n = self
                .inner
                .read(&mut prefix[filled..])
                .await
                .map_err(|e| HelperError::Protocol(format!("failed to read frame length: {e}")))?;
            if n == 0 {
                if filled > 0 {
                    tracing::debug!(bytes = filled, "stream ended inside a length prefix");
                }
                return Ok(None);
            }
            filled += n;
        }

        let len = u32::from_le_bytes(prefix) as usize;
        if len == 0 {
            return Ok(None);
        }
        if len > self.max_frame_bytes {
            return Err(HelperError::Protocol(format!(
                "frame of {len} bytes exceeds the {} byte limit",
                self.max_frame_bytes
            )));
        }

        let mut body = vec![0u8; len];
        self.inner.read_exact(&mut body).await.map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                HelperError::Protocol(format!(
                    "truncated frame: stream ended before {len} body bytes"
                ))
            } else {
                HelperError::Protocol(format!("failed to read frame body: {e}"))
            }
        })?;

        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| HelperError::Protocol(format!("frame body is not valid JSON: {e}")))
    }
}

/// Writes frames to the outbound stream.
///
/// Cloneable; every clone shares one lock so frames from concurrent callers
/// never interleave.
pub struct FrameWriter<W> {
    inner: Arc<Mutex<W>>,
}

impl<W> Clone for FrameWriter<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Serialize `payload`, write it as one frame, and flush.
    ///
    /// # Errors
    ///
    /// Returns a channel error if serialization or the write fails.
    pub async fn write_frame<T: Serialize>(&self, payload: &T) -> Result<()> {
        let frame = encode_frame(payload)?;
        let mut w = self.inner.lock().await;
        w.write_all(&frame)
            .await
            .map_err(|e| HelperError::Channel(format!("failed to write frame: {e}")))?;
        w.flush()
            .await
            .map_err(|e| HelperError::Channel(format!("failed to flush frame: {e}")))?;
        Ok(())
    }
}
