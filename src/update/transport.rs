//! Byte transports the downloader can pull an archive from.

use crate::config::HelperConfig;
use crate::error::{HelperError, Result};
use futures_util::TryStreamExt;
use std::pin::Pin;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

/// An opened response body.
pub struct ByteStream {
    /// Declared body length, when the server sent one.
    pub total: Option<u64>,
    pub body: Pin<Box<dyn AsyncRead + Send>>,
}

/// Source of update archive bytes.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Start fetching `url` and return its body as a stream.
    async fn open(&self, url: &str) -> Result<ByteStream>;
}

/// HTTP(S) transport backed by `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a client from the helper config.
    ///
    /// # Errors
    ///
    /// Returns a download error if the TLS backend cannot be initialised.
    pub fn new(config: &HelperConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| HelperError::Download(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn open(&self, url: &str) -> Result<ByteStream> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, url, "update request failed");
                HelperError::Download(format!("connection error: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = %status, url, "update request returned error");
            return Err(HelperError::Download(format!("server returned {status}")));
        }

        let total = response.content_length();
        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(ByteStream {
            total,
            body: Box::pin(StreamReader::new(stream)),
        })
    }
}
