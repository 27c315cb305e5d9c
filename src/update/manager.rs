//! Single-flight update task.
//!
//! At most one update runs at a time. [`UpdateManager::try_start`] rejects a
//! second request instead of queueing it; [`UpdateManager::request_cancel`]
//! only sets the running task's token and returns immediately.
//!
//! ```text
//! Idle --try_start--> Running --+--> Completed --+
//!                               +--> Canceled  --+--> slot cleared (Idle)
//!                               +--> Failed    --+
//! ```
//!
//! Pipeline: start log, download to a fresh temp dir, clean the target,
//! extract. The target is only cleaned after the download succeeds, so a
//! failed download never destroys a working install.

use crate::config::HelperConfig;
use crate::error::{HelperError, Result};
use crate::host::contract::{ALREADY_RUNNING_TEXT, MISSING_URL_TEXT, StatusMessage};
use crate::host::status::StatusSink;
use crate::update::download::{DownloadProgress, download};
use crate::update::extract::extract;
use crate::update::guard::{CleanOutcome, CleanPolicy, ensure_clean_target_dir, resolve_target_dir};
use crate::update::transport::Transport;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Log text sent when an accepted update begins downloading.
pub const START_TEXT: &str = "starting update download...";

/// Log text sent between download and extraction.
pub const DOWNLOAD_DONE_TEXT: &str = "download complete, extracting...";

/// File name of the archive inside the per-attempt temp dir.
const ARCHIVE_NAME: &str = "cjt_helper_update.zip";

/// Prefix of the per-attempt temp dir.
const SCRATCH_PREFIX: &str = "cjt_helper_update_";

/// A validated `start_update` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub download_url: String,
    pub target_dir: PathBuf,
}

impl UpdateRequest {
    /// Build a request from the raw command fields.
    ///
    /// # Errors
    ///
    /// Returns a command error when the download URL is missing or empty.
    pub fn from_fields(download_url: Option<String>, target_dir: Option<&str>) -> Result<Self> {
        let download_url = download_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| HelperError::Command(MISSING_URL_TEXT.to_owned()))?;
        Ok(Self {
            download_url,
            target_dir: resolve_target_dir(target_dir),
        })
    }
}

struct ActiveUpdate {
    id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Shared {
    slot: Mutex<Option<ActiveUpdate>>,
    transport: Arc<dyn Transport>,
    sink: StatusSink,
    config: HelperConfig,
    clean_policy: Option<CleanPolicy>,
    next_id: AtomicU64,
}

/// Owner of the single update slot.
#[derive(Clone)]
pub struct UpdateManager {
    shared: Arc<Shared>,
}

impl UpdateManager {
    /// Manager that cleans targets according to [`CleanPolicy::standard`].
    pub fn new(transport: Arc<dyn Transport>, sink: StatusSink, config: HelperConfig) -> Self {
        Self::build(transport, sink, config, None)
    }

    /// Manager with a fixed cleaning policy.
    pub fn with_clean_policy(
        transport: Arc<dyn Transport>,
        sink: StatusSink,
        config: HelperConfig,
        policy: CleanPolicy,
    ) -> Self {
        Self::build(transport, sink, config, Some(policy))
    }

    fn build(
        transport: Arc<dyn Transport>,
        sink: StatusSink,
        config: HelperConfig,
        clean_policy: Option<CleanPolicy>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(None),
                transport,
                sink,
                config,
                clean_policy,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Start `request` in the background unless an update is already active.
    ///
    /// Returns the id of the new run. Progress and the terminal status are
    /// reported through the sink, never through this return value.
    ///
    /// # Errors
    ///
    /// Returns a command error with [`ALREADY_RUNNING_TEXT`] if an update is
    /// active; the active update is not touched.
    pub async fn try_start(&self, request: UpdateRequest) -> Result<u64> {
        let mut slot = self.shared.slot.lock().await;
        if slot.as_ref().is_some_and(|active| !active.handle.is_finished()) {
            tracing::warn!("reject: update already running");
            return Err(HelperError::Command(ALREADY_RUNNING_TEXT.to_owned()));
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        tracing::info!(
            id,
            url = %request.download_url,
            target = %request.target_dir.display(),
            "start_update: task created"
        );
        let handle = tokio::spawn(run_update(
            Arc::clone(&self.shared),
            id,
            cancel.clone(),
            request,
        ));
        *slot = Some(ActiveUpdate { id, cancel, handle });
        Ok(id)
    }

    /// Signal the running update to stop at its next checkpoint.
    ///
    /// Returns whether an update was running. Does not wait for it to stop.
    pub async fn request_cancel(&self) -> bool {
        let slot = self.shared.slot.lock().await;
        match slot.as_ref() {
            Some(active) => {
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.shared
            .slot
            .lock()
            .await
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// Cancel any running update and wait up to `grace` for it to finish.
    pub async fn shutdown(&self, grace: Duration) {
        let active = self.shared.slot.lock().await.take();
        let Some(active) = active else {
            return;
        };
        active.cancel.cancel();
        if tokio::time::timeout(grace, active.handle).await.is_err() {
            tracing::warn!(id = active.id, "update did not stop within the shutdown grace period");
        }
    }
}

async fn run_update(
    shared: Arc<Shared>,
    id: u64,
    cancel: CancellationToken,
    request: UpdateRequest,
) {
    let terminal = match shared.run_pipeline(&cancel, &request).await {
        Ok(path) => {
            tracing::info!(id, path = %path, "complete");
            StatusMessage::complete(path)
        }
        Err(HelperError::Canceled(reason)) => {
            tracing::info!(id, reason = %reason, "canceled");
            StatusMessage::canceled(reason)
        }
        Err(e) => {
            tracing::error!(id, error = %e, "update failed");
            StatusMessage::error(e.to_string())
        }
    };

    // Free the slot before the host hears the outcome, so a start_update
    // sent in reaction to the terminal frame is accepted.
    shared.release(id).await;
    shared.sink.send(terminal);
}

impl Shared {
    async fn release(&self, id: u64) {
        let mut slot = self.slot.lock().await;
        if slot.as_ref().is_some_and(|active| active.id == id) {
            *slot = None;
        }
    }

    /// Returns the target path reported by the `complete` status.
    async fn run_pipeline(
        &self,
        cancel: &CancellationToken,
        request: &UpdateRequest,
    ) -> Result<String> {
        let target = &request.target_dir;
        tokio::fs::create_dir_all(target).await.map_err(|e| {
            HelperError::Io(std::io::Error::new(
                e.kind(),
                format!("cannot create target directory {}: {e}", target.display()),
            ))
        })?;

        tracing::info!("start_update: downloading update package");
        self.sink.send(StatusMessage::log(START_TEXT));

        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let scratch = match &self.config.scratch_dir {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        let archive = scratch.path().join(ARCHIVE_NAME);

        let result = self
            .download_and_install(cancel, &request.download_url, target, &archive)
            .await;

        // Best effort: leftover temp files are not worth failing an update over.
        if let Err(e) = scratch.close() {
            tracing::debug!(error = %e, "ignoring temp dir cleanup failure");
        }

        result.map(|()| target.to_string_lossy().into_owned())
    }

    async fn download_and_install(
        &self,
        cancel: &CancellationToken,
        url: &str,
        target: &Path,
        archive: &Path,
    ) -> Result<()> {
        let sink = self.sink.clone();
        download(
            self.transport.as_ref(),
            url,
            archive,
            cancel,
            &self.config,
            move |progress| match progress {
                DownloadProgress::Percent(percent) => {
                    sink.send(StatusMessage::download_percent(percent));
                }
                DownloadProgress::Pulse { .. } => sink.send(StatusMessage::download_ping()),
            },
        )
        .await?;

        let policy = self
            .clean_policy
            .clone()
            .unwrap_or_else(CleanPolicy::standard);
        let dir = target.to_path_buf();
        let outcome = tokio::task::spawn_blocking(move || ensure_clean_target_dir(&dir, &policy))
            .await
            .map_err(|e| HelperError::Cleanup(format!("cleanup task failed: {e}")))??;
        if outcome == CleanOutcome::Skipped {
            tracing::info!(target = %target.display(), "extracting over existing contents");
        }

        tracing::info!("download_done: extracting");
        self.sink.send(StatusMessage::log(DOWNLOAD_DONE_TEXT));

        let sink = self.sink.clone();
        let cancel = cancel.clone();
        let archive = archive.to_path_buf();
        let dir = target.to_path_buf();
        tokio::task::spawn_blocking(move || {
            extract(&archive, &dir, &cancel, |percent| {
                sink.send(StatusMessage::extract_percent(percent));
            })
        })
        .await
        .map_err(|e| HelperError::Extract(format!("extract task failed: {e}")))??;

        Ok(())
    }
}
