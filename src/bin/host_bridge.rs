//! Native messaging host binary for CJT Helper updates.
//!
//! The browser starts this process and speaks length-prefixed JSON over
//! stdin/stdout. All tracing/diagnostic output goes to stderr and the
//! side-channel log file so that stdout remains a clean frame channel.

use cjt_helper::HelperConfig;
use cjt_helper::diagnostics::init_tracing;
use cjt_helper::helper_dirs;
use cjt_helper::host::session::{SessionOptions, run_stdio_session};
use cjt_helper::update::HttpTransport;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_tracing(&helper_dirs::log_file());

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "native host started");

    let config = HelperConfig::load_or_default();
    let transport = HttpTransport::new(&config).map_err(|e| {
        tracing::error!(error = %e, "cannot initialise HTTP transport");
        anyhow::anyhow!("cjt-helper-host failed: {e}")
    })?;

    run_stdio_session(SessionOptions {
        transport: Arc::new(transport),
        config,
        clean_policy: None,
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "cjt-helper-host exited with error");
        anyhow::anyhow!("cjt-helper-host failed: {e}")
    })?;

    tracing::info!("native host shut down cleanly");
    Ok(())
}
