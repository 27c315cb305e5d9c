//! Tracing setup for the helper process.
//!
//! Two sinks:
//! - stderr, filtered by `RUST_LOG` (default `info`). Stdout is never used:
//!   it carries protocol frames.
//! - the append-only side-channel log file (`auto-update.log` in the helper
//!   home), one plain-text line per event.
//!
//! The log file is fire-and-forget. If its directory cannot be created the
//! file sink is skipped, and write failures are dropped by the non-blocking
//! appender. Neither ever reaches the host or stops an update.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the file writer.
pub fn init_tracing(log_file: &Path) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match open_log_appender(log_file) {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
    if installed.is_err() {
        // A subscriber already exists (tests, embedding); keep it.
        return None;
    }
    guard
}

/// Never-rotating appender for `log_file`, or `None` if it cannot be opened.
fn open_log_appender(log_file: &Path) -> Option<RollingFileAppender> {
    let dir = log_file.parent()?;
    let name = log_file.file_name()?.to_str()?;
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("log file disabled: cannot create {}: {e}", dir.display());
        return None;
    }
    match RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
    {
        Ok(appender) => Some(appender),
        Err(e) => {
            eprintln!("log file disabled: {e}");
            None
        }
    }
}
