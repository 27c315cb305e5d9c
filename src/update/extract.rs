//! Zip extraction with per-entry progress and cancellation checkpoints.
//!
//! Blocking; the update manager runs it on the blocking pool.

use crate::error::{HelperError, Result};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Extract every entry of `archive_path` into `target_dir`.
///
/// `on_progress` receives `floor(done * 100 / total)` once per entry, in
/// archive order. An empty archive extracts nothing and reports nothing.
/// Returns the number of entries extracted.
///
/// # Errors
///
/// Returns [`HelperError::Canceled`] if `cancel` is set before an entry,
/// or an extract error if the archive is unreadable, an entry name would
/// land outside `target_dir`, or a write fails.
pub fn extract<F>(
    archive_path: &Path,
    target_dir: &Path,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> Result<usize>
where
    F: FnMut(u8),
{
    let file = File::open(archive_path).map_err(|e| {
        HelperError::Extract(format!("cannot open {}: {e}", archive_path.display()))
    })?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| HelperError::Extract(format!("not a valid zip archive: {e}")))?;

    let total = archive.len();
    if total == 0 {
        tracing::info!(archive = %archive_path.display(), "archive has no entries");
        return Ok(0);
    }

    for index in 0..total {
        if cancel.is_cancelled() {
            return Err(HelperError::canceled());
        }

        let mut entry = archive
            .by_index(index)
            .map_err(|e| HelperError::Extract(format!("cannot read entry {index}: {e}")))?;
        // Rejects absolute names and `..` segments.
        let relative = entry.enclosed_name().ok_or_else(|| {
            HelperError::Extract(format!(
                "entry {:?} would escape the target directory",
                entry.name()
            ))
        })?;
        let out_path = target_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|e| write_error(&out_path, &e))?;
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent).map_err(|e| write_error(parent, &e))?;
            }
            let mut out = File::create(&out_path).map_err(|e| write_error(&out_path, &e))?;
            std::io::copy(&mut entry, &mut out).map_err(|e| write_error(&out_path, &e))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o777))
                        .map_err(|e| write_error(&out_path, &e))?;
                }
            }
        }

        on_progress(percent_of(index + 1, total));
    }

    Ok(total)
}

fn write_error(path: &Path, e: &std::io::Error) -> HelperError {
    HelperError::Extract(format!("cannot write {}: {e}", path.display()))
}

fn percent_of(done: usize, total: usize) -> u8 {
    u8::try_from(done * 100 / total).unwrap_or(100)
}
