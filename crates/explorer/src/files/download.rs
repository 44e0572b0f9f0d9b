//! Saving downloaded files locally.
//!
//! Downloads are written to a hidden temporary file in the destination
//! directory and renamed into place, so a partially written file never shows
//! up under its final name.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{ExplorerError, ValidationError};

/// Save `data` as `dest_dir/filename` and return the final path.
///
/// `filename` must be a bare file name; anything that would escape
/// `dest_dir` is rejected.
pub async fn save_atomic(
    dest_dir: &Path,
    filename: &str,
    data: &[u8],
) -> Result<PathBuf, ExplorerError> {
    if filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains('/')
        || filename.contains('\\')
    {
        return Err(ValidationError::InvalidName(filename.to_string()).into());
    }

    fs::create_dir_all(dest_dir).await?;

    let destination = dest_dir.join(filename);
    let temp_path = dest_dir.join(format!(
        ".download_{:x}_{}.tmp",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos(),
        rand::random::<u32>()
    ));

    if let Err(e) = write_file(&temp_path, data).await {
        if let Err(cleanup) = fs::remove_file(&temp_path).await {
            warn!(path = ?temp_path, error = %cleanup, "Failed to cleanup temp file after write error");
        }
        return Err(e.into());
    }

    if let Err(e) = fs::rename(&temp_path, &destination).await {
        if let Err(cleanup) = fs::remove_file(&temp_path).await {
            warn!(path = ?temp_path, error = %cleanup, "Failed to cleanup temp file after rename error");
        }
        return Err(e.into());
    }

    debug!(path = ?destination, size = data.len(), "Saved download");
    Ok(destination)
}

async fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}
