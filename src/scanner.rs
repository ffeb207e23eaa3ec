use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs;
use tracing::debug;

use crate::error::{Result, StreamError};

/// Returns the most recently modified file directly inside `folder` whose
/// name ends with `extension` (case-sensitive).
///
/// An empty `folder` means nothing has been chosen yet and yields `Ok(None)`
/// without touching the filesystem. Ties on the modification time resolve to
/// whichever entry the directory listing returned first.
pub async fn find_newest(folder: &Path, extension: &str) -> Result<Option<PathBuf>> {
    if folder.as_os_str().is_empty() {
        return Ok(None);
    }

    let access_error = |source| StreamError::FolderAccess {
        path: folder.to_path_buf(),
        source,
    };

    let mut entries = fs::read_dir(folder).await.map_err(access_error)?;
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    while let Some(entry) = entries.next_entry().await.map_err(access_error)? {
        let name = entry.file_name();
        if !name.to_string_lossy().ends_with(extension) {
            continue;
        }

        // Entries can vanish between listing and stat; skip those.
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().map_err(access_error)?;

        if newest.as_ref().map_or(true, |(best, _)| modified > *best) {
            newest = Some((modified, entry.path()));
        }
    }

    match &newest {
        Some((_, path)) => debug!("Newest candidate in {}: {}", folder.display(), path.display()),
        None => debug!("No {} files in {}", extension, folder.display()),
    }

    Ok(newest.map(|(_, path)| path))
}
