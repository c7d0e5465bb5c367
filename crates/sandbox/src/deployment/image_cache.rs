//! Shared on-disk image cache. Concurrent pulls of the same image must
//! not corrupt the cache: a download writes to a temp path first and is
//! only renamed into place on success, so a reader never observes a
//! partially-written entry (§5 shared-resource policy).

use std::path::{Path, PathBuf};

use teamcore_foundation::{Error, Result};

const CACHE_ROOT: &str = ".teamcore";

/// Root directory for the cache: `~/.teamcore/cache`.
pub fn cache_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| Error::Internal("no home directory".into()))?;
    Ok(home.join(CACHE_ROOT).join("cache"))
}

/// `image:tag` -> cache file name, replacing `/` and `:` with `_`.
pub fn sanitize_image_name(image: &str) -> String {
    image.replace('/', "_").replace(':', "_")
}

/// Full path an image would occupy in the cache, e.g.
/// `~/.teamcore/cache/python_3.11.sif`.
pub fn image_cache_path(image: &str) -> Result<PathBuf> {
    Ok(cache_dir()?.join(format!("{}.sif", sanitize_image_name(image))))
}

/// Whether the image is already cached on disk.
pub fn is_cached(image: &str) -> Result<bool> {
    Ok(image_cache_path(image)?.is_file())
}

/// Atomically mark an image as cached by renaming a completed download
/// at `downloaded_path` into the cache. Renaming within the same
/// filesystem is atomic, so a concurrent reader either sees the old
/// absence or the fully-written file, never a partial one.
pub fn commit_download(image: &str, downloaded_path: &Path) -> Result<PathBuf> {
    let dest = image_cache_path(image)?;
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(downloaded_path, &dest)?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_slashes_and_colons() {
        assert_eq!(sanitize_image_name("python:3.11"), "python_3.11");
        assert_eq!(sanitize_image_name("ghcr.io/org/repo:tag"), "ghcr.io_org_repo_tag");
    }
}
