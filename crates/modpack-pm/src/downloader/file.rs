//! Cache-aware file downloader.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::Cache;
use crate::http::Transport;
use crate::{ModpackError, Result};

use super::checksum::{verify_checksum, ChecksumType};

/// Outcome of placing one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    pub entry: String,
    pub path: PathBuf,
    pub from_cache: bool,
}

/// Places artifacts in the install tree, reusing the cache when possible
pub struct FileDownloader {
    transport: Arc<dyn Transport>,
    cache: Cache,
}

impl FileDownloader {
    pub fn new(transport: Arc<dyn Transport>, cache: Cache) -> Self {
        Self { transport, cache }
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Place the artifact for `label` at `dest`.
    ///
    /// When `cache_dir` holds a file it is copied and no request is made.
    /// Otherwise `url` is downloaded to `dest`, checked against `checksum`
    /// if one is given, and copied into `cache_dir`.
    pub async fn fetch(
        &self,
        label: &str,
        url: &str,
        dest: &Path,
        cache_dir: Option<&Path>,
        checksum: Option<&str>,
    ) -> Result<DownloadResult> {
        if let Some(dir) = cache_dir {
            if self.cache.restore(dir, dest)? {
                log::info!("{}: reused cached {}", label, dest.display());
                return Ok(DownloadResult {
                    entry: label.to_string(),
                    path: dest.to_path_buf(),
                    from_cache: true,
                });
            }
        }

        log::info!("{}: downloading {}", label, url);
        let written = self
            .transport
            .download(url, dest)
            .await
            .map_err(|e| ModpackError::DownloadFailed {
                entry: label.to_string(),
                reason: e.to_string(),
            })?;
        log::debug!("{}: wrote {} bytes to {}", label, written, dest.display());

        if let Some(expected) = checksum {
            self.verify(label, dest, expected).await?;
        }

        if let Some(dir) = cache_dir {
            if let Err(e) = self.cache.store(dir, dest) {
                log::warn!("{}: could not store in cache {}: {}", label, dir.display(), e);
            }
        }

        Ok(DownloadResult {
            entry: label.to_string(),
            path: dest.to_path_buf(),
            from_cache: false,
        })
    }

    async fn verify(&self, label: &str, dest: &Path, expected: &str) -> Result<()> {
        let Some(checksum_type) = ChecksumType::from_hex_length(expected.trim().len()) else {
            log::warn!("{}: ignoring checksum of unknown type '{}'", label, expected);
            return Ok(());
        };

        if !verify_checksum(dest, expected, checksum_type).await? {
            let _ = tokio::fs::remove_file(dest).await;
            return Err(ModpackError::ChecksumMismatch(label.to_string()));
        }
        log::debug!("{}: {:?} checksum verified", label, checksum_type);
        Ok(())
    }

    /// Copy a file from the local filesystem into the install tree
    pub async fn copy_local(&self, label: &str, source: &Path, dest: &Path) -> Result<DownloadResult> {
        if !source.is_file() {
            return Err(ModpackError::DownloadFailed {
                entry: label.to_string(),
                reason: format!("{} does not exist", source.display()),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(source, dest).await?;
        log::info!("{}: copied {}", label, source.display());

        Ok(DownloadResult {
            entry: label.to_string(),
            path: dest.to_path_buf(),
            from_cache: false,
        })
    }
}
