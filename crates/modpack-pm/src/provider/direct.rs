//! Plain URL downloads.
//!
//! Besides declared `direct` entries, this provider downloads every entry
//! whose backend resolved to a URL: those providers switch the entry's kind
//! to [`ProviderKind::Direct`] in `prepare_download`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::traits::{decode, file_name_from_url, name_from_file, Declaration, Provider};
use crate::cache::Cache;
use crate::downloader::{sha256_hex, DownloadResult, FileDownloader};
use crate::entry::{Coordinate, Entry, PackageType, ProviderKind, Side};
use crate::{ModpackError, Result};

#[derive(Deserialize)]
struct DirectDeclaration {
    url: String,
}

pub struct DirectProvider {
    downloader: Arc<FileDownloader>,
}

impl DirectProvider {
    pub fn new(downloader: Arc<FileDownloader>) -> Self {
        Self { downloader }
    }
}

#[async_trait]
impl Provider for DirectProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Direct
    }

    fn required_attributes(&self) -> &'static [&'static str] {
        &["url"]
    }

    fn coordinate(&self, decl: &Declaration) -> Result<Coordinate> {
        let decl: DirectDeclaration = decode(self.kind(), decl)?;
        Ok(Coordinate::Direct { url: decl.url })
    }

    fn apply_defaults(&self, entry: &mut Entry) {
        entry.side.get_or_insert(Side::Both);
        if entry.url.is_none() {
            if let Coordinate::Direct { url } = &entry.coordinate {
                entry.url = Some(url.clone());
            }
        }
    }

    async fn fill_information(&self, entry: &mut Entry) -> Result<()> {
        if entry.file_name.is_none() {
            entry.file_name = entry.url.as_deref().and_then(file_name_from_url);
        }
        if entry.name.is_none() {
            entry.name = entry.file_name.as_deref().map(name_from_file);
        }
        entry.package_type.get_or_insert(PackageType::Mod);
        Ok(())
    }

    fn prepare_download(&self, entry: &mut Entry, cache: &Cache) {
        if entry.cache_path.is_some() {
            return;
        }
        if let Some(url) = &entry.url {
            let key = sha256_hex(url);
            entry.cache_base = Some(cache.base_dir(self.kind().tag()));
            entry.cache_path = Some(cache.artifact_dir(self.kind().tag(), &[key.as_str()]));
        }
    }

    async fn download(&self, entry: &Entry, pack_root: &Path) -> Result<DownloadResult> {
        let label = entry.label();
        let (Some(url), Some(file_path)) = (&entry.url, &entry.file_path) else {
            return Err(ModpackError::DownloadFailed {
                entry: label,
                reason: "url or file path not resolved".to_string(),
            });
        };

        self.downloader
            .fetch(
                &label,
                url,
                &pack_root.join(file_path),
                entry.cache_path.as_deref(),
                entry.checksum.as_deref(),
            )
            .await
    }
}
