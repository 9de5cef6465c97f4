//! Files already on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::traits::{decode, name_from_file, Declaration, Provider};
use crate::config::expand_path;
use crate::downloader::{DownloadResult, FileDownloader};
use crate::entry::{Coordinate, Entry, PackageType, ProviderKind};
use crate::{ModpackError, Result};

#[derive(Deserialize)]
struct LocalDeclaration {
    file: PathBuf,
}

/// Copies declared files into the install tree. Relative paths resolve
/// against the pack's local base directory. Nothing is cached.
pub struct LocalProvider {
    base: PathBuf,
    downloader: Arc<FileDownloader>,
}

impl LocalProvider {
    pub fn new(base: PathBuf, downloader: Arc<FileDownloader>) -> Self {
        Self { base, downloader }
    }

    fn source(&self, entry: &Entry) -> Option<PathBuf> {
        match &entry.coordinate {
            Coordinate::Local { file } => {
                let file = expand_path(file);
                Some(if file.is_absolute() { file } else { self.base.join(file) })
            }
            _ => None,
        }
    }
}

#[async_trait]
impl Provider for LocalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn required_attributes(&self) -> &'static [&'static str] {
        &["file"]
    }

    fn coordinate(&self, decl: &Declaration) -> Result<Coordinate> {
        let decl: LocalDeclaration = decode(self.kind(), decl)?;
        Ok(Coordinate::Local { file: decl.file })
    }

    async fn prepare_dependencies(&self, entry: &mut Entry) -> Result<bool> {
        match self.source(entry) {
            Some(source) if source.is_file() => Ok(true),
            Some(source) => Err(ModpackError::NotFound(source.display().to_string())),
            None => Ok(false),
        }
    }

    async fn fill_information(&self, entry: &mut Entry) -> Result<()> {
        if entry.file_name.is_none() {
            if let Coordinate::Local { file } = &entry.coordinate {
                entry.file_name = file.file_name().map(|n| n.to_string_lossy().into_owned());
            }
        }
        if entry.name.is_none() {
            entry.name = entry.file_name.as_deref().map(name_from_file);
        }
        entry.package_type.get_or_insert(PackageType::Mod);
        Ok(())
    }

    async fn download(&self, entry: &Entry, pack_root: &Path) -> Result<DownloadResult> {
        let label = entry.label();
        let (Some(source), Some(file_path)) = (self.source(entry), &entry.file_path) else {
            return Err(ModpackError::DownloadFailed {
                entry: label,
                reason: "source or file path not resolved".to_string(),
            });
        };

        self.downloader
            .copy_local(&label, &source, &pack_root.join(file_path))
            .await
    }
}
