//! Metadata files written next to placed artifacts.
//!
//! `<file>.url.txt` holds the decoded download URL so an installer can fetch
//! the artifact itself; `<file>.info.json` describes the optional feature an
//! entry seeds.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::entry::{Entry, ProviderKind};
use crate::Result;

#[derive(Debug, Serialize)]
struct FeatureInfo<'a> {
    feature: FeatureDescription<'a>,
}

#[derive(Debug, Serialize)]
struct FeatureDescription<'a> {
    name: &'a str,
    description: &'a str,
    selected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    recommendation: Option<&'a str>,
}

fn sidecar_path(pack_root: &Path, file_path: &str, suffix: &str) -> PathBuf {
    pack_root.join(format!("{}{}", file_path, suffix))
}

async fn write(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await?;
    Ok(())
}

/// Write `<file_path>.url.txt`. Local files and entries without a URL or
/// placement get none; returns the written path.
pub async fn write_url(entry: &Entry, pack_root: &Path) -> Result<Option<PathBuf>> {
    if matches!(entry.kind, ProviderKind::Local) {
        return Ok(None);
    }
    let (Some(url), Some(file_path)) = (&entry.url, &entry.file_path) else {
        log::warn!("{} has no download url, not writing url file", entry.label());
        return Ok(None);
    };

    let decoded = urlencoding::decode(url).map(|u| u.into_owned()).unwrap_or_else(|_| url.clone());
    let path = sidecar_path(pack_root, file_path, ".url.txt");
    write(&path, decoded.as_bytes()).await?;
    Ok(Some(path))
}

/// Write `<file_path>.info.json` for entries carrying both a `selected`
/// flag and a description.
pub async fn write_feature(entry: &Entry, pack_root: &Path) -> Result<Option<PathBuf>> {
    let (Some(selected), Some(description), Some(file_path)) =
        (entry.selected, entry.description.as_deref(), entry.file_path.as_deref())
    else {
        return Ok(None);
    };
    let Some(name) = entry.feature_name.as_deref().or(entry.name.as_deref()) else {
        return Ok(None);
    };

    let info = FeatureInfo {
        feature: FeatureDescription {
            name,
            description,
            selected,
            recommendation: entry.recommendation.as_deref(),
        },
    };
    let path = sidecar_path(pack_root, file_path, ".info.json");
    write(&path, &serde_json::to_vec_pretty(&info)?).await?;
    Ok(Some(path))
}

/// Write every sidecar for the pack. URL files only when `urls` is set.
pub async fn write_all(entries: &[Entry], pack_root: &Path, urls: bool) -> Result<usize> {
    let mut written = 0;
    for entry in entries {
        if write_feature(entry, pack_root).await?.is_some() {
            written += 1;
        }
        if urls && write_url(entry, pack_root).await?.is_some() {
            written += 1;
        }
    }
    log::debug!("Wrote {} sidecar files", written);
    Ok(written)
}
