//! Pack orchestration.
//!
//! A [`Pipeline`] runs one pack through every stage in order. Each stage
//! completes for all entries before the next one starts, and the entry set
//! is checked for required fields between stages.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::Cache;
use crate::config::PackConfig;
use crate::downloader::{DownloadResult, FileDownloader};
use crate::entry::{Entry, ProviderKind};
use crate::error::IncompleteEntry;
use crate::feature::{self, Feature};
use crate::http::Transport;
use crate::loader;
use crate::normalize::normalize;
use crate::path::{LOADER_DIR, MOD_DIR, SOURCE_DIR};
use crate::provider::ProviderManager;
use crate::resolver;
use crate::sidecar;
use crate::{ModpackError, Result};

/// Everything a pack run produced
#[derive(Debug, Default)]
pub struct PackResult {
    pub entries: Vec<Entry>,
    pub features: Vec<Feature>,
    /// Empty when the pack was only resolved
    pub downloads: Vec<DownloadResult>,
}

impl PackResult {
    pub fn from_cache(&self) -> usize {
        self.downloads.iter().filter(|d| d.from_cache).count()
    }
}

/// Result of one pack in a batch
#[derive(Debug)]
pub struct PackOutcome {
    pub name: String,
    pub result: Result<PackResult>,
}

pub struct Pipeline {
    config: PackConfig,
    transport: Arc<dyn Transport>,
    cache: Cache,
    providers: ProviderManager,
}

impl Pipeline {
    /// Validate the configuration and set up the standard providers. Fails
    /// before any network access when the configuration is unusable.
    pub fn new(config: PackConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let cache = Cache::new(config.cache_root());
        let downloader = Arc::new(FileDownloader::new(transport.clone(), cache.clone()));
        let providers = ProviderManager::from_config(&config, transport.clone(), downloader)?;

        Ok(Self {
            config,
            transport,
            cache,
            providers,
        })
    }

    /// Pipeline with a caller-supplied provider set
    pub fn with_providers(config: PackConfig, transport: Arc<dyn Transport>, providers: ProviderManager) -> Result<Self> {
        config.validate()?;
        let cache = Cache::new(config.cache_root());
        Ok(Self {
            config,
            transport,
            cache,
            providers,
        })
    }

    pub fn config(&self) -> &PackConfig {
        &self.config
    }

    pub fn providers(&self) -> &ProviderManager {
        &self.providers
    }

    pub fn pack_root(&self) -> PathBuf {
        self.config.pack_root()
    }

    /// Run every stage up to path resolution without touching the install
    /// tree.
    pub async fn resolve(&self) -> Result<PackResult> {
        let name = &self.config.name;
        log::info!("Resolving pack '{}' ({} declarations)", name, self.config.mods.len());

        let mut entries = normalize(&self.providers, &self.config.mods)?;

        for entry in entries.iter_mut() {
            self.providers.get(entry.kind)?.apply_defaults(entry);
        }

        entries = self.prepare_dependencies(entries).await?;
        entries = self.validate(entries)?;
        resolver::merge_duplicates(&mut entries);

        resolver::resolve_dependencies(
            &self.providers,
            &mut entries,
            self.config.resolution,
            &self.config.dependency_policy(),
        )
        .await?;

        let mut features = Vec::new();
        for index in 0..entries.len() {
            self.providers
                .get(entries[index].kind)?
                .resolve_feature_dependencies(index, &entries, &mut features);
        }
        feature::assign_feature_names(&mut entries, &features);

        for entry in entries.iter_mut() {
            self.providers.get(entry.kind)?.fill_information(entry).await?;
        }
        check_fields("fill_information", &entries, |e| {
            let mut missing = Vec::new();
            if e.name.is_none() {
                missing.push("name");
            }
            if e.package_type.is_none() {
                missing.push("package_type");
            }
            missing
        })?;

        for entry in entries.iter_mut() {
            self.providers.get(entry.kind)?.prepare_download(entry, &self.cache);
        }
        check_fields("prepare_download", &entries, |e| {
            let local = e.kind == ProviderKind::Local;
            let mut missing = Vec::new();
            if e.url.is_none() && !local {
                missing.push("url");
            }
            if e.file_name.is_none() {
                missing.push("file_name");
            }
            if e.cache_path.is_none() && !local {
                missing.push("cache_path");
            }
            missing
        })?;

        let artifact = loader::resolve_loader(self.transport.as_ref(), &self.config).await?;
        log::info!("Loader: {}", artifact.file_name);
        entries.push(loader::loader_entry(&artifact, &self.cache));

        for entry in entries.iter_mut() {
            self.providers.get(entry.kind)?.resolve_path(entry);
        }
        check_fields("resolve_path", &entries, |e| {
            let mut missing = Vec::new();
            if e.path.is_none() {
                missing.push("path");
            }
            if e.file_path.is_none() {
                missing.push("file_path");
            }
            if e.target_path.is_none() {
                missing.push("target_path");
            }
            missing
        })?;

        self.providers.persist_all()?;

        log::info!(
            "Resolved pack '{}': {} entries ({} dependencies), {} features",
            name,
            entries.len(),
            entries.iter().filter(|e| e.transient).count(),
            features.len()
        );
        Ok(PackResult {
            entries,
            features,
            downloads: Vec::new(),
        })
    }

    /// Resolve, then lay out the install tree under the pack root
    pub async fn run(&self) -> Result<PackResult> {
        let mut result = self.resolve().await?;
        let pack_root = self.pack_root();

        clear_output(&pack_root).await?;
        sidecar::write_all(&result.entries, &pack_root, self.config.urls).await?;

        for entry in &result.entries {
            let provider = self.providers.get(entry.kind)?;
            result.downloads.push(provider.download(entry, &pack_root).await?);
        }

        log::info!(
            "Pack '{}' written to {} ({} files, {} from cache)",
            self.config.name,
            pack_root.display(),
            result.downloads.len(),
            result.from_cache()
        );
        Ok(result)
    }

    async fn prepare_dependencies(&self, entries: Vec<Entry>) -> Result<Vec<Entry>> {
        let mut prepared = Vec::with_capacity(entries.len());

        for mut entry in entries {
            let provider = self.providers.get(entry.kind)?;
            match provider.prepare_dependencies(&mut entry).await {
                Ok(true) => prepared.push(entry),
                Ok(false) => log::warn!("{} could not be resolved, skipping", entry.label()),
                Err(e) if e.is_lookup_failure() => log::warn!("{}: {}, skipping", entry.label(), e),
                Err(e) => return Err(e),
            }
        }

        Ok(prepared)
    }

    fn validate(&self, entries: Vec<Entry>) -> Result<Vec<Entry>> {
        let mut valid = Vec::with_capacity(entries.len());
        for entry in entries {
            if self.providers.get(entry.kind)?.validate(&entry) {
                valid.push(entry);
            } else {
                log::warn!("{} failed validation, skipping", entry.label());
            }
        }
        Ok(valid)
    }
}

/// Fail with every entry that lacks a field `missing` reports
fn check_fields<F>(stage: &'static str, entries: &[Entry], missing: F) -> Result<()>
where
    F: Fn(&Entry) -> Vec<&'static str>,
{
    let incomplete: Vec<IncompleteEntry> = entries
        .iter()
        .filter_map(|e| {
            let keys = missing(e);
            (!keys.is_empty()).then(|| IncompleteEntry {
                entry: e.label(),
                keys,
            })
        })
        .collect();

    if incomplete.is_empty() {
        Ok(())
    } else {
        Err(ModpackError::MissingFields {
            stage,
            entries: incomplete,
        })
    }
}

/// Empty the mod and loader directories of a previous run
async fn clear_output(pack_root: &Path) -> Result<()> {
    for dir in [pack_root.join(SOURCE_DIR).join(MOD_DIR), pack_root.join(LOADER_DIR)] {
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => log::debug!("Cleared {}", dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&dir).await?;
    }
    Ok(())
}

/// Run (or only resolve) every pack in order. A failing pack is logged and
/// recorded; the remaining packs still run.
pub async fn run_batch(configs: Vec<PackConfig>, transport: Arc<dyn Transport>, resolve_only: bool) -> Vec<PackOutcome> {
    let mut outcomes = Vec::with_capacity(configs.len());

    for config in configs {
        let name = config.name.clone();
        let result = match Pipeline::new(config, transport.clone()) {
            Ok(pipeline) if resolve_only => pipeline.resolve().await,
            Ok(pipeline) => pipeline.run().await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            log::error!("Pack '{}' failed: {}", name, e);
        }
        outcomes.push(PackOutcome { name, result });
    }

    outcomes
}
