//! Loader installer lookup.
//!
//! The loader is resolved against the Forge promotions index and injected as
//! a synthetic direct entry, so it is cached, placed and downloaded like any
//! other artifact.

use std::collections::HashMap;

use serde::Deserialize;

use crate::cache::Cache;
use crate::config::{LoaderVersion, PackConfig};
use crate::entry::{Coordinate, Entry, PackageType, ProviderKind, Side};
use crate::http::{get_json, Transport};
use crate::{ModpackError, Result};

pub const DEFAULT_INDEX_URL: &str = "https://files.minecraftforge.net/maven/net/minecraftforge/forge/json";
const CACHE_TAG: &str = "loader";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoaderSettings {
    index_url: Option<String>,
}

/// One build in the index
#[derive(Debug, Clone, Deserialize)]
pub struct LoaderBuild {
    pub mcversion: String,
    pub version: String,
    #[serde(default)]
    pub branch: Option<String>,
}

/// The promotions index: named promotions and branches point at build
/// numbers, `mcversion` lists the builds per game version.
#[derive(Debug, Clone, Deserialize)]
pub struct LoaderIndex {
    pub webpath: String,
    #[serde(default)]
    pub promos: HashMap<String, u64>,
    #[serde(default)]
    pub branches: HashMap<String, u64>,
    #[serde(default)]
    pub mcversion: HashMap<String, Vec<u64>>,
    #[serde(default)]
    pub number: HashMap<String, LoaderBuild>,
}

/// Download coordinates of a resolved loader installer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderArtifact {
    pub url: String,
    pub file_name: String,
    /// `<game>-<version>[-<branch>]`
    pub long_version: String,
}

impl LoaderIndex {
    /// Build number for a selector.
    ///
    /// `recommended` and `latest` use the promotion for the game version.
    /// Other names are tried as a promotion, then a branch, then a game
    /// version whose highest build for `game_version` wins.
    pub fn resolve_build(&self, selector: &LoaderVersion, game_version: &str) -> Result<u64> {
        let name = match selector {
            LoaderVersion::Build(number) => return Ok(*number),
            LoaderVersion::Selector(name) => name.as_str(),
        };

        let build = if name == "recommended" || name == "latest" {
            self.promos.get(&format!("{}-{}", game_version, name)).copied()
        } else {
            self.promos
                .get(name)
                .or_else(|| self.branches.get(name))
                .copied()
                .or_else(|| {
                    self.mcversion.get(name).and_then(|builds| {
                        builds
                            .iter()
                            .copied()
                            .filter(|b| {
                                self.number
                                    .get(&b.to_string())
                                    .map_or(false, |info| info.mcversion == game_version)
                            })
                            .max()
                    })
                })
        };

        build.ok_or_else(|| {
            ModpackError::NotFound(format!("loader version '{}' for game version {}", name, game_version))
        })
    }

    pub fn artifact(&self, build: u64) -> Result<LoaderArtifact> {
        let info = self
            .number
            .get(&build.to_string())
            .ok_or_else(|| ModpackError::NotFound(format!("loader build {}", build)))?;

        let mut long_version = format!("{}-{}", info.mcversion, info.version);
        if let Some(branch) = info.branch.as_deref().filter(|b| !b.is_empty()) {
            long_version.push('-');
            long_version.push_str(branch);
        }
        let file_name = format!("forge-{}-installer.jar", long_version);
        let url = format!("{}/{}/{}", self.webpath.trim_end_matches('/'), long_version, file_name);

        Ok(LoaderArtifact {
            url,
            file_name,
            long_version,
        })
    }
}

/// Fetch the index and resolve the pack's loader selector
pub async fn resolve_loader(transport: &dyn Transport, config: &PackConfig) -> Result<LoaderArtifact> {
    let selector = config
        .loader_version
        .as_ref()
        .ok_or_else(|| ModpackError::InvalidConfig(format!("no loader version defined for pack '{}'", config.name)))?;
    let settings: LoaderSettings = config.provider_settings.section(CACHE_TAG)?;
    let index_url = settings.index_url.as_deref().unwrap_or(DEFAULT_INDEX_URL);

    let index: LoaderIndex = get_json(transport, index_url).await?;
    let build = index.resolve_build(selector, config.game_version())?;
    let artifact = index.artifact(build)?;
    log::debug!("Loader {:?} -> build {} ({})", selector, build, artifact.long_version);
    Ok(artifact)
}

/// Synthetic direct entry for the loader installer
pub fn loader_entry(artifact: &LoaderArtifact, cache: &Cache) -> Entry {
    let mut entry = Entry::new(
        ProviderKind::Direct,
        Coordinate::Direct {
            url: artifact.url.clone(),
        },
    );
    entry.name = Some(format!("forge-{}-installer", artifact.long_version));
    entry.package_type = Some(PackageType::Loader);
    entry.side = Some(Side::Both);
    entry.file_name = Some(artifact.file_name.clone());
    entry.url = Some(artifact.url.clone());
    entry.cache_base = Some(cache.base_dir(CACHE_TAG));
    entry.cache_path = Some(cache.artifact_dir(CACHE_TAG, &[artifact.long_version.as_str()]));
    entry
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn index() -> LoaderIndex {
        serde_json::from_value(serde_json::json!({
            "webpath": "https://files.example/maven/forge/",
            "promos": {"1.12.2-recommended": 2768, "1.12.2-latest": 2847, "stable": 2768},
            "branches": {"new": 2900},
            "mcversion": {"1.12.2": [2768, 2847, 2855], "1.12": [2400]},
            "number": {
                "2768": {"mcversion": "1.12.2", "version": "14.23.5.2768", "branch": null},
                "2847": {"mcversion": "1.12.2", "version": "14.23.5.2847", "branch": null},
                "2855": {"mcversion": "1.12.2", "version": "14.23.5.2855", "branch": "dev"},
                "2400": {"mcversion": "1.12", "version": "14.21.1.2400"}
            }
        }))
        .unwrap()
    }

    fn select(name: &str) -> LoaderVersion {
        LoaderVersion::Selector(name.to_string())
    }

    #[test]
    fn test_resolve_build_selectors() {
        let index = index();
        assert_eq!(index.resolve_build(&select("recommended"), "1.12.2").unwrap(), 2768);
        assert_eq!(index.resolve_build(&select("latest"), "1.12.2").unwrap(), 2847);
        assert_eq!(index.resolve_build(&select("stable"), "1.12.2").unwrap(), 2768);
        assert_eq!(index.resolve_build(&select("new"), "1.12.2").unwrap(), 2900);
        assert_eq!(index.resolve_build(&select("1.12.2"), "1.12.2").unwrap(), 2855);
        assert_eq!(index.resolve_build(&LoaderVersion::Build(1234), "1.12.2").unwrap(), 1234);
    }

    #[test]
    fn test_game_version_list_is_filtered() {
        let index = index();
        assert!(matches!(
            index.resolve_build(&select("1.12"), "1.12.2"),
            Err(ModpackError::NotFound(_))
        ));
        assert!(index.resolve_build(&select("recommended"), "1.7.10").is_err());
    }

    #[test]
    fn test_artifact_naming() {
        let index = index();
        let plain = index.artifact(2768).unwrap();
        assert_eq!(plain.long_version, "1.12.2-14.23.5.2768");
        assert_eq!(plain.file_name, "forge-1.12.2-14.23.5.2768-installer.jar");
        assert_eq!(
            plain.url,
            "https://files.example/maven/forge/1.12.2-14.23.5.2768/forge-1.12.2-14.23.5.2768-installer.jar"
        );

        assert_eq!(index.artifact(2855).unwrap().long_version, "1.12.2-14.23.5.2855-dev");
        assert!(index.artifact(1).is_err());
    }

    #[test]
    fn test_loader_entry() {
        let artifact = index().artifact(2768).unwrap();
        let entry = loader_entry(&artifact, &Cache::new(PathBuf::from("/cache")));

        assert_eq!(entry.kind, ProviderKind::Direct);
        assert_eq!(entry.package_type, Some(PackageType::Loader));
        assert_eq!(entry.url.as_deref(), Some(artifact.url.as_str()));
        assert_eq!(entry.cache_path, Some(PathBuf::from("/cache/loader/1.12.2-14.23.5.2768")));
    }
}
