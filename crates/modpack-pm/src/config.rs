//! Pack-level settings consumed by the pipeline.
//!
//! A [`PackConfig`] is built once per pack (usually by the CLI from TOML
//! files) and never mutated after the run starts. Provider-specific knobs
//! live in the free-form `provider_settings` table, keyed by provider tag,
//! and are decoded by each provider through [`ProviderSettings::section`].

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::entry::{DependencyKind, Entry, ReleaseType};
use crate::error::{ModpackError, Result};

const CACHE_DIR_ENV: &str = "MODPACK_CACHE_DIR";

/// How dependency expansion treats entries appended during a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionMode {
    /// Keep expanding appended entries until nothing new is discovered
    FixedPoint,
    /// Expand only the entries present when the pass started
    SinglePass,
}

impl Default for ResolutionMode {
    fn default() -> Self {
        ResolutionMode::FixedPoint
    }
}

/// Loader version selector: a concrete build number or a named selector
/// (`recommended`, `latest`, a promotion or branch name, a game version).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LoaderVersion {
    Build(u64),
    Selector(String),
}

/// Free-form per-provider settings, keyed by provider tag
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ProviderSettings(HashMap<String, serde_json::Value>);

impl ProviderSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: impl Into<String>, value: serde_json::Value) {
        self.0.insert(tag.into(), value);
    }

    /// Decode the section for `tag`, falling back to the type's defaults
    pub fn section<T: DeserializeOwned + Default>(&self, tag: &str) -> Result<T> {
        match self.0.get(tag) {
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                ModpackError::InvalidConfig(format!("provider_settings.{}: {}", tag, e))
            }),
            None => Ok(T::default()),
        }
    }
}

/// Settings for one pack run
#[derive(Debug, Clone, Deserialize)]
pub struct PackConfig {
    #[serde(default)]
    pub name: String,

    #[serde(alias = "mc_version")]
    pub game_version: Option<String>,

    #[serde(alias = "forge")]
    pub loader_version: Option<LoaderVersion>,

    #[serde(default, alias = "optionals")]
    pub download_optional: bool,

    #[serde(default = "default_release_types", alias = "release_type")]
    pub release_types: Vec<ReleaseType>,

    #[serde(default)]
    pub resolution: ResolutionMode,

    #[serde(default)]
    pub provider_settings: ProviderSettings,

    #[serde(default = "default_output")]
    pub output: PathBuf,

    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Base directory for relative `local` declarations
    #[serde(default)]
    pub local_base: Option<PathBuf>,

    /// Write `<file>.url.txt` sidecars next to every downloadable entry
    #[serde(default = "default_true")]
    pub urls: bool,

    #[serde(default)]
    pub mods: Vec<serde_json::Value>,
}

fn default_release_types() -> Vec<ReleaseType> {
    vec![ReleaseType::Release, ReleaseType::Beta]
}

fn default_output() -> PathBuf {
    PathBuf::from("modpacks")
}

fn default_true() -> bool {
    true
}

impl PackConfig {
    pub fn new(name: impl Into<String>, game_version: impl Into<String>, loader: LoaderVersion) -> Self {
        Self {
            name: name.into(),
            game_version: Some(game_version.into()),
            loader_version: Some(loader),
            download_optional: false,
            release_types: default_release_types(),
            resolution: ResolutionMode::default(),
            provider_settings: ProviderSettings::default(),
            output: default_output(),
            cache_dir: None,
            local_base: None,
            urls: true,
            mods: Vec::new(),
        }
    }

    /// Reject configurations that cannot produce an install tree. Runs
    /// before any network activity.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ModpackError::InvalidConfig("pack has no name".to_string()));
        }
        if self.game_version.as_deref().map_or(true, |v| v.trim().is_empty()) {
            return Err(ModpackError::InvalidConfig(format!(
                "no game version defined for pack '{}'",
                self.name
            )));
        }
        if self.loader_version.is_none() {
            return Err(ModpackError::InvalidConfig(format!(
                "no loader version defined for pack '{}'",
                self.name
            )));
        }
        if self.release_types.is_empty() {
            return Err(ModpackError::InvalidConfig(format!(
                "pack '{}' accepts no release types",
                self.name
            )));
        }
        Ok(())
    }

    pub fn game_version(&self) -> &str {
        self.game_version.as_deref().unwrap_or_default()
    }

    /// Root of this pack's install tree: `<output>/<name>`
    pub fn pack_root(&self) -> PathBuf {
        expand_path(&self.output).join(&self.name)
    }

    /// Cache root, from config, then `MODPACK_CACHE_DIR`, then the platform
    /// cache directory
    pub fn cache_root(&self) -> PathBuf {
        match &self.cache_dir {
            Some(dir) => expand_path(dir),
            None => default_cache_dir(),
        }
    }

    pub fn local_base(&self) -> PathBuf {
        match &self.local_base {
            Some(dir) => expand_path(dir),
            None => PathBuf::from("."),
        }
    }

    pub fn dependency_policy(&self) -> DependencyPolicy {
        DependencyPolicy {
            download_optional: self.download_optional,
        }
    }
}

/// Decides which dependency edges produce new entries
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyPolicy {
    pub download_optional: bool,
}

impl DependencyPolicy {
    /// Required edges are always followed, optional ones only when enabled
    /// for the pack or the depending entry, embedded ones never.
    pub fn follows(&self, kind: DependencyKind, dependent: &Entry) -> bool {
        match kind {
            DependencyKind::Required => true,
            DependencyKind::Optional => dependent.optionals.unwrap_or(self.download_optional),
            DependencyKind::Embedded => false,
        }
    }
}

/// Platform cache directory, overridable through `MODPACK_CACHE_DIR`
pub fn default_cache_dir() -> PathBuf {
    if let Some(dir) = env::var(CACHE_DIR_ENV).ok().filter(|s| !s.is_empty()) {
        return expand_path(Path::new(&dir));
    }

    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "modpack") {
        proj_dirs.cache_dir().to_path_buf()
    } else if let Some(base) = directories::BaseDirs::new() {
        base.home_dir().join(".modpack").join("cache")
    } else {
        PathBuf::from(".modpack-cache")
    }
}

/// Expand a leading `~` and environment variables in a configured path
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Coordinate, ProviderKind};

    fn parse(json: serde_json::Value) -> PackConfig {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(serde_json::json!({"name": "pack", "mc_version": "1.12.2", "forge": "recommended"}));

        assert_eq!(config.game_version(), "1.12.2");
        assert_eq!(config.loader_version, Some(LoaderVersion::Selector("recommended".into())));
        assert!(!config.download_optional);
        assert_eq!(config.release_types, vec![ReleaseType::Release, ReleaseType::Beta]);
        assert_eq!(config.resolution, ResolutionMode::FixedPoint);
        assert!(config.urls);
        assert!(config.mods.is_empty());
        assert_eq!(config.pack_root(), PathBuf::from("modpacks/pack"));
        config.validate().unwrap();
    }

    #[test]
    fn test_heterogeneous_mods_list() {
        let config = parse(serde_json::json!({
            "name": "pack",
            "game_version": "1.12.2",
            "loader_version": 2847,
            "resolution": "single-pass",
            "mods": ["Applied Energistics 2", 223794, {"type": "direct", "url": "https://x/y.jar"}]
        }));

        assert_eq!(config.loader_version, Some(LoaderVersion::Build(2847)));
        assert_eq!(config.resolution, ResolutionMode::SinglePass);
        assert_eq!(config.mods.len(), 3);
        assert!(config.mods[0].is_string());
        assert!(config.mods[1].is_u64());
        assert!(config.mods[2].is_object());
    }

    #[test]
    fn test_missing_game_or_loader_version_is_fatal() {
        let no_game = parse(serde_json::json!({"name": "pack", "forge": "latest"}));
        assert!(matches!(no_game.validate(), Err(ModpackError::InvalidConfig(m)) if m.contains("game version")));

        let no_loader = parse(serde_json::json!({"name": "pack", "mc_version": "1.12.2"}));
        assert!(matches!(no_loader.validate(), Err(ModpackError::InvalidConfig(m)) if m.contains("loader version")));
    }

    #[test]
    fn test_provider_settings_section() {
        #[derive(Debug, Default, Deserialize)]
        struct Section {
            #[serde(default)]
            repository: Option<String>,
        }

        let config = parse(serde_json::json!({
            "name": "pack",
            "provider_settings": {"mvn": {"repository": "https://maven.example.org"}}
        }));

        let mvn: Section = config.provider_settings.section("mvn").unwrap();
        assert_eq!(mvn.repository.as_deref(), Some("https://maven.example.org"));
        let github: Section = config.provider_settings.section("github").unwrap();
        assert!(github.repository.is_none());
    }

    #[test]
    fn test_cache_root_prefers_configured_dir() {
        let mut config = PackConfig::new("pack", "1.12.2", LoaderVersion::Build(1));
        config.cache_dir = Some(PathBuf::from("/tmp/modpack-cache"));
        assert_eq!(config.cache_root(), PathBuf::from("/tmp/modpack-cache"));
    }

    #[test]
    fn test_dependency_policy() {
        let mut entry = Entry::new(ProviderKind::Direct, Coordinate::Direct { url: "u".into() });
        let off = DependencyPolicy { download_optional: false };
        let on = DependencyPolicy { download_optional: true };

        assert!(off.follows(DependencyKind::Required, &entry));
        assert!(!off.follows(DependencyKind::Optional, &entry));
        assert!(on.follows(DependencyKind::Optional, &entry));
        assert!(!on.follows(DependencyKind::Embedded, &entry));

        entry.optionals = Some(true);
        assert!(off.follows(DependencyKind::Optional, &entry));
    }
}
