//! Package registry backend (tag `curse`).
//!
//! Addons are looked up by exact name or id in the bulk addon index. Their
//! file listings are fetched lazily and kept for the rest of the run, so a
//! pack touches each addon's listing at most once. With
//! `provider_settings.curse.persist_snapshot` the whole metadata cache is
//! written to `<cache>/curse/snapshot.json` at the end of a run and loaded
//! again by the next one.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::traits::{decode, Declaration, Provider};
use crate::cache::Cache;
use crate::config::{DependencyPolicy, PackConfig};
use crate::entry::{Coordinate, DependencyKind, Entry, PackageType, ProviderKind, ReleaseType};
use crate::http::{get_json, HttpError, Transport};
use crate::resolver;
use crate::{ModpackError, Result};

const DEFAULT_API_URL: &str = "https://cursemeta.nikky.moe/api";
const ADDON_PROPERTIES: &str = "id,name,summary,websiteURL,packageType,categorySection.path";
const SNAPSHOT_KEY: &str = "curse/snapshot.json";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RegistrySettings {
    api_url: Option<String>,
    persist_snapshot: bool,
}

/// One addon from the bulk index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Addon {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, rename = "websiteURL")]
    pub website_url: Option<String>,
    #[serde(default, rename = "packageType")]
    pub package_type: Option<Value>,
    // The index flattens the selected property into a dotted key; full addon
    // documents nest it instead.
    #[serde(default, rename = "categorySection.path", skip_serializing_if = "Option::is_none")]
    category_path: Option<String>,
    #[serde(default, rename = "categorySection", skip_serializing_if = "Option::is_none")]
    category_section: Option<CategorySection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CategorySection {
    #[serde(default)]
    path: Option<String>,
}

impl Addon {
    /// Install directory the registry files this addon under
    pub fn path(&self) -> Option<&str> {
        self.category_path
            .as_deref()
            .or_else(|| self.category_section.as_ref()?.path.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonFile {
    pub id: u64,
    pub file_name: String,
    #[serde(default)]
    pub file_name_on_disk: Option<String>,
    #[serde(default)]
    pub file_date: Option<String>,
    #[serde(default)]
    pub release_type: Value,
    #[serde(default)]
    pub game_version: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<AddonDependency>,
    #[serde(default, rename = "downloadURL")]
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonDependency {
    #[serde(rename = "addOnId", alias = "addonId")]
    pub addon_id: u64,
    #[serde(rename = "type")]
    pub kind: Value,
}

impl AddonDependency {
    pub fn kind(&self) -> Option<DependencyKind> {
        match &self.kind {
            Value::Number(n) => n.as_u64().and_then(|n| DependencyKind::from_wire(n as u8)),
            Value::String(s) => match s.to_lowercase().as_str() {
                "required" => Some(DependencyKind::Required),
                "optional" => Some(DependencyKind::Optional),
                "embedded" => Some(DependencyKind::Embedded),
                _ => None,
            },
            _ => None,
        }
    }
}

impl AddonFile {
    pub fn release_type(&self) -> Option<ReleaseType> {
        match &self.release_type {
            Value::Number(n) => n.as_u64().and_then(|n| ReleaseType::from_wire(n as u8)),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Publish date; unparseable dates sort last
    pub fn published(&self) -> Option<NaiveDateTime> {
        let raw = self.file_date.as_deref()?;
        if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
            return Some(date.naive_utc());
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    }

    /// Name the file is stored under on disk
    pub fn disk_name(&self) -> &str {
        self.file_name_on_disk.as_deref().unwrap_or(&self.file_name)
    }
}

/// Pick the newest file matching a version substring, or failing that the
/// accepted game versions and release types. Ties keep listing order.
pub fn select_file<'a>(
    files: &'a [AddonFile],
    version: Option<&str>,
    game_versions: &[String],
    release_types: &[ReleaseType],
) -> Option<&'a AddonFile> {
    let mut candidates: Vec<&AddonFile> = files
        .iter()
        .filter(|f| match version {
            Some(v) => f.file_name.contains(v),
            None => {
                f.game_version.iter().any(|g| game_versions.contains(g))
                    && f.release_type().map_or(false, |r| release_types.contains(&r))
            }
        })
        .collect();

    candidates.sort_by(|a, b| b.published().cmp(&a.published()));
    candidates.into_iter().next()
}

/// Everything the provider has learned about the registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub addons: Vec<Addon>,
    pub files: BTreeMap<u64, Vec<AddonFile>>,
}

#[derive(Default)]
struct MetadataCache {
    addons: Option<Arc<Vec<Addon>>>,
    files: HashMap<u64, Arc<Vec<AddonFile>>>,
    single_files: HashMap<(u64, u64), AddonFile>,
    dirty: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(value: OneOrMany<T>) -> Self {
        match value {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Deserialize)]
struct RegistryDeclaration {
    addon_id: Option<u64>,
    file_id: Option<u64>,
    version: Option<String>,
    #[serde(alias = "mc_version", alias = "game_version")]
    game_versions: Option<OneOrMany<String>>,
    #[serde(alias = "release_type")]
    release_types: Option<OneOrMany<ReleaseType>>,
}

pub struct RegistryProvider {
    transport: Arc<dyn Transport>,
    api_url: String,
    game_version: String,
    release_types: Vec<ReleaseType>,
    snapshot_cache: Option<Cache>,
    metadata: Mutex<MetadataCache>,
}

impl RegistryProvider {
    pub fn new(transport: Arc<dyn Transport>, game_version: impl Into<String>, release_types: Vec<ReleaseType>) -> Self {
        Self {
            transport,
            api_url: DEFAULT_API_URL.to_string(),
            game_version: game_version.into(),
            release_types,
            snapshot_cache: None,
            metadata: Mutex::new(MetadataCache::default()),
        }
    }

    pub fn from_config(config: &PackConfig, transport: Arc<dyn Transport>, cache: &Cache) -> Result<Self> {
        let settings: RegistrySettings = config.provider_settings.section(ProviderKind::Registry.tag())?;
        let mut provider = Self::new(transport, config.game_version(), config.release_types.clone());
        if let Some(api_url) = settings.api_url {
            provider = provider.with_api_url(api_url);
        }

        if settings.persist_snapshot {
            match cache.read(SNAPSHOT_KEY) {
                Ok(Some(data)) => match serde_json::from_slice::<RegistrySnapshot>(&data) {
                    Ok(snapshot) => {
                        log::debug!("Loaded registry snapshot with {} addons", snapshot.addons.len());
                        provider = provider.with_snapshot(snapshot);
                    }
                    Err(e) => log::warn!("Ignoring unreadable registry snapshot: {}", e),
                },
                Ok(None) => {}
                Err(e) => log::warn!("Could not read registry snapshot: {}", e),
            }
            provider.snapshot_cache = Some(cache.clone());
        }

        Ok(provider)
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Seed the metadata cache, skipping the network for everything it holds
    pub fn with_snapshot(self, snapshot: RegistrySnapshot) -> Self {
        {
            let mut metadata = self.lock();
            if !snapshot.addons.is_empty() {
                metadata.addons = Some(Arc::new(snapshot.addons));
            }
            for (addon_id, files) in snapshot.files {
                metadata.files.insert(addon_id, Arc::new(files));
            }
        }
        self
    }

    /// Current metadata cache contents
    pub fn snapshot(&self) -> RegistrySnapshot {
        let metadata = self.lock();
        RegistrySnapshot {
            addons: metadata.addons.as_deref().cloned().unwrap_or_default(),
            files: metadata.files.iter().map(|(id, files)| (*id, files.as_ref().clone())).collect(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MetadataCache> {
        self.metadata.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn addons(&self) -> Result<Arc<Vec<Addon>>> {
        if let Some(addons) = self.lock().addons.clone() {
            return Ok(addons);
        }

        let url = format!("{}/addon/?mods=1&property={}", self.api_url, ADDON_PROPERTIES);
        log::debug!("Fetching addon index from {}", url);
        let addons: Vec<Addon> = get_json(self.transport.as_ref(), &url).await?;
        log::info!("Addon index: {} addons", addons.len());

        let addons = Arc::new(addons);
        let mut metadata = self.lock();
        metadata.addons = Some(addons.clone());
        metadata.dirty = true;
        Ok(addons)
    }

    pub async fn addon(&self, addon_id: u64) -> Result<Addon> {
        self.addons()
            .await?
            .iter()
            .find(|a| a.id == addon_id)
            .cloned()
            .ok_or_else(|| ModpackError::NotFound(format!("curse addon {}", addon_id)))
    }

    pub async fn addon_by_name(&self, name: &str) -> Result<Addon> {
        self.addons()
            .await?
            .iter()
            .find(|a| a.name == name)
            .cloned()
            .ok_or_else(|| ModpackError::NotFound(format!("curse addon '{}'", name)))
    }

    /// All files of an addon, fetched once per run
    pub async fn files(&self, addon_id: u64) -> Result<Arc<Vec<AddonFile>>> {
        if let Some(files) = self.lock().files.get(&addon_id).cloned() {
            return Ok(files);
        }

        let url = format!("{}/addon/{}/files", self.api_url, addon_id);
        let files: Vec<AddonFile> = get_json(self.transport.as_ref(), &url)
            .await
            .map_err(|e| lookup_error(e, || format!("files of curse addon {}", addon_id)))?;

        let files = Arc::new(files);
        let mut metadata = self.lock();
        metadata.files.insert(addon_id, files.clone());
        metadata.dirty = true;
        Ok(files)
    }

    /// One file, from the addon's listing when it is already known
    pub async fn file(&self, addon_id: u64, file_id: u64) -> Result<AddonFile> {
        {
            let metadata = self.lock();
            if let Some(file) = metadata
                .files
                .get(&addon_id)
                .and_then(|files| files.iter().find(|f| f.id == file_id))
            {
                return Ok(file.clone());
            }
            if let Some(file) = metadata.single_files.get(&(addon_id, file_id)) {
                return Ok(file.clone());
            }
        }

        let url = format!("{}/addon/{}/files/{}", self.api_url, addon_id, file_id);
        let file: AddonFile = get_json(self.transport.as_ref(), &url)
            .await
            .map_err(|e| lookup_error(e, || format!("curse file {}/{}", addon_id, file_id)))?;

        self.lock().single_files.insert((addon_id, file_id), file.clone());
        Ok(file)
    }

    async fn select(
        &self,
        addon: &Addon,
        version: Option<&str>,
        game_versions: &[String],
        release_types: &[ReleaseType],
    ) -> Result<AddonFile> {
        let files = self.files(addon.id).await?;
        select_file(&files, version, game_versions, release_types)
            .cloned()
            .ok_or_else(|| ModpackError::NoMatchingFile {
                name: addon.name.clone(),
                game_versions: game_versions.join(", "),
                version: version.unwrap_or("-").to_string(),
            })
    }
}

fn lookup_error(err: HttpError, what: impl FnOnce() -> String) -> ModpackError {
    match err {
        HttpError::HttpStatus { status: 404, .. } => ModpackError::NotFound(what()),
        other => ModpackError::Http(other),
    }
}

fn registry_ids(entry: &Entry) -> Option<(u64, u64)> {
    match entry.coordinate {
        Coordinate::Registry {
            addon_id: Some(addon_id),
            file_id: Some(file_id),
            ..
        } => Some((addon_id, file_id)),
        _ => None,
    }
}

/// Keys that claim a named declaration for another backend
const FOREIGN_KEYS: &[&str] = &["url", "file", "coordinates", "group", "user", "repository", "jenkins", "job"];

#[async_trait]
impl Provider for RegistryProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Registry
    }

    fn required_attributes(&self) -> &'static [&'static str] {
        &[]
    }

    fn convert(&self, raw: &Value) -> Option<Declaration> {
        let mut decl = Declaration::new();
        match raw {
            Value::String(name) => {
                decl.insert("name".into(), Value::String(name.clone()));
            }
            Value::Number(n) if n.is_u64() => {
                decl.insert("addon_id".into(), Value::Number(n.clone()));
            }
            Value::Object(map) => return Some(map.clone()),
            _ => return None,
        }
        decl.insert("type".into(), Value::String(self.kind().tag().into()));
        Some(decl)
    }

    fn match_declaration(&self, decl: &Declaration) -> bool {
        decl.contains_key("addon_id")
            || (decl.contains_key("name") && !FOREIGN_KEYS.iter().any(|k| decl.contains_key(*k)))
    }

    fn coordinate(&self, decl: &Declaration) -> Result<Coordinate> {
        let decl: RegistryDeclaration = decode(self.kind(), decl)?;
        Ok(Coordinate::Registry {
            addon_id: decl.addon_id,
            file_id: decl.file_id,
            version: decl.version,
            game_versions: decl.game_versions.map(Vec::from).unwrap_or_default(),
            release_types: decl.release_types.map(Vec::from).unwrap_or_default(),
        })
    }

    fn apply_defaults(&self, entry: &mut Entry) {
        entry.side.get_or_insert_with(Default::default);
        if let Coordinate::Registry { game_versions, release_types, .. } = &mut entry.coordinate {
            if game_versions.is_empty() {
                game_versions.push(self.game_version.clone());
            }
            if release_types.is_empty() {
                release_types.extend(self.release_types.iter().copied());
            }
        }
    }

    async fn prepare_dependencies(&self, entry: &mut Entry) -> Result<bool> {
        let Coordinate::Registry { addon_id, file_id, version, game_versions, release_types } = entry.coordinate.clone()
        else {
            return Ok(false);
        };

        let addon = match (addon_id, entry.name.as_deref()) {
            (Some(id), _) => self.addon(id).await?,
            (None, Some(name)) => self.addon_by_name(name).await?,
            (None, None) => return Ok(false),
        };

        if let Coordinate::Registry { addon_id, .. } = &mut entry.coordinate {
            *addon_id = Some(addon.id);
        }
        entry.name.get_or_insert_with(|| addon.name.clone());

        let file = match file_id {
            Some(file_id) => self.file(addon.id, file_id).await?,
            None => self.select(&addon, version.as_deref(), &game_versions, &release_types).await?,
        };
        log::debug!("{}: selected {} ({})", addon.name, file.file_name, file.id);

        if let Coordinate::Registry { file_id, .. } = &mut entry.coordinate {
            *file_id = Some(file.id);
        }
        Ok(true)
    }

    fn validate(&self, entry: &Entry) -> bool {
        registry_ids(entry).is_some()
    }

    async fn resolve_dependencies(&self, index: usize, entries: &mut Vec<Entry>, policy: &DependencyPolicy) -> Result<()> {
        let Some((addon_id, file_id)) = registry_ids(&entries[index]) else {
            return Ok(());
        };
        let (game_versions, release_types) = match &entries[index].coordinate {
            Coordinate::Registry { game_versions, release_types, .. } => (game_versions.clone(), release_types.clone()),
            _ => return Ok(()),
        };

        let file = self.file(addon_id, file_id).await?;
        let dependent_name = match entries[index].name.clone() {
            Some(name) => name,
            None => self.addon(addon_id).await?.name,
        };
        let dependent_side = entries[index].side();

        for dependency in &file.dependencies {
            let Some(kind) = dependency.kind() else {
                log::warn!("{}: unknown dependency type {} for addon {}", dependent_name, dependency.kind, dependency.addon_id);
                continue;
            };
            let dep_addon = match self.addon(dependency.addon_id).await {
                Ok(addon) => addon,
                Err(e) if e.is_lookup_failure() => {
                    log::warn!("{}: {} dependency skipped: {}", dependent_name, kind, e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            entries[index].add_depends(kind, &dep_addon.name);

            let identity = format!("{}:{}", self.kind().tag(), dep_addon.id);
            if resolver::merge_into_existing(entries, &identity, kind, &dependent_name, dependent_side) {
                continue;
            }
            if !policy.follows(kind, &entries[index]) {
                log::debug!("{}: not following {} dependency {}", dependent_name, kind, dep_addon.name);
                continue;
            }

            let dep_file = match self.select(&dep_addon, None, &game_versions, &release_types).await {
                Ok(file) => file,
                Err(e) if e.is_lookup_failure() => {
                    log::warn!("{}: {} dependency skipped: {}", dependent_name, kind, e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let mut dep_entry = Entry::new(
                ProviderKind::Registry,
                Coordinate::Registry {
                    addon_id: Some(dep_addon.id),
                    file_id: Some(dep_file.id),
                    version: None,
                    game_versions: game_versions.clone(),
                    release_types: release_types.clone(),
                },
            );
            dep_entry.name = Some(dep_addon.name.clone());
            dep_entry.side = Some(dependent_side);
            dep_entry.transient = true;
            dep_entry.add_provides(kind, &dependent_name);

            log::info!("Added {} dependency {} of {}", kind, dep_file.file_name, dependent_name);
            entries.push(dep_entry);
        }

        Ok(())
    }

    async fn fill_information(&self, entry: &mut Entry) -> Result<()> {
        let Some((addon_id, file_id)) = registry_ids(entry) else {
            return Err(ModpackError::provider(self.kind().tag(), format!("{} was never resolved", entry.label())));
        };
        let addon = self.addon(addon_id).await?;
        let file = self.file(addon_id, file_id).await?;

        entry.name.get_or_insert_with(|| addon.name.clone());
        if entry.description.is_none() {
            entry.description = addon.summary.clone();
        }
        entry.file_name.get_or_insert_with(|| file.disk_name().to_string());
        if entry.url.is_none() {
            entry.url = file.download_url.clone();
        }
        if entry.website_url.is_none() {
            entry.website_url = addon.website_url.clone();
        }
        entry
            .package_type
            .get_or_insert_with(|| addon.package_type.as_ref().map(PackageType::from_metadata).unwrap_or_default());
        if entry.path.is_none() {
            entry.path = addon.path().map(str::to_string);
        }
        Ok(())
    }

    fn prepare_download(&self, entry: &mut Entry, cache: &Cache) {
        let Some((addon_id, file_id)) = registry_ids(entry) else {
            return;
        };
        let tag = self.kind().tag();
        entry.cache_base.get_or_insert_with(|| cache.base_dir(tag));
        let (addon_dir, file_dir) = (addon_id.to_string(), file_id.to_string());
        entry
            .cache_path
            .get_or_insert_with(|| cache.artifact_dir(tag, &[addon_dir.as_str(), file_dir.as_str()]));
        entry.kind = ProviderKind::Direct;
    }

    fn persist(&self) -> Result<()> {
        let Some(cache) = &self.snapshot_cache else {
            return Ok(());
        };
        if !self.lock().dirty {
            return Ok(());
        }

        let data = serde_json::to_vec(&self.snapshot())?;
        cache.write(SNAPSHOT_KEY, &data)?;
        self.lock().dirty = false;
        log::debug!("Wrote registry snapshot to {}", cache.root().join(SNAPSHOT_KEY).display());
        Ok(())
    }
}
