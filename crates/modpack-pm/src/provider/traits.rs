use std::path::Path;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::cache::Cache;
use crate::config::DependencyPolicy;
use crate::downloader::DownloadResult;
use crate::entry::{Coordinate, Entry, PackageType, ProviderKind, Side};
use crate::feature::{self, Feature};
use crate::path;
use crate::{ModpackError, Result};

/// Raw declaration after conversion to key/value form
pub type Declaration = serde_json::Map<String, Value>;

/// Backend plug-in driven by the pipeline, one stage at a time.
///
/// Every hook except [`Provider::coordinate`] has a default, so a provider
/// only overrides the stages its backend cares about.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Tag this provider answers to
    fn kind(&self) -> ProviderKind;

    /// Keys a declaration without an explicit `type` must carry to match
    fn required_attributes(&self) -> &'static [&'static str];

    /// Turn a raw declaration into key/value form. Object declarations are
    /// taken as is; providers accepting shorthand forms override this.
    fn convert(&self, raw: &Value) -> Option<Declaration> {
        raw.as_object().cloned()
    }

    /// Structural match on an already converted declaration
    fn match_declaration(&self, decl: &Declaration) -> bool {
        let missing: Vec<&str> = self
            .required_attributes()
            .iter()
            .copied()
            .filter(|key| !decl.contains_key(*key))
            .collect();

        if !missing.is_empty() {
            log::trace!("{} does not match, missing {:?}", self.kind(), missing);
            return false;
        }
        true
    }

    /// Whether this provider claims the raw declaration
    fn matches(&self, raw: &Value) -> bool {
        let Some(decl) = self.convert(raw) else {
            return false;
        };

        match decl.get("type").and_then(Value::as_str) {
            Some(tag) if tag != self.kind().tag() => false,
            _ => self.match_declaration(&decl),
        }
    }

    /// Backend coordinate described by a converted declaration
    fn coordinate(&self, decl: &Declaration) -> Result<Coordinate>;

    /// Build the entry for a converted declaration: the coordinate plus the
    /// fields every provider shares
    fn entry(&self, decl: &Declaration) -> Result<Entry> {
        let mut entry = Entry::new(self.kind(), self.coordinate(decl)?);
        apply_common_fields(&mut entry, decl)?;
        Ok(entry)
    }

    fn apply_defaults(&self, entry: &mut Entry) {
        entry.side.get_or_insert(Side::Both);
    }

    /// Resolve the loose coordinate to a concrete one. `Ok(false)` marks the
    /// entry invalid; lookup errors do the same after a warning.
    async fn prepare_dependencies(&self, _entry: &mut Entry) -> Result<bool> {
        Ok(true)
    }

    fn validate(&self, _entry: &Entry) -> bool {
        true
    }

    /// Expand the dependencies of `entries[index]`, merging into existing
    /// entries or appending new ones.
    async fn resolve_dependencies(
        &self,
        _index: usize,
        _entries: &mut Vec<Entry>,
        _policy: &DependencyPolicy,
    ) -> Result<()> {
        Ok(())
    }

    fn resolve_feature_dependencies(&self, index: usize, entries: &[Entry], features: &mut Vec<Feature>) {
        feature::seed_feature(index, entries, features);
    }

    async fn fill_information(&self, entry: &mut Entry) -> Result<()> {
        entry.package_type.get_or_insert(PackageType::Mod);
        Ok(())
    }

    /// Set `url`, `file_name` and the cache location. Providers that hand
    /// their entries over to the direct downloader switch `kind` here.
    fn prepare_download(&self, _entry: &mut Entry, _cache: &Cache) {}

    fn resolve_path(&self, entry: &mut Entry) {
        path::resolve_path(entry);
    }

    /// Place the entry's artifact under `pack_root`
    async fn download(&self, entry: &Entry, _pack_root: &Path) -> Result<DownloadResult> {
        Err(ModpackError::provider(
            self.kind().tag(),
            format!("{} cannot be downloaded by this provider", entry.label()),
        ))
    }

    /// Flush provider state (metadata snapshots) at the end of a run
    fn persist(&self) -> Result<()> {
        Ok(())
    }
}

/// Declaration keys shared by every provider
#[derive(Debug, Default, Deserialize)]
struct CommonFields {
    name: Option<String>,
    description: Option<String>,
    side: Option<String>,
    package_type: Option<PackageType>,
    path: Option<String>,
    #[serde(alias = "file_name_on_disk")]
    file_name: Option<String>,
    #[serde(alias = "websiteURL")]
    website_url: Option<String>,
    optionals: Option<bool>,
    feature_name: Option<String>,
    selected: Option<bool>,
    recommendation: Option<String>,
}

/// Copy shared declaration keys onto the entry. An unknown `side` is fatal.
pub fn apply_common_fields(entry: &mut Entry, decl: &Declaration) -> Result<()> {
    let common: CommonFields = decode(entry.kind, decl)?;

    entry.side = common.side.as_deref().map(str::parse::<Side>).transpose()?;
    entry.name = common.name;
    entry.description = common.description;
    entry.package_type = common.package_type;
    entry.path = common.path;
    entry.file_name = common.file_name;
    entry.website_url = common.website_url;
    entry.optionals = common.optionals;
    entry.feature_name = common.feature_name;
    entry.selected = common.selected;
    entry.recommendation = common.recommendation;
    Ok(())
}

/// Decode a declaration into a provider's typed form
pub(crate) fn decode<T: DeserializeOwned>(kind: ProviderKind, decl: &Declaration) -> Result<T> {
    serde_json::from_value(Value::Object(decl.clone())).map_err(|e| ModpackError::InvalidDeclaration {
        provider: kind.tag().to_string(),
        message: e.to_string(),
    })
}

/// Last path segment of a URL, percent-decoded
pub(crate) fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(segment).ok()?;
    Some(decoded.into_owned())
}

/// Name derived from a file name: the stem without the extension
pub(crate) fn name_from_file(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file_name.to_string(),
    }
}

/// Join a base URL and a path without doubling slashes
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
