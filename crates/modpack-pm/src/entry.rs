//! The canonical entry record and the small value types it is built from.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModpackError, Result};

/// Which installation an artifact belongs to. Bit flags: `Both = Client | Server`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Client,
    Server,
    Both,
}

impl Side {
    pub fn bits(self) -> u8 {
        match self {
            Side::Client => 1,
            Side::Server => 2,
            Side::Both => 3,
        }
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            1 => Some(Side::Client),
            2 => Some(Side::Server),
            3 => Some(Side::Both),
            _ => None,
        }
    }

    /// Directory suffix layered on the mod directory for this side
    pub fn suffix(self) -> Option<&'static str> {
        match self {
            Side::Client => Some("_CLIENT"),
            Side::Server => Some("_SERVER"),
            Side::Both => None,
        }
    }
}

impl Default for Side {
    fn default() -> Self {
        Side::Both
    }
}

impl BitOr for Side {
    type Output = Side;

    fn bitor(self, rhs: Side) -> Side {
        // Union of two non-empty flag sets is always a valid side.
        Side::from_bits(self.bits() | rhs.bits()).unwrap_or(Side::Both)
    }
}

impl BitOrAssign for Side {
    fn bitor_assign(&mut self, rhs: Side) {
        *self = *self | rhs;
    }
}

impl FromStr for Side {
    type Err = ModpackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "client" => Ok(Side::Client),
            "server" => Ok(Side::Server),
            "both" => Ok(Side::Both),
            _ => Err(ModpackError::InvalidSide(s.to_string())),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Client => write!(f, "client"),
            Side::Server => write!(f, "server"),
            Side::Both => write!(f, "both"),
        }
    }
}

/// Where an artifact is placed in the install tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    Mod,
    Loader,
}

impl Default for PackageType {
    fn default() -> Self {
        PackageType::Mod
    }
}

impl PackageType {
    /// Lenient mapping used for backend metadata, which may carry ints or
    /// differently-cased strings. Anything that is not a loader is a mod.
    pub fn from_metadata(value: &serde_json::Value) -> Self {
        match value.as_str() {
            Some(s) if s.eq_ignore_ascii_case("loader") => PackageType::Loader,
            _ => PackageType::Mod,
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageType::Mod => write!(f, "mod"),
            PackageType::Loader => write!(f, "loader"),
        }
    }
}

/// Kind of a dependency edge, with the registry's wire numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DependencyKind {
    Required,
    Optional,
    Embedded,
}

impl DependencyKind {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            1 => Some(DependencyKind::Required),
            2 => Some(DependencyKind::Optional),
            3 => Some(DependencyKind::Embedded),
            _ => None,
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyKind::Required => write!(f, "Required"),
            DependencyKind::Optional => write!(f, "Optional"),
            DependencyKind::Embedded => write!(f, "Embedded"),
        }
    }
}

/// Release channel of a registry file. Ordered Release > Beta > Alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseType {
    Release,
    Beta,
    Alpha,
}

impl ReleaseType {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            1 => Some(ReleaseType::Release),
            2 => Some(ReleaseType::Beta),
            3 => Some(ReleaseType::Alpha),
            _ => None,
        }
    }

    pub fn all() -> Vec<ReleaseType> {
        vec![ReleaseType::Release, ReleaseType::Beta, ReleaseType::Alpha]
    }
}

impl FromStr for ReleaseType {
    type Err = ModpackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "release" => Ok(ReleaseType::Release),
            "beta" => Ok(ReleaseType::Beta),
            "alpha" => Ok(ReleaseType::Alpha),
            _ => Err(ModpackError::InvalidConfig(format!("unknown release type '{}'", s))),
        }
    }
}

/// Closed set of provider tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "curse")]
    Registry,
    #[serde(rename = "direct")]
    Direct,
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "mvn")]
    Maven,
    #[serde(rename = "github")]
    Github,
    #[serde(rename = "jenkins")]
    Jenkins,
}

impl ProviderKind {
    pub fn tag(self) -> &'static str {
        match self {
            ProviderKind::Registry => "curse",
            ProviderKind::Direct => "direct",
            ProviderKind::Local => "local",
            ProviderKind::Maven => "mvn",
            ProviderKind::Github => "github",
            ProviderKind::Jenkins => "jenkins",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "curse" => Some(ProviderKind::Registry),
            "direct" => Some(ProviderKind::Direct),
            "local" => Some(ProviderKind::Local),
            "mvn" => Some(ProviderKind::Maven),
            "github" => Some(ProviderKind::Github),
            "jenkins" => Some(ProviderKind::Jenkins),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Immutable identity of an artifact within its backend.
///
/// Loose fields (`name`, `version`, `tag`, ...) are what the declaration
/// asked for; the concrete fields (`file_id`, `build`, resolved version) are
/// filled once by `prepare_dependencies` and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Coordinate {
    Registry {
        addon_id: Option<u64>,
        file_id: Option<u64>,
        version: Option<String>,
        game_versions: Vec<String>,
        release_types: Vec<ReleaseType>,
    },
    Direct {
        url: String,
    },
    Local {
        file: PathBuf,
    },
    Maven {
        repository: Option<String>,
        group: String,
        artifact: String,
        version: String,
        classifier: Option<String>,
        extension: String,
    },
    Github {
        user: String,
        repo: String,
        tag: Option<String>,
        asset: Option<String>,
        /// Name of the asset the release resolved to
        file: Option<String>,
    },
    Jenkins {
        server: String,
        job: String,
        build: Option<String>,
        artifact: Option<String>,
        /// Relative path of the build artifact that was picked
        file: Option<String>,
    },
}

impl Coordinate {
    /// Key that identifies the same artifact across declarations, if the
    /// coordinate is concrete enough to have one.
    pub fn identity(&self) -> Option<String> {
        match self {
            Coordinate::Registry { addon_id: Some(id), .. } => Some(format!("curse:{}", id)),
            Coordinate::Registry { addon_id: None, .. } => None,
            Coordinate::Direct { url } => Some(format!("direct:{}", url)),
            Coordinate::Local { file } => Some(format!("local:{}", file.display())),
            Coordinate::Maven { repository, group, artifact, version, classifier, extension } => Some(format!(
                "mvn:{}:{}:{}:{}@{}#{}",
                group,
                artifact,
                version,
                classifier.as_deref().unwrap_or(""),
                extension,
                repository.as_deref().unwrap_or("").trim_end_matches('/')
            )),
            Coordinate::Github { user, repo, tag, asset, .. } => Some(format!(
                "github:{}/{}@{}:{}",
                user,
                repo,
                tag.as_deref().unwrap_or("latest"),
                asset.as_deref().unwrap_or("")
            )),
            Coordinate::Jenkins { server, job, build, artifact, .. } => Some(format!(
                "jenkins:{}/{}#{}:{}",
                server.trim_end_matches('/'),
                job,
                build.as_deref().unwrap_or("lastSuccessfulBuild"),
                artifact.as_deref().unwrap_or("")
            )),
        }
    }
}

/// One artifact to acquire and place. Created by the normalizer and filled
/// in by every later stage.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    pub kind: ProviderKind,
    pub coordinate: Coordinate,

    pub name: Option<String>,
    pub description: Option<String>,
    pub website_url: Option<String>,

    pub side: Option<Side>,
    pub package_type: Option<PackageType>,
    pub path: Option<String>,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub target_path: Option<String>,

    pub depends: BTreeMap<DependencyKind, Vec<String>>,
    pub provides: BTreeMap<DependencyKind, Vec<String>>,
    /// Per-entry override of the pack's optional-dependency policy
    pub optionals: Option<bool>,

    pub feature_name: Option<String>,
    pub selected: Option<bool>,
    pub recommendation: Option<String>,

    pub url: Option<String>,
    pub cache_base: Option<PathBuf>,
    pub cache_path: Option<PathBuf>,
    /// Hex digest published by the backend, verified after download
    pub checksum: Option<String>,

    /// Discovered as a dependency rather than declared
    pub transient: bool,
}

impl Entry {
    pub fn new(kind: ProviderKind, coordinate: Coordinate) -> Self {
        Self {
            kind,
            coordinate,
            name: None,
            description: None,
            website_url: None,
            side: None,
            package_type: None,
            path: None,
            file_name: None,
            file_path: None,
            target_path: None,
            depends: BTreeMap::new(),
            provides: BTreeMap::new(),
            optionals: None,
            feature_name: None,
            selected: None,
            recommendation: None,
            url: None,
            cache_base: None,
            cache_path: None,
            checksum: None,
            transient: false,
        }
    }

    /// Best human-readable label for log lines and error reports
    pub fn label(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some(url) = &self.url {
            return url.clone();
        }
        match &self.coordinate {
            Coordinate::Registry { addon_id: Some(id), .. } => format!("curse addon {}", id),
            Coordinate::Direct { url } => url.clone(),
            Coordinate::Local { file } => file.display().to_string(),
            other => other.identity().unwrap_or_else(|| format!("{:?}", other)),
        }
    }

    pub fn side(&self) -> Side {
        self.side.unwrap_or_default()
    }

    pub fn package_type(&self) -> PackageType {
        self.package_type.unwrap_or_default()
    }

    pub fn identity(&self) -> Option<String> {
        self.coordinate.identity()
    }

    /// Append a dependency name, keeping each kind's list free of repeats
    pub fn add_depends(&mut self, kind: DependencyKind, name: &str) {
        push_unique(self.depends.entry(kind).or_default(), name);
    }

    /// Record that `name` depends on this entry
    pub fn add_provides(&mut self, kind: DependencyKind, name: &str) {
        push_unique(self.provides.entry(kind).or_default(), name);
    }

    /// All dependency names across kinds, in kind order
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.depends.values().flatten().map(String::as_str)
    }

    /// Fold a duplicate declaration of the same artifact into this entry.
    pub fn merge_from(&mut self, other: &Entry) {
        if self.side.is_some() || other.side.is_some() {
            self.side = Some(self.side() | other.side());
        }
        for (kind, names) in &other.depends {
            for name in names {
                self.add_depends(*kind, name);
            }
        }
        for (kind, names) in &other.provides {
            for name in names {
                self.add_provides(*kind, name);
            }
        }
        self.transient &= other.transient;
        macro_rules! keep_first {
            ($($field:ident),*) => {
                $( if self.$field.is_none() { self.$field = other.$field.clone(); } )*
            };
        }
        keep_first!(
            name, description, website_url, package_type, path, file_name, optionals,
            feature_name, selected, recommendation, url, checksum
        );
    }
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}
