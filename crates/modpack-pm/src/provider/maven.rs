//! Maven repository coordinates (tag `mvn`).

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use super::traits::{decode, join_url, Declaration, Provider};
use crate::cache::Cache;
use crate::config::PackConfig;
use crate::downloader::{parse_checksum_file, ChecksumType};
use crate::entry::{Coordinate, Entry, PackageType, ProviderKind};
use crate::http::Transport;
use crate::{ModpackError, Result};

const MAVEN_CENTRAL: &str = "https://repo1.maven.org/maven2";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MavenSettings {
    repository: Option<String>,
}

#[derive(Deserialize)]
struct MavenDeclaration {
    #[serde(alias = "remoteRepository")]
    repository: Option<String>,
    group: Option<String>,
    artifact: Option<String>,
    version: Option<String>,
    classifier: Option<String>,
    extension: Option<String>,
    /// `group:artifact:version[:classifier]`
    coordinates: Option<String>,
}

/// Versions listed in a `maven-metadata.xml`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MavenMetadata {
    pub latest: Option<String>,
    pub release: Option<String>,
    pub versions: Vec<String>,
}

fn tag_regex(tag: &'static str) -> Regex {
    Regex::new(&format!(r"<{tag}>\s*([^<\s]+)\s*</{tag}>")).expect("static regex")
}

impl MavenMetadata {
    pub fn parse(xml: &str) -> Self {
        static LATEST: OnceLock<Regex> = OnceLock::new();
        static RELEASE: OnceLock<Regex> = OnceLock::new();
        static VERSIONS: OnceLock<Regex> = OnceLock::new();
        static VERSION: OnceLock<Regex> = OnceLock::new();

        let first = |re: &Regex| re.captures(xml).map(|c| c[1].to_string());
        let versions_block = VERSIONS
            .get_or_init(|| Regex::new(r"(?s)<versions>(.*?)</versions>").expect("static regex"))
            .captures(xml)
            .map(|c| c[1].to_string())
            .unwrap_or_default();

        Self {
            latest: first(LATEST.get_or_init(|| tag_regex("latest"))),
            release: first(RELEASE.get_or_init(|| tag_regex("release"))),
            versions: VERSION
                .get_or_init(|| tag_regex("version"))
                .captures_iter(&versions_block)
                .map(|c| c[1].to_string())
                .collect(),
        }
    }

    /// Concrete version for a `latest`/`release` selector; anything else is
    /// taken verbatim
    pub fn resolve(&self, selector: &str) -> Option<String> {
        let preferred = match selector.to_lowercase().as_str() {
            "latest" => self.latest.clone(),
            "release" => self.release.clone(),
            _ => return Some(selector.to_string()),
        };
        preferred.or_else(|| self.versions.last().cloned())
    }
}

pub fn is_dynamic_version(version: &str) -> bool {
    version.eq_ignore_ascii_case("latest") || version.eq_ignore_ascii_case("release")
}

fn group_path(group: &str) -> String {
    group.replace('.', "/")
}

pub struct MavenProvider {
    transport: Arc<dyn Transport>,
    default_repository: String,
}

impl MavenProvider {
    pub fn new(transport: Arc<dyn Transport>, default_repository: impl Into<String>) -> Self {
        Self {
            transport,
            default_repository: default_repository.into(),
        }
    }

    pub fn from_config(config: &PackConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let settings: MavenSettings = config.provider_settings.section(ProviderKind::Maven.tag())?;
        Ok(Self::new(
            transport,
            settings.repository.unwrap_or_else(|| MAVEN_CENTRAL.to_string()),
        ))
    }

    fn repository<'a>(&'a self, repository: &'a Option<String>) -> &'a str {
        repository.as_deref().unwrap_or(&self.default_repository)
    }

    /// File name and URL of the artifact a concrete coordinate points at
    fn artifact_location(&self, coordinate: &Coordinate) -> Option<(String, String)> {
        let Coordinate::Maven { repository, group, artifact, version, classifier, extension } = coordinate else {
            return None;
        };
        let file_name = match classifier {
            Some(c) => format!("{}-{}-{}.{}", artifact, version, c, extension),
            None => format!("{}-{}.{}", artifact, version, extension),
        };
        let url = join_url(
            self.repository(repository),
            &format!("{}/{}/{}/{}", group_path(group), artifact, version, file_name),
        );
        Some((file_name, url))
    }

    async fn metadata(&self, repository: &str, group: &str, artifact: &str) -> Result<MavenMetadata> {
        let url = join_url(repository, &format!("{}/{}/maven-metadata.xml", group_path(group), artifact));
        match self.transport.get_text_opt(&url).await? {
            Some(xml) => Ok(MavenMetadata::parse(&xml)),
            None => Err(ModpackError::NotFound(format!("{}:{}", group, artifact))),
        }
    }

    /// First published digest for `url`, trying stronger ones first
    async fn published_checksum(&self, url: &str) -> Option<String> {
        for checksum_type in [ChecksumType::Sha1, ChecksumType::Md5] {
            let checksum_url = format!("{}.{}", url, checksum_type.extension());
            match self.transport.get_text_opt(&checksum_url).await {
                Ok(Some(content)) => {
                    if let Some(digest) = parse_checksum_file(&content) {
                        return Some(digest);
                    }
                }
                Ok(None) => {}
                Err(e) => log::warn!("Could not fetch {}: {}", checksum_url, e),
            }
        }
        None
    }
}

#[async_trait]
impl Provider for MavenProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Maven
    }

    fn required_attributes(&self) -> &'static [&'static str] {
        &["group", "artifact", "version"]
    }

    fn match_declaration(&self, decl: &Declaration) -> bool {
        decl.contains_key("coordinates") || self.required_attributes().iter().all(|k| decl.contains_key(*k))
    }

    fn coordinate(&self, decl: &Declaration) -> Result<Coordinate> {
        let decl: MavenDeclaration = decode(self.kind(), decl)?;
        let invalid = |message: String| ModpackError::InvalidDeclaration {
            provider: ProviderKind::Maven.tag().to_string(),
            message,
        };

        let (group, artifact, version, classifier) = match &decl.coordinates {
            Some(coordinates) => {
                let parts: Vec<&str> = coordinates.split(':').collect();
                match parts.as_slice() {
                    [g, a, v] => (g.to_string(), a.to_string(), v.to_string(), None),
                    [g, a, v, c] => (g.to_string(), a.to_string(), v.to_string(), Some(c.to_string())),
                    _ => return Err(invalid(format!("malformed coordinates '{}'", coordinates))),
                }
            }
            None => match (decl.group, decl.artifact) {
                (Some(g), Some(a)) => (g, a, decl.version.unwrap_or_else(|| "release".to_string()), decl.classifier),
                _ => return Err(invalid("group and artifact are required".to_string())),
            },
        };

        Ok(Coordinate::Maven {
            repository: decl.repository,
            group,
            artifact,
            version,
            classifier,
            extension: decl.extension.unwrap_or_else(|| "jar".to_string()),
        })
    }

    async fn prepare_dependencies(&self, entry: &mut Entry) -> Result<bool> {
        let Coordinate::Maven { repository, group, artifact, version, .. } = &entry.coordinate else {
            return Ok(false);
        };
        if !is_dynamic_version(version) {
            return Ok(true);
        }

        let metadata = self.metadata(self.repository(repository), group, artifact).await?;
        let resolved = metadata.resolve(version).ok_or_else(|| ModpackError::NoMatchingFile {
            name: format!("{}:{}", group, artifact),
            game_versions: "-".to_string(),
            version: version.clone(),
        })?;
        log::debug!("{}:{}: {} resolved to {}", group, artifact, version, resolved);

        if let Coordinate::Maven { version, .. } = &mut entry.coordinate {
            *version = resolved;
        }
        Ok(true)
    }

    async fn fill_information(&self, entry: &mut Entry) -> Result<()> {
        let Some((file_name, url)) = self.artifact_location(&entry.coordinate) else {
            return Ok(());
        };

        if entry.name.is_none() {
            if let Coordinate::Maven { artifact, .. } = &entry.coordinate {
                entry.name = Some(artifact.clone());
            }
        }
        entry.file_name.get_or_insert(file_name);
        entry.package_type.get_or_insert(PackageType::Mod);
        if entry.checksum.is_none() {
            entry.checksum = self.published_checksum(&url).await;
        }
        entry.url.get_or_insert(url);
        Ok(())
    }

    fn prepare_download(&self, entry: &mut Entry, cache: &Cache) {
        let Coordinate::Maven { group, artifact, version, classifier, extension, .. } = &entry.coordinate else {
            return;
        };
        let mut parts = vec![group.as_str(), artifact.as_str(), version.as_str()];
        if let Some(classifier) = classifier {
            parts.push(classifier);
        }
        parts.push(extension);

        let tag = self.kind().tag();
        let cache_path = cache.artifact_dir(tag, &parts);
        entry.cache_base.get_or_insert_with(|| cache.base_dir(tag));
        entry.cache_path.get_or_insert(cache_path);
        entry.kind = ProviderKind::Direct;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpClient;

    const METADATA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <groupId>mezz.jei</groupId>
  <artifactId>jei_1.12.2</artifactId>
  <version>4.8.0.100</version>
  <versioning>
    <latest>4.8.5.138</latest>
    <release>4.8.5.137</release>
    <versions>
      <version>4.8.0.100</version>
      <version>4.8.5.137</version>
      <version>4.8.5.138</version>
    </versions>
    <lastUpdated>20180101000000</lastUpdated>
  </versioning>
</metadata>"#;

    fn provider() -> MavenProvider {
        MavenProvider::new(Arc::new(HttpClient::new().unwrap()), MAVEN_CENTRAL)
    }

    #[test]
    fn test_parse_metadata() {
        let metadata = MavenMetadata::parse(METADATA);
        assert_eq!(metadata.latest.as_deref(), Some("4.8.5.138"));
        assert_eq!(metadata.release.as_deref(), Some("4.8.5.137"));
        assert_eq!(metadata.versions, vec!["4.8.0.100", "4.8.5.137", "4.8.5.138"]);
    }

    #[test]
    fn test_resolve_selectors() {
        let metadata = MavenMetadata::parse(METADATA);
        assert_eq!(metadata.resolve("latest").as_deref(), Some("4.8.5.138"));
        assert_eq!(metadata.resolve("RELEASE").as_deref(), Some("4.8.5.137"));
        assert_eq!(metadata.resolve("4.8.0.100").as_deref(), Some("4.8.0.100"));

        let bare = MavenMetadata {
            versions: vec!["1".into(), "2".into()],
            ..Default::default()
        };
        assert_eq!(bare.resolve("release").as_deref(), Some("2"));
        assert_eq!(MavenMetadata::default().resolve("latest"), None);
    }

    #[test]
    fn test_coordinates_shorthand_and_location() {
        let p = provider();
        let decl = serde_json::json!({"type": "mvn", "coordinates": "mezz.jei:jei_1.12.2:4.8.5.138:api"});
        assert!(p.matches(&decl));
        let coordinate = p.coordinate(decl.as_object().unwrap()).unwrap();

        let (file_name, url) = p.artifact_location(&coordinate).unwrap();
        assert_eq!(file_name, "jei_1.12.2-4.8.5.138-api.jar");
        assert_eq!(
            url,
            "https://repo1.maven.org/maven2/mezz/jei/jei_1.12.2/4.8.5.138/jei_1.12.2-4.8.5.138-api.jar"
        );
    }

    #[test]
    fn test_structural_match_needs_all_three() {
        let p = provider();
        assert!(p.matches(&serde_json::json!({"group": "g", "artifact": "a", "version": "1"})));
        assert!(!p.matches(&serde_json::json!({"group": "g", "artifact": "a"})));
    }

    #[test]
    fn test_cache_dir_from_coordinate() {
        let p = provider();
        let decl = serde_json::json!({"group": "net.minecraftforge", "artifact": "forge", "version": "1.12.2-14.23.5.2847"});
        let mut entry = p.entry(decl.as_object().unwrap()).unwrap();
        let cache = Cache::new(std::path::PathBuf::from("/cache"));
        p.prepare_download(&mut entry, &cache);

        assert_eq!(entry.kind, ProviderKind::Direct);
        assert_eq!(
            entry.cache_path,
            Some(std::path::PathBuf::from("/cache/mvn/net.minecraftforge/forge/1.12.2-14.23.5.2847/jar"))
        );
    }

    #[test]
    fn test_extensions_of_one_version_stay_apart() {
        let p = provider();
        let cache = Cache::new(std::path::PathBuf::from("/cache"));
        let jar = serde_json::json!({"coordinates": "g:a:1"});
        let zip = serde_json::json!({"coordinates": "g:a:1", "extension": "zip"});
        let mut jar = p.entry(jar.as_object().unwrap()).unwrap();
        let mut zip = p.entry(zip.as_object().unwrap()).unwrap();
        assert_ne!(jar.identity(), zip.identity());

        p.prepare_download(&mut jar, &cache);
        p.prepare_download(&mut zip, &cache);
        assert_ne!(jar.cache_path, zip.cache_path);

        let mut entries = vec![jar, zip];
        crate::resolver::merge_duplicates(&mut entries);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_repository_is_part_of_identity() {
        let p = provider();
        let central = serde_json::json!({"coordinates": "g:a:1"});
        let mirror = serde_json::json!({"coordinates": "g:a:1", "repository": "https://maven.example/releases/"});
        let central = p.entry(central.as_object().unwrap()).unwrap();
        let mirror = p.entry(mirror.as_object().unwrap()).unwrap();
        assert_ne!(central.identity(), mirror.identity());
        assert_eq!(mirror.identity().as_deref(), Some("mvn:g:a:1:@jar#https://maven.example/releases"));
    }
}
