//! GitHub release assets (tag `github`).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use super::traits::{decode, join_url, name_from_file, Declaration, Provider};
use crate::cache::Cache;
use crate::config::PackConfig;
use crate::entry::{Coordinate, Entry, PackageType, ProviderKind};
use crate::http::{get_json, HttpError, Transport};
use crate::{ModpackError, Result};

const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GithubSettings {
    pub api_url: Option<String>,
    /// Personal access token, sent as a bearer token to the API host
    pub token: Option<String>,
}

#[derive(Deserialize)]
struct GithubDeclaration {
    user: Option<String>,
    repo: Option<String>,
    /// Repository URL in place of `user`/`repo`
    repository: Option<String>,
    tag: Option<String>,
    asset: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

/// Parse a GitHub URL into owner and repository name
pub fn parse_github_url(url: &str) -> Option<(String, String)> {
    // Handle various GitHub URL formats:
    // - https://github.com/owner/repo
    // - https://github.com/owner/repo.git
    // - git@github.com:owner/repo.git
    let url = url.trim_end_matches('/').trim_end_matches(".git");

    let path = url.split("github.com").nth(1)?;
    let path = path.trim_start_matches('/').trim_start_matches(':');
    let mut parts = path.split('/').filter(|p| !p.is_empty());
    match (parts.next(), parts.next()) {
        (Some(owner), Some(repo)) => Some((owner.to_string(), repo.to_string())),
        _ => None,
    }
}

/// Asset matching `pattern`, else the first `.jar`, else the first asset
pub fn select_asset<'a>(assets: &'a [ReleaseAsset], pattern: Option<&Regex>) -> Option<&'a ReleaseAsset> {
    match pattern {
        Some(re) => assets.iter().find(|a| re.is_match(&a.name)),
        None => assets
            .iter()
            .find(|a| a.name.ends_with(".jar"))
            .or_else(|| assets.first()),
    }
}

pub struct GithubProvider {
    transport: Arc<dyn Transport>,
    api_url: String,
    releases: Mutex<HashMap<String, Release>>,
}

impl GithubProvider {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            api_url: DEFAULT_API_URL.to_string(),
            releases: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &PackConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let settings: GithubSettings = config.provider_settings.section(ProviderKind::Github.tag())?;
        let mut provider = Self::new(transport);
        if let Some(api_url) = settings.api_url {
            provider.api_url = api_url.trim_end_matches('/').to_string();
        }
        Ok(provider)
    }

    async fn release(&self, user: &str, repo: &str, tag: Option<&str>) -> Result<Release> {
        let path = match tag {
            Some(tag) => format!("repos/{}/{}/releases/tags/{}", user, repo, urlencoding::encode(tag)),
            None => format!("repos/{}/{}/releases/latest", user, repo),
        };
        let url = join_url(&self.api_url, &path);

        if let Some(release) = self.releases.lock().unwrap_or_else(|e| e.into_inner()).get(&url) {
            return Ok(release.clone());
        }

        let release: Release = get_json(self.transport.as_ref(), &url).await.map_err(|e| match e {
            HttpError::HttpStatus { status: 404, .. } => ModpackError::NotFound(format!(
                "release {} of {}/{}",
                tag.unwrap_or("latest"),
                user,
                repo
            )),
            other => ModpackError::Http(other),
        })?;

        self.releases
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url, release.clone());
        Ok(release)
    }
}

#[async_trait]
impl Provider for GithubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Github
    }

    fn required_attributes(&self) -> &'static [&'static str] {
        &["user", "repo"]
    }

    fn match_declaration(&self, decl: &Declaration) -> bool {
        let typed = decl.get("type").and_then(|t| t.as_str()) == Some(self.kind().tag());
        (typed && decl.contains_key("repository"))
            || self.required_attributes().iter().all(|k| decl.contains_key(*k))
    }

    fn coordinate(&self, decl: &Declaration) -> Result<Coordinate> {
        let decl: GithubDeclaration = decode(self.kind(), decl)?;
        let (user, repo) = match (decl.user, decl.repo, decl.repository.as_deref().and_then(parse_github_url)) {
            (Some(user), Some(repo), _) => (user, repo),
            (_, _, Some(parsed)) => parsed,
            _ => {
                return Err(ModpackError::InvalidDeclaration {
                    provider: self.kind().tag().to_string(),
                    message: "user and repo (or a repository URL) are required".to_string(),
                })
            }
        };

        if let Some(pattern) = &decl.asset {
            Regex::new(pattern).map_err(|e| ModpackError::InvalidDeclaration {
                provider: self.kind().tag().to_string(),
                message: format!("asset pattern '{}': {}", pattern, e),
            })?;
        }

        Ok(Coordinate::Github {
            user,
            repo,
            tag: decl.tag,
            asset: decl.asset,
            file: None,
        })
    }

    async fn prepare_dependencies(&self, entry: &mut Entry) -> Result<bool> {
        let Coordinate::Github { user, repo, tag, asset, .. } = entry.coordinate.clone() else {
            return Ok(false);
        };

        let release = self.release(&user, &repo, tag.as_deref()).await?;
        let pattern = asset.as_deref().map(Regex::new).transpose().map_err(|e| ModpackError::InvalidDeclaration {
            provider: self.kind().tag().to_string(),
            message: e.to_string(),
        })?;
        let chosen = select_asset(&release.assets, pattern.as_ref()).ok_or_else(|| {
            ModpackError::NotFound(format!(
                "asset {} in release {} of {}/{}",
                asset.as_deref().unwrap_or("*.jar"),
                release.tag_name,
                user,
                repo
            ))
        })?;
        log::debug!("{}/{}: using {} from {}", user, repo, chosen.name, release.tag_name);

        entry.file_name.get_or_insert_with(|| chosen.name.clone());
        entry.url.get_or_insert_with(|| chosen.browser_download_url.clone());
        if entry.website_url.is_none() {
            entry.website_url = release.html_url.clone();
        }
        if let Coordinate::Github { tag, file, .. } = &mut entry.coordinate {
            *tag = Some(release.tag_name.clone());
            *file = Some(chosen.name.clone());
        }
        Ok(true)
    }

    async fn fill_information(&self, entry: &mut Entry) -> Result<()> {
        if entry.name.is_none() {
            entry.name = match &entry.coordinate {
                Coordinate::Github { repo, .. } => Some(repo.clone()),
                _ => entry.file_name.as_deref().map(name_from_file),
            };
        }
        entry.package_type.get_or_insert(PackageType::Mod);
        Ok(())
    }

    fn prepare_download(&self, entry: &mut Entry, cache: &Cache) {
        let Coordinate::Github { user, repo, tag: Some(tag), file: Some(asset), .. } = &entry.coordinate else {
            return;
        };

        let tag_dir = self.kind().tag();
        let cache_path = cache.artifact_dir(tag_dir, &[user.as_str(), repo.as_str(), tag.as_str(), asset.as_str()]);
        entry.cache_base.get_or_insert_with(|| cache.base_dir(tag_dir));
        entry.cache_path.get_or_insert(cache_path);
        entry.kind = ProviderKind::Direct;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(name: &str) -> ReleaseAsset {
        ReleaseAsset {
            name: name.to_string(),
            browser_download_url: format!("https://github.com/o/r/releases/download/v1/{}", name),
        }
    }

    #[test]
    fn test_parse_github_url() {
        assert_eq!(
            parse_github_url("https://github.com/owner/repo"),
            Some(("owner".to_string(), "repo".to_string()))
        );
        assert_eq!(
            parse_github_url("https://github.com/owner/repo.git"),
            Some(("owner".to_string(), "repo".to_string()))
        );
        assert_eq!(
            parse_github_url("git@github.com:owner/repo.git"),
            Some(("owner".to_string(), "repo".to_string()))
        );
        assert_eq!(parse_github_url("https://gitlab.com/owner/repo"), None);
        assert_eq!(parse_github_url("https://github.com/owner"), None);
    }

    #[test]
    fn test_select_asset() {
        let assets = vec![asset("sources.zip"), asset("mod-1.0.jar"), asset("mod-1.0-dev.jar")];

        assert_eq!(select_asset(&assets, None).unwrap().name, "mod-1.0.jar");
        let dev = Regex::new("-dev\\.jar$").unwrap();
        assert_eq!(select_asset(&assets, Some(&dev)).unwrap().name, "mod-1.0-dev.jar");
        let none = Regex::new("\\.exe$").unwrap();
        assert!(select_asset(&assets, Some(&none)).is_none());
        assert_eq!(select_asset(&[asset("a.zip")], None).unwrap().name, "a.zip");
    }

    #[test]
    fn test_coordinate_from_repository_url() {
        let p = GithubProvider::new(Arc::new(crate::http::HttpClient::new().unwrap()));
        let decl = serde_json::json!({"type": "github", "repository": "https://github.com/o/r"});
        assert!(p.matches(&decl));
        assert!(!p.matches(&serde_json::json!({"repository": "https://github.com/o/r"})));
        let coordinate = p.coordinate(decl.as_object().unwrap()).unwrap();
        assert_eq!(
            coordinate,
            Coordinate::Github { user: "o".into(), repo: "r".into(), tag: None, asset: None, file: None }
        );

        let bad = serde_json::json!({"user": "o", "repo": "r", "asset": "("});
        assert!(p.coordinate(bad.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_cache_dir_follows_selected_asset_not_file_name() {
        let p = GithubProvider::new(Arc::new(crate::http::HttpClient::new().unwrap()));
        let cache = Cache::new(std::path::PathBuf::from("/cache"));
        let mut entry = Entry::new(
            ProviderKind::Github,
            Coordinate::Github {
                user: "o".into(),
                repo: "r".into(),
                tag: Some("v1".into()),
                asset: None,
                file: Some("mod-1.0.jar".into()),
            },
        );
        entry.file_name = Some("renamed.jar".into());
        p.prepare_download(&mut entry, &cache);

        assert_eq!(entry.kind, ProviderKind::Direct);
        assert_eq!(
            entry.cache_path,
            Some(std::path::PathBuf::from("/cache/github/o/r/v1/mod-1.0.jar"))
        );
    }
}
