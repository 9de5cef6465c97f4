//! Jenkins build artifacts (tag `jenkins`).

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::traits::{decode, join_url, Declaration, Provider};
use crate::cache::Cache;
use crate::config::PackConfig;
use crate::entry::{Coordinate, Entry, PackageType, ProviderKind};
use crate::http::{get_json, HttpError, Transport};
use crate::{ModpackError, Result};

const LAST_SUCCESSFUL_BUILD: &str = "lastSuccessfulBuild";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JenkinsSettings {
    /// Server used by declarations that do not name one
    server: Option<String>,
}

#[derive(Deserialize)]
struct JenkinsDeclaration {
    jenkins: Option<String>,
    job: String,
    build: Option<Value>,
    artifact: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Build {
    pub number: u64,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<BuildArtifact>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildArtifact {
    pub file_name: String,
    pub relative_path: String,
}

/// `a/b` -> `job/a/job/b`, the URL path of a (possibly foldered) job
pub fn job_path(job: &str) -> String {
    job.split('/')
        .filter(|p| !p.is_empty())
        .map(|p| format!("job/{}", urlencoding::encode(p)))
        .collect::<Vec<_>>()
        .join("/")
}

/// Artifact matching `pattern`, else the first jar that is not a sources or
/// javadoc jar
pub fn select_artifact<'a>(artifacts: &'a [BuildArtifact], pattern: Option<&Regex>) -> Option<&'a BuildArtifact> {
    match pattern {
        Some(re) => artifacts.iter().find(|a| re.is_match(&a.file_name)),
        None => artifacts.iter().find(|a| {
            a.file_name.ends_with(".jar")
                && !a.file_name.ends_with("-sources.jar")
                && !a.file_name.ends_with("-javadoc.jar")
        }),
    }
}

pub struct JenkinsProvider {
    transport: Arc<dyn Transport>,
    default_server: Option<String>,
}

impl JenkinsProvider {
    pub fn new(transport: Arc<dyn Transport>, default_server: Option<String>) -> Self {
        Self {
            transport,
            default_server,
        }
    }

    pub fn from_config(config: &PackConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let settings: JenkinsSettings = config.provider_settings.section(ProviderKind::Jenkins.tag())?;
        Ok(Self::new(transport, settings.server))
    }

    async fn build(&self, server: &str, job: &str, build: &str) -> Result<Build> {
        let url = join_url(server, &format!("{}/{}/api/json", job_path(job), build));
        get_json(self.transport.as_ref(), &url).await.map_err(|e| match e {
            HttpError::HttpStatus { status: 404, .. } => {
                ModpackError::NotFound(format!("build {} of jenkins job {}", build, job))
            }
            other => ModpackError::Http(other),
        })
    }
}

#[async_trait]
impl Provider for JenkinsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Jenkins
    }

    fn required_attributes(&self) -> &'static [&'static str] {
        &["jenkins", "job"]
    }

    fn match_declaration(&self, decl: &Declaration) -> bool {
        let typed = decl.get("type").and_then(Value::as_str) == Some(self.kind().tag());
        (typed && self.default_server.is_some() && decl.contains_key("job"))
            || self.required_attributes().iter().all(|k| decl.contains_key(*k))
    }

    fn coordinate(&self, decl: &Declaration) -> Result<Coordinate> {
        let decl: JenkinsDeclaration = decode(self.kind(), decl)?;
        let invalid = |message: String| ModpackError::InvalidDeclaration {
            provider: ProviderKind::Jenkins.tag().to_string(),
            message,
        };

        let server = decl
            .jenkins
            .or_else(|| self.default_server.clone())
            .ok_or_else(|| invalid("no jenkins server given".to_string()))?;
        let build = match decl.build {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::String(s)) => Some(s),
            Some(other) => return Err(invalid(format!("unsupported build selector {}", other))),
        };
        if let Some(pattern) = &decl.artifact {
            Regex::new(pattern).map_err(|e| invalid(format!("artifact pattern '{}': {}", pattern, e)))?;
        }

        Ok(Coordinate::Jenkins {
            server: server.trim_end_matches('/').to_string(),
            job: decl.job.trim_matches('/').to_string(),
            build,
            artifact: decl.artifact,
            file: None,
        })
    }

    async fn prepare_dependencies(&self, entry: &mut Entry) -> Result<bool> {
        let Coordinate::Jenkins { server, job, build, artifact, .. } = entry.coordinate.clone() else {
            return Ok(false);
        };

        let selector = build.as_deref().unwrap_or(LAST_SUCCESSFUL_BUILD);
        let resolved = self.build(&server, &job, selector).await?;
        let pattern = artifact.as_deref().map(Regex::new).transpose().map_err(|e| ModpackError::InvalidDeclaration {
            provider: self.kind().tag().to_string(),
            message: e.to_string(),
        })?;
        let chosen = select_artifact(&resolved.artifacts, pattern.as_ref()).ok_or_else(|| {
            ModpackError::NotFound(format!("artifact of build {} of jenkins job {}", resolved.number, job))
        })?;
        log::debug!("{}: build {} -> #{} {}", job, selector, resolved.number, chosen.file_name);

        entry.file_name.get_or_insert_with(|| chosen.file_name.clone());
        entry.url.get_or_insert_with(|| {
            join_url(
                &server,
                &format!("{}/{}/artifact/{}", job_path(&job), resolved.number, chosen.relative_path),
            )
        });
        if entry.website_url.is_none() {
            entry.website_url = resolved.url.clone();
        }
        if let Coordinate::Jenkins { build, file, .. } = &mut entry.coordinate {
            *build = Some(resolved.number.to_string());
            *file = Some(chosen.relative_path.clone());
        }
        Ok(true)
    }

    async fn fill_information(&self, entry: &mut Entry) -> Result<()> {
        if entry.name.is_none() {
            if let Coordinate::Jenkins { job, .. } = &entry.coordinate {
                entry.name = job.rsplit('/').next().map(str::to_string);
            }
        }
        entry.package_type.get_or_insert(PackageType::Mod);
        Ok(())
    }

    fn prepare_download(&self, entry: &mut Entry, cache: &Cache) {
        let Coordinate::Jenkins { server, job, build: Some(build), file: Some(file), .. } = &entry.coordinate else {
            return;
        };
        let host = url::Url::parse(server)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| server.clone());

        let tag = self.kind().tag();
        let mut parts = vec![host.as_str()];
        parts.extend(job.split('/').filter(|p| !p.is_empty()));
        parts.push(build.as_str());
        parts.extend(file.split('/').filter(|p| !p.is_empty()));

        let cache_path = cache.artifact_dir(tag, &parts);
        entry.cache_base.get_or_insert_with(|| cache.base_dir(tag));
        entry.cache_path.get_or_insert(cache_path);
        entry.kind = ProviderKind::Direct;
    }
}
