use std::sync::Arc;

use serde_json::Value;

use super::traits::Provider;
use super::{DirectProvider, GithubProvider, JenkinsProvider, LocalProvider, MavenProvider, RegistryProvider};
use crate::config::PackConfig;
use crate::downloader::FileDownloader;
use crate::entry::ProviderKind;
use crate::http::Transport;
use crate::{ModpackError, Result};

/// Registered providers in match order (first = highest priority)
pub struct ProviderManager {
    providers: Vec<Arc<dyn Provider>>,
}

impl ProviderManager {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Add a provider with the lowest priority
    pub fn add_provider(&mut self, provider: Arc<dyn Provider>) {
        self.providers.push(provider);
    }

    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    /// Provider registered for `kind`
    pub fn get(&self, kind: ProviderKind) -> Result<&Arc<dyn Provider>> {
        self.providers
            .iter()
            .find(|p| p.kind() == kind)
            .ok_or_else(|| ModpackError::UnknownProvider(kind.tag().to_string()))
    }

    /// First provider claiming a raw declaration
    pub fn find_matching(&self, raw: &Value) -> Option<&Arc<dyn Provider>> {
        self.providers.iter().find(|p| p.matches(raw))
    }

    /// Flush every provider's state. All providers are tried; the first
    /// failure is returned.
    pub fn persist_all(&self) -> Result<()> {
        let mut first_error = None;
        for provider in &self.providers {
            if let Err(e) = provider.persist() {
                log::warn!("Failed to persist {} state: {}", provider.kind(), e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// The standard provider set for a pack
    pub fn from_config(
        config: &PackConfig,
        transport: Arc<dyn Transport>,
        downloader: Arc<FileDownloader>,
    ) -> Result<Self> {
        let mut manager = Self::new();

        manager.add_provider(Arc::new(RegistryProvider::from_config(
            config,
            transport.clone(),
            downloader.cache(),
        )?));
        manager.add_provider(Arc::new(DirectProvider::new(downloader.clone())));
        manager.add_provider(Arc::new(LocalProvider::new(config.local_base(), downloader)));
        manager.add_provider(Arc::new(MavenProvider::from_config(config, transport.clone())?));
        manager.add_provider(Arc::new(GithubProvider::from_config(config, transport.clone())?));
        manager.add_provider(Arc::new(JenkinsProvider::from_config(config, transport)?));

        Ok(manager)
    }
}

impl Default for ProviderManager {
    fn default() -> Self {
        Self::new()
    }
}
