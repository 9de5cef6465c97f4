//! HTTP access for providers and the acquisition cache.
//!
//! Everything that touches the network goes through the [`Transport`] trait so
//! a pack run can be driven by [`HttpClient`] in production and by an
//! in-memory transport in tests.

mod client;

pub use client::{HttpClient, HttpClientConfig, HttpError, Retry};

use std::path::Path;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Network capability shared by providers and downloaders.
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET a resource into memory.
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, HttpError>;

    /// Stream a resource to `dest`, creating parent directories. Returns the
    /// number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, HttpError>;

    /// GET a text resource, mapping 404 to `None`.
    async fn get_text_opt(&self, url: &str) -> Result<Option<String>, HttpError> {
        match self.get_bytes(url).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(HttpError::HttpStatus { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// GET and deserialize a JSON document.
pub async fn get_json<T: DeserializeOwned>(
    transport: &dyn Transport,
    url: &str,
) -> Result<T, HttpError> {
    let bytes = transport.get_bytes(url).await?;
    serde_json::from_slice(&bytes).map_err(|e| HttpError::JsonParse(format!("{}: {}", url, e)))
}
