//! `reqwest` backed [`Transport`].
//!
//! Redirects are followed here rather than by reqwest so each hop goes
//! through the same retry policy and bearer lookup. Downloads stream into a
//! `.part` file that is renamed once complete.
//!
//! ```no_run
//! use modpack_pm::http::{HttpClient, HttpClientConfig, Transport};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::with_config(
//!     HttpClientConfig::new()
//!         .with_timeout(Duration::from_secs(60))
//!         .with_bearer("api.github.com", "ghp_xxx"),
//! )?;
//! let index = client.get_bytes("https://repo1.maven.org/maven2/").await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::{Client, Response, StatusCode};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use super::Transport;

const USER_AGENT: &str = concat!("modpack/", env!("CARGO_PKG_VERSION"));
const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Too many redirects from {url}")]
    TooManyRedirects { url: String },

    #[error("Bad redirect target '{location}' from {url}: {reason}")]
    BadRedirect {
        url: String,
        location: String,
        reason: String,
    },

    #[error("Invalid JSON from {0}")]
    JsonParse(String),
}

/// Backoff for idempotent GETs: `base`, `2 * base`, `4 * base`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retry {
    pub attempts: u32,
    pub base: Duration,
}

impl Retry {
    fn delay(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(1 << attempt.min(16))
    }

    /// Server errors and rate limiting are worth another try; other client
    /// errors are final.
    fn should_retry(status: StatusCode) -> bool {
        status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
    }
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            attempts: 3,
            base: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: Retry,
    /// Bearer tokens keyed by host; subdomains of the host match too
    pub bearer: HashMap<String, String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
            retry: Retry::default(),
            bearer: HashMap::new(),
        }
    }
}

impl HttpClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: Retry) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_bearer(mut self, host: impl Into<String>, token: impl Into<String>) -> Self {
        self.bearer.insert(host.into(), token.into());
        self
    }
}

pub struct HttpClient {
    client: Client,
    retry: Retry,
    bearer: HashMap<String, String>,
}

impl HttpClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_config(HttpClientConfig::default())
    }

    pub fn with_config(config: HttpClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .gzip(true)
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            client,
            retry: config.retry,
            bearer: config.bearer,
        })
    }

    /// GET `url`, following up to [`MAX_REDIRECTS`] `Location` hops
    pub async fn get(&self, url: &str) -> Result<Response, HttpError> {
        let mut current = url.to_string();

        for _ in 0..=MAX_REDIRECTS {
            let response = self.send(&current).await?;
            if !response.status().is_redirection() {
                return Ok(response);
            }

            let Some(location) = response.headers().get(LOCATION).and_then(|v| v.to_str().ok()) else {
                return Err(HttpError::HttpStatus {
                    status: response.status().as_u16(),
                    url: current,
                });
            };
            let next = redirect_target(&current, location)?;
            log::trace!("HTTP: {} -> {}", current, next);
            current = next;
        }

        Err(HttpError::TooManyRedirects { url: url.to_string() })
    }

    /// One hop, retried per [`Retry`]. Success and redirect statuses are
    /// returned as is.
    async fn send(&self, url: &str) -> Result<Response, HttpError> {
        let mut attempt = 0;
        loop {
            log::trace!("HTTP: GET {}", url);
            let mut request = self.client.get(url);
            if let Some(token) = self.token_for(url) {
                request = request.bearer_auth(token);
            }

            let error = match request.send().await {
                Ok(response) if response.status().is_success() || response.status().is_redirection() => {
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status();
                    let error = HttpError::HttpStatus {
                        status: status.as_u16(),
                        url: url.to_string(),
                    };
                    if !Retry::should_retry(status) {
                        return Err(error);
                    }
                    error
                }
                Err(e) => HttpError::Request(e),
            };

            if attempt >= self.retry.attempts {
                return Err(error);
            }
            let delay = self.retry.delay(attempt);
            log::debug!("{}; retrying in {:?}", error, delay);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn token_for(&self, url: &str) -> Option<&str> {
        let parsed = url::Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        self.bearer
            .iter()
            .find(|(domain, _)| {
                host == domain.as_str()
                    || host
                        .strip_suffix(domain.as_str())
                        .map_or(false, |prefix| prefix.ends_with('.'))
            })
            .map(|(_, token)| token.as_str())
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        Ok(self.get(url).await?.bytes().await?.to_vec())
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, HttpError> {
        let response = self.get(url).await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let written = stream_to_file(response.bytes_stream(), dest).await?;
        log::trace!("HTTP: {} bytes from {} to {}", written, url, dest.display());
        Ok(written)
    }
}

/// Write `body` to `dest` through a `.part` sibling, removed again on any
/// failure.
async fn stream_to_file<S, B, E>(body: S, dest: &Path) -> Result<u64, HttpError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    HttpError: From<E>,
{
    let partial = partial_path(dest);
    let result = write_partial(body, &partial, dest).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&partial).await;
    }
    result
}

async fn write_partial<S, B, E>(body: S, partial: &Path, dest: &Path) -> Result<u64, HttpError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    HttpError: From<E>,
{
    let mut body = std::pin::pin!(body);
    let mut file = tokio::fs::File::create(partial).await?;
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(chunk.as_ref()).await?;
        written += chunk.as_ref().len() as u64;
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(partial, dest).await?;
    Ok(written)
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

fn redirect_target(current: &str, location: &str) -> Result<String, HttpError> {
    url::Url::parse(current)
        .and_then(|base| base.join(location))
        .map(String::from)
        .map_err(|e| HttpError::BadRedirect {
            url: current.to_string(),
            location: location.to_string(),
            reason: e.to_string(),
        })
}
