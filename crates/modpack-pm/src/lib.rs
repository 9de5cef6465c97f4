pub mod cache;
pub mod config;
pub mod downloader;
pub mod entry;
pub mod error;
pub mod feature;
pub mod http;
pub mod loader;
pub mod normalize;
pub mod path;
pub mod pipeline;
pub mod provider;
pub mod resolver;
pub mod sidecar;

pub use error::{IncompleteEntry, ModpackError, Result};
pub use config::{DependencyPolicy, LoaderVersion, PackConfig, ProviderSettings, ResolutionMode};
pub use entry::{Coordinate, DependencyKind, Entry, PackageType, ProviderKind, ReleaseType, Side};
pub use feature::Feature;
pub use cache::Cache;
pub use downloader::{DownloadResult, FileDownloader};
pub use http::{HttpClient, HttpClientConfig, HttpError, Transport};
pub use provider::{Provider, ProviderManager};
pub use pipeline::{run_batch, PackOutcome, PackResult, Pipeline};
