//! Backend providers and the manager that dispatches declarations to them.

mod direct;
mod github;
mod jenkins;
mod local;
mod manager;
mod maven;
mod registry;
mod traits;

pub use direct::DirectProvider;
pub use github::{GithubProvider, GithubSettings};
pub use jenkins::JenkinsProvider;
pub use local::LocalProvider;
pub use manager::ProviderManager;
pub use maven::{MavenMetadata, MavenProvider};
pub use registry::{select_file, Addon, AddonFile, RegistryProvider, RegistrySnapshot};
pub use traits::{apply_common_fields, Declaration, Provider};
