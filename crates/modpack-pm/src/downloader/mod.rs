//! Artifact acquisition.
//!
//! Downloads go through the on-disk [`Cache`](crate::cache::Cache): a cached
//! artifact is copied into place without touching the network, a miss is
//! downloaded, verified when a digest is known, and then stored for the next
//! run.

mod checksum;
mod file;

pub use checksum::{digest_hex, parse_checksum_file, sha256_hex, verify_checksum, ChecksumType};
pub use file::{DownloadResult, FileDownloader};
