//! Digest helpers for artifact verification and cache keys.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::Result;

/// Digests a backend may publish next to an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumType {
    Md5,
    Sha1,
    Sha256,
}

impl ChecksumType {
    /// Detect checksum type from length of hex string
    pub fn from_hex_length(len: usize) -> Option<Self> {
        match len {
            32 => Some(ChecksumType::Md5),
            40 => Some(ChecksumType::Sha1),
            64 => Some(ChecksumType::Sha256),
            _ => None,
        }
    }

    /// File extension repositories use for this digest (`.sha1`, ...)
    pub fn extension(self) -> &'static str {
        match self {
            ChecksumType::Md5 => "md5",
            ChecksumType::Sha1 => "sha1",
            ChecksumType::Sha256 => "sha256",
        }
    }
}

fn hex_digest<D: Digest>(data: &[u8]) -> String {
    let mut hasher = D::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Hex digest of an in-memory buffer
pub fn digest_hex(data: &[u8], checksum_type: ChecksumType) -> String {
    match checksum_type {
        ChecksumType::Md5 => hex_digest::<Md5>(data),
        ChecksumType::Sha1 => hex_digest::<Sha1>(data),
        ChecksumType::Sha256 => hex_digest::<Sha256>(data),
    }
}

/// SHA-256 of a string, used to key caches by URL
pub fn sha256_hex(value: &str) -> String {
    digest_hex(value.as_bytes(), ChecksumType::Sha256)
}

/// Verify checksum of a file
pub async fn verify_checksum(path: &Path, expected: &str, checksum_type: ChecksumType) -> Result<bool> {
    let buffer = tokio::fs::read(path).await?;
    let actual = digest_hex(&buffer, checksum_type);
    Ok(actual.eq_ignore_ascii_case(expected.trim()))
}

/// Pull the digest out of a published checksum file. These are either the
/// bare hex string or `<hex>  <file name>`.
pub fn parse_checksum_file(content: &str) -> Option<String> {
    let token = content.split_whitespace().next()?;
    let valid = ChecksumType::from_hex_length(token.len()).is_some()
        && token.chars().all(|c| c.is_ascii_hexdigit());
    valid.then(|| token.to_ascii_lowercase())
}
