use std::fmt;

use thiserror::Error;

use crate::http::HttpError;

/// Entries that failed a consistency check, with the keys each one lacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompleteEntry {
    pub entry: String,
    pub keys: Vec<&'static str>,
}

impl fmt::Display for IncompleteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is missing {}", self.entry, self.keys.join(", "))
    }
}

#[derive(Error, Debug)]
pub enum ModpackError {
    // Configuration errors
    #[error("Invalid pack configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown side '{0}' (expected client, server or both)")]
    InvalidSide(String),

    #[error("Invalid declaration for {provider}: {message}")]
    InvalidDeclaration { provider: String, message: String },

    // Lookup errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No matching file for {name} (game versions: {game_versions}, version: {version})")]
    NoMatchingFile {
        name: String,
        game_versions: String,
        version: String,
    },

    // Consistency errors
    #[error("[{stage}] {} entries are incomplete: {}", .entries.len(), format_missing(.entries))]
    MissingFields {
        stage: &'static str,
        entries: Vec<IncompleteEntry>,
    },

    // Provider errors
    #[error("Provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    #[error("No provider registered for type '{0}'")]
    UnknownProvider(String),

    // Network errors
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    // JSON/parsing errors
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Download errors
    #[error("Download failed for {entry}: {reason}")]
    DownloadFailed { entry: String, reason: String },

    #[error("Checksum mismatch for {0}")]
    ChecksumMismatch(String),
}

fn format_missing(entries: &[IncompleteEntry]) -> String {
    entries
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ModpackError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ModpackError::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Lookup failures are recoverable: the entry is dropped and the run continues.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(self, ModpackError::NotFound(_) | ModpackError::NoMatchingFile { .. })
    }
}

pub type Result<T> = std::result::Result<T, ModpackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_message_lists_every_entry() {
        let err = ModpackError::MissingFields {
            stage: "fill_information",
            entries: vec![
                IncompleteEntry { entry: "Alpha".to_string(), keys: vec!["name", "package_type"] },
                IncompleteEntry { entry: "https://x/y.jar".to_string(), keys: vec!["url"] },
            ],
        };

        let msg = err.to_string();
        assert!(msg.starts_with("[fill_information] 2 entries"));
        assert!(msg.contains("Alpha is missing name, package_type"));
        assert!(msg.contains("https://x/y.jar is missing url"));
    }

    #[test]
    fn test_lookup_failures_are_recoverable() {
        assert!(ModpackError::NotFound("x".into()).is_lookup_failure());
        assert!(ModpackError::NoMatchingFile {
            name: "x".into(),
            game_versions: "1.12.2".into(),
            version: "-".into(),
        }
        .is_lookup_failure());
        assert!(!ModpackError::InvalidConfig("x".into()).is_lookup_failure());
    }
}
