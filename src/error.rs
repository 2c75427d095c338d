//! Error types and handling for the airsounds fetcher

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::models::SourceKind;
use crate::providers::ProviderError;

/// Stage of a run in which a fatal error happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Fetch,
    Write,
    Index,
    Digest,
    Publish,
}

/// Main error type for a fetch run. Every variant is fatal for the run.
#[derive(Error, Debug)]
pub enum AirsoundsError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Upstream provider failed to deliver data
    #[error("Fetching {provider} failed: {cause}")]
    Fetch {
        provider: SourceKind,
        #[source]
        cause: ProviderError,
    },

    /// Upstream provider did not answer within the fetch deadline
    #[error("Fetching {provider} timed out after {}s", after.as_secs())]
    Timeout { provider: SourceKind, after: Duration },

    /// Artifact or index could not be written
    #[error("Failed to write {}: {cause}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    /// Record could not be serialized
    #[error("Failed to encode {}: {cause}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        cause: serde_json::Error,
    },

    /// Persisted index exists but cannot be read or parsed
    #[error("Index {} is unreadable: {message}", path.display())]
    IndexCorrupt { path: PathBuf, message: String },

    /// Digest rebuild failed
    #[error("Digest error: {message}")]
    Digest { message: String },

    /// Change publication failed
    #[error("Publish error: {message}")]
    Publish { message: String },
}

impl AirsoundsError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new fetch error for a provider
    pub fn fetch(provider: SourceKind, cause: ProviderError) -> Self {
        Self::Fetch { provider, cause }
    }

    pub fn write(path: impl Into<PathBuf>, cause: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            cause,
        }
    }

    pub fn encode(path: impl Into<PathBuf>, cause: serde_json::Error) -> Self {
        Self::Encode {
            path: path.into(),
            cause,
        }
    }

    pub fn index_corrupt<S: Into<String>>(path: impl Into<PathBuf>, message: S) -> Self {
        Self::IndexCorrupt {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn digest<S: Into<String>>(message: S) -> Self {
        Self::Digest {
            message: message.into(),
        }
    }

    /// Create a new publish error
    pub fn publish<S: Into<String>>(message: S) -> Self {
        Self::Publish {
            message: message.into(),
        }
    }

    /// Stage of the run that failed
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Config { .. } => Stage::Config,
            Self::Fetch { .. } | Self::Timeout { .. } => Stage::Fetch,
            Self::Write { .. } | Self::Encode { .. } => Stage::Write,
            Self::IndexCorrupt { .. } => Stage::Index,
            Self::Digest { .. } => Stage::Digest,
            Self::Publish { .. } => Stage::Publish,
        }
    }

    /// Source whose pipeline failed, if the failure belongs to one
    #[must_use]
    pub fn source_kind(&self) -> Option<SourceKind> {
        match self {
            Self::Fetch { provider, .. } | Self::Timeout { provider, .. } => Some(*provider),
            _ => None,
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Config { message } => format!("Configuration error: {message}"),
            Self::Fetch { provider, .. } | Self::Timeout { provider, .. } => {
                format!("Unable to fetch {provider} data. Nothing was published; re-run later.")
            }
            Self::Write { .. } | Self::Encode { .. } => {
                "Failed to write forecast files. Please check the data directory.".to_string()
            }
            Self::IndexCorrupt { path, .. } => format!(
                "The index file {} is corrupt. Fix or remove it and re-run.",
                path.display()
            ),
            Self::Digest { message } | Self::Publish { message } => message.clone(),
        }
    }
}
