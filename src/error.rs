//! Error types shared across the document pipeline.
//!
//! [`DocumentError`] is what callers of the document service see.
//! [`ProviderError`] covers the external embedding and completion APIs.
//! Neither type carries user-facing wording; the HTTP layer in
//! [`crate::server`] decides how each variant is presented.

use std::path::PathBuf;

use thiserror::Error;

use crate::extract::ExtractError;

/// Errors returned by document operations (upload, get, delete, retrieve).
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The file extension is not one of the recognized formats.
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),

    /// The file was recognized but could not be parsed.
    #[error(transparent)]
    Extraction(#[from] ExtractError),

    /// No document with this id exists.
    #[error("document not found: {0}")]
    NotFound(String),

    /// A caller-supplied argument was rejected (e.g. `k == 0`).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The upload exceeds the configured size limit.
    #[error("file is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    /// Reading or writing persisted state failed.
    #[error("storage I/O on {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The metadata snapshot could not be serialized.
    #[error("failed to serialize document store: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DocumentError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}

/// Errors from the embedding and completion provider APIs.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider is disabled or missing a required setting.
    #[error("{0}")]
    NotConfigured(String),

    /// The provider answered with a non-success HTTP status.
    #[error("{provider} API error {status}: {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// The request never produced a response (connect failure, timeout).
    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The response body did not have the expected shape.
    #[error("invalid {provider} response: {message}")]
    InvalidResponse {
        provider: &'static str,
        message: String,
    },
}

impl ProviderError {
    /// Rate limits, server errors and transport failures are worth retrying.
    /// Authentication and malformed-request errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Api { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Transport { .. } => true,
            ProviderError::NotConfigured(_) | ProviderError::InvalidResponse { .. } => false,
        }
    }

    pub(crate) fn invalid(provider: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_server_errors_are_retryable() {
        let api = |status| ProviderError::Api {
            provider: "OpenAI",
            status,
            body: String::new(),
        };
        assert!(api(429).is_retryable());
        assert!(api(503).is_retryable());
        assert!(!api(401).is_retryable());
        assert!(!api(400).is_retryable());
        assert!(!ProviderError::NotConfigured("x".into()).is_retryable());
    }

    #[test]
    fn storage_error_names_the_path() {
        let err = DocumentError::storage(
            "/tmp/documents.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/documents.json"));
        assert!(msg.contains("denied"));
    }
}
