//! Error types for MedIQ.
//!
//! Library crates use [`MediqError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//! Capability providers report [`CapabilityError`], which pipeline
//! stages degrade on rather than propagate.

use std::path::PathBuf;

/// Top-level error type for all MedIQ operations.
#[derive(Debug, thiserror::Error)]
pub enum MediqError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Corpus index loading error (malformed records, row mismatch).
    #[error("index error: {0}")]
    Index(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (empty query, invalid payload shape, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MediqError>;

impl MediqError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Capability errors
// ---------------------------------------------------------------------------

/// Machine-readable failure category for an external capability call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityErrorKind {
    /// No credentials, prompt, or endpoint configured for the capability.
    Unavailable,
    /// Transport-level failure (connection, TLS, non-success status).
    Transport,
    /// The provider rejected the call with a rate-limit status.
    RateLimited,
    /// The provider responded, but the payload could not be parsed.
    InvalidResponse,
    /// The call exceeded its deadline.
    Timeout,
}

impl CapabilityErrorKind {
    /// Stable string form used in diagnostics and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::Transport => "transport",
            Self::RateLimited => "rate_limited",
            Self::InvalidResponse => "invalid_response",
            Self::Timeout => "timeout",
        }
    }
}

/// Failure of a single external capability call.
///
/// Stages never bubble these to the pipeline caller; the engine records
/// the failure and degrades the stage locally.
#[derive(Debug, Clone, thiserror::Error)]
#[error("capability {kind:?}: {message}")]
pub struct CapabilityError {
    pub kind: CapabilityErrorKind,
    /// HTTP status when the failure came from a provider response.
    pub status: Option<u16>,
    pub message: String,
}

/// Result alias for capability calls.
pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;

impl CapabilityError {
    /// Capability not configured (missing key, prompt, or endpoint).
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self {
            kind: CapabilityErrorKind::Unavailable,
            status: None,
            message: msg.into(),
        }
    }

    /// Transport-level failure without a provider status.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self {
            kind: CapabilityErrorKind::Transport,
            status: None,
            message: msg.into(),
        }
    }

    /// Failure derived from a non-success provider status code.
    ///
    /// 429 maps to [`CapabilityErrorKind::RateLimited`] so the UI can
    /// explain a weak answer distinctly from a generic failure.
    pub fn from_status(status: u16, msg: impl Into<String>) -> Self {
        let kind = if status == 429 {
            CapabilityErrorKind::RateLimited
        } else {
            CapabilityErrorKind::Transport
        };
        Self {
            kind,
            status: Some(status),
            message: msg.into(),
        }
    }

    /// Unparseable provider payload.
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self {
            kind: CapabilityErrorKind::InvalidResponse,
            status: None,
            message: msg.into(),
        }
    }

    /// Deadline exceeded.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self {
            kind: CapabilityErrorKind::Timeout,
            status: None,
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = MediqError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = MediqError::validation("vectors.jsonl row count mismatch");
        assert!(err.to_string().contains("row count mismatch"));
    }

    #[test]
    fn rate_limit_status_maps_to_distinct_kind() {
        let err = CapabilityError::from_status(429, "slow down");
        assert_eq!(err.kind, CapabilityErrorKind::RateLimited);
        assert_eq!(err.status, Some(429));

        let err = CapabilityError::from_status(500, "boom");
        assert_eq!(err.kind, CapabilityErrorKind::Transport);
    }
}
