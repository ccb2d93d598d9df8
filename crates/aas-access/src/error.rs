//! Error types for credential resolution.

use thiserror::Error;

/// Errors surfaced by the access coordinator and its collaborators.
///
/// A declined credential is not an error: it is reported as `Ok(None)` and
/// remembered for the session. Everything here leaves the cache untouched,
/// so a later call may retry.
///
/// The type is `Clone` because every caller waiting on the same resolution
/// receives an identical copy of its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum AccessError {
    /// Interactive resolution was requested but no resolver is registered.
    #[error("Configuration error: no interactive resolver registered")]
    NoResolver,

    /// The location is empty or cannot be normalized.
    #[error("Invalid location: {0:?}")]
    InvalidLocation(String),

    /// The resolver raised an error while determining a credential.
    #[error("Resolution failed for {location}: {message}")]
    ResolutionFailed {
        /// Normalized location key.
        location: String,
        /// Resolver error, rendered without secret material.
        message: String,
    },

    /// The resolver did not finish within the configured timeout.
    #[error("Resolution timed out for {location}")]
    TimedOut {
        /// Normalized location key.
        location: String,
    },

    /// The call that started the resolution was cancelled before it finished.
    #[error("Resolution cancelled for {location}")]
    Cancelled {
        /// Normalized location key.
        location: String,
    },

    /// Credential store I/O or format error.
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AccessError {
    /// Check if retrying the same call may succeed.
    ///
    /// Returns `true` for resolver failures, timeouts and cancellations.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ResolutionFailed { .. } | Self::TimedOut { .. } | Self::Cancelled { .. }
        )
    }

    /// Check if this is a configuration problem of the embedding application.
    pub const fn is_configuration_error(&self) -> bool {
        matches!(self, Self::NoResolver | Self::Config(_))
    }

    /// Check if this is a cancellation.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Result type alias using `AccessError`.
pub type Result<T> = std::result::Result<T, AccessError>;

impl From<std::io::Error> for AccessError {
    fn from(err: std::io::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<serde_json::Error> for AccessError {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(err.to_string())
    }
}
