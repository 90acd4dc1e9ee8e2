//! Error types for the cloudhold control layer.
//!
//! This module provides the error hierarchy for every stage of a resource's
//! life: configuration, remote calls, cache and draft bookkeeping, and
//! post-action convergence checks.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for cloudhold.
#[derive(Debug, Error)]
pub enum CloudholdError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Resource cache, draft and remote call errors.
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    /// Post-action convergence errors.
    #[error("Convergence error: {0}")]
    Convergence(#[from] ConvergenceError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },
}

/// Failures reported by a remote control-plane client.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Authentication or authorization failed.
    #[error("authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// The control plane answered with a non-success status.
    #[error("request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the control plane.
        message: String,
    },

    /// The addressed resource does not exist.
    #[error("not found: {resource}")]
    NotFound {
        /// Identifier or path that was addressed.
        resource: String,
    },

    /// Rate limited.
    #[error("rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("network error: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// The response could not be understood.
    #[error("invalid response: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// The resource kind does not support this operation.
    #[error("{operation} is not supported by this resource kind")]
    Unsupported {
        /// Operation that was attempted.
        operation: &'static str,
    },
}

/// Errors raised by entities, modules and drafts.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The target does not exist remotely.
    #[error("{resource} not found")]
    NotFound {
        /// Identity of the missing resource.
        resource: String,
    },

    /// The remote call itself failed.
    #[error("{operation} {resource} failed: {source}")]
    Transport {
        /// Operation that was attempted (get, list, create_or_update, delete, restart).
        operation: &'static str,
        /// Identity of the resource involved.
        resource: String,
        /// Root cause reported by the client.
        #[source]
        source: RemoteError,
    },

    /// A draft was committed more than once, or modified after its commit.
    #[error("draft for {resource} has already been committed")]
    CommitReuse {
        /// Identity of the draft target.
        resource: String,
    },

    /// A create draft targeted a resource that already exists.
    #[error("{resource} already exists")]
    AlreadyExists {
        /// Identity of the existing resource.
        resource: String,
    },

    /// Two distinct entities were about to share one cache key.
    #[error("cache key conflict for {key}")]
    CacheKeyConflict {
        /// The contested (resource group, name) key.
        key: String,
    },

    /// A resource identifier could not be parsed.
    #[error("invalid resource id '{id}': {reason}")]
    InvalidId {
        /// The offending identifier.
        id: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Errors raised while verifying that a remote action converged.
#[derive(Debug, Error)]
pub enum ConvergenceError {
    /// The attempt budget ran out before a healthy probe.
    #[error("{target} did not converge after {attempts} attempts (last observed: {last})")]
    Timeout {
        /// What was being verified.
        target: String,
        /// Probe invocations made.
        attempts: u32,
        /// Last observed probe outcome, informational only.
        last: String,
    },

    /// The probe reported a hard failure.
    #[error("{target} is unhealthy: {reason}")]
    Unhealthy {
        /// What was being verified.
        target: String,
        /// Reason reported by the probe.
        reason: String,
    },

    /// The probe itself failed to run.
    #[error("probe for {target} failed on attempt {attempt}: {message}")]
    ProbeFailed {
        /// What was being verified.
        target: String,
        /// Attempt on which the probe failed.
        attempt: u32,
        /// Description of the failure.
        message: String,
    },

    /// The caller cancelled verification.
    #[error("verification of {target} was cancelled")]
    Cancelled {
        /// What was being verified.
        target: String,
    },
}

/// Result type alias for cloudhold operations.
pub type Result<T> = std::result::Result<T, CloudholdError>;

impl CloudholdError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Resource(ResourceError::Transport {
                source: RemoteError::RateLimited { .. } | RemoteError::NetworkError { .. },
                ..
            })
        )
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Resource(ResourceError::Transport { source, .. }) => match source {
                RemoteError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
                RemoteError::NetworkError { .. } => Some(5),
                _ => None,
            },
            _ => None,
        }
    }

    /// Returns true if this error means the remote target does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Resource(ResourceError::NotFound { .. }))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl RemoteError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

impl ResourceError {
    /// Wraps a client failure with the operation and resource it concerned.
    #[must_use]
    pub fn transport(operation: &'static str, resource: impl Into<String>, source: RemoteError) -> Self {
        Self::Transport {
            operation,
            resource: resource.into(),
            source,
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_retryable() {
        let err = CloudholdError::from(ResourceError::transport(
            "get",
            "rg/server-1",
            RemoteError::RateLimited { retry_after_secs: 30 },
        ));

        assert!(err.is_retryable());
        assert_eq!(err.retry_delay_secs(), Some(30));
    }

    #[test]
    fn test_auth_failure_not_retryable() {
        let err = CloudholdError::from(ResourceError::transport(
            "delete",
            "rg/server-1",
            RemoteError::AuthenticationFailed {
                message: String::from("expired token"),
            },
        ));

        assert!(!err.is_retryable());
        assert_eq!(err.retry_delay_secs(), None);
    }

    #[test]
    fn test_transport_message_carries_context() {
        let err = ResourceError::transport("list", "rg/server-1", RemoteError::network("reset"));
        let message = err.to_string();

        assert!(message.contains("list"));
        assert!(message.contains("rg/server-1"));
        assert!(message.contains("reset"));
    }
}
