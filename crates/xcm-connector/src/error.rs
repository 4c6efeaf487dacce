//! Error types for cluster connection
//!
//! Errors carry enough structure for the caller to tell apart the failure
//! classes of a bootstrap run: a remote operation that never converged, a
//! terminal API failure, a partially applied batch, a broken manifest
//! catalog, or a missing local credential.

use std::time::Duration;

use thiserror::Error;

use crate::orchestrator::Stage;
use crate::pki::PkiError;
use crate::reconcile::ApplyError;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for connector operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// One or more objects in an apply batch failed
    #[error(transparent)]
    Apply(#[from] ApplyError),

    /// A polled operation did not converge within its budget
    #[error("timed out after {}s waiting for {operation}", timeout.as_secs())]
    Timeout {
        /// What was being waited on
        operation: String,
        /// The budget that was exhausted
        timeout: Duration,
    },

    /// The run was cancelled by the caller
    #[error("cancelled while {operation}")]
    Cancelled {
        /// What was in flight when cancellation fired
        operation: String,
    },

    /// Certificate or key generation failed
    #[error(transparent)]
    Pki(#[from] PkiError),

    /// An embedded manifest is malformed or renders to an unsupported kind
    #[error("manifest {manifest} is invalid: {message}")]
    Manifest {
        /// Catalog path of the manifest
        manifest: String,
        /// Description of what's wrong
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// The persisted admin credential could not be loaded or parsed
    #[error("cannot load control plane admin config: {message}")]
    Credential {
        /// Description of what failed
        message: String,
    },

    /// A bootstrap stage failed
    #[error("{stage} failed: {source}")]
    Stage {
        /// Stage that was running
        stage: Stage,
        /// The originating error
        #[source]
        source: Box<Error>,
    },

    /// Validation error for caller supplied input
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred
        context: String,
    },
}

impl Error {
    /// Create a timeout error for the given operation
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Create a cancellation error for the given operation
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a manifest error for a catalog entry
    pub fn manifest(manifest: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Manifest {
            manifest: manifest.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error for a specific resource kind
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a credential loading error
    pub fn credential(msg: impl Into<String>) -> Self {
        Self::Credential {
            message: msg.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with a specific context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Wrap this error with the stage it escaped from
    ///
    /// Already staged errors keep their innermost stage.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            staged @ Error::Stage { .. } => staged,
            other => Error::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// True when the remote API reported the object as missing
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 404,
            Error::Stage { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// True when a create lost a race with another writer
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 409,
            Error::Stage { source, .. } => source.is_conflict(),
            _ => false,
        }
    }

    /// Check if this error is retryable
    ///
    /// Timeouts, cancellation, certificate, manifest and invariant failures
    /// are final.
    /// Kubernetes errors are retryable unless the API answered with a 4xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::Apply(apply) => apply.is_not_yet_available(),
            Error::Timeout { .. } => false,
            Error::Cancelled { .. } => false,
            Error::Pki(_) => false,
            Error::Manifest { .. } => false,
            Error::Serialization { .. } => false,
            Error::Credential { .. } => false,
            Error::Stage { source, .. } => source.is_retryable(),
            Error::Validation { .. } => false,
            Error::Internal { .. } => false,
        }
    }

    /// Stage the error escaped from, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Result type for connector operations
pub type Result<T> = std::result::Result<T, Error>;
