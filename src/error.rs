//! Crate-wide error taxonomy.
//!
//! Every kernel component returns [`KernelError`] at its public boundary,
//! collapsing the per-entity error enums a larger system would accumulate
//! into the six kinds named by the error handling design: validation,
//! capacity, not-found/conflict, timeout, external and fatal.

use thiserror::Error;

/// The kernel's single error type, crossing every component boundary.
#[derive(Debug, Error, Clone)]
pub enum KernelError {
    /// Input failed schema validation, an unsafe path/command was rejected,
    /// or a dependency insertion would have formed a cycle.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A bounded resource (agent pool, queue, per-agent inbox) is full.
    #[error("capacity exceeded: {0}")]
    Capacity(String),

    /// An id was not found in its registry.
    #[error("not found: {kind} {id}")]
    NotFound {
        /// The kind of entity that was looked up, e.g. "task" or "agent".
        kind: &'static str,
        /// The id that was not found.
        id: String,
    },

    /// An operation conflicts with existing state (duplicate registration,
    /// illegal state transition).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A bounded operation (probe, plugin lifecycle, task, consensus) did
    /// not complete within its timeout.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// A transport, auth, or external backend failure.
    #[error("external failure: {0}")]
    External(String),

    /// An unrecoverable condition: circular plugin dependency, plugin
    /// initialization failure, or coordinator state corruption. Triggers
    /// orderly shutdown of everything already initialised.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl KernelError {
    /// Whether this error kind is retried automatically by callers that
    /// implement backoff, as opposed to being a terminal, user-facing
    /// failure.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::External(_))
    }

    /// The JSON-RPC error code this kernel error maps to on the wire.
    #[must_use]
    pub fn json_rpc_code(&self) -> i32 {
        match self {
            Self::Validation(_) => -32602,
            Self::NotFound { .. } | Self::Conflict(_) => -32000,
            Self::Capacity(_) => -32000,
            Self::Timeout(_) => -32000,
            Self::External(_) => -32000,
            Self::Fatal(_) => -32603,
        }
    }
}

/// A convenience alias used throughout the kernel.
pub type KernelResult<T> = Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_and_external_are_retryable() {
        assert!(KernelError::Timeout("x".into()).is_retryable());
        assert!(KernelError::External("x".into()).is_retryable());
        assert!(!KernelError::Validation("x".into()).is_retryable());
    }

    #[test]
    fn fatal_maps_to_internal_error_code() {
        assert_eq!(KernelError::Fatal("x".into()).json_rpc_code(), -32603);
    }
}
