// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Provisioning error types for instancemgr.
//!
//! This module provides the error taxonomy shared by the reconciliation
//! engine and both adapter interfaces:
//! - Intent validation failures (bad sizes, duplicate scaling groups)
//! - Cloud adapter failures (scaling groups, configurations, IAM)
//! - Cluster adapter failures (nodes, events, auth map)
//! - Not-found conditions, which delete paths treat as success
//! - Transient network failures
//!
//! Every error carries enough structure to be lifted into a status
//! condition and classified for retry.

use thiserror::Error;

/// Composite error type for all provisioning operations.
///
/// This is the primary error type returned by the reconciliation engine and
/// the adapter traits. Retry behavior is derived from the variant through
/// [`ProvisionError::is_retryable`], and status conditions use
/// [`ProvisionError::status_reason`].
#[derive(Error, Debug, Clone)]
pub enum ProvisionError {
    /// Invalid user intent (bad max<min, more than one matching scaling
    /// group, unresolvable image reference).
    ///
    /// Never retried; surfaced as a status condition until the spec changes.
    #[error("validation of '{field}' failed: {reason}")]
    Validation {
        /// The spec field or derived property that failed validation
        field: String,
        /// Explanation of what is invalid
        reason: String,
    },

    /// A cloud adapter call failed.
    ///
    /// Covers both transient and persistent cloud API failures; retried with
    /// exponential backoff.
    #[error("cloud API call '{operation}' failed: {reason}")]
    Cloud {
        /// The adapter operation that failed (e.g. "describe-scaling-groups")
        operation: String,
        /// The error reported by the cloud side
        reason: String,
    },

    /// A cluster adapter call failed (nodes, events, status, auth map).
    #[error("cluster API call '{operation}' failed: {reason}")]
    Cluster {
        /// The adapter operation that failed (e.g. "list-nodes")
        operation: String,
        /// The error reported by the API server
        reason: String,
    },

    /// A referenced object does not exist.
    ///
    /// Treated as success on delete paths and as absence on read paths.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// The kind of object (e.g. "launch configuration", "role")
        kind: String,
        /// The missing object's name
        name: String,
    },

    /// An optimistic write to shared cluster state lost the race.
    ///
    /// Retried immediately, then with capped backoff.
    #[error("conflicting write to '{resource}', retry with current version")]
    Conflict {
        /// The object whose resource version moved underneath us
        resource: String,
    },

    /// Network-level failure or timeout.
    #[error("transient failure during '{operation}': {reason}")]
    Transient {
        /// The operation that was interrupted
        operation: String,
        /// The underlying failure
        reason: String,
    },
}

/// Convenience alias used across the engine and the adapter traits.
pub type ProvisionResult<T> = std::result::Result<T, ProvisionError>;

impl ProvisionError {
    /// Returns true if the reconcile pass that hit this error should be
    /// requeued and retried.
    ///
    /// Validation failures are permanent until the user edits the spec;
    /// everything else is worth another pass.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Validation { .. })
    }

    /// Returns true if the error represents a missing object.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the error is an optimistic-concurrency conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns the status reason code for this error.
    ///
    /// This is used when updating status conditions to provide structured
    /// error information.
    #[must_use]
    pub fn status_reason(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "ValidationError",
            Self::Cloud { .. } => "CloudError",
            Self::Cluster { .. } => "ClusterError",
            Self::NotFound { .. } => "NotFound",
            Self::Conflict { .. } => "Conflict",
            Self::Transient { .. } => "Transient",
        }
    }

    /// Build a [`ProvisionError::Cloud`] from an operation name and any
    /// displayable cause.
    pub fn cloud(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Cloud {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a [`ProvisionError::Cluster`] from an operation name and any
    /// displayable cause.
    pub fn cluster(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Cluster {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a [`ProvisionError::Validation`] from a field and reason.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`ProvisionError::NotFound`] from a kind and name.
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

#[cfg(test)]
#[path = "provision_errors_tests.rs"]
mod provision_errors_tests;
