// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes reconciliation logic for instance groups.
//!
//! This module contains the reconciliation engine for the `InstanceGroup`
//! custom resource, following the standard controller pattern:
//!
//! 1. **Discover** - Snapshot cloud and cluster state for the resource
//! 2. **Classify** - Map the snapshot onto a reconcile state
//! 3. **Dispatch** - Run the create, update, upgrade or delete path
//! 4. **Status** - Report the resulting state back to Kubernetes
//!
//! # Available Entry Points
//!
//! - [`reconcile_instance_group`] - one full pass for a live resource
//! - [`cleanup_instance_group`] - one teardown pass for a deleted resource

pub mod instancegroup;

pub use instancegroup::{cleanup_instance_group, reconcile_instance_group};

/// Check if a resource's spec has changed by comparing generation with
/// `observed_generation`.
///
/// `metadata.generation` is incremented by Kubernetes only when the spec
/// changes, while `status.observed_generation` is set by the controller
/// after processing a spec.
///
/// # Returns
///
/// * `true` - spec changed, or first reconciliation
/// * `false` - spec unchanged (status-only update)
#[must_use]
pub fn should_reconcile(current_generation: Option<i64>, observed_generation: Option<i64>) -> bool {
    match (current_generation, observed_generation) {
        (Some(current), Some(observed)) => current != observed,
        (Some(_), None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod mod_tests;
