// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Deterministic reconcile-state classification.
//!
//! A pure function from the discovery snapshot and the resource's deletion
//! timestamp to the next state. Classification only acts on resources still
//! at `Init`; later transitions belong to the dispatch paths, which keeps
//! the classifier idempotent.

use crate::cloud::types::ScalingGroup;
use crate::constants::SCALING_GROUP_DELETING_STATUS;
use crate::crd::ReconcileState;

/// Classify the situation discovered for a resource.
///
/// | deleting | provisioned | group deleting | -> next |
/// |---|---|---|---|
/// | yes | yes | yes | `Deleting` |
/// | yes | yes | no  | `InitDelete` |
/// | yes | no  | -   | `Deleted` |
/// | no  | yes | -   | `InitUpdate` |
/// | no  | no  | -   | `InitCreate` |
///
/// A current state other than `Init` passes through unchanged.
#[must_use]
pub fn classify(
    current: ReconcileState,
    deleting: bool,
    provisioned: bool,
    scaling_group: Option<&ScalingGroup>,
) -> ReconcileState {
    if current != ReconcileState::Init {
        return current;
    }

    let group_deleting = scaling_group
        .and_then(|g| g.status.as_deref())
        .is_some_and(|s| s == SCALING_GROUP_DELETING_STATUS);

    match (deleting, provisioned) {
        (true, true) if group_deleting => ReconcileState::Deleting,
        (true, true) => ReconcileState::InitDelete,
        (true, false) => ReconcileState::Deleted,
        (false, true) => ReconcileState::InitUpdate,
        (false, false) => ReconcileState::InitCreate,
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod state_tests;
