// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition helpers for instance groups.
//!
//! Conditions follow the standard Kubernetes shape: a type, a True/False
//! status, a CamelCase reason and a human-readable message, stamped with an
//! RFC3339 transition time. Timestamps only move when the condition
//! actually changes, so steady states do not churn the status subresource.

use chrono::Utc;

use crate::crd::{Condition, InstanceGroupStatus};
use crate::provision_errors::ProvisionError;

/// Condition type reporting fleet readiness.
pub const CONDITION_NODES_READY: &str = "NodesReady";

/// Condition type lifting the latest reconcile failure.
pub const CONDITION_RECONCILE_FAILED: &str = "ReconcileFailed";

/// Create a new condition with the current timestamp.
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

/// Insert or replace a condition by type, preserving the transition time
/// when nothing changed.
pub fn set_condition(status: &mut InstanceGroupStatus, condition: Condition) {
    if let Some(existing) = status
        .conditions
        .iter_mut()
        .find(|c| c.r#type == condition.r#type)
    {
        let unchanged = existing.status == condition.status
            && existing.reason == condition.reason
            && existing.message == condition.message;
        if !unchanged {
            *existing = condition;
        }
        return;
    }
    status.conditions.push(condition);
}

/// Drop a condition by type.
pub fn clear_condition(status: &mut InstanceGroupStatus, condition_type: &str) {
    status.conditions.retain(|c| c.r#type != condition_type);
}

/// Record fleet readiness as the `NodesReady` condition.
pub fn set_nodes_ready(status: &mut InstanceGroupStatus, ready: bool) {
    let condition = if ready {
        create_condition(
            CONDITION_NODES_READY,
            "True",
            "NodesJoined",
            "all scaling-group instances have ready nodes",
        )
    } else {
        create_condition(
            CONDITION_NODES_READY,
            "False",
            "NodesNotReady",
            "some scaling-group instances have no ready node",
        )
    };
    set_condition(status, condition);
}

/// Lift a reconcile failure into the status conditions.
pub fn set_failure(status: &mut InstanceGroupStatus, error: &ProvisionError) {
    let condition = create_condition(
        CONDITION_RECONCILE_FAILED,
        "True",
        error.status_reason(),
        &error.to_string(),
    );
    set_condition(status, condition);
}

/// Clear a previously recorded reconcile failure.
pub fn clear_failure(status: &mut InstanceGroupStatus) {
    clear_condition(status, CONDITION_RECONCILE_FAILED);
}

#[cfg(test)]
#[path = "status_helpers_tests.rs"]
mod status_helpers_tests;
