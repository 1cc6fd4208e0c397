// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Budgeted instance rotation (rolling update).
//!
//! One pass per reconcile: partition instances into current and stale,
//! resolve the availability budget, and terminate at most as many stale
//! instances as the budget allows after subtracting everything already
//! unavailable. Scale-group membership is the source of truth; node
//! objects join by the instance-id suffix of their provider id. No state
//! survives between passes.

#[allow(clippy::wildcard_imports)]
use super::types::*;
use super::discovery::{node_for_instance, node_is_ready, DiscoveredState};
use crate::constants::REASON_ROTATING;
use crate::metrics;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

/// Resolve `maxUnavailable` against the desired instance count.
///
/// Percentages round up; anything at or below zero floors to one so a
/// configured `"0%"` still rotates a single instance at a time.
#[must_use]
pub fn resolve_max_unavailable(value: Option<&IntOrString>, desired: i64) -> i64 {
    let resolved = match value {
        None => 1,
        Some(IntOrString::Int(i)) => i64::from(*i),
        Some(IntOrString::String(s)) => {
            let percent = s.trim_end_matches('%').parse::<i64>().unwrap_or(0);
            // round up: 25% of 10 is 3
            (percent * desired + 99) / 100
        }
    };

    if resolved <= 0 {
        debug!(desired = desired, "maxUnavailable resolved to zero, flooring to 1");
        1
    } else {
        resolved
    }
}

/// Run one rotation pass.
///
/// # Returns
///
/// `true` when no stale instances remain, `false` when another pass is
/// needed (budget exhausted or terminations in flight).
///
/// # Errors
///
/// Fails when cordon, drain or terminate calls fail; the pass is safe to
/// re-run because membership is re-read every time.
pub async fn rotate_once(
    group: &InstanceGroup,
    state: &DiscoveredState,
    ctx: &Context,
) -> ProvisionResult<bool> {
    let Some(scaling_group) = &state.scaling_group else {
        return Ok(true);
    };

    let stale: Vec<&ScalingInstance> = scaling_group
        .instances
        .iter()
        .filter(|i| !state.configuration.instance_current(i))
        .collect();
    if stale.is_empty() {
        return Ok(true);
    }

    let desired = scaling_group.desired_capacity.max(1);
    let max_unavailable = resolve_max_unavailable(group.max_unavailable(), desired);

    // Everything already out of service eats into the budget
    let terminating = scaling_group
        .instances
        .iter()
        .filter(|i| i.is_terminating())
        .count() as i64;
    let current_not_ready = scaling_group
        .instances
        .iter()
        .filter(|i| state.configuration.instance_current(i) && !i.is_terminating())
        .filter(|i| {
            !node_for_instance(&state.nodes, &i.instance_id).is_some_and(node_is_ready)
        })
        .count() as i64;
    let unavailable = terminating + current_not_ready;

    let budget = max_unavailable - unavailable;
    if budget <= 0 {
        debug!(
            max_unavailable = max_unavailable,
            unavailable = unavailable,
            stale = stale.len(),
            "Rotation budget exhausted, waiting for the fleet to recover"
        );
        return Ok(false);
    }

    let victims: Vec<&ScalingInstance> = stale
        .iter()
        .filter(|i| !i.is_terminating())
        .take(budget as usize)
        .copied()
        .collect();

    info!(
        scaling_group = %scaling_group.name,
        stale = stale.len(),
        rotating = victims.len(),
        budget = budget,
        "Rotating stale instances"
    );
    state
        .publisher
        .normal(
            REASON_ROTATING,
            &format!(
                "rotating {} of {} stale instances in {}",
                victims.len(),
                stale.len(),
                scaling_group.name
            ),
        )
        .await;

    for victim in &victims {
        if let Some(node) = node_for_instance(&state.nodes, &victim.instance_id) {
            let node_name = node.name_any();
            ctx.cluster.cordon_node(&node_name).await?;
            ctx.cluster
                .drain_node(&node_name, ctx.config.drain_grace_seconds)
                .await?;
        } else {
            debug!(
                instance = %victim.instance_id,
                "No node joined for instance, terminating without drain"
            );
        }

        // shouldDecrement=false: the group launches a replacement on the
        // active configuration
        ctx.cloud
            .terminate_instance(&victim.instance_id, false)
            .await?;
    }

    metrics::record_rotation(&scaling_group.name, victims.len());
    Ok(false)
}

#[cfg(test)]
#[path = "rotation_tests.rs"]
mod rotation_tests;
