// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Teardown of an instance group's cloud state.
//!
//! Delete order is fixed: scaling group first, then the scaling
//! configurations, then the derived IAM objects. A scaling group must
//! never outlive its backing configuration, so nothing later in the chain
//! runs while the group delete fails. The auth-map entry is removed last,
//! and that removal runs even when an earlier step failed, so a torn-down
//! role can never linger in the shared map.

#[allow(clippy::wildcard_imports)]
use super::types::*;
use super::discovery::DiscoveredState;
use crate::authmap;

/// Tolerate not-found on a delete-path call.
fn absorb_missing(result: ProvisionResult<()>) -> ProvisionResult<()> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

async fn teardown_cloud_state(state: &mut DiscoveredState, ctx: &Context) -> ProvisionResult<()> {
    let cloud = ctx.cloud.as_ref();

    if let Some(scaling_group) = &state.scaling_group {
        info!(scaling_group = %scaling_group.name, "Deleting scaling group");
        absorb_missing(cloud.delete_scaling_group(&scaling_group.name).await)?;
    }

    state
        .configuration
        .delete(
            cloud,
            &DeleteConfigInput {
                active_name: state.configuration.name().map(str::to_string),
                prefix: state.prefix.clone(),
                delete_all: true,
                retain_versions: ctx.config.config_retention,
                in_use_version: None,
            },
        )
        .await?;

    if state.iam.provided {
        debug!("Role and profile are externally provided, leaving them in place");
        return Ok(());
    }

    if state.iam.role.is_some() || state.iam.profile.is_some() {
        info!(role = %state.iam.role_name, "Deleting derived node role and profile");

        if !state.iam.attached_policies.is_empty() {
            absorb_missing(
                cloud
                    .detach_role_policies(&state.iam.role_name, &state.iam.attached_policies)
                    .await,
            )?;
        }
        absorb_missing(
            cloud
                .remove_role_from_instance_profile(&state.iam.profile_name, &state.iam.role_name)
                .await,
        )?;
        absorb_missing(cloud.delete_instance_profile(&state.iam.profile_name).await)?;
        absorb_missing(cloud.delete_role(&state.iam.role_name).await)?;
    }

    Ok(())
}

/// Tear down everything owned by a deleted instance group.
///
/// # Errors
///
/// Returns the first failing step; the auth-map removal still runs before
/// the error propagates.
pub async fn teardown(
    group: &InstanceGroup,
    state: &mut DiscoveredState,
    ctx: &Context,
) -> ProvisionResult<()> {
    let result = teardown_cloud_state(state, ctx).await;

    // Guaranteed: the role leaves the shared auth map when no sibling
    // still references it, even when cloud teardown failed mid-way
    let role_arn = state
        .iam
        .role
        .as_ref()
        .map(|r| r.arn.clone())
        .or_else(|| {
            group
                .status
                .as_ref()
                .and_then(|s| s.node_role_arn.clone())
        });
    if let Some(role_arn) = role_arn {
        if let Err(e) =
            authmap::remove_auth_role(ctx.cluster.as_ref(), &state.publisher, &role_arn).await
        {
            warn!(role_arn = %role_arn, error = %e, "Auth map removal failed");
            if result.is_ok() {
                return Err(e);
            }
        }
    }

    result
}

#[cfg(test)]
#[path = "delete_tests.rs"]
mod delete_tests;
