// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Convergence of an already provisioned instance group.
//!
//! Reconciles tags, IAM policies, the auth-map entry and lifecycle hooks,
//! produces a new scaling configuration when the machine definition
//! drifted, re-points the scaling group, and decides whether instance
//! rotation is required. Tag and policy reconciliation works on
//! added/removed sets.

#[allow(clippy::wildcard_imports)]
use super::types::*;
use super::create::{desired_policy_arns, ensure_node_role, machine_config};
use super::discovery::DiscoveredState;
use crate::authmap;
use crate::crd::MixedInstancesPolicy;
use crate::scaling::timestamped_name;
use crate::tags::{desired_group_tags, tag_diff};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

/// The spot ratio of a mixed-instances policy, as a plain percentage.
#[must_use]
pub fn spot_ratio_value(policy: &MixedInstancesPolicy) -> i64 {
    match &policy.spot_ratio {
        None => 0,
        Some(IntOrString::Int(i)) => i64::from(*i),
        Some(IntOrString::String(s)) => {
            s.trim_end_matches('%').parse::<i64>().unwrap_or(0)
        }
    }
}

/// The mixed-instances wiring the scaling group should carry, if any.
#[must_use]
pub fn desired_mixed_instances(
    configuration: &EksConfiguration,
    state: &DiscoveredState,
) -> Option<MixedInstancesSpec> {
    let policy = configuration.mixed_instances_policy.as_ref()?;

    let anchor = configuration.instance_type.clone();
    let overrides = state
        .instance_pool
        .get(&anchor)
        .cloned()
        .unwrap_or_else(|| {
            vec![PoolInstance {
                instance_type: anchor,
                weight: "1".to_string(),
            }]
        });

    Some(MixedInstancesSpec {
        launch_template_name: state.prefix.clone(),
        overrides,
        on_demand_percentage: 100 - spot_ratio_value(policy),
    })
}

/// The configuration reference the scaling group should point at.
#[must_use]
pub fn group_config_ref(
    configuration: &ScalingConfiguration,
    fallback_name: &str,
) -> GroupConfigRef {
    let name = configuration
        .name()
        .unwrap_or(fallback_name)
        .to_string();
    match configuration.kind() {
        ScalingConfigurationKind::LaunchConfiguration => {
            GroupConfigRef::LaunchConfiguration(name)
        }
        ScalingConfigurationKind::LaunchTemplate => GroupConfigRef::LaunchTemplate {
            name,
            version: configuration
                .latest_version()
                .map_or_else(|| "1".to_string(), |v| v.to_string()),
        },
    }
}

fn current_config_ref(group: &ScalingGroup) -> Option<GroupConfigRef> {
    if let Some(name) = &group.launch_configuration_name {
        return Some(GroupConfigRef::LaunchConfiguration(name.clone()));
    }
    group
        .launch_template
        .as_ref()
        .map(|t| GroupConfigRef::LaunchTemplate {
            name: t.name.clone(),
            version: t.version.clone().unwrap_or_default(),
        })
}

/// Converge an existing instance group toward its spec.
///
/// # Returns
///
/// The next reconcile state: `InitUpgrade` when stale instances need
/// rotation, `Ready` when converged with ready nodes, `ReconcileModifying`
/// while the fleet settles.
///
/// # Errors
///
/// Any failing adapter call fails the pass.
pub async fn converge(
    group: &InstanceGroup,
    state: &mut DiscoveredState,
    ctx: &Context,
) -> ProvisionResult<ReconcileState> {
    let eks = group.eks()?;
    let configuration = &eks.configuration;
    let cloud = ctx.cloud.as_ref();

    let Some(target) = state.scaling_group.clone() else {
        return Err(ProvisionError::validation(
            "scaling-group",
            "update dispatched without a provisioned scaling group",
        ));
    };

    ensure_node_role(state, ctx, eks).await?;

    // Re-assert the auth map entry; a no-op while it is already present,
    // and it restores entries lost to out-of-band edits
    if let Some(role_arn) = state.status.node_role_arn.clone() {
        authmap::ensure_auth_role(ctx.cluster.as_ref(), &state.publisher, &role_arn).await?;
    }

    // Detach policies that fell out of the desired set (derived roles only)
    if !state.iam.provided {
        let desired_policies = desired_policy_arns(configuration);
        let extraneous: Vec<String> = state
            .iam
            .attached_policies
            .iter()
            .filter(|arn| !desired_policies.contains(arn))
            .cloned()
            .collect();
        if !extraneous.is_empty() {
            info!(count = extraneous.len(), "Detaching extraneous policies");
            cloud
                .detach_role_policies(&state.iam.role_name, &extraneous)
                .await?;
            state
                .iam
                .attached_policies
                .retain(|arn| !extraneous.contains(arn));
        }
    }

    // Reconcile tags as added/removed sets
    let namespace = group.namespace().unwrap_or_default();
    let name = group.name_any();
    let desired_tags = desired_group_tags(
        &state.prefix,
        &configuration.cluster_name,
        &namespace,
        &name,
        &configuration.tags,
    );
    let (added, removed) = tag_diff(&target.tags, &desired_tags);
    if !added.is_empty() {
        cloud.create_or_update_tags(&target.name, &added).await?;
    }
    if !removed.is_empty() {
        cloud.delete_tags(&target.name, &removed).await?;
    }

    // Reconcile lifecycle hooks
    let desired_hooks: Vec<LifecycleHook> = configuration
        .lifecycle_hooks
        .iter()
        .map(LifecycleHook::from)
        .collect();
    for hook in &desired_hooks {
        if !state.lifecycle_hooks.contains(hook) {
            cloud.put_lifecycle_hook(&target.name, hook).await?;
        }
    }
    for hook in &state.lifecycle_hooks {
        if !desired_hooks.iter().any(|d| d.name == hook.name) {
            cloud.delete_lifecycle_hook(&target.name, &hook.name).await?;
        }
    }

    // Produce a new configuration when the machine definition drifted
    let desired_config = machine_config(eks, state);
    if state.configuration.drifted(&desired_config) {
        let config_name = match state.configuration.kind() {
            ScalingConfigurationKind::LaunchConfiguration => timestamped_name(&state.prefix),
            ScalingConfigurationKind::LaunchTemplate => state.prefix.clone(),
        };
        info!(configuration = %config_name, "Creating drift-free configuration");
        state
            .configuration
            .create(
                cloud,
                &CreateConfigInput {
                    name: config_name.clone(),
                    config: desired_config,
                },
            )
            .await?;
        state
            .configuration
            .discover(
                cloud,
                DiscoverInput {
                    scaling_group: None,
                    target_name: Some(config_name),
                },
            )
            .await?;
        state.status.active_scaling_config_name =
            state.configuration.name().map(str::to_string);
        state.status.latest_template_version =
            state.configuration.latest_version().map(|v| v.to_string());
    }

    // Re-point and resize the scaling group when anything moved
    let desired_mixed = desired_mixed_instances(configuration, state);
    let desired_ref = group_config_ref(&state.configuration, &state.prefix);
    let sizes_changed = target.min_size != eks.min_size || target.max_size != eks.max_size;
    let ref_changed = current_config_ref(&target).as_ref() != Some(&desired_ref);
    let mixed_changed = target.mixed_instances != desired_mixed;

    if sizes_changed || ref_changed || mixed_changed {
        info!(
            scaling_group = %target.name,
            sizes_changed = sizes_changed,
            ref_changed = ref_changed,
            mixed_changed = mixed_changed,
            "Updating scaling group"
        );
        cloud
            .update_scaling_group(&UpdateScalingGroupInput {
                name: target.name.clone(),
                min_size: eks.min_size,
                max_size: eks.max_size,
                config_ref: desired_ref,
                mixed_instances: desired_mixed,
            })
            .await?;
        state.status.current_min = Some(eks.min_size);
        state.status.current_max = Some(eks.max_size);

        // Rotation compares instances against the new reference
        if let Some(updated) = state.scaling_group.as_mut() {
            *updated = cloud
                .describe_scaling_groups()
                .await?
                .into_iter()
                .find(|g| g.name == target.name)
                .unwrap_or(target.clone());
        }
    }

    let rotation_target = state.scaling_group.as_ref().unwrap_or(&target);
    if state.configuration.rotation_needed(rotation_target) {
        return Ok(ReconcileState::InitUpgrade);
    }

    if state.nodes_ready {
        Ok(ReconcileState::Ready)
    } else {
        Ok(ReconcileState::ReconcileModifying)
    }
}

#[cfg(test)]
#[path = "update_tests.rs"]
mod update_tests;
