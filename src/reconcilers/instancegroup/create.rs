// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! First-time provisioning of an instance group.
//!
//! Order matters: the IAM role and instance profile come first (the machine
//! definition references the profile ARN) and the role is registered in the
//! shared auth map, then the scaling configuration, then the scaling group
//! carrying tags, subnets, lifecycle hooks and the mixed-instances policy.

#[allow(clippy::wildcard_imports)]
use super::types::*;
use super::discovery::DiscoveredState;
use super::update::{desired_mixed_instances, group_config_ref};
use crate::authmap;
use crate::constants::{DEFAULT_MANAGED_POLICIES, NODE_ROLE_TRUST_POLICY};
use crate::naming::managed_policy_arn;
use crate::scaling::timestamped_name;
use crate::tags::desired_group_tags;
use kube::ResourceExt;

/// Assemble the desired machine definition from spec and discovery.
#[must_use]
pub fn machine_config(eks: &EksSpec, state: &DiscoveredState) -> MachineConfig {
    let configuration = &eks.configuration;
    MachineConfig {
        image_id: state.image_id.clone(),
        instance_type: configuration.instance_type.clone(),
        instance_profile_arn: state.iam.profile.as_ref().map(|p| p.arn.clone()),
        security_groups: configuration.node_security_groups.clone(),
        spot_price: state.spot_price.clone(),
        key_name: configuration.key_pair_name.clone(),
        user_data: Some(render_user_data(configuration)),
        block_devices: configuration.volumes.iter().map(Into::into).collect(),
        license_specifications: configuration.license_specifications.clone(),
        placement: configuration.placement.as_ref().map(Into::into),
    }
}

/// Render the node bootstrap script.
///
/// The user-supplied script fragment runs first, then the EKS bootstrap
/// call with labels, taints and extra arguments.
#[must_use]
pub fn render_user_data(configuration: &EksConfiguration) -> String {
    let mut script = String::from("#!/bin/bash\n");

    if let Some(user_data) = &configuration.user_data {
        script.push_str(user_data.trim_end());
        script.push('\n');
    }

    let mut kubelet_args = Vec::new();
    if !configuration.labels.is_empty() {
        let labels: Vec<String> = configuration
            .labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        kubelet_args.push(format!("--node-labels={}", labels.join(",")));
    }
    if !configuration.taints.is_empty() {
        let taints: Vec<String> = configuration
            .taints
            .iter()
            .map(|t| {
                format!(
                    "{}={}:{}",
                    t.key,
                    t.value.as_deref().unwrap_or_default(),
                    t.effect
                )
            })
            .collect();
        kubelet_args.push(format!("--register-with-taints={}", taints.join(",")));
    }

    script.push_str("set -o xtrace\n");
    script.push_str(&format!(
        "/etc/eks/bootstrap.sh {}",
        configuration.cluster_name
    ));
    if !kubelet_args.is_empty() {
        script.push_str(&format!(
            " --kubelet-extra-args '{}'",
            kubelet_args.join(" ")
        ));
    }
    if let Some(arguments) = &configuration.bootstrap_arguments {
        if !arguments.is_empty() {
            script.push(' ');
            script.push_str(arguments);
        }
    }
    script.push('\n');
    script
}

/// The managed policy ARNs a derived role should carry.
#[must_use]
pub fn desired_policy_arns(configuration: &EksConfiguration) -> Vec<String> {
    let mut arns: Vec<String> = DEFAULT_MANAGED_POLICIES
        .iter()
        .map(|p| managed_policy_arn(p))
        .collect();
    for policy in &configuration.managed_policies {
        let arn = managed_policy_arn(policy);
        if !arns.contains(&arn) {
            arns.push(arn);
        }
    }
    arns
}

/// Ensure the node role and instance profile exist and are wired together.
///
/// Externally provided roles are looked up and must exist; derived roles
/// are created with the worker trust policy and the baseline managed
/// policies plus the requested ones.
///
/// # Errors
///
/// Returns a validation error when a provided role or profile is missing,
/// or the underlying cloud error.
pub async fn ensure_node_role(state: &mut DiscoveredState, ctx: &Context, eks: &EksSpec) -> ProvisionResult<()> {
    let cloud = ctx.cloud.as_ref();

    if state.iam.provided {
        if state.iam.role.is_none() {
            state.iam.role = cloud.get_role(&state.iam.role_name).await?;
        }
        if state.iam.profile.is_none() {
            state.iam.profile = cloud.get_instance_profile(&state.iam.profile_name).await?;
        }
        let Some(role) = &state.iam.role else {
            return Err(ProvisionError::validation(
                "spec.eks.configuration.roleName",
                format!("provided role '{}' does not exist", state.iam.role_name),
            ));
        };
        if state.iam.profile.is_none() {
            return Err(ProvisionError::validation(
                "spec.eks.configuration.instanceProfileName",
                format!(
                    "provided instance profile '{}' does not exist",
                    state.iam.profile_name
                ),
            ));
        }
        state.status.node_role_arn = Some(role.arn.clone());
        return Ok(());
    }

    if state.iam.role.is_none() {
        info!(role = %state.iam.role_name, "Creating node role");
        let role = cloud
            .create_role(&state.iam.role_name, NODE_ROLE_TRUST_POLICY)
            .await?;
        state.iam.role = Some(role);
    }

    if state.iam.profile.is_none() {
        info!(profile = %state.iam.profile_name, "Creating instance profile");
        let profile = cloud.create_instance_profile(&state.iam.profile_name).await?;
        cloud
            .add_role_to_instance_profile(&state.iam.profile_name, &state.iam.role_name)
            .await?;
        state.iam.profile = Some(profile);
    }

    let desired = desired_policy_arns(&eks.configuration);
    let missing: Vec<String> = desired
        .iter()
        .filter(|arn| !state.iam.attached_policies.contains(arn))
        .cloned()
        .collect();
    if !missing.is_empty() {
        cloud
            .attach_role_policies(&state.iam.role_name, &missing)
            .await?;
        state.iam.attached_policies.extend(missing);
    }

    if let Some(role) = &state.iam.role {
        state.status.node_role_arn = Some(role.arn.clone());
    }
    Ok(())
}

/// Provision all cloud-side objects for a fresh instance group.
///
/// # Errors
///
/// Any failing step fails the pass; the next pass re-discovers and resumes
/// where cloud state left off, so partial provisioning converges.
pub async fn provision(
    group: &InstanceGroup,
    state: &mut DiscoveredState,
    ctx: &Context,
) -> ProvisionResult<()> {
    let eks = group.eks()?;
    let configuration = &eks.configuration;
    let cloud = ctx.cloud.as_ref();

    ensure_node_role(state, ctx, eks).await?;

    // Bootstrap: the node role joins the shared auth map before any
    // instance tries to register
    if let Some(role_arn) = state.status.node_role_arn.clone() {
        authmap::ensure_auth_role(ctx.cluster.as_ref(), &state.publisher, &role_arn).await?;
    }

    // Materialize the machine definition
    let desired = machine_config(eks, state);
    let config_name = match state.configuration.kind() {
        ScalingConfigurationKind::LaunchConfiguration => timestamped_name(&state.prefix),
        ScalingConfigurationKind::LaunchTemplate => state.prefix.clone(),
    };
    state
        .configuration
        .create(
            cloud,
            &CreateConfigInput {
                name: config_name.clone(),
                config: desired,
            },
        )
        .await?;

    // Re-discover so the new resource (or version) is bound as target
    state
        .configuration
        .discover(
            cloud,
            DiscoverInput {
                scaling_group: None,
                target_name: Some(config_name.clone()),
            },
        )
        .await?;
    state.status.active_scaling_config_name =
        state.configuration.name().map(str::to_string);
    state.status.latest_template_version =
        state.configuration.latest_version().map(|v| v.to_string());

    let namespace = group.namespace().unwrap_or_default();
    let name = group.name_any();
    let tags = desired_group_tags(
        &state.prefix,
        &configuration.cluster_name,
        &namespace,
        &name,
        &configuration.tags,
    );

    let mixed_instances = desired_mixed_instances(configuration, state);
    let config_ref = group_config_ref(&state.configuration, &config_name);

    info!(
        scaling_group = %state.prefix,
        min = eks.min_size,
        max = eks.max_size,
        "Creating scaling group"
    );
    cloud
        .create_scaling_group(&CreateScalingGroupInput {
            name: state.prefix.clone(),
            min_size: eks.min_size,
            max_size: eks.max_size,
            subnets: configuration.subnets.clone(),
            tags,
            config_ref,
            mixed_instances,
        })
        .await?;

    for hook in &configuration.lifecycle_hooks {
        cloud
            .put_lifecycle_hook(&state.prefix, &LifecycleHook::from(hook))
            .await?;
    }

    state.status.active_scaling_group_name = Some(state.prefix.clone());
    state.status.current_min = Some(eks.min_size);
    state.status.current_max = Some(eks.max_size);

    Ok(())
}

#[cfg(test)]
#[path = "create_tests.rs"]
mod create_tests;
