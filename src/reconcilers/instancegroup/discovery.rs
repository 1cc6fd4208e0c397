// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cloud and cluster state discovery.
//!
//! Every reconcile pass starts from a fresh [`DiscoveredState`] snapshot;
//! nothing survives between passes. Discovery is ordered: adapter failures
//! on steps the rest of the pass depends on (nodes, scaling groups, cluster
//! handle, catalog, spot events) abort the pass, while IAM lookups and the
//! configuration reaper degrade to warnings because the objects may simply
//! not exist yet.

#[allow(clippy::wildcard_imports)]
use super::types::*;
use crate::constants::{
    IMAGE_LATEST, IMAGE_SSM_PREFIX, REASON_DISCOVERY_WARNING, SPOT_RECOMMENDATION_REASON,
};
use crate::naming;
use crate::scaling::pool::sub_family_flexible_pools;
use crate::spot;
use crate::tags;
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;

/// IAM state resolved for a resource.
pub struct IamState {
    /// Role name, derived or user-provided
    pub role_name: String,
    /// Instance profile name, derived or user-provided
    pub profile_name: String,
    /// Whether the role/profile pair is externally provided
    pub provided: bool,
    /// The role, when it exists
    pub role: Option<IamRole>,
    /// The instance profile, when it exists
    pub profile: Option<InstanceProfile>,
    /// Managed policy ARNs attached to a derived role
    pub attached_policies: Vec<String>,
}

/// Snapshot of everything a reconcile pass dispatches on.
///
/// Recomputed from scratch at the start of every pass, never persisted.
pub struct DiscoveredState {
    /// Event publisher bound to the resource identity
    pub publisher: EventPublisher,
    /// Shared name prefix of all owned cloud resources
    pub prefix: String,
    /// All cluster nodes
    pub nodes: Vec<Node>,
    /// Scaling groups owned by this controller for the cluster
    pub owned_scaling_groups: Vec<ScalingGroup>,
    /// The unique scaling group backing this resource, when provisioned
    pub scaling_group: Option<ScalingGroup>,
    /// Lifecycle hooks on the target scaling group
    pub lifecycle_hooks: Vec<LifecycleHook>,
    /// The polymorphic scaling-configuration handle
    pub configuration: ScalingConfiguration,
    /// IAM role and instance profile state
    pub iam: IamState,
    /// The managed cluster handle
    pub cluster_info: EksClusterInfo,
    /// Sub-family-flexible pools derived from offerings and the catalog
    pub instance_pool: BTreeMap<String, Vec<PoolInstance>>,
    /// Instance-type information catalog
    pub type_catalog: Vec<InstanceTypeInfo>,
    /// Fully resolved image id
    pub image_id: String,
    /// Effective spot price after advisor arbitration
    pub spot_price: Option<String>,
    /// Fleet lifecycle for this pass
    pub lifecycle: LifecycleKind,
    /// Whether the effective price came from an advisor recommendation
    pub using_spot_recommendation: bool,
    /// Whether the backing scaling group exists
    pub provisioned: bool,
    /// Whether every in-service instance has a Ready node
    pub nodes_ready: bool,
    /// Status draft assembled during discovery
    pub status: InstanceGroupStatus,
}

/// Join a scaling-group instance to its node object.
///
/// Node objects carry the cloud instance id as the trailing segment of
/// their provider id.
#[must_use]
pub fn node_for_instance<'a>(nodes: &'a [Node], instance_id: &str) -> Option<&'a Node> {
    nodes.iter().find(|node| {
        node.spec
            .as_ref()
            .and_then(|s| s.provider_id.as_deref())
            .is_some_and(|provider_id| {
                provider_id.rsplit('/').next() == Some(instance_id)
            })
    })
}

/// Whether a node's Ready condition reads True.
#[must_use]
pub fn node_is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

/// Whether every in-service instance of a group has a Ready node.
///
/// An empty instance list is vacuously ready.
#[must_use]
pub fn group_nodes_ready(group: &ScalingGroup, nodes: &[Node]) -> bool {
    group
        .instances
        .iter()
        .filter(|i| !i.is_terminating())
        .all(|instance| {
            node_for_instance(nodes, &instance.instance_id).is_some_and(node_is_ready)
        })
}

/// Build the [`DiscoveredState`] snapshot for one resource.
///
/// # Errors
///
/// Fatal failures abort the pass: listing nodes or scaling groups,
/// describing the cluster or the catalog, resolving the image reference,
/// more than one matching scaling group (`ValidationError`), or reading
/// spot events.
pub async fn cloud_discovery(
    group: &InstanceGroup,
    ctx: &Context,
    publisher: EventPublisher,
) -> ProvisionResult<DiscoveredState> {
    let eks = group.eks()?;
    let configuration = &eks.configuration;
    let namespace = group.namespace().unwrap_or_default();
    let name = group.name_any();
    let cluster_name = configuration.cluster_name.clone();

    let mut status = group.status.clone().unwrap_or_default();
    status.lifecycle = Some(LifecycleKind::Normal.to_string());

    // IAM names resolve before anything else so the shared prefix is known
    let (role_name, role_provided) = naming::role_name(
        &cluster_name,
        &namespace,
        &name,
        configuration.role_name.as_deref(),
    );
    let (profile_name, _) = naming::instance_profile_name(
        &cluster_name,
        &namespace,
        &name,
        configuration.instance_profile_name.as_deref(),
    );
    let prefix = naming::resource_prefix(&cluster_name, &namespace, &name);

    // The configuration handle starts from the last-known active name and
    // re-discovers once the concrete scaling group is bound
    let mut scaling_config = ScalingConfiguration::new(
        eks.r#type,
        &prefix,
        status.active_scaling_config_name.clone(),
    );
    scaling_config
        .discover(
            ctx.cloud.as_ref(),
            DiscoverInput {
                scaling_group: None,
                target_name: status.active_scaling_config_name.clone(),
            },
        )
        .await?;

    // Node readiness depends on this list; failures are fatal
    let nodes = ctx.cluster.list_nodes().await?;

    // IAM lookups record state but never abort: the objects may not exist
    // yet on the create path
    let role = match ctx.cloud.get_role(&role_name).await {
        Ok(role) => role,
        Err(e) => {
            warn!(role = %role_name, error = %e, "Role lookup failed");
            publisher
                .warning(
                    REASON_DISCOVERY_WARNING,
                    &format!("role lookup failed: {e}"),
                )
                .await;
            None
        }
    };
    if let Some(role) = &role {
        status.node_role_arn = Some(role.arn.clone());
    }

    let attached_policies = if role_provided || role.is_none() {
        Vec::new()
    } else {
        match ctx.cloud.list_attached_policies(&role_name).await {
            Ok(policies) => policies,
            Err(e) => {
                warn!(role = %role_name, error = %e, "Policy listing failed");
                Vec::new()
            }
        }
    };

    let profile = match ctx.cloud.get_instance_profile(&profile_name).await {
        Ok(profile) => profile,
        Err(e) => {
            warn!(profile = %profile_name, error = %e, "Instance profile lookup failed");
            None
        }
    };

    // Fatal describes: scaling groups, cluster handle, type catalog
    let all_groups = ctx.cloud.describe_scaling_groups().await?;
    let cluster_info = ctx.cloud.describe_cluster(&cluster_name).await?;
    let type_catalog = ctx.instance_types().await?;
    let offerings = ctx.cloud.describe_instance_type_offerings().await?;
    let instance_pool = sub_family_flexible_pools(&offerings, &type_catalog);

    let image_id = resolve_image(ctx, configuration, &cluster_info).await?;

    // Ownership partition; more than one match is a validation failure
    let owned_scaling_groups = tags::owned_groups(&all_groups, &cluster_name);
    let mut matches: Vec<&ScalingGroup> = owned_scaling_groups
        .iter()
        .filter(|g| tags::is_owned_by_resource(g, &cluster_name, &namespace, &name))
        .collect();
    if matches.len() > 1 {
        return Err(ProvisionError::validation(
            "scaling-groups",
            format!(
                "{} scaling groups match {namespace}/{name}; expected at most one",
                matches.len()
            ),
        ));
    }
    let target = matches.pop().cloned();

    let Some(target) = target else {
        // Not provisioned yet; the create path takes it from here
        let decision = spot::arbitrate(
            &[],
            configuration.spot_price.as_deref(),
            group.using_spot_recommendation(),
            false,
            false,
        );
        status.using_spot_recommendation = Some(decision.using_recommendation);
        super::status_helpers::set_nodes_ready(&mut status, false);
        return Ok(DiscoveredState {
            publisher,
            prefix,
            nodes,
            owned_scaling_groups,
            scaling_group: None,
            lifecycle_hooks: Vec::new(),
            configuration: scaling_config,
            iam: IamState {
                role_name,
                profile_name,
                provided: role_provided,
                role,
                profile,
                attached_policies,
            },
            cluster_info,
            instance_pool,
            type_catalog,
            image_id,
            spot_price: decision.spot_price,
            lifecycle: LifecycleKind::Normal,
            using_spot_recommendation: decision.using_recommendation,
            provisioned: false,
            nodes_ready: false,
            status,
        });
    };

    let nodes_ready = group_nodes_ready(&target, &nodes);

    // Spot advisor: reading events is fatal, adoption is gated on readiness
    let events = ctx
        .cluster
        .list_events(&namespace, &target.name, SPOT_RECOMMENDATION_REASON)
        .await?;
    let decision = spot::arbitrate(
        &events,
        configuration.spot_price.as_deref(),
        group.using_spot_recommendation(),
        true,
        nodes_ready,
    );
    status.using_spot_recommendation = Some(decision.using_recommendation);

    let mut lifecycle = LifecycleKind::Normal;
    if decision.spot_price.is_some() {
        lifecycle = LifecycleKind::Spot;
    }
    if let Some(policy) = &configuration.mixed_instances_policy {
        if super::update::spot_ratio_value(policy) > 0 {
            lifecycle = LifecycleKind::Mixed;
        }
    }
    status.lifecycle = Some(lifecycle.to_string());

    let lifecycle_hooks = ctx.cloud.describe_lifecycle_hooks(&target.name).await?;

    status.active_scaling_group_name = Some(target.name.clone());
    status.current_min = Some(target.min_size);
    status.current_max = Some(target.max_size);

    // Re-discover with the concrete scaling group bound
    scaling_config
        .discover(
            ctx.cloud.as_ref(),
            DiscoverInput {
                scaling_group: Some(&target),
                target_name: None,
            },
        )
        .await?;
    status.active_scaling_config_name = scaling_config.name().map(str::to_string);
    status.latest_template_version = scaling_config.latest_version().map(|v| v.to_string());

    // Reap superseded configurations; errors degrade to warnings
    let reap_input = DeleteConfigInput {
        active_name: scaling_config.name().map(str::to_string),
        prefix: prefix.clone(),
        delete_all: false,
        retain_versions: ctx.config.config_retention,
        in_use_version: target
            .launch_template
            .as_ref()
            .and_then(|t| t.version.as_deref())
            .and_then(|v| v.parse::<i64>().ok()),
    };
    if let Err(e) = scaling_config.delete(ctx.cloud.as_ref(), &reap_input).await {
        warn!(error = %e, "Configuration reap failed, continuing");
        publisher
            .warning(
                REASON_DISCOVERY_WARNING,
                &format!("configuration reap failed: {e}"),
            )
            .await;
    }

    super::status_helpers::set_nodes_ready(&mut status, nodes_ready);

    Ok(DiscoveredState {
        publisher,
        prefix,
        nodes,
        owned_scaling_groups,
        scaling_group: Some(target),
        lifecycle_hooks,
        configuration: scaling_config,
        iam: IamState {
            role_name,
            profile_name,
            provided: role_provided,
            role,
            profile,
            attached_policies,
        },
        cluster_info,
        instance_pool,
        type_catalog,
        image_id,
        spot_price: decision.spot_price,
        lifecycle,
        using_spot_recommendation: decision.using_recommendation,
        provisioned: true,
        nodes_ready,
        status,
    })
}

/// Resolve the image reference of the spec to a concrete image id.
///
/// Literal ids pass through; `latest` queries the newest published image
/// for the cluster's Kubernetes version; `ssm://<key>` reads the parameter
/// store.
async fn resolve_image(
    ctx: &Context,
    configuration: &EksConfiguration,
    cluster_info: &EksClusterInfo,
) -> ProvisionResult<String> {
    let image = configuration.image.as_str();

    if image == IMAGE_LATEST {
        return ctx
            .cloud
            .latest_image_id(&cluster_info.kubernetes_version)
            .await;
    }

    if let Some(key) = image.strip_prefix(IMAGE_SSM_PREFIX) {
        return match ctx.cloud.get_parameter(key).await {
            Ok(value) => Ok(value),
            Err(e) if e.is_not_found() => Err(ProvisionError::validation(
                "spec.eks.configuration.image",
                format!("parameter '{key}' does not resolve to an image"),
            )),
            Err(e) => Err(e),
        };
    }

    Ok(image.to_string())
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod discovery_tests;
