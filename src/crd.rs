// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for worker-fleet management.
//!
//! This module defines the `InstanceGroup` custom resource used by
//! instancemgr to manage homogeneous pools of EKS worker nodes
//! declaratively, plus the supporting spec, status and state types.
//!
//! # Resource Types
//!
//! - [`InstanceGroup`] - A homogeneous pool of worker nodes backed by a
//!   cloud scaling group
//!
//! # Example: Creating an InstanceGroup
//!
//! ```yaml
//! apiVersion: instancemgr.keikoproj.io/v1alpha1
//! kind: InstanceGroup
//! metadata:
//!   name: ig1
//!   namespace: default
//! spec:
//!   provisioner: eks
//!   strategy:
//!     type: rollingUpdate
//!     rollingUpdate:
//!       maxUnavailable: 1
//!   eks:
//!     minSize: 1
//!     maxSize: 3
//!     type: LaunchConfiguration
//!     configuration:
//!       clusterName: production
//!       image: ami-0001
//!       instanceType: m5.large
//!       keyPairName: ops
//!       nodeSecurityGroups: [sg-aaa]
//!       subnets: [subnet-1, subnet-2]
//! ```

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::constants::PROVISIONER_EKS;
use crate::provision_errors::{ProvisionError, ProvisionResult};

/// Condition represents an observation of a resource's current state.
///
/// Conditions are used in status subresources to communicate the state of
/// a resource to users and controllers.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition. The controller reports `NodesReady`.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Reconcile state machine positions.
///
/// The classifier maps every discovered situation onto one of these states;
/// the driver dispatches on them and writes the resulting state back into
/// the status subresource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema)]
pub enum ReconcileState {
    /// Freshly admitted, not yet classified
    #[default]
    Init,
    /// No cloud state exists for this resource; create path runs next
    InitCreate,
    /// Cloud state exists; update path runs next
    InitUpdate,
    /// Stale instances detected; rotation runs next
    InitUpgrade,
    /// Deletion requested; teardown runs next
    InitDelete,
    /// Backing resources are converging
    ReconcileModifying,
    /// A mutation was submitted this pass
    ReconcileModified,
    /// Cloud-side teardown is in flight
    Deleting,
    /// Terminal: all cloud state is gone
    Deleted,
    /// Terminal until spec or cloud state changes
    Ready,
    /// Terminal: non-retryable failure
    #[serde(rename = "Error")]
    Err,
}

impl ReconcileState {
    /// Whether a pass ending in this state should be requeued.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Err | Self::Ready | Self::Deleted)
    }

    /// Whether this state marks the end of a deletion.
    #[must_use]
    pub fn is_terminal_delete(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "Init",
            Self::InitCreate => "InitCreate",
            Self::InitUpdate => "InitUpdate",
            Self::InitUpgrade => "InitUpgrade",
            Self::InitDelete => "InitDelete",
            Self::ReconcileModifying => "ReconcileModifying",
            Self::ReconcileModified => "ReconcileModified",
            Self::Deleting => "Deleting",
            Self::Deleted => "Deleted",
            Self::Ready => "Ready",
            Self::Err => "Error",
        };
        f.write_str(name)
    }
}

/// Fleet lifecycle reported in status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleKind {
    /// On-demand instances only
    #[default]
    Normal,
    /// Spot instances at the configured bid
    Spot,
    /// Mixed-instances policy with a spot ratio
    Mixed,
}

impl fmt::Display for LifecycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::Spot => f.write_str("spot"),
            Self::Mixed => f.write_str("mixed"),
        }
    }
}

/// Upgrade strategy selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema)]
pub enum UpgradeStrategyType {
    /// Rotate stale instances in-place under an availability budget
    #[default]
    #[serde(rename = "rollingUpdate")]
    RollingUpdate,
    /// Delegate rotation to a user-provided custom resource
    #[serde(rename = "crd")]
    Crd,
}

/// Rolling-update strategy parameters.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RollingUpdateStrategy {
    /// Maximum number (or percentage) of nodes that may be unavailable
    /// during rotation. Percentages round up against the desired count;
    /// a resolved value of zero floors to one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<IntOrString>,
}

/// CRD-delegated upgrade strategy parameters.
///
/// The controller renders `spec` (a JSON or YAML manifest fragment) with the
/// active scaling-configuration name, submits it, and polls
/// `statusJSONPath` until it reads `successString` or `failureString`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CrdUpgradeStrategy {
    /// Name of the custom resource kind to submit (plural, lowercased)
    pub name: String,

    /// Manifest fragment submitted as the upgrade resource's spec
    pub spec: String,

    /// Dotted path into the submitted resource's status
    #[serde(rename = "statusJSONPath")]
    pub status_json_path: String,

    /// Value at the status path that marks the upgrade complete
    pub success_string: String,

    /// Value at the status path that marks the upgrade failed
    pub failure_string: String,
}

/// Upgrade strategy: how stale instances are replaced after drift.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeStrategy {
    /// Strategy selector
    #[serde(default)]
    pub r#type: UpgradeStrategyType,

    /// Parameters for `type: crd`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crd: Option<CrdUpgradeStrategy>,

    /// Parameters for `type: rollingUpdate`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolling_update: Option<RollingUpdateStrategy>,
}

/// Scaling-configuration flavor backing the scaling group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema)]
pub enum ScalingConfigurationKind {
    /// Immutable, name-identified machine template
    #[default]
    LaunchConfiguration,
    /// Versioned machine template identified by name + version
    LaunchTemplate,
}

/// Block device attached to every instance in the group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeVolume {
    /// Device name (e.g. `/dev/xvda`)
    pub name: String,

    /// Volume type (e.g. `gp3`)
    pub r#type: String,

    /// Volume size in GiB
    pub size: i64,

    /// Provisioned IOPS, for volume types that support it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iops: Option<i64>,

    /// Snapshot to restore the volume from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,

    /// Whether the volume is deleted when its instance terminates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_on_termination: Option<bool>,

    /// Whether the volume is encrypted at rest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
}

/// A custom tag propagated to the scaling group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeyValuePair {
    /// Tag key
    pub key: String,
    /// Tag value
    pub value: String,
}

/// A taint applied to nodes at registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeTaint {
    /// Taint key
    pub key: String,

    /// Taint value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Taint effect: `NoSchedule`, `PreferNoSchedule` or `NoExecute`
    pub effect: String,
}

/// Placement constraints forwarded to the machine template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlacementSpec {
    /// Availability zone to pin instances to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,

    /// Placement group name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,

    /// Tenancy: `default`, `dedicated` or `host`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenancy: Option<String>,
}

/// Stage at which a lifecycle hook fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStage {
    /// Hook fires while an instance launches
    #[default]
    Launch,
    /// Hook fires while an instance terminates
    Terminate,
}

/// A lifecycle hook managed on the scaling group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleHookSpec {
    /// Hook name, unique within the group
    pub name: String,

    /// Launch or terminate stage
    #[serde(default)]
    pub stage: LifecycleStage,

    /// Result when the heartbeat times out: `CONTINUE` or `ABANDON`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_result: Option<String>,

    /// Heartbeat timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_timeout: Option<i64>,

    /// Notification target for hook events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_arn: Option<String>,

    /// Role assumed to publish notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,

    /// Free-form metadata forwarded with notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

/// Mixed-instances policy: run the anchor type next to interchangeable
/// siblings, at a spot ratio.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MixedInstancesPolicy {
    /// Pool derivation strategy; only `subFamilyFlexible` is supported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_pool: Option<String>,

    /// Percentage of capacity to run on spot, 0..100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spot_ratio: Option<IntOrString>,
}

/// Machine definition and fleet wiring for the EKS provisioner.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EksConfiguration {
    /// Name of the EKS cluster the nodes join
    pub cluster_name: String,

    /// Image reference: a literal image id, the sentinel `latest`, or
    /// `ssm://<key>` resolved through the parameter store
    pub image: String,

    /// Instance type for the fleet (the anchor type under a
    /// mixed-instances policy)
    pub instance_type: String,

    /// SSH key pair installed on the nodes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_pair_name: Option<String>,

    /// Security groups attached to every node
    #[serde(default)]
    pub node_security_groups: Vec<String>,

    /// Subnets the scaling group spans
    #[serde(default)]
    pub subnets: Vec<String>,

    /// Block devices attached to every node
    #[serde(default)]
    pub volumes: Vec<NodeVolume>,

    /// Custom tags merged onto the scaling group
    #[serde(default)]
    pub tags: Vec<KeyValuePair>,

    /// Node labels passed to the bootstrap script
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Node taints passed to the bootstrap script
    #[serde(default)]
    pub taints: Vec<NodeTaint>,

    /// Extra arguments appended to the bootstrap invocation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_arguments: Option<String>,

    /// User-data script prepended to the generated bootstrap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,

    /// Spot bid price; empty means on-demand unless the spot advisor is
    /// active
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spot_price: Option<String>,

    /// Existing IAM role to use instead of a derived one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,

    /// Existing instance profile to use instead of a derived one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_profile_name: Option<String>,

    /// Managed policies attached to the derived role, by name or full ARN
    #[serde(default)]
    pub managed_policies: Vec<String>,

    /// License configuration ARNs forwarded to the machine template
    #[serde(default)]
    pub license_specifications: Vec<String>,

    /// Placement constraints forwarded to the machine template
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement: Option<PlacementSpec>,

    /// Mixed-instances policy for the scaling group
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mixed_instances_policy: Option<MixedInstancesPolicy>,

    /// Lifecycle hooks managed on the scaling group
    #[serde(default)]
    pub lifecycle_hooks: Vec<LifecycleHookSpec>,
}

/// EKS provisioner parameters.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EksSpec {
    /// Minimum fleet size
    #[schemars(range(min = 0))]
    pub min_size: i64,

    /// Maximum fleet size
    #[schemars(range(min = 0))]
    pub max_size: i64,

    /// Scaling-configuration flavor backing the group
    #[serde(default)]
    pub r#type: ScalingConfigurationKind,

    /// Machine definition and fleet wiring
    pub configuration: EksConfiguration,
}

/// `InstanceGroup` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceGroupStatus {
    /// Name of the scaling group backing this resource
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_scaling_group_name: Option<String>,

    /// Name of the active launch configuration or launch template
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_scaling_config_name: Option<String>,

    /// Latest template version, when the template flavor is active
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_template_version: Option<String>,

    /// ARN of the node role registered in the auth map
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_role_arn: Option<String>,

    /// Current minimum size as reported by the cloud
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_min: Option<i64>,

    /// Current maximum size as reported by the cloud
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_max: Option<i64>,

    /// Fleet lifecycle: `normal`, `spot` or `mixed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<String>,

    /// Observed conditions, e.g. `NodesReady`
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Whether the spot price was taken from an advisor recommendation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub using_spot_recommendation: Option<bool>,

    /// Position in the reconcile state machine
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<ReconcileState>,

    /// Generation last processed by the controller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// `InstanceGroup` declares a homogeneous pool of worker nodes.
///
/// The controller converges cloud-side objects (scaling group, launch
/// configuration or launch template, IAM role and instance profile,
/// lifecycle hooks) to match this specification, keeps the shared auth map
/// synchronized with the node role, and rotates instances when the machine
/// definition drifts.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "instancemgr.keikoproj.io",
    version = "v1alpha1",
    kind = "InstanceGroup",
    namespaced,
    shortname = "ig",
    shortname = "igs",
    doc = "InstanceGroup declares a homogeneous pool of EKS worker nodes backed by a cloud scaling group.",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Min","type":"integer","jsonPath":".status.currentMin"}"#,
    printcolumn = r#"{"name":"Max","type":"integer","jsonPath":".status.currentMax"}"#,
    printcolumn = r#"{"name":"Group","type":"string","jsonPath":".status.activeScalingGroupName"}"#,
    printcolumn = r#"{"name":"Lifecycle","type":"string","jsonPath":".status.lifecycle"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[kube(status = "InstanceGroupStatus")]
#[serde(rename_all = "camelCase")]
pub struct InstanceGroupSpec {
    /// Provisioner handling this group; must be `eks`
    pub provisioner: String,

    /// How stale instances are replaced after drift
    #[serde(default)]
    pub strategy: UpgradeStrategy,

    /// EKS provisioner parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eks: Option<EksSpec>,
}

impl InstanceGroup {
    /// Whether a deletion timestamp is present on the resource.
    #[must_use]
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// The current reconcile state recorded in status, defaulting to `Init`.
    #[must_use]
    pub fn current_state(&self) -> ReconcileState {
        self.status
            .as_ref()
            .and_then(|s| s.state)
            .unwrap_or_default()
    }

    /// Whether a previous pass adopted an advisor spot recommendation.
    #[must_use]
    pub fn using_spot_recommendation(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.using_spot_recommendation)
            .unwrap_or(false)
    }

    /// The EKS parameters, or a validation error when missing.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Validation`] when `spec.eks` is absent.
    pub fn eks(&self) -> ProvisionResult<&EksSpec> {
        self.spec
            .eks
            .as_ref()
            .ok_or_else(|| ProvisionError::validation("spec.eks", "eks configuration is required"))
    }

    /// The configured `maxUnavailable`, when a rolling update is requested.
    #[must_use]
    pub fn max_unavailable(&self) -> Option<&IntOrString> {
        self.spec
            .strategy
            .rolling_update
            .as_ref()
            .and_then(|r| r.max_unavailable.as_ref())
    }

    /// Validate intent before dispatching a reconcile pass.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Validation`] on:
    /// - a provisioner other than `eks`
    /// - a missing `spec.eks` block
    /// - `maxSize < minSize` or negative sizes
    /// - an empty image reference
    /// - a strategy selector without its parameter block
    /// - a spot ratio outside 0..=100
    pub fn validate(&self) -> ProvisionResult<()> {
        if self.spec.provisioner != PROVISIONER_EKS {
            return Err(ProvisionError::validation(
                "spec.provisioner",
                format!("unsupported provisioner '{}'", self.spec.provisioner),
            ));
        }

        let eks = self.eks()?;
        if eks.min_size < 0 || eks.max_size < 0 {
            return Err(ProvisionError::validation(
                "spec.eks",
                "fleet sizes must not be negative",
            ));
        }
        if eks.max_size < eks.min_size {
            return Err(ProvisionError::validation(
                "spec.eks.maxSize",
                format!(
                    "maxSize {} is smaller than minSize {}",
                    eks.max_size, eks.min_size
                ),
            ));
        }
        if eks.configuration.cluster_name.is_empty() {
            return Err(ProvisionError::validation(
                "spec.eks.configuration.clusterName",
                "clusterName is required",
            ));
        }
        if eks.configuration.image.is_empty() {
            return Err(ProvisionError::validation(
                "spec.eks.configuration.image",
                "image reference is required",
            ));
        }
        if eks.configuration.instance_type.is_empty() {
            return Err(ProvisionError::validation(
                "spec.eks.configuration.instanceType",
                "instanceType is required",
            ));
        }

        match self.spec.strategy.r#type {
            UpgradeStrategyType::Crd if self.spec.strategy.crd.is_none() => {
                return Err(ProvisionError::validation(
                    "spec.strategy.crd",
                    "strategy type 'crd' requires a crd block",
                ));
            }
            _ => {}
        }

        if let Some(policy) = &eks.configuration.mixed_instances_policy {
            if let Some(ratio) = &policy.spot_ratio {
                let value = match ratio {
                    IntOrString::Int(i) => i64::from(*i),
                    IntOrString::String(s) => s
                        .trim_end_matches('%')
                        .parse::<i64>()
                        .map_err(|_| {
                            ProvisionError::validation(
                                "spec.eks.configuration.mixedInstancesPolicy.spotRatio",
                                format!("'{s}' is not a number or percentage"),
                            )
                        })?,
                };
                if !(0..=100).contains(&value) {
                    return Err(ProvisionError::validation(
                        "spec.eks.configuration.mixedInstancesPolicy.spotRatio",
                        format!("spot ratio {value} is outside 0..=100"),
                    ));
                }
            }
        }

        Ok(())
    }
}
