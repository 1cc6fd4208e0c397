// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Model types exchanged with the cloud adapter.
//!
//! These types describe the cloud-side objects the controller owns or reads:
//! scaling groups and their instances, launch configurations and launch
//! templates, IAM roles and instance profiles, the managed cluster handle,
//! and the instance-type catalog. They are deliberately independent of any
//! SDK so the adapter seam stays mockable.

use chrono::{DateTime, Utc};

use crate::crd::{LifecycleHookSpec, LifecycleStage, NodeVolume, PlacementSpec};

/// A key/value tag on a cloud resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    /// Tag key
    pub key: String,
    /// Tag value
    pub value: String,
}

impl Tag {
    /// Build a tag from anything string-like.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Reference to a launch template at a concrete version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateRef {
    /// Template name
    pub name: String,
    /// Version the referencing object is pinned to
    pub version: Option<String>,
}

/// One member instance of a scaling group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScalingInstance {
    /// Cloud instance id (e.g. `i-0abc123`)
    pub instance_id: String,

    /// Lifecycle state reported by the group (e.g. `InService`,
    /// `Terminating`)
    pub lifecycle_state: String,

    /// Launch configuration the instance was started from, when the group
    /// uses the immutable flavor
    pub launch_configuration_name: Option<String>,

    /// Launch template and version the instance was started from, when the
    /// group uses the versioned flavor
    pub launch_template: Option<TemplateRef>,
}

impl ScalingInstance {
    /// Whether the group is already taking this instance down.
    #[must_use]
    pub fn is_terminating(&self) -> bool {
        self.lifecycle_state.starts_with("Terminating")
            || self.lifecycle_state == "Terminated"
    }
}

/// A cloud auto-scaling group.
#[derive(Clone, Debug, Default)]
pub struct ScalingGroup {
    /// Group name
    pub name: String,

    /// Group status; non-empty while the cloud is deleting the group
    pub status: Option<String>,

    /// Minimum size
    pub min_size: i64,

    /// Maximum size
    pub max_size: i64,

    /// Desired capacity
    pub desired_capacity: i64,

    /// Referenced launch configuration, for the immutable flavor
    pub launch_configuration_name: Option<String>,

    /// Referenced launch template, for the versioned flavor (directly or
    /// through a mixed-instances policy)
    pub launch_template: Option<TemplateRef>,

    /// Tags on the group
    pub tags: Vec<Tag>,

    /// Member instances
    pub instances: Vec<ScalingInstance>,

    /// Subnets the group spans
    pub subnets: Vec<String>,

    /// Resolved mixed-instances overrides currently on the group
    pub mixed_instances: Option<MixedInstancesSpec>,
}

impl ScalingGroup {
    /// Look up a tag value by key.
    #[must_use]
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }
}

/// A lifecycle hook observed on (or desired for) a scaling group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleHook {
    /// Hook name, unique within the group
    pub name: String,

    /// Launch or terminate stage
    pub stage: LifecycleStage,

    /// Result when the heartbeat times out
    pub default_result: Option<String>,

    /// Heartbeat timeout in seconds
    pub heartbeat_timeout: Option<i64>,

    /// Notification target for hook events
    pub notification_arn: Option<String>,

    /// Role assumed to publish notifications
    pub role_arn: Option<String>,

    /// Free-form metadata forwarded with notifications
    pub metadata: Option<String>,
}

impl From<&LifecycleHookSpec> for LifecycleHook {
    fn from(spec: &LifecycleHookSpec) -> Self {
        Self {
            name: spec.name.clone(),
            stage: spec.stage,
            default_result: spec.default_result.clone(),
            heartbeat_timeout: spec.heartbeat_timeout,
            notification_arn: spec.notification_arn.clone(),
            role_arn: spec.role_arn.clone(),
            metadata: spec.metadata.clone(),
        }
    }
}

/// A block device in a machine definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockDevice {
    /// Device name (e.g. `/dev/xvda`)
    pub device_name: String,
    /// Volume type (e.g. `gp3`)
    pub volume_type: String,
    /// Volume size in GiB
    pub size: i64,
    /// Provisioned IOPS
    pub iops: Option<i64>,
    /// Snapshot to restore from
    pub snapshot_id: Option<String>,
    /// Encrypt at rest
    pub encrypted: Option<bool>,
    /// Delete with the instance
    pub delete_on_termination: Option<bool>,
}

impl From<&NodeVolume> for BlockDevice {
    fn from(volume: &NodeVolume) -> Self {
        Self {
            device_name: volume.name.clone(),
            volume_type: volume.r#type.clone(),
            size: volume.size,
            iops: volume.iops,
            snapshot_id: volume.snapshot_id.clone(),
            encrypted: volume.encrypted,
            delete_on_termination: volume.delete_on_termination,
        }
    }
}

/// Placement constraints in a machine definition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Placement {
    /// Availability zone to pin instances to
    pub availability_zone: Option<String>,
    /// Placement group name
    pub group_name: Option<String>,
    /// Tenancy
    pub tenancy: Option<String>,
}

impl From<&PlacementSpec> for Placement {
    fn from(spec: &PlacementSpec) -> Self {
        Self {
            availability_zone: spec.availability_zone.clone(),
            group_name: spec.group_name.clone(),
            tenancy: spec.tenancy.clone(),
        }
    }
}

/// The full machine definition shared by both scaling-configuration flavors.
///
/// Two machine definitions are equal iff no field differs; security-group
/// comparison is order-independent and handled by the drift check.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MachineConfig {
    /// Image id
    pub image_id: String,
    /// Instance type
    pub instance_type: String,
    /// Instance profile ARN the nodes run under
    pub instance_profile_arn: Option<String>,
    /// Security groups
    pub security_groups: Vec<String>,
    /// Spot bid price; empty means on-demand
    pub spot_price: Option<String>,
    /// SSH key name
    pub key_name: Option<String>,
    /// User-data script
    pub user_data: Option<String>,
    /// Block device mappings
    pub block_devices: Vec<BlockDevice>,
    /// License configuration ARNs
    pub license_specifications: Vec<String>,
    /// Placement constraints
    pub placement: Option<Placement>,
}

/// An immutable launch configuration.
#[derive(Clone, Debug)]
pub struct LaunchConfiguration {
    /// Unique name
    pub name: String,
    /// Creation time; absent values sort before any present one
    pub created_time: Option<DateTime<Utc>>,
    /// The machine definition
    pub config: MachineConfig,
}

/// A named, versioned launch template.
#[derive(Clone, Debug)]
pub struct LaunchTemplate {
    /// Template name
    pub name: String,
    /// Latest version number
    pub latest_version: Option<i64>,
    /// Creation time of the template object
    pub created_time: Option<DateTime<Utc>>,
}

/// One numbered version of a launch template.
#[derive(Clone, Debug)]
pub struct LaunchTemplateVersion {
    /// Owning template name
    pub template_name: String,
    /// Version number
    pub version: i64,
    /// Creation time; absent values sort before any present one
    pub created_time: Option<DateTime<Utc>>,
    /// The machine definition at this version
    pub config: MachineConfig,
}

/// An IAM role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IamRole {
    /// Role name
    pub name: String,
    /// Role ARN
    pub arn: String,
}

/// An IAM instance profile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceProfile {
    /// Profile name
    pub name: String,
    /// Profile ARN
    pub arn: String,
}

/// Handle of the managed cluster as described by the cloud.
#[derive(Clone, Debug, Default)]
pub struct EksClusterInfo {
    /// Cluster name
    pub name: String,
    /// VPC the cluster lives in
    pub vpc_id: String,
    /// Kubernetes version
    pub kubernetes_version: String,
    /// API endpoint
    pub endpoint: String,
    /// Base64 certificate authority bundle
    pub certificate_authority: String,
}

/// Catalog entry describing one instance type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceTypeInfo {
    /// Instance type name (e.g. `m5.large`)
    pub instance_type: String,
    /// Supported architectures
    pub architectures: Vec<String>,
    /// vCPU count
    pub vcpus: i64,
    /// Memory size in MiB
    pub memory_mib: i64,
}

/// One interchangeable member of a mixed-instances pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolInstance {
    /// Instance type name
    pub instance_type: String,
    /// Weighted capacity, as the cloud expects it
    pub weight: String,
}

/// Mixed-instances wiring for a scaling group.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MixedInstancesSpec {
    /// Launch template backing the mixed policy
    pub launch_template_name: String,
    /// Interchangeable types, anchor first
    pub overrides: Vec<PoolInstance>,
    /// Percentage of capacity kept on-demand (100 - spot ratio)
    pub on_demand_percentage: i64,
}

/// Reference from a scaling group to its backing configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GroupConfigRef {
    /// The immutable flavor, referenced by unique name
    LaunchConfiguration(String),
    /// The versioned flavor, referenced by name and version
    LaunchTemplate {
        /// Template name
        name: String,
        /// Version to pin the group to
        version: String,
    },
}

/// Input to scaling-group creation.
#[derive(Clone, Debug)]
pub struct CreateScalingGroupInput {
    /// Group name
    pub name: String,
    /// Minimum size
    pub min_size: i64,
    /// Maximum size
    pub max_size: i64,
    /// Subnets the group spans
    pub subnets: Vec<String>,
    /// Tags to stamp on the group (propagated to instances)
    pub tags: Vec<Tag>,
    /// Backing configuration reference
    pub config_ref: GroupConfigRef,
    /// Mixed-instances wiring, when a pool is requested
    pub mixed_instances: Option<MixedInstancesSpec>,
}

/// Input to scaling-group mutation.
#[derive(Clone, Debug)]
pub struct UpdateScalingGroupInput {
    /// Group name
    pub name: String,
    /// Desired minimum size
    pub min_size: i64,
    /// Desired maximum size
    pub max_size: i64,
    /// Backing configuration reference
    pub config_ref: GroupConfigRef,
    /// Mixed-instances wiring; `None` detaches any existing policy
    pub mixed_instances: Option<MixedInstancesSpec>,
}

/// Input to launch configuration / template creation.
#[derive(Clone, Debug)]
pub struct CreateConfigInput {
    /// Resource name: a timestamped unique name for the immutable flavor,
    /// the stable template name for the versioned flavor
    pub name: String,
    /// The machine definition to materialize
    pub config: MachineConfig,
}
