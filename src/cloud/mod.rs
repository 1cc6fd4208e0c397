// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cloud provider adapter interface.
//!
//! The reconciliation engine talks to the cloud exclusively through the
//! [`CloudProvider`] trait: enumerating, creating, mutating and deleting
//! scaling groups, launch configurations, launch templates, IAM roles and
//! instance profiles, lifecycle hooks, and describing instance-type
//! offerings. The trait is the seam for the SDK-backed adapter deployed in
//! production and for the in-memory implementation used by the test suites.
//!
//! All methods are idempotent from the engine's point of view: a failed
//! call may have partially applied, and the next reconcile pass re-reads
//! cloud state from scratch.

pub mod memory;
pub mod types;

use async_trait::async_trait;

use crate::provision_errors::ProvisionResult;
use types::{
    CreateConfigInput, CreateScalingGroupInput, EksClusterInfo, IamRole, InstanceProfile,
    InstanceTypeInfo, LaunchConfiguration, LaunchTemplate, LaunchTemplateVersion, LifecycleHook,
    ScalingGroup, Tag, UpdateScalingGroupInput,
};

/// Interface to the cloud hosting the worker fleet.
///
/// Implementations must be safe to share across reconcile workers; all
/// methods take `&self`.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    // ------------------------------------------------------------------
    // Scaling groups
    // ------------------------------------------------------------------

    /// Describe all scaling groups in the account/region.
    async fn describe_scaling_groups(&self) -> ProvisionResult<Vec<ScalingGroup>>;

    /// Create a scaling group.
    async fn create_scaling_group(&self, input: &CreateScalingGroupInput) -> ProvisionResult<()>;

    /// Mutate an existing scaling group (sizes, configuration reference,
    /// mixed-instances policy).
    async fn update_scaling_group(&self, input: &UpdateScalingGroupInput) -> ProvisionResult<()>;

    /// Delete a scaling group and its instances.
    ///
    /// Implementations report `NotFound` when the group is already gone;
    /// callers treat that as success.
    async fn delete_scaling_group(&self, name: &str) -> ProvisionResult<()>;

    /// Terminate one instance through the scaling group.
    ///
    /// With `decrement` false the group launches a replacement.
    async fn terminate_instance(&self, instance_id: &str, decrement: bool) -> ProvisionResult<()>;

    /// Create or overwrite tags on a scaling group.
    async fn create_or_update_tags(&self, group: &str, tags: &[Tag]) -> ProvisionResult<()>;

    /// Remove tags from a scaling group.
    async fn delete_tags(&self, group: &str, tags: &[Tag]) -> ProvisionResult<()>;

    // ------------------------------------------------------------------
    // Lifecycle hooks
    // ------------------------------------------------------------------

    /// Describe the lifecycle hooks of a scaling group.
    async fn describe_lifecycle_hooks(&self, group: &str) -> ProvisionResult<Vec<LifecycleHook>>;

    /// Create or update one lifecycle hook.
    async fn put_lifecycle_hook(&self, group: &str, hook: &LifecycleHook) -> ProvisionResult<()>;

    /// Delete one lifecycle hook.
    async fn delete_lifecycle_hook(&self, group: &str, name: &str) -> ProvisionResult<()>;

    // ------------------------------------------------------------------
    // Launch configurations (immutable flavor)
    // ------------------------------------------------------------------

    /// Describe all launch configurations.
    async fn describe_launch_configurations(&self) -> ProvisionResult<Vec<LaunchConfiguration>>;

    /// Create a launch configuration; the name must be unique.
    async fn create_launch_configuration(&self, input: &CreateConfigInput) -> ProvisionResult<()>;

    /// Delete a launch configuration by name.
    async fn delete_launch_configuration(&self, name: &str) -> ProvisionResult<()>;

    // ------------------------------------------------------------------
    // Launch templates (versioned flavor)
    // ------------------------------------------------------------------

    /// Describe all launch templates.
    async fn describe_launch_templates(&self) -> ProvisionResult<Vec<LaunchTemplate>>;

    /// Describe all versions of one launch template.
    async fn describe_launch_template_versions(
        &self,
        name: &str,
    ) -> ProvisionResult<Vec<LaunchTemplateVersion>>;

    /// Create a launch template with an initial version.
    async fn create_launch_template(&self, input: &CreateConfigInput) -> ProvisionResult<()>;

    /// Add a version to an existing launch template.
    async fn create_launch_template_version(
        &self,
        input: &CreateConfigInput,
    ) -> ProvisionResult<()>;

    /// Delete a launch template and all its versions.
    async fn delete_launch_template(&self, name: &str) -> ProvisionResult<()>;

    /// Delete a batch of launch template versions.
    async fn delete_launch_template_versions(
        &self,
        name: &str,
        versions: &[i64],
    ) -> ProvisionResult<()>;

    // ------------------------------------------------------------------
    // IAM
    // ------------------------------------------------------------------

    /// Look up a role; `Ok(None)` when absent.
    async fn get_role(&self, name: &str) -> ProvisionResult<Option<IamRole>>;

    /// Create a role with the given trust policy.
    async fn create_role(&self, name: &str, trust_policy: &str) -> ProvisionResult<IamRole>;

    /// Delete a role.
    async fn delete_role(&self, name: &str) -> ProvisionResult<()>;

    /// List the managed policy ARNs attached to a role.
    async fn list_attached_policies(&self, role: &str) -> ProvisionResult<Vec<String>>;

    /// Attach managed policies to a role.
    async fn attach_role_policies(&self, role: &str, arns: &[String]) -> ProvisionResult<()>;

    /// Detach managed policies from a role.
    async fn detach_role_policies(&self, role: &str, arns: &[String]) -> ProvisionResult<()>;

    /// Look up an instance profile; `Ok(None)` when absent.
    async fn get_instance_profile(&self, name: &str) -> ProvisionResult<Option<InstanceProfile>>;

    /// Create an instance profile.
    async fn create_instance_profile(&self, name: &str) -> ProvisionResult<InstanceProfile>;

    /// Delete an instance profile.
    async fn delete_instance_profile(&self, name: &str) -> ProvisionResult<()>;

    /// Bind a role into an instance profile.
    async fn add_role_to_instance_profile(&self, profile: &str, role: &str)
        -> ProvisionResult<()>;

    /// Unbind a role from an instance profile.
    async fn remove_role_from_instance_profile(
        &self,
        profile: &str,
        role: &str,
    ) -> ProvisionResult<()>;

    // ------------------------------------------------------------------
    // Cluster handle, catalog, images
    // ------------------------------------------------------------------

    /// Describe the managed cluster (VPC, version, CA, endpoint).
    async fn describe_cluster(&self, name: &str) -> ProvisionResult<EksClusterInfo>;

    /// Instance types offered in the region.
    async fn describe_instance_type_offerings(&self) -> ProvisionResult<Vec<String>>;

    /// Full instance-type information catalog.
    async fn describe_instance_types(&self) -> ProvisionResult<Vec<InstanceTypeInfo>>;

    /// Resolve the latest published worker image for a Kubernetes version.
    async fn latest_image_id(&self, kubernetes_version: &str) -> ProvisionResult<String>;

    /// Fetch a value from the parameter store.
    async fn get_parameter(&self, key: &str) -> ProvisionResult<String>;
}
