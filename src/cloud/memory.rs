// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory cloud provider.
//!
//! A complete, stateful implementation of [`CloudProvider`](super::CloudProvider)
//! backed by process memory. It powers the unit and integration suites and
//! the standalone development loop: groups launch simulated instances,
//! configurations carry monotonic creation times, and every mutating call is
//! recorded for idempotence assertions.
//!
//! Failure injection: [`MemoryCloud::fail_next`] arms a one-shot error for a
//! named operation, which the next matching call returns instead of acting.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::types::{
    CreateConfigInput, CreateScalingGroupInput, EksClusterInfo, GroupConfigRef, IamRole,
    InstanceProfile, InstanceTypeInfo, LaunchConfiguration, LaunchTemplate, LaunchTemplateVersion,
    LifecycleHook, ScalingGroup, ScalingInstance, Tag, TemplateRef, UpdateScalingGroupInput,
};
use super::CloudProvider;
use crate::provision_errors::{ProvisionError, ProvisionResult};

/// Base of the synthetic clock used for creation times.
const CLOCK_EPOCH_SECS: i64 = 1_700_000_000;

#[derive(Default)]
struct CloudState {
    scaling_groups: BTreeMap<String, ScalingGroup>,
    launch_configurations: BTreeMap<String, LaunchConfiguration>,
    launch_templates: BTreeMap<String, LaunchTemplate>,
    template_versions: BTreeMap<String, Vec<LaunchTemplateVersion>>,
    lifecycle_hooks: BTreeMap<String, Vec<LifecycleHook>>,
    roles: BTreeMap<String, IamRole>,
    attached_policies: BTreeMap<String, Vec<String>>,
    instance_profiles: BTreeMap<String, InstanceProfile>,
    profile_roles: BTreeMap<String, String>,
    clusters: BTreeMap<String, EksClusterInfo>,
    offerings: Vec<String>,
    type_infos: Vec<InstanceTypeInfo>,
    latest_images: BTreeMap<String, String>,
    parameters: BTreeMap<String, String>,
    clock: i64,
    instance_seq: u64,
    calls: Vec<String>,
    fail_ops: BTreeMap<String, ProvisionError>,
}

impl CloudState {
    fn next_time(&mut self) -> Option<DateTime<Utc>> {
        self.clock += 1;
        DateTime::<Utc>::from_timestamp(CLOCK_EPOCH_SECS + self.clock, 0)
    }

    fn next_instance_id(&mut self) -> String {
        self.instance_seq += 1;
        format!("i-{:08x}", self.instance_seq)
    }

    fn record(&mut self, operation: &str) -> ProvisionResult<()> {
        self.calls.push(operation.to_string());
        match self.fail_ops.remove(operation) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn spawn_instance(&mut self, config_ref: &GroupConfigRef) -> ScalingInstance {
        let instance_id = self.next_instance_id();
        match config_ref {
            GroupConfigRef::LaunchConfiguration(name) => ScalingInstance {
                instance_id,
                lifecycle_state: "InService".to_string(),
                launch_configuration_name: Some(name.clone()),
                launch_template: None,
            },
            GroupConfigRef::LaunchTemplate { name, version } => ScalingInstance {
                instance_id,
                lifecycle_state: "InService".to_string(),
                launch_configuration_name: None,
                launch_template: Some(TemplateRef {
                    name: name.clone(),
                    version: Some(version.clone()),
                }),
            },
        }
    }

    fn group_config_ref(group: &ScalingGroup) -> Option<GroupConfigRef> {
        if let Some(name) = &group.launch_configuration_name {
            return Some(GroupConfigRef::LaunchConfiguration(name.clone()));
        }
        group.launch_template.as_ref().map(|t| GroupConfigRef::LaunchTemplate {
            name: t.name.clone(),
            version: t.version.clone().unwrap_or_default(),
        })
    }
}

/// In-memory [`CloudProvider`] implementation.
#[derive(Default)]
pub struct MemoryCloud {
    state: Mutex<CloudState>,
}

impl MemoryCloud {
    /// Create an empty in-memory cloud.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cluster handle returned by `describe_cluster`.
    pub async fn seed_cluster(&self, cluster: EksClusterInfo) {
        let mut state = self.state.lock().await;
        state.clusters.insert(cluster.name.clone(), cluster);
    }

    /// Set the region's instance-type offerings.
    pub async fn seed_offerings(&self, offerings: Vec<String>) {
        self.state.lock().await.offerings = offerings;
    }

    /// Set the instance-type information catalog.
    pub async fn seed_instance_types(&self, infos: Vec<InstanceTypeInfo>) {
        self.state.lock().await.type_infos = infos;
    }

    /// Set the latest published image for a Kubernetes version.
    pub async fn seed_latest_image(&self, kubernetes_version: &str, image_id: &str) {
        self.state
            .lock()
            .await
            .latest_images
            .insert(kubernetes_version.to_string(), image_id.to_string());
    }

    /// Store a parameter-store value.
    pub async fn seed_parameter(&self, key: &str, value: &str) {
        self.state
            .lock()
            .await
            .parameters
            .insert(key.to_string(), value.to_string());
    }

    /// Arm a one-shot failure for the named operation.
    pub async fn fail_next(&self, operation: &str, error: ProvisionError) {
        self.state
            .lock()
            .await
            .fail_ops
            .insert(operation.to_string(), error);
    }

    /// Overwrite the status string of a scaling group.
    pub async fn set_group_status(&self, name: &str, status: Option<&str>) {
        if let Some(group) = self.state.lock().await.scaling_groups.get_mut(name) {
            group.status = status.map(str::to_string);
        }
    }

    /// Fetch a scaling group snapshot by name.
    pub async fn group(&self, name: &str) -> Option<ScalingGroup> {
        self.state.lock().await.scaling_groups.get(name).cloned()
    }

    /// Names of all launch configurations, sorted.
    pub async fn launch_configuration_names(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .launch_configurations
            .keys()
            .cloned()
            .collect()
    }

    /// Number of recorded calls for one operation name.
    pub async fn call_count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    /// Replace the instance list of a group, for scripted scenarios.
    pub async fn set_group_instances(&self, name: &str, instances: Vec<ScalingInstance>) {
        if let Some(group) = self.state.lock().await.scaling_groups.get_mut(name) {
            group.instances = instances;
        }
    }
}

#[async_trait]
impl CloudProvider for MemoryCloud {
    async fn describe_scaling_groups(&self) -> ProvisionResult<Vec<ScalingGroup>> {
        let mut state = self.state.lock().await;
        state.record("describe-scaling-groups")?;
        Ok(state.scaling_groups.values().cloned().collect())
    }

    async fn create_scaling_group(&self, input: &CreateScalingGroupInput) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        state.record("create-scaling-group")?;
        if state.scaling_groups.contains_key(&input.name) {
            return Err(ProvisionError::cloud(
                "create-scaling-group",
                format!("scaling group '{}' already exists", input.name),
            ));
        }

        let mut instances = Vec::new();
        for _ in 0..input.min_size {
            instances.push(state.spawn_instance(&input.config_ref));
        }

        let (lc_name, template) = match &input.config_ref {
            GroupConfigRef::LaunchConfiguration(name) => (Some(name.clone()), None),
            GroupConfigRef::LaunchTemplate { name, version } => (
                None,
                Some(TemplateRef {
                    name: name.clone(),
                    version: Some(version.clone()),
                }),
            ),
        };

        state.scaling_groups.insert(
            input.name.clone(),
            ScalingGroup {
                name: input.name.clone(),
                status: None,
                min_size: input.min_size,
                max_size: input.max_size,
                desired_capacity: input.min_size,
                launch_configuration_name: lc_name,
                launch_template: template,
                tags: input.tags.clone(),
                instances,
                subnets: input.subnets.clone(),
                mixed_instances: input.mixed_instances.clone(),
            },
        );
        Ok(())
    }

    async fn update_scaling_group(&self, input: &UpdateScalingGroupInput) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        state.record("update-scaling-group")?;
        let Some(mut group) = state.scaling_groups.get(&input.name).cloned() else {
            return Err(ProvisionError::not_found("scaling group", &input.name));
        };

        group.min_size = input.min_size;
        group.max_size = input.max_size;
        group.mixed_instances = input.mixed_instances.clone();
        match &input.config_ref {
            GroupConfigRef::LaunchConfiguration(name) => {
                group.launch_configuration_name = Some(name.clone());
                group.launch_template = None;
            }
            GroupConfigRef::LaunchTemplate { name, version } => {
                group.launch_configuration_name = None;
                group.launch_template = Some(TemplateRef {
                    name: name.clone(),
                    version: Some(version.clone()),
                });
            }
        }

        // Grow to the new minimum; existing instances keep their old refs.
        while (group.instances.len() as i64) < group.min_size {
            let instance = state.spawn_instance(&input.config_ref);
            group.instances.push(instance);
        }
        group.desired_capacity = group.instances.len() as i64;

        state.scaling_groups.insert(group.name.clone(), group);
        Ok(())
    }

    async fn delete_scaling_group(&self, name: &str) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        state.record("delete-scaling-group")?;
        if state.scaling_groups.remove(name).is_none() {
            return Err(ProvisionError::not_found("scaling group", name));
        }
        state.lifecycle_hooks.remove(name);
        Ok(())
    }

    async fn terminate_instance(&self, instance_id: &str, decrement: bool) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        state.record("terminate-instance")?;

        let Some(group_name) = state
            .scaling_groups
            .values()
            .find(|g| g.instances.iter().any(|i| i.instance_id == instance_id))
            .map(|g| g.name.clone())
        else {
            return Err(ProvisionError::not_found("instance", instance_id));
        };

        let group = state
            .scaling_groups
            .get(&group_name)
            .cloned()
            .unwrap_or_default();
        let replacement_ref = CloudState::group_config_ref(&group);

        let Some(group) = state.scaling_groups.get_mut(&group_name) else {
            return Err(ProvisionError::not_found("scaling group", &group_name));
        };
        group.instances.retain(|i| i.instance_id != instance_id);

        if decrement {
            if let Some(group) = state.scaling_groups.get_mut(&group_name) {
                group.desired_capacity -= 1;
            }
        } else if let Some(config_ref) = replacement_ref {
            let replacement = state.spawn_instance(&config_ref);
            if let Some(group) = state.scaling_groups.get_mut(&group_name) {
                group.instances.push(replacement);
            }
        }
        Ok(())
    }

    async fn create_or_update_tags(&self, group: &str, tags: &[Tag]) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        state.record("create-or-update-tags")?;
        let Some(group) = state.scaling_groups.get_mut(group) else {
            return Err(ProvisionError::not_found("scaling group", group));
        };
        for tag in tags {
            match group.tags.iter_mut().find(|t| t.key == tag.key) {
                Some(existing) => existing.value = tag.value.clone(),
                None => group.tags.push(tag.clone()),
            }
        }
        Ok(())
    }

    async fn delete_tags(&self, group: &str, tags: &[Tag]) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        state.record("delete-tags")?;
        let Some(group) = state.scaling_groups.get_mut(group) else {
            return Err(ProvisionError::not_found("scaling group", group));
        };
        group
            .tags
            .retain(|t| !tags.iter().any(|d| d.key == t.key));
        Ok(())
    }

    async fn describe_lifecycle_hooks(&self, group: &str) -> ProvisionResult<Vec<LifecycleHook>> {
        let mut state = self.state.lock().await;
        state.record("describe-lifecycle-hooks")?;
        Ok(state.lifecycle_hooks.get(group).cloned().unwrap_or_default())
    }

    async fn put_lifecycle_hook(&self, group: &str, hook: &LifecycleHook) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        state.record("put-lifecycle-hook")?;
        let hooks = state.lifecycle_hooks.entry(group.to_string()).or_default();
        hooks.retain(|h| h.name != hook.name);
        hooks.push(hook.clone());
        Ok(())
    }

    async fn delete_lifecycle_hook(&self, group: &str, name: &str) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        state.record("delete-lifecycle-hook")?;
        if let Some(hooks) = state.lifecycle_hooks.get_mut(group) {
            hooks.retain(|h| h.name != name);
        }
        Ok(())
    }

    async fn describe_launch_configurations(&self) -> ProvisionResult<Vec<LaunchConfiguration>> {
        let mut state = self.state.lock().await;
        state.record("describe-launch-configurations")?;
        Ok(state.launch_configurations.values().cloned().collect())
    }

    async fn create_launch_configuration(&self, input: &CreateConfigInput) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        state.record("create-launch-configuration")?;
        if state.launch_configurations.contains_key(&input.name) {
            return Err(ProvisionError::cloud(
                "create-launch-configuration",
                format!("launch configuration '{}' already exists", input.name),
            ));
        }
        let created_time = state.next_time();
        state.launch_configurations.insert(
            input.name.clone(),
            LaunchConfiguration {
                name: input.name.clone(),
                created_time,
                config: input.config.clone(),
            },
        );
        Ok(())
    }

    async fn delete_launch_configuration(&self, name: &str) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        state.record("delete-launch-configuration")?;
        if state.launch_configurations.remove(name).is_none() {
            return Err(ProvisionError::not_found("launch configuration", name));
        }
        Ok(())
    }

    async fn describe_launch_templates(&self) -> ProvisionResult<Vec<LaunchTemplate>> {
        let mut state = self.state.lock().await;
        state.record("describe-launch-templates")?;
        Ok(state.launch_templates.values().cloned().collect())
    }

    async fn describe_launch_template_versions(
        &self,
        name: &str,
    ) -> ProvisionResult<Vec<LaunchTemplateVersion>> {
        let mut state = self.state.lock().await;
        state.record("describe-launch-template-versions")?;
        Ok(state.template_versions.get(name).cloned().unwrap_or_default())
    }

    async fn create_launch_template(&self, input: &CreateConfigInput) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        state.record("create-launch-template")?;
        if state.launch_templates.contains_key(&input.name) {
            return Err(ProvisionError::cloud(
                "create-launch-template",
                format!("launch template '{}' already exists", input.name),
            ));
        }
        let created_time = state.next_time();
        state.launch_templates.insert(
            input.name.clone(),
            LaunchTemplate {
                name: input.name.clone(),
                latest_version: Some(1),
                created_time,
            },
        );
        let version_time = state.next_time();
        state.template_versions.insert(
            input.name.clone(),
            vec![LaunchTemplateVersion {
                template_name: input.name.clone(),
                version: 1,
                created_time: version_time,
                config: input.config.clone(),
            }],
        );
        Ok(())
    }

    async fn create_launch_template_version(
        &self,
        input: &CreateConfigInput,
    ) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        state.record("create-launch-template-version")?;
        if !state.launch_templates.contains_key(&input.name) {
            return Err(ProvisionError::not_found("launch template", &input.name));
        }
        let created_time = state.next_time();
        let versions = state.template_versions.entry(input.name.clone()).or_default();
        let next = versions.iter().map(|v| v.version).max().unwrap_or(0) + 1;
        versions.push(LaunchTemplateVersion {
            template_name: input.name.clone(),
            version: next,
            created_time,
            config: input.config.clone(),
        });
        if let Some(template) = state.launch_templates.get_mut(&input.name) {
            template.latest_version = Some(next);
        }
        Ok(())
    }

    async fn delete_launch_template(&self, name: &str) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        state.record("delete-launch-template")?;
        if state.launch_templates.remove(name).is_none() {
            return Err(ProvisionError::not_found("launch template", name));
        }
        state.template_versions.remove(name);
        Ok(())
    }

    async fn delete_launch_template_versions(
        &self,
        name: &str,
        versions: &[i64],
    ) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        state.record("delete-launch-template-versions")?;
        let Some(existing) = state.template_versions.get_mut(name) else {
            return Err(ProvisionError::not_found("launch template", name));
        };
        existing.retain(|v| !versions.contains(&v.version));
        Ok(())
    }

    async fn get_role(&self, name: &str) -> ProvisionResult<Option<IamRole>> {
        let mut state = self.state.lock().await;
        state.record("get-role")?;
        Ok(state.roles.get(name).cloned())
    }

    async fn create_role(&self, name: &str, _trust_policy: &str) -> ProvisionResult<IamRole> {
        let mut state = self.state.lock().await;
        state.record("create-role")?;
        let role = IamRole {
            name: name.to_string(),
            arn: format!("arn:aws:iam::000000000000:role/{name}"),
        };
        state.roles.insert(name.to_string(), role.clone());
        Ok(role)
    }

    async fn delete_role(&self, name: &str) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        state.record("delete-role")?;
        if state.roles.remove(name).is_none() {
            return Err(ProvisionError::not_found("role", name));
        }
        state.attached_policies.remove(name);
        Ok(())
    }

    async fn list_attached_policies(&self, role: &str) -> ProvisionResult<Vec<String>> {
        let mut state = self.state.lock().await;
        state.record("list-attached-policies")?;
        Ok(state.attached_policies.get(role).cloned().unwrap_or_default())
    }

    async fn attach_role_policies(&self, role: &str, arns: &[String]) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        state.record("attach-role-policies")?;
        let attached = state.attached_policies.entry(role.to_string()).or_default();
        for arn in arns {
            if !attached.contains(arn) {
                attached.push(arn.clone());
            }
        }
        Ok(())
    }

    async fn detach_role_policies(&self, role: &str, arns: &[String]) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        state.record("detach-role-policies")?;
        if let Some(attached) = state.attached_policies.get_mut(role) {
            attached.retain(|a| !arns.contains(a));
        }
        Ok(())
    }

    async fn get_instance_profile(&self, name: &str) -> ProvisionResult<Option<InstanceProfile>> {
        let mut state = self.state.lock().await;
        state.record("get-instance-profile")?;
        Ok(state.instance_profiles.get(name).cloned())
    }

    async fn create_instance_profile(&self, name: &str) -> ProvisionResult<InstanceProfile> {
        let mut state = self.state.lock().await;
        state.record("create-instance-profile")?;
        let profile = InstanceProfile {
            name: name.to_string(),
            arn: format!("arn:aws:iam::000000000000:instance-profile/{name}"),
        };
        state
            .instance_profiles
            .insert(name.to_string(), profile.clone());
        Ok(profile)
    }

    async fn delete_instance_profile(&self, name: &str) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        state.record("delete-instance-profile")?;
        if state.instance_profiles.remove(name).is_none() {
            return Err(ProvisionError::not_found("instance profile", name));
        }
        state.profile_roles.remove(name);
        Ok(())
    }

    async fn add_role_to_instance_profile(
        &self,
        profile: &str,
        role: &str,
    ) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        state.record("add-role-to-instance-profile")?;
        state
            .profile_roles
            .insert(profile.to_string(), role.to_string());
        Ok(())
    }

    async fn remove_role_from_instance_profile(
        &self,
        profile: &str,
        _role: &str,
    ) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        state.record("remove-role-from-instance-profile")?;
        state.profile_roles.remove(profile);
        Ok(())
    }

    async fn describe_cluster(&self, name: &str) -> ProvisionResult<EksClusterInfo> {
        let mut state = self.state.lock().await;
        state.record("describe-cluster")?;
        state
            .clusters
            .get(name)
            .cloned()
            .ok_or_else(|| ProvisionError::not_found("cluster", name))
    }

    async fn describe_instance_type_offerings(&self) -> ProvisionResult<Vec<String>> {
        let mut state = self.state.lock().await;
        state.record("describe-instance-type-offerings")?;
        Ok(state.offerings.clone())
    }

    async fn describe_instance_types(&self) -> ProvisionResult<Vec<InstanceTypeInfo>> {
        let mut state = self.state.lock().await;
        state.record("describe-instance-types")?;
        Ok(state.type_infos.clone())
    }

    async fn latest_image_id(&self, kubernetes_version: &str) -> ProvisionResult<String> {
        let mut state = self.state.lock().await;
        state.record("latest-image-id")?;
        Ok(state
            .latest_images
            .get(kubernetes_version)
            .cloned()
            .unwrap_or_else(|| "ami-latest".to_string()))
    }

    async fn get_parameter(&self, key: &str) -> ProvisionResult<String> {
        let mut state = self.state.lock().await;
        state.record("get-parameter")?;
        state
            .parameters
            .get(key)
            .cloned()
            .ok_or_else(|| ProvisionError::not_found("parameter", key))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod memory_tests;
