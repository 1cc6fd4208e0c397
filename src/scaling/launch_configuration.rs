// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The immutable scaling-configuration flavor.
//!
//! Launch configurations cannot be mutated: every change is a new resource
//! under the owning prefix with a timestamped name, and the scaling group is
//! re-pointed. The full prefixed resource list is retained as rotation
//! history and reaped down to the retention bound, oldest first, never
//! touching the active resource.

use tracing::{debug, warn};

use super::{effective_retention, DeleteConfigInput, DiscoverInput};
use crate::cloud::types::{CreateConfigInput, LaunchConfiguration, MachineConfig};
use crate::cloud::CloudProvider;
use crate::provision_errors::ProvisionResult;

/// Adapter over launch configurations.
pub struct LaunchConfigurationAdapter {
    prefix: String,
    seed_name: Option<String>,
    target: Option<LaunchConfiguration>,
    resources: Vec<LaunchConfiguration>,
}

impl LaunchConfigurationAdapter {
    /// Build an adapter for a resource prefix.
    ///
    /// `seed_name` is the last-known active name; it binds the target before
    /// a scaling group exists to reference one.
    #[must_use]
    pub fn new(prefix: &str, seed_name: Option<String>) -> Self {
        Self {
            prefix: prefix.to_string(),
            seed_name: seed_name.filter(|n| !n.is_empty()),
            target: None,
            resources: Vec::new(),
        }
    }

    /// Name of the bound target, when present.
    #[must_use]
    pub fn target_name(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.name.as_str())
    }

    /// Machine definition of the bound target, when present.
    #[must_use]
    pub fn target_config(&self) -> Option<&MachineConfig> {
        self.target.as_ref().map(|t| &t.config)
    }

    /// All owned resources discovered so far, oldest first.
    #[must_use]
    pub fn resources(&self) -> &[LaunchConfiguration] {
        &self.resources
    }

    /// Enumerate owned configurations and bind the target.
    pub(super) async fn discover(
        &mut self,
        cloud: &dyn CloudProvider,
        input: DiscoverInput<'_>,
    ) -> ProvisionResult<()> {
        let mut owned: Vec<LaunchConfiguration> = cloud
            .describe_launch_configurations()
            .await?
            .into_iter()
            .filter(|c| c.name.starts_with(&self.prefix))
            .collect();
        sort_by_creation(&mut owned);
        self.resources = owned;

        let wanted = input
            .scaling_group
            .and_then(|g| g.launch_configuration_name.clone())
            .or_else(|| input.target_name.clone())
            .or_else(|| self.seed_name.clone());

        self.target = wanted.and_then(|name| {
            self.resources.iter().find(|c| c.name == name).cloned()
        });

        debug!(
            prefix = %self.prefix,
            resources = self.resources.len(),
            target = self.target_name().unwrap_or("<none>"),
            "Launch configurations discovered"
        );
        Ok(())
    }

    /// Create a new uniquely named configuration.
    pub(super) async fn create(
        &self,
        cloud: &dyn CloudProvider,
        input: &CreateConfigInput,
    ) -> ProvisionResult<()> {
        cloud.create_launch_configuration(input).await
    }

    /// Reap superseded configurations, oldest first.
    ///
    /// With `delete_all` every prefixed configuration goes, the active one
    /// included. Otherwise the oldest `len - retain` are deleted, always
    /// skipping the active name. Missing resources count as deleted.
    pub(super) async fn delete(
        &self,
        cloud: &dyn CloudProvider,
        input: &DeleteConfigInput,
    ) -> ProvisionResult<()> {
        let retain = effective_retention(input.retain_versions);

        let mut prefixed: Vec<LaunchConfiguration> = self
            .resources
            .iter()
            .filter(|c| c.name.starts_with(&input.prefix))
            .cloned()
            .collect();
        sort_by_creation(&mut prefixed);

        // The active resource is always retained on top of the retention
        // bound, so it never counts against it.
        let deletable = if input.delete_all {
            prefixed.len()
        } else {
            let superseded = prefixed
                .iter()
                .filter(|c| Some(c.name.as_str()) != input.active_name.as_deref())
                .count();
            superseded.saturating_sub(retain)
        };

        let mut deleted = 0;
        for configuration in &prefixed {
            if deleted >= deletable {
                break;
            }
            if !input.delete_all && Some(configuration.name.as_str()) == input.active_name.as_deref()
            {
                continue;
            }
            match cloud.delete_launch_configuration(&configuration.name).await {
                Ok(()) => {
                    debug!(name = %configuration.name, "Launch configuration deleted");
                }
                Err(e) if e.is_not_found() => {
                    warn!(name = %configuration.name, "Launch configuration already gone");
                }
                Err(e) => return Err(e),
            }
            deleted += 1;
        }
        Ok(())
    }

    /// Whether an instance references the active configuration.
    pub(super) fn instance_current(&self, instance: &crate::cloud::types::ScalingInstance) -> bool {
        let Some(active) = self.target_name() else {
            return true;
        };
        instance.launch_configuration_name.as_deref() == Some(active)
    }
}

/// Sort configurations ascending by creation time; missing times first.
fn sort_by_creation(configurations: &mut [LaunchConfiguration]) {
    configurations.sort_by(|a, b| match (&a.created_time, &b.created_time) {
        (None, None) => std::cmp::Ordering::Equal,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (Some(_), None) => std::cmp::Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(y),
    });
}

#[cfg(test)]
#[path = "launch_configuration_tests.rs"]
mod launch_configuration_tests;
