// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The versioned scaling-configuration flavor.
//!
//! A launch template is a single named object whose mutations are numbered
//! versions; the scaling group pins a version and rotation moves the pin.
//! Version reaping excludes the latest version and the version the scaling
//! group currently runs, so the live definition can never be deleted, and
//! removes the remaining oldest versions in one batch call.

use tracing::{debug, warn};

use super::{effective_retention, DeleteConfigInput, DiscoverInput};
use crate::cloud::types::{
    CreateConfigInput, LaunchTemplate, LaunchTemplateVersion, MachineConfig,
};
use crate::cloud::CloudProvider;
use crate::provision_errors::ProvisionResult;

/// Adapter over launch templates and their versions.
pub struct LaunchTemplateAdapter {
    name: String,
    target: Option<LaunchTemplate>,
    versions: Vec<LaunchTemplateVersion>,
    resources: Vec<LaunchTemplate>,
}

impl LaunchTemplateAdapter {
    /// Build an adapter for a resource prefix.
    ///
    /// The template itself carries the stable prefix name; versions number
    /// upward underneath it.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            name: prefix.to_string(),
            target: None,
            versions: Vec::new(),
            resources: Vec::new(),
        }
    }

    /// Name of the bound template, when present.
    #[must_use]
    pub fn target_name(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.name.as_str())
    }

    /// Latest version number of the bound template.
    #[must_use]
    pub fn latest_version(&self) -> Option<i64> {
        self.target.as_ref().and_then(|t| t.latest_version)
    }

    /// Machine definition at the latest version, when known.
    #[must_use]
    pub fn latest_config(&self) -> Option<&MachineConfig> {
        let latest = self.latest_version()?;
        self.versions
            .iter()
            .find(|v| v.version == latest)
            .map(|v| &v.config)
    }

    /// All versions discovered for the bound template.
    #[must_use]
    pub fn versions(&self) -> &[LaunchTemplateVersion] {
        &self.versions
    }

    /// Enumerate owned templates, bind the target and fetch its versions.
    pub(super) async fn discover(
        &mut self,
        cloud: &dyn CloudProvider,
        input: DiscoverInput<'_>,
    ) -> ProvisionResult<()> {
        self.resources = cloud
            .describe_launch_templates()
            .await?
            .into_iter()
            .filter(|t| t.name.starts_with(&self.name))
            .collect();

        let wanted = input
            .scaling_group
            .and_then(|g| g.launch_template.as_ref().map(|t| t.name.clone()))
            .or_else(|| input.target_name.clone())
            .unwrap_or_else(|| self.name.clone());

        self.target = self.resources.iter().find(|t| t.name == wanted).cloned();

        self.versions = match &self.target {
            Some(template) => {
                let mut versions = cloud
                    .describe_launch_template_versions(&template.name)
                    .await?;
                sort_by_creation(&mut versions);
                versions
            }
            None => Vec::new(),
        };

        debug!(
            template = %self.name,
            versions = self.versions.len(),
            latest = self.latest_version().unwrap_or_default(),
            "Launch template discovered"
        );
        Ok(())
    }

    /// Create the template, or add a version when it already exists.
    pub(super) async fn create(
        &self,
        cloud: &dyn CloudProvider,
        input: &CreateConfigInput,
    ) -> ProvisionResult<()> {
        let exists = self.target_name() == Some(input.name.as_str())
            || self.resources.iter().any(|t| t.name == input.name);
        if exists {
            cloud.create_launch_template_version(input).await
        } else {
            cloud.create_launch_template(input).await
        }
    }

    /// Reap superseded versions, or delete the whole template.
    pub(super) async fn delete(
        &self,
        cloud: &dyn CloudProvider,
        input: &DeleteConfigInput,
    ) -> ProvisionResult<()> {
        if input.delete_all {
            return match cloud.delete_launch_template(&self.name).await {
                Ok(()) => Ok(()),
                Err(e) if e.is_not_found() => {
                    warn!(template = %self.name, "Launch template already gone");
                    Ok(())
                }
                Err(e) => Err(e),
            };
        }

        let retain = effective_retention(input.retain_versions);
        let mut sorted = self.versions.clone();
        sort_by_creation(&mut sorted);

        let latest = self.latest_version();

        // The latest version plays the active role and never counts against
        // retention; the version the group still runs is spared outright.
        let superseded = sorted
            .iter()
            .filter(|v| Some(v.version) != latest)
            .count();
        let deletable_count = superseded.saturating_sub(retain);

        let versions: Vec<i64> = sorted
            .iter()
            .filter(|v| Some(v.version) != latest)
            .filter(|v| Some(v.version) != input.in_use_version)
            .map(|v| v.version)
            .take(deletable_count)
            .collect();

        if versions.is_empty() {
            return Ok(());
        }

        match cloud
            .delete_launch_template_versions(&self.name, &versions)
            .await
        {
            Ok(()) => {
                debug!(template = %self.name, count = versions.len(), "Template versions reaped");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Whether an instance runs the latest version of the active template.
    pub(super) fn instance_current(&self, instance: &crate::cloud::types::ScalingInstance) -> bool {
        let Some(active) = self.target_name() else {
            return true;
        };
        let latest = self.latest_version().map(|v| v.to_string());

        match &instance.launch_template {
            Some(reference) => reference.name == active && reference.version == latest,
            // launched before the group moved to templates
            None => false,
        }
    }
}

/// Sort versions ascending by creation time; missing times first.
fn sort_by_creation(versions: &mut [LaunchTemplateVersion]) {
    versions.sort_by(|a, b| match (&a.created_time, &b.created_time) {
        (None, None) => std::cmp::Ordering::Equal,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (Some(_), None) => std::cmp::Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(y),
    });
}

#[cfg(test)]
#[path = "launch_template_tests.rs"]
mod launch_template_tests;
