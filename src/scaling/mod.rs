// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Polymorphic scaling-configuration handling.
//!
//! Launch configurations are create-only: every mutation is a new uniquely
//! named resource. Launch templates are versioned: every mutation is a new
//! numbered version plus a pointer move. Upper layers stay agnostic by
//! talking to [`ScalingConfiguration`], which exposes the same operation
//! set over both flavors: discover, create, delete (with retention), drift
//! detection, rotation detection and provisioned-ness.
//!
//! The two variants share no data; they are composed as a tagged enum
//! rather than a trait hierarchy.

pub mod launch_configuration;
pub mod launch_template;
pub mod pool;

use chrono::Utc;
use tracing::info;

use crate::cloud::types::{CreateConfigInput, MachineConfig, ScalingGroup};
use crate::cloud::CloudProvider;
use crate::constants::DEFAULT_CONFIG_RETENTION;
use crate::crd::ScalingConfigurationKind;
use crate::provision_errors::ProvisionResult;
use launch_configuration::LaunchConfigurationAdapter;
use launch_template::LaunchTemplateAdapter;

/// Input to [`ScalingConfiguration::discover`].
#[derive(Default)]
pub struct DiscoverInput<'a> {
    /// The scaling group to bind the target configuration from, once known
    pub scaling_group: Option<&'a ScalingGroup>,

    /// Last-known active name, used before a scaling group exists
    pub target_name: Option<String>,
}

/// Input to [`ScalingConfiguration::delete`].
#[derive(Clone, Debug, Default)]
pub struct DeleteConfigInput {
    /// Name of the currently active resource; never reaped
    pub active_name: Option<String>,

    /// Name prefix owned by the resource
    pub prefix: String,

    /// Tear everything down instead of reaping old versions
    pub delete_all: bool,

    /// Retention bound; zero falls back to the default
    pub retain_versions: usize,

    /// Template version currently referenced by the scaling group
    pub in_use_version: Option<i64>,
}

/// Resolve a configured retention against the default.
///
/// A retention of zero behaves as the default so a zeroed field can never
/// reap the full history.
#[must_use]
pub fn effective_retention(retain_versions: usize) -> usize {
    if retain_versions == 0 {
        DEFAULT_CONFIG_RETENTION
    } else {
        retain_versions
    }
}

/// Build a unique, timestamped launch-configuration name under a prefix.
#[must_use]
pub fn timestamped_name(prefix: &str) -> String {
    format!("{prefix}-{}", Utc::now().format("%Y%m%d%H%M%S%6f"))
}

/// Compare two machine definitions and name the first differing field.
///
/// Security-group comparison is order-independent; block devices, license
/// specifications and placement use deep equality. Optional strings treat
/// absence and emptiness alike.
#[must_use]
pub fn first_drift(current: &MachineConfig, desired: &MachineConfig) -> Option<&'static str> {
    fn text(value: &Option<String>) -> &str {
        value.as_deref().unwrap_or("")
    }

    if current.image_id != desired.image_id {
        return Some("image-id");
    }
    if current.instance_type != desired.instance_type {
        return Some("instance-type");
    }
    if text(&current.instance_profile_arn) != text(&desired.instance_profile_arn) {
        return Some("instance-profile");
    }

    let mut current_groups = current.security_groups.clone();
    let mut desired_groups = desired.security_groups.clone();
    current_groups.sort();
    desired_groups.sort();
    if current_groups != desired_groups {
        return Some("security-groups");
    }

    if text(&current.spot_price) != text(&desired.spot_price) {
        return Some("spot-price");
    }
    if text(&current.key_name) != text(&desired.key_name) {
        return Some("key-name");
    }
    if text(&current.user_data) != text(&desired.user_data) {
        return Some("user-data");
    }
    if current.block_devices != desired.block_devices {
        return Some("block-devices");
    }
    if current.license_specifications != desired.license_specifications {
        return Some("license-specifications");
    }
    if current.placement != desired.placement {
        return Some("placement");
    }

    None
}

/// The polymorphic scaling configuration.
pub enum ScalingConfiguration {
    /// Immutable flavor
    LaunchConfiguration(LaunchConfigurationAdapter),
    /// Versioned flavor
    LaunchTemplate(LaunchTemplateAdapter),
}

impl ScalingConfiguration {
    /// Construct the variant selected in the spec.
    ///
    /// # Arguments
    ///
    /// * `kind` - flavor selector from the spec
    /// * `prefix` - the resource's name prefix
    /// * `active_name` - last-known active name, empty on first sight
    #[must_use]
    pub fn new(kind: ScalingConfigurationKind, prefix: &str, active_name: Option<String>) -> Self {
        match kind {
            ScalingConfigurationKind::LaunchConfiguration => {
                Self::LaunchConfiguration(LaunchConfigurationAdapter::new(prefix, active_name))
            }
            ScalingConfigurationKind::LaunchTemplate => {
                Self::LaunchTemplate(LaunchTemplateAdapter::new(prefix))
            }
        }
    }

    /// The flavor of this configuration.
    #[must_use]
    pub fn kind(&self) -> ScalingConfigurationKind {
        match self {
            Self::LaunchConfiguration(_) => ScalingConfigurationKind::LaunchConfiguration,
            Self::LaunchTemplate(_) => ScalingConfigurationKind::LaunchTemplate,
        }
    }

    /// Name of the active resource, when one is bound.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::LaunchConfiguration(adapter) => adapter.target_name(),
            Self::LaunchTemplate(adapter) => adapter.target_name(),
        }
    }

    /// Latest template version, for the versioned flavor.
    #[must_use]
    pub fn latest_version(&self) -> Option<i64> {
        match self {
            Self::LaunchConfiguration(_) => None,
            Self::LaunchTemplate(adapter) => adapter.latest_version(),
        }
    }

    /// Whether a target resource is bound.
    #[must_use]
    pub fn provisioned(&self) -> bool {
        self.name().is_some()
    }

    /// Enumerate owned resources and bind the target.
    ///
    /// Absence of a target is not an error; only cloud failures are.
    ///
    /// # Errors
    ///
    /// Returns a cloud error when enumeration fails.
    pub async fn discover(
        &mut self,
        cloud: &dyn CloudProvider,
        input: DiscoverInput<'_>,
    ) -> ProvisionResult<()> {
        match self {
            Self::LaunchConfiguration(adapter) => adapter.discover(cloud, input).await,
            Self::LaunchTemplate(adapter) => adapter.discover(cloud, input).await,
        }
    }

    /// Materialize a new machine definition.
    ///
    /// For launch configurations the caller supplies a fresh unique name;
    /// for launch templates an existing template gains a version and a
    /// missing one is created.
    ///
    /// # Errors
    ///
    /// Returns a cloud error when creation fails; no partial side effects
    /// are assumed either way.
    pub async fn create(
        &self,
        cloud: &dyn CloudProvider,
        input: &CreateConfigInput,
    ) -> ProvisionResult<()> {
        match self {
            Self::LaunchConfiguration(adapter) => adapter.create(cloud, input).await,
            Self::LaunchTemplate(adapter) => adapter.create(cloud, input).await,
        }
    }

    /// Reap superseded resources, or tear everything down.
    ///
    /// # Errors
    ///
    /// Returns a cloud error when deletion fails; missing resources are
    /// treated as already deleted.
    pub async fn delete(
        &self,
        cloud: &dyn CloudProvider,
        input: &DeleteConfigInput,
    ) -> ProvisionResult<()> {
        match self {
            Self::LaunchConfiguration(adapter) => adapter.delete(cloud, input).await,
            Self::LaunchTemplate(adapter) => adapter.delete(cloud, input).await,
        }
    }

    /// Whether the bound target diverges from the desired definition.
    ///
    /// An absent target counts as drifted. The first differing field is
    /// logged for debuggability.
    #[must_use]
    pub fn drifted(&self, desired: &MachineConfig) -> bool {
        let (flavor, current) = match self {
            Self::LaunchConfiguration(adapter) => {
                ("launch configuration", adapter.target_config())
            }
            Self::LaunchTemplate(adapter) => ("launch template", adapter.latest_config()),
        };

        let Some(current) = current else {
            info!(flavor = flavor, "No active configuration, treating as drifted");
            return true;
        };

        match first_drift(current, desired) {
            Some(field) => {
                info!(flavor = flavor, field = field, "Configuration drift detected");
                true
            }
            None => false,
        }
    }

    /// Whether one instance runs the active definition.
    ///
    /// Launch configurations compare by name; launch templates compare by
    /// name and latest version. Without a bound target every instance
    /// counts as current.
    #[must_use]
    pub fn instance_current(&self, instance: &crate::cloud::types::ScalingInstance) -> bool {
        match self {
            Self::LaunchConfiguration(adapter) => adapter.instance_current(instance),
            Self::LaunchTemplate(adapter) => adapter.instance_current(instance),
        }
    }

    /// Whether any group instance still runs a superseded definition.
    ///
    /// An empty instance list never needs rotation.
    #[must_use]
    pub fn rotation_needed(&self, group: &ScalingGroup) -> bool {
        group
            .instances
            .iter()
            .any(|instance| !self.instance_current(instance))
    }
}
