// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared types and imports for `InstanceGroup` reconciliation.
//!
//! This module provides common type re-exports and shared utilities
//! used across the instancegroup reconciliation modules.

#![allow(clippy::wildcard_imports)]

// Re-export commonly used domain types
pub use crate::cloud::types::{
    CreateConfigInput, CreateScalingGroupInput, EksClusterInfo, GroupConfigRef, IamRole,
    InstanceProfile, InstanceTypeInfo, LifecycleHook, MachineConfig, MixedInstancesSpec,
    PoolInstance, ScalingGroup, ScalingInstance, Tag, UpdateScalingGroupInput,
};
pub use crate::cloud::CloudProvider;
pub use crate::cluster::{ClusterProvider, EventKind, EventPublisher, ResourceIdentity};
pub use crate::context::Context;
pub use crate::crd::{
    Condition, EksConfiguration, EksSpec, InstanceGroup, InstanceGroupStatus, LifecycleKind,
    ReconcileState, ScalingConfigurationKind, UpgradeStrategyType,
};
pub use crate::provision_errors::{ProvisionError, ProvisionResult};
pub use crate::scaling::{
    DeleteConfigInput, DiscoverInput, ScalingConfiguration,
};

// Re-export common utilities
pub use std::collections::BTreeMap;
pub use std::sync::Arc;
pub use tracing::{debug, error, info, warn};
