// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cluster adapter interface.
//!
//! The reconciliation engine reads and writes cluster-side state through the
//! [`ClusterProvider`] trait: worker nodes, the event stream, the shared
//! authentication map (with compare-and-swap semantics), status subresources
//! and published events. [`cluster::kube`](kube) implements it against a
//! live API server; [`cluster::memory`](memory) is the scripted
//! implementation used by the test suites.

pub mod kube;
pub mod memory;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, Node};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::crd::{InstanceGroup, InstanceGroupStatus};
use crate::provision_errors::ProvisionResult;
use std::sync::Arc;

/// Identity of the resource a reconcile pass acts on behalf of.
///
/// Bound into the event publisher at the start of discovery so every event
/// carries the right object reference.
#[derive(Clone, Debug, Default)]
pub struct ResourceIdentity {
    /// Resource name
    pub name: String,
    /// Resource namespace
    pub namespace: String,
    /// Server-assigned uid
    pub uid: Option<String>,
    /// Version token used for optimistic writes
    pub resource_version: Option<String>,
}

impl ResourceIdentity {
    /// Extract the identity triple from a resource.
    #[must_use]
    pub fn from_group(group: &InstanceGroup) -> Self {
        Self {
            name: group.metadata.name.clone().unwrap_or_default(),
            namespace: group.metadata.namespace.clone().unwrap_or_default(),
            uid: group.metadata.uid.clone(),
            resource_version: group.metadata.resource_version.clone(),
        }
    }
}

/// Severity of a published event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// Routine progress
    Normal,
    /// Non-fatal failure worth surfacing
    Warning,
}

impl EventKind {
    /// The string the API expects in `Event.type`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Warning => "Warning",
        }
    }
}

/// One role entry of the shared authentication map.
///
/// The well-known `mapRoles` format consumed by node registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthMapEntry {
    /// Role ARN granted cluster access
    pub rolearn: String,
    /// Username template the role maps to
    pub username: String,
    /// Groups the role joins
    pub groups: Vec<String>,
}

/// Snapshot of the shared authentication map.
///
/// `resource_version` carries the server-side version token; writing a
/// snapshot whose token is stale fails with a conflict.
#[derive(Clone, Debug, Default)]
pub struct AuthMapSnapshot {
    /// Role entries, keyed by role ARN
    pub entries: Vec<AuthMapEntry>,
    /// Version token read with the entries; `None` when the map does not
    /// exist yet
    pub resource_version: Option<String>,
}

impl AuthMapSnapshot {
    /// Whether the map already carries an entry for a role ARN.
    #[must_use]
    pub fn contains_role(&self, role_arn: &str) -> bool {
        self.entries.iter().any(|e| e.rolearn == role_arn)
    }
}

/// Interface to the cluster hosting the instance groups.
#[async_trait]
pub trait ClusterProvider: Send + Sync {
    /// List all worker nodes.
    async fn list_nodes(&self) -> ProvisionResult<Vec<Node>>;

    /// List events bound to an object, filtered by reason.
    async fn list_events(
        &self,
        namespace: &str,
        object_name: &str,
        reason: &str,
    ) -> ProvisionResult<Vec<Event>>;

    /// Publish an event on behalf of an instance group.
    async fn publish_event(
        &self,
        identity: &ResourceIdentity,
        kind: EventKind,
        reason: &str,
        message: &str,
    ) -> ProvisionResult<()>;

    /// Read the shared authentication map.
    ///
    /// A missing map reads as an empty snapshot without a version token.
    async fn get_auth_map(&self) -> ProvisionResult<AuthMapSnapshot>;

    /// Write the shared authentication map.
    ///
    /// # Errors
    ///
    /// Fails with [`ProvisionError::Conflict`](crate::provision_errors::ProvisionError::Conflict)
    /// when the snapshot's version token is stale.
    async fn put_auth_map(&self, snapshot: &AuthMapSnapshot) -> ProvisionResult<()>;

    /// List all `InstanceGroup` resources across namespaces.
    async fn list_instance_groups(&self) -> ProvisionResult<Vec<InstanceGroup>>;

    /// Write an instance group's status subresource.
    async fn update_status(
        &self,
        group: &InstanceGroup,
        status: &InstanceGroupStatus,
    ) -> ProvisionResult<()>;

    /// Mark a node unschedulable.
    async fn cordon_node(&self, node_name: &str) -> ProvisionResult<()>;

    /// Evict the evictable pods of a node with a grace period.
    async fn drain_node(&self, node_name: &str, grace_seconds: u32) -> ProvisionResult<()>;

    /// Create or update the custom resource driving a CRD-based upgrade.
    async fn apply_upgrade_resource(
        &self,
        namespace: &str,
        manifest: &serde_json::Value,
    ) -> ProvisionResult<()>;

    /// Read back a CRD-based upgrade resource, `Ok(None)` when absent.
    async fn get_upgrade_resource(
        &self,
        namespace: &str,
        api_version: &str,
        kind: &str,
        name: &str,
    ) -> ProvisionResult<Option<serde_json::Value>>;
}

/// Event publisher bound to one resource identity.
///
/// Publishing is best-effort: failures are logged and swallowed so a broken
/// event stream can never fail a reconcile pass.
#[derive(Clone)]
pub struct EventPublisher {
    cluster: Arc<dyn ClusterProvider>,
    identity: ResourceIdentity,
}

impl EventPublisher {
    /// Bind a publisher to a resource identity.
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterProvider>, identity: ResourceIdentity) -> Self {
        Self { cluster, identity }
    }

    /// The identity this publisher speaks for.
    #[must_use]
    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    /// Publish a normal event.
    pub async fn normal(&self, reason: &str, message: &str) {
        if let Err(e) = self
            .cluster
            .publish_event(&self.identity, EventKind::Normal, reason, message)
            .await
        {
            warn!(
                namespace = %self.identity.namespace,
                name = %self.identity.name,
                reason = reason,
                error = %e,
                "Failed to publish event"
            );
        }
    }

    /// Publish a warning event.
    pub async fn warning(&self, reason: &str, message: &str) {
        if let Err(e) = self
            .cluster
            .publish_event(&self.identity, EventKind::Warning, reason, message)
            .await
        {
            warn!(
                namespace = %self.identity.namespace,
                name = %self.identity.name,
                reason = reason,
                error = %e,
                "Failed to publish warning event"
            );
        }
    }
}
