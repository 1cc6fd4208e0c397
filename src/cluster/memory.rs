// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory cluster adapter.
//!
//! A scripted implementation of [`ClusterProvider`] used by the unit and
//! integration suites: nodes, events and upgrade-resource statuses are
//! seeded by the test, auth-map writes enforce compare-and-swap against a
//! synthetic version counter, and everything written by the engine can be
//! read back for assertions.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::jiff::Timestamp;
use k8s_openapi::api::core::v1::{
    Event, Node, NodeCondition, NodeSpec, NodeStatus, ObjectReference,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use tokio::sync::Mutex;

use super::{AuthMapSnapshot, ClusterProvider, EventKind, ResourceIdentity};
use crate::crd::{InstanceGroup, InstanceGroupStatus};
use crate::provision_errors::{ProvisionError, ProvisionResult};

/// A published event captured for assertions.
#[derive(Clone, Debug)]
pub struct PublishedEvent {
    /// Normal or Warning
    pub kind: EventKind,
    /// Event reason
    pub reason: String,
    /// Event message
    pub message: String,
}

#[derive(Default)]
struct ClusterState {
    nodes: Vec<Node>,
    events: Vec<Event>,
    published: Vec<PublishedEvent>,
    auth_entries: Vec<super::AuthMapEntry>,
    auth_version: u64,
    auth_exists: bool,
    groups: BTreeMap<String, InstanceGroup>,
    cordoned: Vec<String>,
    drained: Vec<(String, u32)>,
    upgrade_resources: BTreeMap<String, serde_json::Value>,
    upgrade_status_scripts: BTreeMap<String, serde_json::Value>,
    fail_ops: BTreeMap<String, ProvisionError>,
}

fn group_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// In-memory [`ClusterProvider`] implementation.
#[derive(Default)]
pub struct MemoryCluster {
    state: Mutex<ClusterState>,
}

impl MemoryCluster {
    /// Create an empty in-memory cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot failure for the named operation.
    pub async fn fail_next(&self, operation: &str, error: ProvisionError) {
        self.state
            .lock()
            .await
            .fail_ops
            .insert(operation.to_string(), error);
    }

    /// Seed a worker node joined to a cloud instance.
    ///
    /// # Arguments
    ///
    /// * `name` - node name
    /// * `instance_id` - cloud instance id encoded into the provider id
    /// * `ready` - whether the Ready condition reads True
    pub async fn seed_node(&self, name: &str, instance_id: &str, ready: bool) {
        let node = Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            spec: Some(NodeSpec {
                provider_id: Some(format!("aws:///us-west-2a/{instance_id}")),
                ..NodeSpec::default()
            }),
            status: Some(NodeStatus {
                conditions: Some(vec![NodeCondition {
                    type_: "Ready".to_string(),
                    status: if ready { "True" } else { "False" }.to_string(),
                    ..NodeCondition::default()
                }]),
                ..NodeStatus::default()
            }),
        };
        self.state.lock().await.nodes.push(node);
    }

    /// Remove all seeded nodes.
    pub async fn clear_nodes(&self) {
        self.state.lock().await.nodes.clear();
    }

    /// Seed an event bound to an object.
    pub async fn seed_event(
        &self,
        namespace: &str,
        object_name: &str,
        reason: &str,
        message: &str,
        timestamp_secs: i64,
    ) {
        let event = Event {
            metadata: ObjectMeta {
                name: Some(format!("{object_name}.{timestamp_secs}")),
                namespace: Some(namespace.to_string()),
                ..ObjectMeta::default()
            },
            involved_object: ObjectReference {
                name: Some(object_name.to_string()),
                namespace: Some(namespace.to_string()),
                ..ObjectReference::default()
            },
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            last_timestamp: Timestamp::from_second(timestamp_secs).ok().map(Time),
            ..Event::default()
        };
        self.state.lock().await.events.push(event);
    }

    /// Store or replace an instance group resource.
    pub async fn upsert_instance_group(&self, group: InstanceGroup) {
        let key = group_key(
            &group.namespace().unwrap_or_default(),
            &group.name_any(),
        );
        self.state.lock().await.groups.insert(key, group);
    }

    /// Remove an instance group resource.
    pub async fn remove_instance_group(&self, namespace: &str, name: &str) {
        self.state
            .lock()
            .await
            .groups
            .remove(&group_key(namespace, name));
    }

    /// Read back a stored instance group.
    pub async fn instance_group(&self, namespace: &str, name: &str) -> Option<InstanceGroup> {
        self.state
            .lock()
            .await
            .groups
            .get(&group_key(namespace, name))
            .cloned()
    }

    /// The auth-map entries currently stored.
    pub async fn auth_entries(&self) -> Vec<super::AuthMapEntry> {
        self.state.lock().await.auth_entries.clone()
    }

    /// All events published by the engine so far.
    pub async fn published_events(&self) -> Vec<PublishedEvent> {
        self.state.lock().await.published.clone()
    }

    /// Node names cordoned by the engine.
    pub async fn cordoned_nodes(&self) -> Vec<String> {
        self.state.lock().await.cordoned.clone()
    }

    /// Node names drained by the engine, with grace periods.
    pub async fn drained_nodes(&self) -> Vec<(String, u32)> {
        self.state.lock().await.drained.clone()
    }

    /// Script the status block reported for an upgrade resource.
    pub async fn script_upgrade_status(&self, name: &str, status: serde_json::Value) {
        self.state
            .lock()
            .await
            .upgrade_status_scripts
            .insert(name.to_string(), status);
    }

    /// Read back a submitted upgrade resource manifest.
    pub async fn upgrade_resource(&self, name: &str) -> Option<serde_json::Value> {
        self.state
            .lock()
            .await
            .upgrade_resources
            .get(name)
            .cloned()
    }
}

#[async_trait]
impl ClusterProvider for MemoryCluster {
    async fn list_nodes(&self) -> ProvisionResult<Vec<Node>> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.fail_ops.remove("list-nodes") {
            return Err(err);
        }
        Ok(state.nodes.clone())
    }

    async fn list_events(
        &self,
        namespace: &str,
        object_name: &str,
        reason: &str,
    ) -> ProvisionResult<Vec<Event>> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.fail_ops.remove("list-events") {
            return Err(err);
        }
        Ok(state
            .events
            .iter()
            .filter(|e| {
                e.metadata.namespace.as_deref() == Some(namespace)
                    && e.involved_object.name.as_deref() == Some(object_name)
                    && e.reason.as_deref() == Some(reason)
            })
            .cloned()
            .collect())
    }

    async fn publish_event(
        &self,
        _identity: &ResourceIdentity,
        kind: EventKind,
        reason: &str,
        message: &str,
    ) -> ProvisionResult<()> {
        self.state.lock().await.published.push(PublishedEvent {
            kind,
            reason: reason.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }

    async fn get_auth_map(&self) -> ProvisionResult<AuthMapSnapshot> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.fail_ops.remove("get-auth-map") {
            return Err(err);
        }
        if !state.auth_exists {
            return Ok(AuthMapSnapshot::default());
        }
        Ok(AuthMapSnapshot {
            entries: state.auth_entries.clone(),
            resource_version: Some(state.auth_version.to_string()),
        })
    }

    async fn put_auth_map(&self, snapshot: &AuthMapSnapshot) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.fail_ops.remove("put-auth-map") {
            return Err(err);
        }

        let current = if state.auth_exists {
            Some(state.auth_version.to_string())
        } else {
            None
        };
        if snapshot.resource_version != current {
            return Err(ProvisionError::Conflict {
                resource: "kube-system/aws-auth".to_string(),
            });
        }

        state.auth_entries = snapshot.entries.clone();
        state.auth_version += 1;
        state.auth_exists = true;
        Ok(())
    }

    async fn list_instance_groups(&self) -> ProvisionResult<Vec<InstanceGroup>> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.fail_ops.remove("list-instance-groups") {
            return Err(err);
        }
        Ok(state.groups.values().cloned().collect())
    }

    async fn update_status(
        &self,
        group: &InstanceGroup,
        status: &InstanceGroupStatus,
    ) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        let key = group_key(&group.namespace().unwrap_or_default(), &group.name_any());
        if let Some(stored) = state.groups.get_mut(&key) {
            stored.status = Some(status.clone());
        }
        Ok(())
    }

    async fn cordon_node(&self, node_name: &str) -> ProvisionResult<()> {
        let mut state = self.state.lock().await;
        if !state.cordoned.iter().any(|n| n == node_name) {
            state.cordoned.push(node_name.to_string());
        }
        if let Some(node) = state
            .nodes
            .iter_mut()
            .find(|n| n.metadata.name.as_deref() == Some(node_name))
        {
            node.spec.get_or_insert_with(NodeSpec::default).unschedulable = Some(true);
        }
        Ok(())
    }

    async fn drain_node(&self, node_name: &str, grace_seconds: u32) -> ProvisionResult<()> {
        self.state
            .lock()
            .await
            .drained
            .push((node_name.to_string(), grace_seconds));
        Ok(())
    }

    async fn apply_upgrade_resource(
        &self,
        _namespace: &str,
        manifest: &serde_json::Value,
    ) -> ProvisionResult<()> {
        let name = manifest
            .pointer("/metadata/name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let mut state = self.state.lock().await;
        let mut stored = manifest.clone();
        if let Some(status) = state.upgrade_status_scripts.get(&name) {
            stored["status"] = status.clone();
        }
        state.upgrade_resources.insert(name, stored);
        Ok(())
    }

    async fn get_upgrade_resource(
        &self,
        _namespace: &str,
        _api_version: &str,
        _kind: &str,
        name: &str,
    ) -> ProvisionResult<Option<serde_json::Value>> {
        let mut state = self.state.lock().await;
        let mut resource = state.upgrade_resources.get(name).cloned();
        if let (Some(resource), Some(status)) = (
            resource.as_mut(),
            state.upgrade_status_scripts.get(name).cloned(),
        ) {
            resource["status"] = status;
        }
        Ok(resource)
    }
}
