// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes-backed cluster adapter.
//!
//! Implements [`ClusterProvider`] against a live API server. All calls go
//! through [`retry_api_call`](crate::retry::retry_api_call) so transient
//! API-server hiccups are absorbed before they surface as reconcile
//! failures. The shared auth map is written with `replace`, which carries
//! the read resource version and therefore gives compare-and-swap
//! semantics: a stale write comes back as a conflict.

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::{ConfigMap, Event, Node, ObjectReference, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{Api, DeleteParams, ListParams, ObjectMeta, Patch, PatchParams, PostParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Client, ResourceExt};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::{AuthMapEntry, AuthMapSnapshot, ClusterProvider, EventKind, ResourceIdentity};
use crate::constants::{AUTH_MAP_NAME, AUTH_MAP_NAMESPACE, AUTH_MAP_ROLES_KEY};
use crate::crd::{InstanceGroup, InstanceGroupStatus};
use crate::provision_errors::{ProvisionError, ProvisionResult};
use crate::retry::{classify_kube_error, retry_api_call};

/// Field manager name used for controller-side patches.
const FIELD_MANAGER: &str = "instancemgr";

/// Kubernetes-backed [`ClusterProvider`].
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Wrap a Kubernetes client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn auth_map_api(&self) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), AUTH_MAP_NAMESPACE)
    }

    fn snapshot_to_config_map(snapshot: &AuthMapSnapshot) -> ProvisionResult<ConfigMap> {
        let roles = serde_yaml::to_string(&snapshot.entries)
            .map_err(|e| ProvisionError::cluster("encode-auth-map", e))?;

        let mut data = BTreeMap::new();
        data.insert(AUTH_MAP_ROLES_KEY.to_string(), roles);

        Ok(ConfigMap {
            metadata: ObjectMeta {
                name: Some(AUTH_MAP_NAME.to_string()),
                namespace: Some(AUTH_MAP_NAMESPACE.to_string()),
                resource_version: snapshot.resource_version.clone(),
                ..ObjectMeta::default()
            },
            data: Some(data),
            ..ConfigMap::default()
        })
    }
}

#[async_trait]
impl ClusterProvider for KubeCluster {
    async fn list_nodes(&self) -> ProvisionResult<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let list_params = ListParams::default();
        let nodes = retry_api_call(|| api.list(&list_params), "list nodes")
            .await
            .map_err(|e| classify_kube_error("list-nodes", &e))?;
        Ok(nodes.items)
    }

    async fn list_events(
        &self,
        namespace: &str,
        object_name: &str,
        reason: &str,
    ) -> ProvisionResult<Vec<Event>> {
        let api: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        let selector = format!("involvedObject.name={object_name},reason={reason}");
        let lp = ListParams::default().fields(&selector);
        let events = retry_api_call(|| api.list(&lp), "list events")
            .await
            .map_err(|e| classify_kube_error("list-events", &e))?;
        Ok(events.items)
    }

    async fn publish_event(
        &self,
        identity: &ResourceIdentity,
        kind: EventKind,
        reason: &str,
        message: &str,
    ) -> ProvisionResult<()> {
        let api: Api<Event> = Api::namespaced(self.client.clone(), &identity.namespace);
        let now = Utc::now();
        let jiff_now = k8s_openapi::jiff::Timestamp::now();
        let event = Event {
            metadata: ObjectMeta {
                name: Some(format!(
                    "{}.{:x}",
                    identity.name,
                    now.timestamp_nanos_opt().unwrap_or_default()
                )),
                namespace: Some(identity.namespace.clone()),
                ..ObjectMeta::default()
            },
            involved_object: ObjectReference {
                api_version: Some(crate::constants::API_GROUP_VERSION.to_string()),
                kind: Some(crate::constants::KIND_INSTANCE_GROUP.to_string()),
                name: Some(identity.name.clone()),
                namespace: Some(identity.namespace.clone()),
                uid: identity.uid.clone(),
                resource_version: identity.resource_version.clone(),
                ..ObjectReference::default()
            },
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            type_: Some(kind.as_str().to_string()),
            first_timestamp: Some(Time(jiff_now)),
            last_timestamp: Some(Time(jiff_now)),
            count: Some(1),
            ..Event::default()
        };

        api.create(&PostParams::default(), &event)
            .await
            .map_err(|e| classify_kube_error("publish-event", &e))?;
        Ok(())
    }

    async fn get_auth_map(&self) -> ProvisionResult<AuthMapSnapshot> {
        let api = self.auth_map_api();
        let config_map = retry_api_call(|| api.get_opt(AUTH_MAP_NAME), "get auth map")
            .await
            .map_err(|e| classify_kube_error("get-auth-map", &e))?;

        let Some(config_map) = config_map else {
            return Ok(AuthMapSnapshot::default());
        };

        let entries = match config_map
            .data
            .as_ref()
            .and_then(|d| d.get(AUTH_MAP_ROLES_KEY))
        {
            Some(roles) if !roles.trim().is_empty() => {
                serde_yaml::from_str::<Vec<AuthMapEntry>>(roles)
                    .map_err(|e| ProvisionError::cluster("decode-auth-map", e))?
            }
            _ => Vec::new(),
        };

        Ok(AuthMapSnapshot {
            entries,
            resource_version: config_map.metadata.resource_version,
        })
    }

    async fn put_auth_map(&self, snapshot: &AuthMapSnapshot) -> ProvisionResult<()> {
        let api = self.auth_map_api();
        let config_map = Self::snapshot_to_config_map(snapshot)?;

        let result = if snapshot.resource_version.is_some() {
            // replace() sends the read resource version, so a concurrent
            // writer surfaces as a 409
            api.replace(AUTH_MAP_NAME, &PostParams::default(), &config_map)
                .await
        } else {
            api.create(&PostParams::default(), &config_map).await
        };

        match result {
            Ok(_) => {
                info!(entries = snapshot.entries.len(), "Auth map written");
                Ok(())
            }
            Err(e) => Err(classify_kube_error("kube-system/aws-auth", &e)),
        }
    }

    async fn list_instance_groups(&self) -> ProvisionResult<Vec<InstanceGroup>> {
        let api: Api<InstanceGroup> = Api::all(self.client.clone());
        let list_params = ListParams::default();
        let groups = retry_api_call(|| api.list(&list_params), "list instance groups")
            .await
            .map_err(|e| classify_kube_error("list-instance-groups", &e))?;
        Ok(groups.items)
    }

    async fn update_status(
        &self,
        group: &InstanceGroup,
        status: &InstanceGroupStatus,
    ) -> ProvisionResult<()> {
        let namespace = group.namespace().unwrap_or_default();
        let api: Api<InstanceGroup> = Api::namespaced(self.client.clone(), &namespace);
        let patch = json!({ "status": status });
        api.patch_status(
            &group.name_any(),
            &PatchParams::default(),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(|e| classify_kube_error("update-status", &e))?;
        Ok(())
    }

    async fn cordon_node(&self, node_name: &str) -> ProvisionResult<()> {
        let api: Api<Node> = Api::all(self.client.clone());
        let patch = json!({ "spec": { "unschedulable": true } });
        api.patch(node_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| classify_kube_error("cordon-node", &e))?;
        debug!(node = node_name, "Node cordoned");
        Ok(())
    }

    async fn drain_node(&self, node_name: &str, grace_seconds: u32) -> ProvisionResult<()> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let lp = ListParams::default().fields(&format!("spec.nodeName={node_name}"));
        let pods = retry_api_call(|| api.list(&lp), "list node pods")
            .await
            .map_err(|e| classify_kube_error("drain-node", &e))?;

        let mut delete_params = DeleteParams::default();
        delete_params.grace_period_seconds = Some(grace_seconds);

        for pod in pods.items {
            // DaemonSet pods restart in place and mirror pods are
            // kubelet-owned; both survive a drain
            let daemonset_owned = pod
                .metadata
                .owner_references
                .as_ref()
                .is_some_and(|refs| refs.iter().any(|r| r.kind == "DaemonSet"));
            let mirror = pod
                .metadata
                .annotations
                .as_ref()
                .is_some_and(|a| a.contains_key("kubernetes.io/config.mirror"));
            if daemonset_owned || mirror {
                continue;
            }

            let namespace = pod.namespace().unwrap_or_default();
            let pod_api: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);
            match pod_api.delete(&pod.name_any(), &delete_params).await {
                Ok(_) => {}
                Err(kube::Error::Api(ref api_err)) if api_err.code == 404 => {}
                Err(e) => return Err(classify_kube_error("drain-node", &e)),
            }
        }

        info!(node = node_name, grace = grace_seconds, "Node drained");
        Ok(())
    }

    async fn apply_upgrade_resource(
        &self,
        namespace: &str,
        manifest: &serde_json::Value,
    ) -> ProvisionResult<()> {
        let api_version = manifest
            .get("apiVersion")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ProvisionError::validation("strategy.crd.spec", "manifest has no apiVersion")
            })?;
        let kind = manifest
            .get("kind")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ProvisionError::validation("strategy.crd.spec", "manifest has no kind")
            })?;
        let name = manifest
            .pointer("/metadata/name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ProvisionError::validation("strategy.crd.spec", "manifest has no metadata.name")
            })?;

        let (group, version) = match api_version.split_once('/') {
            Some((g, v)) => (g, v),
            None => ("", api_version),
        };
        let gvk = GroupVersionKind::gvk(group, version, kind);
        let resource = ApiResource::from_gvk(&gvk);
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &resource);

        let object: DynamicObject = serde_json::from_value(manifest.clone())
            .map_err(|e| ProvisionError::validation("strategy.crd.spec", e.to_string()))?;

        match api.create(&PostParams::default(), &object).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ref api_err)) if api_err.code == 409 => {
                let pp = PatchParams::apply(FIELD_MANAGER).force();
                api.patch(name, &pp, &Patch::Apply(manifest))
                    .await
                    .map_err(|e| classify_kube_error("apply-upgrade-resource", &e))?;
                Ok(())
            }
            Err(e) => Err(classify_kube_error("apply-upgrade-resource", &e)),
        }
    }

    async fn get_upgrade_resource(
        &self,
        namespace: &str,
        api_version: &str,
        kind: &str,
        name: &str,
    ) -> ProvisionResult<Option<serde_json::Value>> {
        let (group, version) = match api_version.split_once('/') {
            Some((g, v)) => (g, v),
            None => ("", api_version),
        };
        let gvk = GroupVersionKind::gvk(group, version, kind);
        let resource = ApiResource::from_gvk(&gvk);
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &resource);

        let object = api
            .get_opt(name)
            .await
            .map_err(|e| classify_kube_error("get-upgrade-resource", &e))?;

        match object {
            Some(object) => {
                let value = serde_json::to_value(&object)
                    .map_err(|e| ProvisionError::cluster("get-upgrade-resource", e))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}
