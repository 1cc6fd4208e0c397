// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the auth-map reconciler.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::{ensure_auth_role, remove_auth_role};
    use crate::cluster::memory::MemoryCluster;
    use crate::cluster::{ClusterProvider, EventPublisher, ResourceIdentity};
    use crate::crd::{InstanceGroup, InstanceGroupSpec, InstanceGroupStatus};

    fn group_with_role(namespace: &str, name: &str, role_arn: &str) -> InstanceGroup {
        let mut group = InstanceGroup::new(
            name,
            InstanceGroupSpec {
                provisioner: "eks".to_string(),
                strategy: Default::default(),
                eks: None,
            },
        );
        group.metadata.namespace = Some(namespace.to_string());
        group.status = Some(InstanceGroupStatus {
            node_role_arn: Some(role_arn.to_string()),
            ..InstanceGroupStatus::default()
        });
        group
    }

    fn publisher_for(cluster: &Arc<MemoryCluster>, namespace: &str, name: &str) -> EventPublisher {
        EventPublisher::new(
            cluster.clone() as Arc<dyn ClusterProvider>,
            ResourceIdentity {
                name: name.to_string(),
                namespace: namespace.to_string(),
                uid: None,
                resource_version: None,
            },
        )
    }

    #[tokio::test]
    async fn test_ensure_adds_entry_once() {
        let cluster = Arc::new(MemoryCluster::new());
        let publisher = publisher_for(&cluster, "x", "a");

        ensure_auth_role(cluster.as_ref(), &publisher, "arn:R")
            .await
            .unwrap();
        ensure_auth_role(cluster.as_ref(), &publisher, "arn:R")
            .await
            .unwrap();

        let entries = cluster.auth_entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].rolearn, "arn:R");
        assert_eq!(
            entries[0].groups,
            vec!["system:bootstrappers".to_string(), "system:nodes".to_string()]
        );

        // only the first call published an update
        let published = cluster.published_events().await;
        assert_eq!(
            published
                .iter()
                .filter(|e| e.reason == "AuthMapUpdated")
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_shared_role_survives_first_delete() {
        let cluster = Arc::new(MemoryCluster::new());
        cluster
            .upsert_instance_group(group_with_role("x", "a", "arn:R"))
            .await;
        cluster
            .upsert_instance_group(group_with_role("y", "b", "arn:R"))
            .await;

        let publisher_a = publisher_for(&cluster, "x", "a");
        ensure_auth_role(cluster.as_ref(), &publisher_a, "arn:R")
            .await
            .unwrap();

        // delete of `a`: `b` still references arn:R
        cluster.remove_instance_group("x", "a").await;
        remove_auth_role(cluster.as_ref(), &publisher_a, "arn:R")
            .await
            .unwrap();
        assert_eq!(cluster.auth_entries().await.len(), 1);

        // delete of `b`: nobody references arn:R anymore
        cluster.remove_instance_group("y", "b").await;
        let publisher_b = publisher_for(&cluster, "y", "b");
        remove_auth_role(cluster.as_ref(), &publisher_b, "arn:R")
            .await
            .unwrap();
        assert!(cluster.auth_entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_deleting_resource_does_not_count_itself() {
        let cluster = Arc::new(MemoryCluster::new());
        // the deleting resource is still listed (deletion timestamp set
        // server-side, object not yet gone)
        cluster
            .upsert_instance_group(group_with_role("x", "a", "arn:R"))
            .await;

        let publisher = publisher_for(&cluster, "x", "a");
        ensure_auth_role(cluster.as_ref(), &publisher, "arn:R")
            .await
            .unwrap();

        remove_auth_role(cluster.as_ref(), &publisher, "arn:R")
            .await
            .unwrap();
        assert!(cluster.auth_entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_conflicting_write_is_retried() {
        let cluster = Arc::new(MemoryCluster::new());
        let publisher = publisher_for(&cluster, "x", "a");

        // the first put loses the race once
        cluster
            .fail_next(
                "put-auth-map",
                crate::provision_errors::ProvisionError::Conflict {
                    resource: "kube-system/aws-auth".to_string(),
                },
            )
            .await;

        ensure_auth_role(cluster.as_ref(), &publisher, "arn:R")
            .await
            .unwrap();
        assert_eq!(cluster.auth_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_missing_entry_is_a_no_op() {
        let cluster = Arc::new(MemoryCluster::new());
        let publisher = publisher_for(&cluster, "x", "a");
        remove_auth_role(cluster.as_ref(), &publisher, "arn:absent")
            .await
            .unwrap();
        assert!(cluster.published_events().await.is_empty());
    }
}
