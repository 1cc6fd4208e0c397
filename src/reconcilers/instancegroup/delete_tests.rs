// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for cloud-state teardown.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::teardown;
    use crate::cloud::memory::MemoryCloud;
    use crate::cloud::types::{EksClusterInfo, InstanceTypeInfo};
    use crate::cloud::CloudProvider;
    use crate::cluster::memory::MemoryCluster;
    use crate::cluster::{EventPublisher, ResourceIdentity};
    use crate::context::{Context, OperatorConfig};
    use crate::crd::{
        EksConfiguration, EksSpec, InstanceGroup, InstanceGroupSpec, ScalingConfigurationKind,
        UpgradeStrategy,
    };
    use crate::reconcilers::instancegroup::create::provision;
    use crate::reconcilers::instancegroup::discovery::cloud_discovery;

    fn group_fixture(role_name: Option<&str>) -> InstanceGroup {
        let mut group = InstanceGroup::new(
            "ig1",
            InstanceGroupSpec {
                provisioner: "eks".to_string(),
                strategy: UpgradeStrategy::default(),
                eks: Some(EksSpec {
                    min_size: 1,
                    max_size: 2,
                    r#type: ScalingConfigurationKind::LaunchConfiguration,
                    configuration: EksConfiguration {
                        cluster_name: "c".to_string(),
                        image: "ami-0001".to_string(),
                        instance_type: "m5.large".to_string(),
                        role_name: role_name.map(str::to_string),
                        instance_profile_name: role_name.map(str::to_string),
                        ..EksConfiguration::default()
                    },
                }),
            },
        );
        group.metadata.namespace = Some("default".to_string());
        group
    }

    async fn fixture() -> (Arc<MemoryCloud>, Arc<MemoryCluster>, Arc<Context>) {
        let cloud = Arc::new(MemoryCloud::new());
        cloud
            .seed_cluster(EksClusterInfo {
                name: "c".to_string(),
                vpc_id: "vpc-1".to_string(),
                kubernetes_version: "1.29".to_string(),
                endpoint: "https://example".to_string(),
                certificate_authority: "Y2E=".to_string(),
            })
            .await;
        cloud.seed_offerings(vec!["m5.large".to_string()]).await;
        cloud
            .seed_instance_types(vec![InstanceTypeInfo {
                instance_type: "m5.large".to_string(),
                architectures: vec!["x86_64".to_string()],
                vcpus: 2,
                memory_mib: 8192,
            }])
            .await;
        let cluster = Arc::new(MemoryCluster::new());
        let ctx = Arc::new(Context::new(
            cloud.clone(),
            cluster.clone(),
            OperatorConfig::default(),
        ));
        (cloud, cluster, ctx)
    }

    fn publisher(cluster: &Arc<MemoryCluster>, group: &InstanceGroup) -> EventPublisher {
        EventPublisher::new(cluster.clone(), ResourceIdentity::from_group(group))
    }

    #[tokio::test]
    async fn test_teardown_removes_group_configs_and_role() {
        let (cloud, cluster, ctx) = fixture().await;
        let group = group_fixture(None);

        let mut state = cloud_discovery(&group, &ctx, publisher(&cluster, &group))
            .await
            .unwrap();
        provision(&group, &mut state, &ctx).await.unwrap();

        let mut state = cloud_discovery(&group, &ctx, publisher(&cluster, &group))
            .await
            .unwrap();
        teardown(&group, &mut state, &ctx).await.unwrap();

        assert!(cloud.group("c-default-ig1").await.is_none());
        assert!(cloud.launch_configuration_names().await.is_empty());
        assert!(cloud.get_role("c-default-ig1").await.unwrap().is_none());
        assert!(cloud
            .get_instance_profile("c-default-ig1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_provided_role_is_left_in_place() {
        let (cloud, cluster, ctx) = fixture().await;
        cloud.create_role("ops-node-role", "{}").await.unwrap();
        cloud.create_instance_profile("ops-node-role").await.unwrap();

        let group = group_fixture(Some("ops-node-role"));
        let mut state = cloud_discovery(&group, &ctx, publisher(&cluster, &group))
            .await
            .unwrap();
        provision(&group, &mut state, &ctx).await.unwrap();

        let mut state = cloud_discovery(&group, &ctx, publisher(&cluster, &group))
            .await
            .unwrap();
        teardown(&group, &mut state, &ctx).await.unwrap();

        assert!(cloud.group("c-default-ig1").await.is_none());
        assert!(cloud.get_role("ops-node-role").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_teardown_removes_auth_map_entry_when_last_user() {
        let (cloud, cluster, ctx) = fixture().await;
        let group = group_fixture(None);

        let mut state = cloud_discovery(&group, &ctx, publisher(&cluster, &group))
            .await
            .unwrap();
        provision(&group, &mut state, &ctx).await.unwrap();
        // provisioning registered the role
        assert_eq!(cluster.auth_entries().await.len(), 1);

        let mut state = cloud_discovery(&group, &ctx, publisher(&cluster, &group))
            .await
            .unwrap();
        teardown(&group, &mut state, &ctx).await.unwrap();
        assert!(cluster.auth_entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_auth_removal_runs_even_when_cloud_teardown_fails() {
        let (cloud, cluster, ctx) = fixture().await;
        let group = group_fixture(None);

        let mut state = cloud_discovery(&group, &ctx, publisher(&cluster, &group))
            .await
            .unwrap();
        provision(&group, &mut state, &ctx).await.unwrap();
        assert_eq!(cluster.auth_entries().await.len(), 1);

        cloud
            .fail_next(
                "delete-scaling-group",
                crate::provision_errors::ProvisionError::cloud(
                    "delete-scaling-group",
                    "dependency violation",
                ),
            )
            .await;

        let mut state = cloud_discovery(&group, &ctx, publisher(&cluster, &group))
            .await
            .unwrap();
        let result = teardown(&group, &mut state, &ctx).await;
        assert!(result.is_err());
        // the deferred auth-map removal still fired
        assert!(cluster.auth_entries().await.is_empty());
    }
}
