// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for cloud discovery.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::cloud_discovery;
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
    use crate::provision_errors::ProvisionError;
    use crate::reconcilers::instancegroup::create;

    fn group_fixture(image: &str) -> InstanceGroup {
        let mut group = InstanceGroup::new(
            "ig1",
            InstanceGroupSpec {
                provisioner: "eks".to_string(),
                strategy: UpgradeStrategy::default(),
                eks: Some(EksSpec {
                    min_size: 1,
                    max_size: 3,
                    r#type: ScalingConfigurationKind::LaunchConfiguration,
                    configuration: EksConfiguration {
                        cluster_name: "c".to_string(),
                        image: image.to_string(),
                        instance_type: "m5.large".to_string(),
                        node_security_groups: vec!["sg-a".to_string()],
                        subnets: vec!["subnet-1".to_string()],
                        ..EksConfiguration::default()
                    },
                }),
            },
        );
        group.metadata.namespace = Some("default".to_string());
        group.metadata.uid = Some("uid-ig1".to_string());
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

    async fn provision(group: &InstanceGroup, cluster: &Arc<MemoryCluster>, ctx: &Context) {
        let mut state = cloud_discovery(group, ctx, publisher(cluster, group))
            .await
            .unwrap();
        create::provision(group, &mut state, ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_unprovisioned_resource_discovers_empty() {
        let (_cloud, cluster, ctx) = fixture().await;
        let group = group_fixture("ami-0001");

        let state = cloud_discovery(&group, &ctx, publisher(&cluster, &group))
            .await
            .unwrap();

        assert!(!state.provisioned);
        assert!(state.scaling_group.is_none());
        assert!(!state.nodes_ready);
        assert_eq!(state.image_id, "ami-0001");
        assert_eq!(state.prefix, "c-default-ig1");
        assert_eq!(state.status.lifecycle.as_deref(), Some("normal"));
    }

    #[tokio::test]
    async fn test_provisioned_resource_binds_group_and_configuration() {
        let (_cloud, cluster, ctx) = fixture().await;
        let group = group_fixture("ami-0001");
        provision(&group, &cluster, &ctx).await;

        let state = cloud_discovery(&group, &ctx, publisher(&cluster, &group))
            .await
            .unwrap();

        assert!(state.provisioned);
        let scaling_group = state.scaling_group.as_ref().unwrap();
        assert_eq!(scaling_group.name, "c-default-ig1");
        assert!(state.configuration.provisioned());
        assert_eq!(
            state.status.active_scaling_group_name.as_deref(),
            Some("c-default-ig1")
        );
        assert_eq!(state.status.current_min, Some(1));
        assert_eq!(state.status.current_max, Some(3));
        assert!(state
            .status
            .active_scaling_config_name
            .as_deref()
            .unwrap()
            .starts_with("c-default-ig1-"));
        assert!(state.status.node_role_arn.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_scaling_groups_fail_validation() {
        let (cloud, cluster, ctx) = fixture().await;
        let group = group_fixture("ami-0001");
        provision(&group, &cluster, &ctx).await;

        // a second group with the same ownership tags
        let existing = cloud.group("c-default-ig1").await.unwrap();
        cloud
            .create_scaling_group(&crate::cloud::types::CreateScalingGroupInput {
                name: "c-default-ig1-duplicate".to_string(),
                min_size: 1,
                max_size: 1,
                subnets: vec![],
                tags: existing.tags.clone(),
                config_ref: crate::cloud::types::GroupConfigRef::LaunchConfiguration(
                    existing.launch_configuration_name.clone().unwrap(),
                ),
                mixed_instances: None,
            })
            .await
            .unwrap();

        let err = cloud_discovery(&group, &ctx, publisher(&cluster, &group))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_image_reference_resolution() {
        let (cloud, cluster, ctx) = fixture().await;
        cloud.seed_latest_image("1.29", "ami-latest-129").await;
        cloud
            .seed_parameter("/eks/worker/ami", "ami-from-ssm")
            .await;

        let latest = group_fixture("latest");
        let state = cloud_discovery(&latest, &ctx, publisher(&cluster, &latest))
            .await
            .unwrap();
        assert_eq!(state.image_id, "ami-latest-129");

        let ssm = group_fixture("ssm:///eks/worker/ami");
        let state = cloud_discovery(&ssm, &ctx, publisher(&cluster, &ssm))
            .await
            .unwrap();
        assert_eq!(state.image_id, "ami-from-ssm");

        let missing = group_fixture("ssm:///absent/key");
        let err = cloud_discovery(&missing, &ctx, publisher(&cluster, &missing))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_discovery_is_idempotent() {
        let (_cloud, cluster, ctx) = fixture().await;
        let group = group_fixture("ami-0001");
        provision(&group, &cluster, &ctx).await;

        let first = cloud_discovery(&group, &ctx, publisher(&cluster, &group))
            .await
            .unwrap();
        let second = cloud_discovery(&group, &ctx, publisher(&cluster, &group))
            .await
            .unwrap();

        assert_eq!(first.provisioned, second.provisioned);
        assert_eq!(first.image_id, second.image_id);
        assert_eq!(first.nodes_ready, second.nodes_ready);
        assert_eq!(
            first.status.active_scaling_group_name,
            second.status.active_scaling_group_name
        );
        assert_eq!(
            first.status.active_scaling_config_name,
            second.status.active_scaling_config_name
        );
        assert_eq!(
            first.scaling_group.as_ref().map(|g| g.instances.len()),
            second.scaling_group.as_ref().map(|g| g.instances.len())
        );
    }

    #[tokio::test]
    async fn test_reap_failure_degrades_to_warning() {
        let (cloud, cluster, ctx) = fixture().await;
        let group = group_fixture("ami-0001");
        provision(&group, &cluster, &ctx).await;

        // enough superseded configurations to trigger the reaper
        for n in 0..4 {
            cloud
                .create_launch_configuration(&crate::cloud::types::CreateConfigInput {
                    name: format!("c-default-ig1-old{n}"),
                    config: crate::cloud::types::MachineConfig::default(),
                })
                .await
                .unwrap();
        }
        cloud
            .fail_next(
                "delete-launch-configuration",
                ProvisionError::cloud("delete-launch-configuration", "throttled"),
            )
            .await;

        let state = cloud_discovery(&group, &ctx, publisher(&cluster, &group))
            .await
            .unwrap();
        assert!(state.provisioned);

        let warnings = cluster.published_events().await;
        assert!(warnings.iter().any(|e| e.reason == "DiscoveryWarning"));
    }

    #[tokio::test]
    async fn test_nodes_ready_tracks_group_instances() {
        let (cloud, cluster, ctx) = fixture().await;
        let group = group_fixture("ami-0001");
        provision(&group, &cluster, &ctx).await;

        let state = cloud_discovery(&group, &ctx, publisher(&cluster, &group))
            .await
            .unwrap();
        assert!(!state.nodes_ready);

        let instances = cloud.group("c-default-ig1").await.unwrap().instances;
        for (n, instance) in instances.iter().enumerate() {
            cluster
                .seed_node(&format!("node-{n}"), &instance.instance_id, true)
                .await;
        }

        let state = cloud_discovery(&group, &ctx, publisher(&cluster, &group))
            .await
            .unwrap();
        assert!(state.nodes_ready);
        assert!(state
            .status
            .conditions
            .iter()
            .any(|c| c.r#type == "NodesReady" && c.status == "True"));
    }
}
