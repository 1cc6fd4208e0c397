// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the CRD-delegated upgrade strategy.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::{lookup_status_path, submit_and_poll, upgrade_resource_name};
    use crate::cloud::memory::MemoryCloud;
    use crate::cloud::types::{EksClusterInfo, InstanceTypeInfo};
    use crate::cluster::memory::MemoryCluster;
    use crate::cluster::{EventPublisher, ResourceIdentity};
    use crate::context::{Context, OperatorConfig};
    use crate::crd::{
        CrdUpgradeStrategy, EksConfiguration, EksSpec, InstanceGroup, InstanceGroupSpec,
        ScalingConfigurationKind, UpgradeStrategy, UpgradeStrategyType,
    };
    use crate::provision_errors::ProvisionError;
    use crate::reconcilers::instancegroup::create::provision;
    use crate::reconcilers::instancegroup::discovery::cloud_discovery;
    use serde_json::json;

    fn strategy() -> CrdUpgradeStrategy {
        CrdUpgradeStrategy {
            name: "rollingupgrades".to_string(),
            spec: concat!(
                "apiVersion: upgrademgr.keikoproj.io/v1alpha1\n",
                "kind: RollingUpgrade\n",
                "spec:\n",
                "  strategy: randomUpdate\n",
            )
            .to_string(),
            status_json_path: ".status.currentStatus".to_string(),
            success_string: "completed".to_string(),
            failure_string: "error".to_string(),
        }
    }

    fn group_fixture() -> InstanceGroup {
        let mut group = InstanceGroup::new(
            "ig1",
            InstanceGroupSpec {
                provisioner: "eks".to_string(),
                strategy: UpgradeStrategy {
                    r#type: UpgradeStrategyType::Crd,
                    crd: Some(strategy()),
                    rolling_update: None,
                },
                eks: Some(EksSpec {
                    min_size: 1,
                    max_size: 2,
                    r#type: ScalingConfigurationKind::LaunchConfiguration,
                    configuration: EksConfiguration {
                        cluster_name: "c".to_string(),
                        image: "ami-0001".to_string(),
                        instance_type: "m5.large".to_string(),
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

    #[test]
    fn test_status_path_lookup() {
        let value = json!({
            "status": { "currentStatus": "completed", "nested": { "deep": 7 } }
        });

        assert_eq!(
            lookup_status_path(&value, ".status.currentStatus")
                .and_then(|v| v.as_str()),
            Some("completed")
        );
        assert_eq!(
            lookup_status_path(&value, "{.status.currentStatus}")
                .and_then(|v| v.as_str()),
            Some("completed")
        );
        assert_eq!(
            lookup_status_path(&value, "status.nested.deep").and_then(|v| v.as_i64()),
            Some(7)
        );
        assert!(lookup_status_path(&value, ".status.absent").is_none());
    }

    #[tokio::test]
    async fn test_submit_then_poll_to_completion() {
        let (_cloud, cluster, ctx) = fixture().await;
        let group = group_fixture();

        let publisher =
            EventPublisher::new(cluster.clone(), ResourceIdentity::from_group(&group));
        let mut state = cloud_discovery(&group, &ctx, publisher.clone()).await.unwrap();
        provision(&group, &mut state, &ctx).await.unwrap();

        let state = cloud_discovery(&group, &ctx, publisher).await.unwrap();
        let resource_name = upgrade_resource_name("ig1", &state);

        // first pass submits and reports in-progress
        let done = submit_and_poll(&group, &state, &ctx, &strategy())
            .await
            .unwrap();
        assert!(!done);
        let submitted = cluster.upgrade_resource(&resource_name).await.unwrap();
        assert_eq!(submitted["kind"], "RollingUpgrade");
        assert_eq!(submitted["metadata"]["namespace"], "default");

        // still running
        cluster
            .script_upgrade_status(&resource_name, json!({ "currentStatus": "running" }))
            .await;
        let done = submit_and_poll(&group, &state, &ctx, &strategy())
            .await
            .unwrap();
        assert!(!done);

        // completed
        cluster
            .script_upgrade_status(&resource_name, json!({ "currentStatus": "completed" }))
            .await;
        let done = submit_and_poll(&group, &state, &ctx, &strategy())
            .await
            .unwrap();
        assert!(done);
    }

    #[tokio::test]
    async fn test_reported_failure_fails_the_pass() {
        let (_cloud, cluster, ctx) = fixture().await;
        let group = group_fixture();

        let publisher =
            EventPublisher::new(cluster.clone(), ResourceIdentity::from_group(&group));
        let mut state = cloud_discovery(&group, &ctx, publisher.clone()).await.unwrap();
        provision(&group, &mut state, &ctx).await.unwrap();

        let state = cloud_discovery(&group, &ctx, publisher).await.unwrap();
        let resource_name = upgrade_resource_name("ig1", &state);

        submit_and_poll(&group, &state, &ctx, &strategy())
            .await
            .unwrap();
        cluster
            .script_upgrade_status(&resource_name, json!({ "currentStatus": "error" }))
            .await;

        let err = submit_and_poll(&group, &state, &ctx, &strategy())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Cluster { .. }));
    }

    #[tokio::test]
    async fn test_malformed_manifest_is_a_validation_error() {
        let (_cloud, cluster, ctx) = fixture().await;
        let group = group_fixture();

        let publisher =
            EventPublisher::new(cluster.clone(), ResourceIdentity::from_group(&group));
        let state = cloud_discovery(&group, &ctx, publisher).await.unwrap();

        let mut broken = strategy();
        broken.spec = "- just\n- a\n- list\n".to_string();
        let err = submit_and_poll(&group, &state, &ctx, &broken)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Validation { .. }));
    }
}
