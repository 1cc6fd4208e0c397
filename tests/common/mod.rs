// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared fixtures for the integration suites.
//!
//! Every suite runs full reconcile passes against the in-memory cloud and
//! cluster providers: no network, no Kubernetes, real engine code paths.

use std::sync::Arc;

use instancemgr::cloud::memory::MemoryCloud;
use instancemgr::cloud::types::{EksClusterInfo, InstanceTypeInfo};
use instancemgr::cluster::memory::MemoryCluster;
use instancemgr::context::{Context, OperatorConfig};
use instancemgr::crd::{
    EksConfiguration, EksSpec, InstanceGroup, InstanceGroupSpec, RollingUpdateStrategy,
    ScalingConfigurationKind, UpgradeStrategy, UpgradeStrategyType,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

/// The cluster name every fixture uses.
pub const CLUSTER: &str = "c";

/// An `InstanceGroup` named `ig1` in `default`, sized [1, 3].
#[must_use]
pub fn instance_group(image: &str) -> InstanceGroup {
    named_instance_group("default", "ig1", image)
}

/// An `InstanceGroup` with explicit identity.
#[must_use]
pub fn named_instance_group(namespace: &str, name: &str, image: &str) -> InstanceGroup {
    let mut group = InstanceGroup::new(
        name,
        InstanceGroupSpec {
            provisioner: "eks".to_string(),
            strategy: UpgradeStrategy {
                r#type: UpgradeStrategyType::RollingUpdate,
                crd: None,
                rolling_update: Some(RollingUpdateStrategy {
                    max_unavailable: Some(IntOrString::Int(1)),
                }),
            },
            eks: Some(EksSpec {
                min_size: 1,
                max_size: 3,
                r#type: ScalingConfigurationKind::LaunchConfiguration,
                configuration: EksConfiguration {
                    cluster_name: CLUSTER.to_string(),
                    image: image.to_string(),
                    instance_type: "m5.large".to_string(),
                    key_pair_name: Some("ops".to_string()),
                    node_security_groups: vec!["sg-a".to_string()],
                    subnets: vec!["subnet-1".to_string(), "subnet-2".to_string()],
                    ..EksConfiguration::default()
                },
            }),
        },
    );
    group.metadata.namespace = Some(namespace.to_string());
    group.metadata.uid = Some(format!("uid-{namespace}-{name}"));
    group.metadata.generation = Some(1);
    group
}

/// A seeded in-memory cloud, cluster and engine context.
pub async fn environment() -> (Arc<MemoryCloud>, Arc<MemoryCluster>, Arc<Context>) {
    let cloud = Arc::new(MemoryCloud::new());
    cloud
        .seed_cluster(EksClusterInfo {
            name: CLUSTER.to_string(),
            vpc_id: "vpc-1".to_string(),
            kubernetes_version: "1.29".to_string(),
            endpoint: "https://example.eks".to_string(),
            certificate_authority: "Y2E=".to_string(),
        })
        .await;
    cloud
        .seed_offerings(vec!["m5.large".to_string(), "m5a.large".to_string()])
        .await;
    cloud
        .seed_instance_types(vec![
            InstanceTypeInfo {
                instance_type: "m5.large".to_string(),
                architectures: vec!["x86_64".to_string()],
                vcpus: 2,
                memory_mib: 8192,
            },
            InstanceTypeInfo {
                instance_type: "m5a.large".to_string(),
                architectures: vec!["x86_64".to_string()],
                vcpus: 2,
                memory_mib: 8192,
            },
        ])
        .await;

    let cluster = Arc::new(MemoryCluster::new());
    let ctx = Arc::new(Context::new(
        cloud.clone(),
        cluster.clone(),
        OperatorConfig::default(),
    ));
    (cloud, cluster, ctx)
}

/// Register ready nodes for every instance of a scaling group.
pub async fn join_ready_nodes(cloud: &MemoryCloud, cluster: &MemoryCluster, group_name: &str) {
    cluster.clear_nodes().await;
    let Some(group) = cloud.group(group_name).await else {
        return;
    };
    for (n, instance) in group.instances.iter().enumerate() {
        cluster
            .seed_node(&format!("{group_name}-node-{n}"), &instance.instance_id, true)
            .await;
    }
}
