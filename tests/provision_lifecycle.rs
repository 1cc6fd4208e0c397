// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! End-to-end provisioning lifecycle against the in-memory providers.

mod common;

use common::{environment, instance_group, join_ready_nodes};
use instancemgr::cloud::CloudProvider;
use instancemgr::crd::ReconcileState;
use instancemgr::reconcilers::reconcile_instance_group;

#[tokio::test]
async fn test_first_provision_reaches_ready() {
    let (cloud, cluster, ctx) = environment().await;
    let group = instance_group("ami-0001");

    // pass 1: everything gets created, state lands in Modifying
    let state = reconcile_instance_group(&group, &ctx).await.unwrap();
    assert_eq!(state, ReconcileState::ReconcileModifying);

    assert!(cloud.get_role("c-default-ig1").await.unwrap().is_some());
    assert!(cloud
        .get_instance_profile("c-default-ig1")
        .await
        .unwrap()
        .is_some());
    let scaling_group = cloud.group("c-default-ig1").await.unwrap();
    assert_eq!(scaling_group.min_size, 1);
    assert_eq!(scaling_group.max_size, 3);
    assert_eq!(
        scaling_group.tag_value("instancegroups.keikoproj.io/ClusterName"),
        Some("c")
    );
    assert_eq!(
        scaling_group.tag_value("instancegroups.keikoproj.io/InstanceGroup"),
        Some("ig1")
    );
    assert_eq!(
        scaling_group.tag_value("instancegroups.keikoproj.io/Namespace"),
        Some("default")
    );
    let configs = cloud.launch_configuration_names().await;
    assert_eq!(configs.len(), 1);
    assert!(configs[0].starts_with("c-default-ig1-"));

    // bootstrap registered the node role in the shared auth map
    let entries = cluster.auth_entries().await;
    assert_eq!(entries.len(), 1);
    assert!(entries[0].rolearn.ends_with("role/c-default-ig1"));
    assert_eq!(
        entries[0].groups,
        vec!["system:bootstrappers".to_string(), "system:nodes".to_string()]
    );

    // pass 2: nodes joined and ready -> Ready
    join_ready_nodes(&cloud, &cluster, "c-default-ig1").await;
    let state = reconcile_instance_group(&group, &ctx).await.unwrap();
    assert_eq!(state, ReconcileState::Ready);

    // the steady-state pass re-asserts the entry without duplicating it
    assert_eq!(cluster.auth_entries().await.len(), 1);

    // events were published along the way
    let events = cluster.published_events().await;
    assert!(events.iter().any(|e| e.reason == "ReconcileStarted"));
    assert!(events.iter().any(|e| e.reason == "ReconcileCompleted"));
    assert!(events.iter().any(|e| e.reason == "AuthMapUpdated"));
}

#[tokio::test]
async fn test_create_path_is_idempotent() {
    let (cloud, cluster, ctx) = environment().await;
    let group = instance_group("ami-0001");

    reconcile_instance_group(&group, &ctx).await.unwrap();
    join_ready_nodes(&cloud, &cluster, "c-default-ig1").await;
    reconcile_instance_group(&group, &ctx).await.unwrap();
    reconcile_instance_group(&group, &ctx).await.unwrap();

    // one configuration, one scaling group, regardless of pass count
    assert_eq!(cloud.launch_configuration_names().await.len(), 1);
    assert_eq!(cloud.call_count("create-scaling-group").await, 1);
    assert_eq!(cloud.call_count("create-launch-configuration").await, 1);
}

#[tokio::test]
async fn test_validation_failure_parks_at_error() {
    let (_cloud, cluster, ctx) = environment().await;
    let mut group = instance_group("ami-0001");
    group.spec.eks.as_mut().unwrap().min_size = 5;
    group.spec.eks.as_mut().unwrap().max_size = 2;
    cluster.upsert_instance_group(group.clone()).await;

    let err = reconcile_instance_group(&group, &ctx).await.unwrap_err();
    assert_eq!(err.status_reason(), "ValidationError");

    // the failure is lifted into status
    let stored = cluster.instance_group("default", "ig1").await.unwrap();
    let status = stored.status.unwrap();
    assert_eq!(status.state, Some(ReconcileState::Err));
    assert!(status
        .conditions
        .iter()
        .any(|c| c.r#type == "ReconcileFailed" && c.reason.as_deref() == Some("ValidationError")));
}

#[tokio::test]
async fn test_status_reports_fleet_shape() {
    let (cloud, cluster, ctx) = environment().await;
    let group = instance_group("ami-0001");
    cluster.upsert_instance_group(group.clone()).await;

    reconcile_instance_group(&group, &ctx).await.unwrap();
    join_ready_nodes(&cloud, &cluster, "c-default-ig1").await;
    reconcile_instance_group(&group, &ctx).await.unwrap();

    let stored = cluster.instance_group("default", "ig1").await.unwrap();
    let status = stored.status.unwrap();
    assert_eq!(
        status.active_scaling_group_name.as_deref(),
        Some("c-default-ig1")
    );
    assert!(status
        .active_scaling_config_name
        .as_deref()
        .unwrap()
        .starts_with("c-default-ig1-"));
    assert_eq!(status.current_min, Some(1));
    assert_eq!(status.current_max, Some(3));
    assert_eq!(status.lifecycle.as_deref(), Some("normal"));
    assert_eq!(status.state, Some(ReconcileState::Ready));
    assert!(status.node_role_arn.as_deref().unwrap().contains("c-default-ig1"));
    assert!(status
        .conditions
        .iter()
        .any(|c| c.r#type == "NodesReady" && c.status == "True"));
}
