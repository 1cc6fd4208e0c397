// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `tags.rs`

use crate::cloud::types::{ScalingGroup, Tag};
use crate::crd::KeyValuePair;
use crate::tags::{
    desired_group_tags, is_owned_by_cluster, is_owned_by_resource, owned_groups, tag_diff,
};

fn group_with_tags(name: &str, tags: Vec<Tag>) -> ScalingGroup {
    ScalingGroup {
        name: name.to_string(),
        tags,
        ..ScalingGroup::default()
    }
}

fn owned(name: &str, cluster: &str, namespace: &str, ig: &str) -> ScalingGroup {
    group_with_tags(
        name,
        vec![
            Tag::new("instancegroups.keikoproj.io/ClusterName", cluster),
            Tag::new("instancegroups.keikoproj.io/InstanceGroup", ig),
            Tag::new("instancegroups.keikoproj.io/Namespace", namespace),
        ],
    )
}

#[test]
fn test_cluster_ownership_requires_cluster_tag() {
    let group = owned("g1", "c", "default", "ig1");
    assert!(is_owned_by_cluster(&group, "c"));
    assert!(!is_owned_by_cluster(&group, "other"));

    let untagged = group_with_tags("g2", vec![Tag::new("Name", "g2")]);
    assert!(!is_owned_by_cluster(&untagged, "c"));
}

#[test]
fn test_resource_ownership_requires_all_three_tags() {
    let group = owned("g1", "c", "default", "ig1");
    assert!(is_owned_by_resource(&group, "c", "default", "ig1"));
    assert!(!is_owned_by_resource(&group, "c", "default", "other"));
    assert!(!is_owned_by_resource(&group, "c", "kube-system", "ig1"));

    let partial = group_with_tags(
        "g3",
        vec![Tag::new("instancegroups.keikoproj.io/ClusterName", "c")],
    );
    assert!(!is_owned_by_resource(&partial, "c", "default", "ig1"));
}

#[test]
fn test_owned_groups_partition() {
    let groups = vec![
        owned("g1", "c", "default", "ig1"),
        owned("g2", "other", "default", "ig1"),
        group_with_tags("g3", vec![]),
    ];
    let mine = owned_groups(&groups, "c");
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].name, "g1");
}

#[test]
fn test_desired_tags_carry_ownership_and_user_tags() {
    let user = vec![KeyValuePair {
        key: "team".to_string(),
        value: "payments".to_string(),
    }];
    let tags = desired_group_tags("c-default-ig1", "c", "default", "ig1", &user);

    let value_of = |key: &str| {
        tags.iter()
            .find(|t| t.key == key)
            .map(|t| t.value.clone())
    };
    assert_eq!(value_of("Name").as_deref(), Some("c-default-ig1"));
    assert_eq!(value_of("KubernetesCluster").as_deref(), Some("c"));
    assert_eq!(
        value_of("instancegroups.keikoproj.io/ClusterName").as_deref(),
        Some("c")
    );
    assert_eq!(
        value_of("instancegroups.keikoproj.io/InstanceGroup").as_deref(),
        Some("ig1")
    );
    assert_eq!(
        value_of("instancegroups.keikoproj.io/Namespace").as_deref(),
        Some("default")
    );
    assert_eq!(value_of("kubernetes.io/cluster/c").as_deref(), Some("owned"));
    assert_eq!(value_of("team").as_deref(), Some("payments"));
}

#[test]
fn test_user_tags_cannot_shadow_ownership_keys() {
    let user = vec![KeyValuePair {
        key: "instancegroups.keikoproj.io/ClusterName".to_string(),
        value: "spoofed".to_string(),
    }];
    let tags = desired_group_tags("p", "c", "ns", "ig", &user);
    let cluster_tags: Vec<_> = tags
        .iter()
        .filter(|t| t.key == "instancegroups.keikoproj.io/ClusterName")
        .collect();
    assert_eq!(cluster_tags.len(), 1);
    assert_eq!(cluster_tags[0].value, "c");
}

#[test]
fn test_tag_diff_computes_added_and_removed() {
    let current = vec![Tag::new("keep", "1"), Tag::new("stale", "x"), Tag::new("drift", "old")];
    let desired = vec![Tag::new("keep", "1"), Tag::new("drift", "new"), Tag::new("fresh", "2")];

    let (added, removed) = tag_diff(&current, &desired);

    assert!(added.contains(&Tag::new("drift", "new")));
    assert!(added.contains(&Tag::new("fresh", "2")));
    assert_eq!(added.len(), 2);

    assert_eq!(removed, vec![Tag::new("stale", "x")]);
}
