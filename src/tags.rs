// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Ownership tagging rules for cloud scaling groups.
//!
//! Ownership is tag-based: a scaling group belongs to this controller iff it
//! carries the cluster ownership tag, and to a specific `InstanceGroup` iff
//! it additionally carries the matching instance-group and namespace tags.
//! This module also computes the added/removed tag sets the update path
//! reconciles; tags the controller did not add are removed when they fall
//! out of the desired set.

use crate::cloud::types::{ScalingGroup, Tag};
use crate::constants::{
    TAG_CLUSTER_NAME, TAG_CLUSTER_OWNERSHIP_PREFIX, TAG_CLUSTER_OWNERSHIP_VALUE,
    TAG_INSTANCE_GROUP, TAG_KUBERNETES_CLUSTER, TAG_NAME, TAG_NAMESPACE,
};
use crate::crd::KeyValuePair;

/// Whether a scaling group is owned by this controller for a cluster.
#[must_use]
pub fn is_owned_by_cluster(group: &ScalingGroup, cluster: &str) -> bool {
    group.tag_value(TAG_CLUSTER_NAME) == Some(cluster)
}

/// Whether a scaling group backs one specific instance group.
#[must_use]
pub fn is_owned_by_resource(
    group: &ScalingGroup,
    cluster: &str,
    namespace: &str,
    name: &str,
) -> bool {
    is_owned_by_cluster(group, cluster)
        && group.tag_value(TAG_INSTANCE_GROUP) == Some(name)
        && group.tag_value(TAG_NAMESPACE) == Some(namespace)
}

/// Partition all scaling groups into the subset owned by a cluster.
#[must_use]
pub fn owned_groups(groups: &[ScalingGroup], cluster: &str) -> Vec<ScalingGroup> {
    groups
        .iter()
        .filter(|g| is_owned_by_cluster(g, cluster))
        .cloned()
        .collect()
}

/// The full tag set a scaling group should carry.
///
/// Ownership tags first, then the per-cluster ownership marker applied at
/// bootstrap, then user tags. User tags cannot shadow ownership keys.
#[must_use]
pub fn desired_group_tags(
    prefix: &str,
    cluster: &str,
    namespace: &str,
    name: &str,
    user_tags: &[KeyValuePair],
) -> Vec<Tag> {
    let mut tags = vec![
        Tag::new(TAG_NAME, prefix),
        Tag::new(TAG_KUBERNETES_CLUSTER, cluster),
        Tag::new(TAG_CLUSTER_NAME, cluster),
        Tag::new(TAG_INSTANCE_GROUP, name),
        Tag::new(TAG_NAMESPACE, namespace),
        Tag::new(
            format!("{TAG_CLUSTER_OWNERSHIP_PREFIX}{cluster}"),
            TAG_CLUSTER_OWNERSHIP_VALUE,
        ),
    ];

    for user_tag in user_tags {
        if !tags.iter().any(|t| t.key == user_tag.key) {
            tags.push(Tag::new(&user_tag.key, &user_tag.value));
        }
    }

    tags
}

/// Compute the tag sets to add and to remove on an existing group.
///
/// # Returns
///
/// `(added, removed)` where `added` holds desired tags missing or carrying a
/// different value, and `removed` holds current tags with no desired
/// counterpart.
#[must_use]
pub fn tag_diff(current: &[Tag], desired: &[Tag]) -> (Vec<Tag>, Vec<Tag>) {
    let added = desired
        .iter()
        .filter(|d| !current.contains(d))
        .cloned()
        .collect();

    let removed = current
        .iter()
        .filter(|c| !desired.iter().any(|d| d.key == c.key))
        .cloned()
        .collect();

    (added, removed)
}
