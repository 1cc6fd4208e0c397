// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reference-counted node-role entries in the shared auth map.
//!
//! The cluster keeps a single shared authentication map (role ARN to
//! cluster identity) consumed at node registration. Multiple instance
//! groups may share one role ARN, so:
//!
//! - bootstrap adds the entry if any group needs it;
//! - deletion removes the entry only when no other group's status still
//!   references the same ARN.
//!
//! All writes are optimistic: the snapshot's version token rides along and
//! a lost race is retried against freshly read state.

use tracing::{debug, info};

use crate::cluster::{AuthMapEntry, ClusterProvider, EventPublisher};
use crate::constants::{
    AUTH_MAP_NODE_GROUPS, AUTH_MAP_NODE_USERNAME, REASON_AUTH_MAP_UPDATED,
};
use crate::provision_errors::ProvisionResult;
use crate::retry::retry_on_conflict;

/// Build the map entry registered for a node role.
#[must_use]
pub fn node_role_entry(role_arn: &str) -> AuthMapEntry {
    AuthMapEntry {
        rolearn: role_arn.to_string(),
        username: AUTH_MAP_NODE_USERNAME.to_string(),
        groups: AUTH_MAP_NODE_GROUPS.iter().map(|g| (*g).to_string()).collect(),
    }
}

/// Ensure the node role is present in the shared auth map.
///
/// Idempotent: an existing entry leaves the map untouched and publishes
/// nothing.
///
/// # Errors
///
/// Returns a cluster error when the map cannot be read or written after
/// conflict retries are exhausted.
pub async fn ensure_auth_role(
    cluster: &dyn ClusterProvider,
    publisher: &EventPublisher,
    role_arn: &str,
) -> ProvisionResult<()> {
    let added = retry_on_conflict(
        || async {
            let mut snapshot = cluster.get_auth_map().await?;
            if snapshot.contains_role(role_arn) {
                return Ok(false);
            }
            snapshot.entries.push(node_role_entry(role_arn));
            cluster.put_auth_map(&snapshot).await?;
            Ok(true)
        },
        "add node role to auth map",
    )
    .await?;

    if added {
        info!(role_arn = role_arn, "Node role added to auth map");
        publisher
            .normal(
                REASON_AUTH_MAP_UPDATED,
                &format!("added node role {role_arn} to auth map"),
            )
            .await;
    }
    Ok(())
}

/// Remove the node role from the shared auth map, when unreferenced.
///
/// The entry stays as long as any other `InstanceGroup` (across all
/// namespaces) still reports the same role ARN in its status. The deleting
/// resource itself is excluded from the reference count by identity.
///
/// # Errors
///
/// Returns a cluster error when sibling resources cannot be listed or the
/// map cannot be written after conflict retries are exhausted.
pub async fn remove_auth_role(
    cluster: &dyn ClusterProvider,
    publisher: &EventPublisher,
    role_arn: &str,
) -> ProvisionResult<()> {
    let identity = publisher.identity();

    let siblings = cluster.list_instance_groups().await?;
    let still_referenced = siblings.iter().any(|sibling| {
        let same_resource = sibling.metadata.name.as_deref() == Some(identity.name.as_str())
            && sibling.metadata.namespace.as_deref() == Some(identity.namespace.as_str());
        if same_resource {
            return false;
        }
        sibling
            .status
            .as_ref()
            .and_then(|s| s.node_role_arn.as_deref())
            == Some(role_arn)
    });

    if still_referenced {
        debug!(
            role_arn = role_arn,
            "Node role still referenced by sibling instance groups, keeping auth map entry"
        );
        return Ok(());
    }

    let removed = retry_on_conflict(
        || async {
            let mut snapshot = cluster.get_auth_map().await?;
            let before = snapshot.entries.len();
            snapshot.entries.retain(|e| e.rolearn != role_arn);
            if snapshot.entries.len() == before {
                return Ok(false);
            }
            cluster.put_auth_map(&snapshot).await?;
            Ok(true)
        },
        "remove node role from auth map",
    )
    .await?;

    if removed {
        info!(role_arn = role_arn, "Node role removed from auth map");
        publisher
            .normal(
                REASON_AUTH_MAP_UPDATED,
                &format!("removed node role {role_arn} from auth map"),
            )
            .await;
    }
    Ok(())
}

#[cfg(test)]
#[path = "authmap_tests.rs"]
mod authmap_tests;
