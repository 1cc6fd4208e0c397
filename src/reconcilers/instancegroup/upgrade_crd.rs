// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CRD-delegated upgrade strategy.
//!
//! Instead of rotating instances itself, the controller submits a
//! user-provided custom resource (an external upgrade engine consumes it)
//! and polls a dotted status path until it reads the configured success or
//! failure string. The submitted resource is named after the instance
//! group and the active configuration, so every new configuration produces
//! a fresh upgrade resource.

#[allow(clippy::wildcard_imports)]
use super::types::*;
use super::discovery::DiscoveredState;
use crate::crd::CrdUpgradeStrategy;
use kube::ResourceExt;

/// Walk a dotted path (optionally wrapped in `{...}`) through a JSON value.
#[must_use]
pub fn lookup_status_path<'a>(
    value: &'a serde_json::Value,
    path: &str,
) -> Option<&'a serde_json::Value> {
    let trimmed = path
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .trim_start_matches('.');

    let mut cursor = value;
    for segment in trimmed.split('.') {
        if segment.is_empty() {
            continue;
        }
        cursor = cursor.get(segment)?;
    }
    Some(cursor)
}

/// The deterministic name of the upgrade resource for the active
/// configuration.
#[must_use]
pub fn upgrade_resource_name(group_name: &str, state: &DiscoveredState) -> String {
    let config = state
        .configuration
        .name()
        .unwrap_or("unknown")
        .to_lowercase();
    let version = state
        .configuration
        .latest_version()
        .map_or_else(String::new, |v| format!("-{v}"));
    format!("{group_name}-{config}{version}")
}

/// Submit the upgrade resource and poll its status.
///
/// # Returns
///
/// `true` once the status path carries the success string, `false` while
/// the upgrade is still running (or was just submitted).
///
/// # Errors
///
/// Fails when the manifest cannot be parsed, the resource cannot be
/// applied, or the status path carries the failure string.
pub async fn submit_and_poll(
    group: &InstanceGroup,
    state: &DiscoveredState,
    ctx: &Context,
    strategy: &CrdUpgradeStrategy,
) -> ProvisionResult<bool> {
    let namespace = group.namespace().unwrap_or_default();
    let name = upgrade_resource_name(&group.name_any(), state);

    let mut manifest: serde_json::Value = serde_yaml::from_str(&strategy.spec)
        .map_err(|e| {
            ProvisionError::validation(
                "spec.strategy.crd.spec",
                format!("manifest does not parse: {e}"),
            )
        })?;
    if !manifest.is_object() {
        return Err(ProvisionError::validation(
            "spec.strategy.crd.spec",
            "manifest must be a single object",
        ));
    }

    let api_version = manifest
        .get("apiVersion")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let kind = manifest
        .get("kind")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    manifest["metadata"] = serde_json::json!({
        "name": name,
        "namespace": namespace,
    });

    let existing = ctx
        .cluster
        .get_upgrade_resource(&namespace, &api_version, &kind, &name)
        .await?;

    let Some(existing) = existing else {
        info!(resource = %name, kind = %kind, "Submitting upgrade resource");
        ctx.cluster
            .apply_upgrade_resource(&namespace, &manifest)
            .await?;
        return Ok(false);
    };

    let observed = lookup_status_path(&existing, &strategy.status_json_path)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    if observed == strategy.success_string {
        info!(resource = %name, "Upgrade resource reported success");
        return Ok(true);
    }
    if observed == strategy.failure_string {
        return Err(ProvisionError::cluster(
            "crd-upgrade",
            format!("upgrade resource '{name}' reported '{observed}'"),
        ));
    }

    debug!(resource = %name, observed = %observed, "Upgrade still in progress");
    Ok(false)
}

#[cfg(test)]
#[path = "upgrade_crd_tests.rs"]
mod upgrade_crd_tests;
