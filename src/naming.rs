// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Deterministic naming for cloud-side resources.
//!
//! Every cloud object owned by an `InstanceGroup` derives its name from the
//! `<cluster>-<namespace>-<name>` triple. IAM limits role and instance
//! profile names to 63 characters, so longer names are truncated and made
//! unique again with a short content hash.

use sha2::{Digest, Sha256};

use crate::constants::IAM_MAX_NAME_LEN;

/// Number of hash characters appended to a truncated name.
const HASH_SUFFIX_LEN: usize = 16;

/// Derive the shared resource prefix for an instance group.
///
/// The prefix names the IAM role, the instance profile and the scaling
/// group, and prefixes every launch configuration. Names longer than the
/// IAM limit are truncated and suffixed with a hash of the full triple so
/// that distinct long names stay distinct.
///
/// # Arguments
///
/// * `cluster` - EKS cluster name
/// * `namespace` - resource namespace
/// * `name` - resource name
#[must_use]
pub fn resource_prefix(cluster: &str, namespace: &str, name: &str) -> String {
    let full = format!("{cluster}-{namespace}-{name}");
    if full.len() <= IAM_MAX_NAME_LEN {
        return full;
    }

    let digest = Sha256::digest(full.as_bytes());
    let mut hash = String::with_capacity(HASH_SUFFIX_LEN);
    for byte in digest.iter().take(HASH_SUFFIX_LEN / 2) {
        hash.push_str(&format!("{byte:02x}"));
    }

    let keep = IAM_MAX_NAME_LEN - HASH_SUFFIX_LEN - 1;
    format!("{}-{hash}", &full[..keep])
}

/// The IAM role name for an instance group, honoring an explicit override.
#[must_use]
pub fn role_name(
    cluster: &str,
    namespace: &str,
    name: &str,
    existing: Option<&str>,
) -> (String, bool) {
    match existing {
        Some(role) if !role.is_empty() => (role.to_string(), true),
        _ => (resource_prefix(cluster, namespace, name), false),
    }
}

/// The instance profile name for an instance group, honoring an override.
#[must_use]
pub fn instance_profile_name(
    cluster: &str,
    namespace: &str,
    name: &str,
    existing: Option<&str>,
) -> (String, bool) {
    match existing {
        Some(profile) if !profile.is_empty() => (profile.to_string(), true),
        _ => (resource_prefix(cluster, namespace, name), false),
    }
}

/// Expand a managed policy reference to a full ARN.
///
/// Short names are resolved against the AWS-managed policy namespace; full
/// ARNs pass through unchanged.
#[must_use]
pub fn managed_policy_arn(reference: &str) -> String {
    if reference.starts_with("arn:") {
        reference.to_string()
    } else {
        format!("{}{reference}", crate::constants::MANAGED_POLICY_ARN_PREFIX)
    }
}
