// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `naming.rs`

use crate::constants::IAM_MAX_NAME_LEN;
use crate::naming::{instance_profile_name, managed_policy_arn, resource_prefix, role_name};

#[test]
fn test_short_names_pass_through() {
    assert_eq!(resource_prefix("c", "default", "ig1"), "c-default-ig1");
}

#[test]
fn test_long_names_truncate_to_limit() {
    let cluster = "a".repeat(40);
    let namespace = "b".repeat(30);
    let derived = resource_prefix(&cluster, &namespace, "worker-pool");
    assert_eq!(derived.len(), IAM_MAX_NAME_LEN);
}

#[test]
fn test_long_names_stay_distinct() {
    let cluster = "a".repeat(60);
    let one = resource_prefix(&cluster, "ns", "group-one-with-a-long-suffix");
    let two = resource_prefix(&cluster, "ns", "group-two-with-a-long-suffix");
    assert_ne!(one, two);
}

#[test]
fn test_truncation_is_deterministic() {
    let cluster = "z".repeat(70);
    assert_eq!(
        resource_prefix(&cluster, "ns", "ig"),
        resource_prefix(&cluster, "ns", "ig")
    );
}

#[test]
fn test_role_name_prefers_existing() {
    let (name, provided) = role_name("c", "ns", "ig", Some("ops-node-role"));
    assert_eq!(name, "ops-node-role");
    assert!(provided);

    let (name, provided) = role_name("c", "ns", "ig", None);
    assert_eq!(name, "c-ns-ig");
    assert!(!provided);

    // An empty override falls back to the derived name
    let (name, provided) = instance_profile_name("c", "ns", "ig", Some(""));
    assert_eq!(name, "c-ns-ig");
    assert!(!provided);
}

#[test]
fn test_managed_policy_expansion() {
    assert_eq!(
        managed_policy_arn("AmazonEKSWorkerNodePolicy"),
        "arn:aws:iam::aws:policy/AmazonEKSWorkerNodePolicy"
    );
    assert_eq!(
        managed_policy_arn("arn:aws:iam::123456789012:policy/custom"),
        "arn:aws:iam::123456789012:policy/custom"
    );
}
