// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `crd.rs`

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::crd::{
    EksConfiguration, EksSpec, InstanceGroup, InstanceGroupSpec, MixedInstancesPolicy,
    ReconcileState, RollingUpdateStrategy, ScalingConfigurationKind, UpgradeStrategy,
    UpgradeStrategyType,
};

fn valid_group() -> InstanceGroup {
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

#[test]
fn test_valid_group_passes_validation() {
    assert!(valid_group().validate().is_ok());
}

#[test]
fn test_unsupported_provisioner_fails() {
    let mut group = valid_group();
    group.spec.provisioner = "gcp".to_string();
    let err = group.validate().unwrap_err();
    assert_eq!(err.status_reason(), "ValidationError");
}

#[test]
fn test_max_below_min_fails() {
    let mut group = valid_group();
    group.spec.eks.as_mut().unwrap().min_size = 5;
    group.spec.eks.as_mut().unwrap().max_size = 2;
    assert!(group.validate().is_err());
}

#[test]
fn test_missing_eks_block_fails() {
    let mut group = valid_group();
    group.spec.eks = None;
    assert!(group.validate().is_err());
    assert!(group.eks().is_err());
}

#[test]
fn test_empty_image_fails() {
    let mut group = valid_group();
    group.spec.eks.as_mut().unwrap().configuration.image = String::new();
    assert!(group.validate().is_err());
}

#[test]
fn test_crd_strategy_requires_crd_block() {
    let mut group = valid_group();
    group.spec.strategy.r#type = UpgradeStrategyType::Crd;
    assert!(group.validate().is_err());
}

#[test]
fn test_spot_ratio_bounds() {
    let mut group = valid_group();
    group
        .spec
        .eks
        .as_mut()
        .unwrap()
        .configuration
        .mixed_instances_policy = Some(MixedInstancesPolicy {
        instance_pool: Some("subFamilyFlexible".to_string()),
        spot_ratio: Some(IntOrString::Int(120)),
    });
    assert!(group.validate().is_err());

    group
        .spec
        .eks
        .as_mut()
        .unwrap()
        .configuration
        .mixed_instances_policy = Some(MixedInstancesPolicy {
        instance_pool: Some("subFamilyFlexible".to_string()),
        spot_ratio: Some(IntOrString::String("40%".to_string())),
    });
    assert!(group.validate().is_ok());
}

#[test]
fn test_max_unavailable_accessor() {
    let mut group = valid_group();
    assert!(group.max_unavailable().is_none());

    group.spec.strategy.rolling_update = Some(RollingUpdateStrategy {
        max_unavailable: Some(IntOrString::String("25%".to_string())),
    });
    assert_eq!(
        group.max_unavailable(),
        Some(&IntOrString::String("25%".to_string()))
    );
}

#[test]
fn test_reconcile_state_retryability() {
    for state in [
        ReconcileState::Init,
        ReconcileState::InitCreate,
        ReconcileState::InitUpdate,
        ReconcileState::InitUpgrade,
        ReconcileState::InitDelete,
        ReconcileState::ReconcileModifying,
        ReconcileState::ReconcileModified,
        ReconcileState::Deleting,
    ] {
        assert!(state.is_retryable(), "{state} should be retryable");
    }
    for state in [
        ReconcileState::Err,
        ReconcileState::Ready,
        ReconcileState::Deleted,
    ] {
        assert!(!state.is_retryable(), "{state} should not be retryable");
    }
}

#[test]
fn test_reconcile_state_serializes_as_error() {
    let serialized = serde_json::to_string(&ReconcileState::Err).unwrap();
    assert_eq!(serialized, "\"Error\"");
    assert_eq!(ReconcileState::Err.to_string(), "Error");
}

#[test]
fn test_spec_uses_camel_case_wire_names() {
    let group = valid_group();
    let value = serde_json::to_value(&group.spec).unwrap();
    let eks = &value["eks"];
    assert!(eks["minSize"].is_i64());
    assert!(eks["maxSize"].is_i64());
    assert_eq!(eks["type"], "LaunchConfiguration");
    assert_eq!(eks["configuration"]["clusterName"], "c");
    assert_eq!(eks["configuration"]["instanceType"], "m5.large");
}

#[test]
fn test_current_state_defaults_to_init() {
    let group = valid_group();
    assert_eq!(group.current_state(), ReconcileState::Init);
    assert!(!group.using_spot_recommendation());
}
