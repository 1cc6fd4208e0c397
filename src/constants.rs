// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the instancemgr operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for the InstanceGroup CRD
pub const API_GROUP: &str = "instancemgr.keikoproj.io";

/// API version for the InstanceGroup CRD
pub const API_VERSION: &str = "v1alpha1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "instancemgr.keikoproj.io/v1alpha1";

/// Kind name for the `InstanceGroup` resource
pub const KIND_INSTANCE_GROUP: &str = "InstanceGroup";

/// The only provisioner this controller handles
pub const PROVISIONER_EKS: &str = "eks";

/// Finalizer placed on every managed `InstanceGroup`
pub const FINALIZER_NAME: &str = "finalizers.instancemgr.keikoproj.io/instance-group";

// ============================================================================
// Scaling-group ownership tags
// ============================================================================

/// Name tag applied to every owned scaling group
pub const TAG_NAME: &str = "Name";

/// Legacy cluster tag kept for tooling that still filters on it
pub const TAG_KUBERNETES_CLUSTER: &str = "KubernetesCluster";

/// Ownership tag: the cluster this controller manages
pub const TAG_CLUSTER_NAME: &str = "instancegroups.keikoproj.io/ClusterName";

/// Ownership tag: the `InstanceGroup` name backing the scaling group
pub const TAG_INSTANCE_GROUP: &str = "instancegroups.keikoproj.io/InstanceGroup";

/// Ownership tag: the namespace of the backing `InstanceGroup`
pub const TAG_NAMESPACE: &str = "instancegroups.keikoproj.io/Namespace";

/// Prefix of the per-cluster ownership tag (`kubernetes.io/cluster/<name>`)
pub const TAG_CLUSTER_OWNERSHIP_PREFIX: &str = "kubernetes.io/cluster/";

/// Value of the per-cluster ownership tag
pub const TAG_CLUSTER_OWNERSHIP_VALUE: &str = "owned";

// ============================================================================
// IAM
// ============================================================================

/// Maximum length of an IAM role / instance-profile name
pub const IAM_MAX_NAME_LEN: usize = 63;

/// Managed policies attached to every derived node role, in addition to the
/// policies requested in the spec
pub const DEFAULT_MANAGED_POLICIES: [&str; 3] = [
    "AmazonEKSWorkerNodePolicy",
    "AmazonEKS_CNI_Policy",
    "AmazonEC2ContainerRegistryReadOnly",
];

/// ARN prefix for AWS-managed policies
pub const MANAGED_POLICY_ARN_PREFIX: &str = "arn:aws:iam::aws:policy/";

/// Trust policy for the worker-node role
pub const NODE_ROLE_TRUST_POLICY: &str = r#"{
    "Version": "2012-10-17",
    "Statement": [
        {
            "Effect": "Allow",
            "Principal": {
                "Service": "ec2.amazonaws.com"
            },
            "Action": "sts:AssumeRole"
        }
    ]
}"#;

// ============================================================================
// Scaling configurations
// ============================================================================

/// Number of superseded scaling configurations retained next to the active
/// one; a configured retention of zero falls back to this value
pub const DEFAULT_CONFIG_RETENTION: usize = 2;

/// Scaling-group status value reported by the cloud while a delete is running
pub const SCALING_GROUP_DELETING_STATUS: &str = "Delete in progress";

// ============================================================================
// Image references
// ============================================================================

/// Image reference sentinel resolved to the latest published image
pub const IMAGE_LATEST: &str = "latest";

/// Prefix marking an image reference resolved through the parameter store
pub const IMAGE_SSM_PREFIX: &str = "ssm://";

// ============================================================================
// Spot advisor
// ============================================================================

/// Event reason carrying spot recommendations for a scaling group
pub const SPOT_RECOMMENDATION_REASON: &str = "SpotRecommendationGiven";

// ============================================================================
// Auth map
// ============================================================================

/// Namespace of the shared authentication config object
pub const AUTH_MAP_NAMESPACE: &str = "kube-system";

/// Name of the shared authentication config object
pub const AUTH_MAP_NAME: &str = "aws-auth";

/// Key holding the role mappings inside the auth config object
pub const AUTH_MAP_ROLES_KEY: &str = "mapRoles";

/// Username template registered for worker-node roles
pub const AUTH_MAP_NODE_USERNAME: &str = "system:node:{{EC2PrivateDNSName}}";

/// Groups registered for worker-node roles
pub const AUTH_MAP_NODE_GROUPS: [&str; 2] = ["system:bootstrappers", "system:nodes"];

// ============================================================================
// Event reasons
// ============================================================================

/// Emitted when a reconcile pass begins
pub const REASON_RECONCILE_STARTED: &str = "ReconcileStarted";

/// Emitted when a reconcile pass completes
pub const REASON_RECONCILE_COMPLETED: &str = "ReconcileCompleted";

/// Emitted when instance rotation terminates instances
pub const REASON_ROTATING: &str = "Rotating";

/// Emitted when the shared auth map is modified
pub const REASON_AUTH_MAP_UPDATED: &str = "AuthMapUpdated";

/// Emitted for non-fatal failures swallowed during discovery
pub const REASON_DISCOVERY_WARNING: &str = "DiscoveryWarning";

// ============================================================================
// Timing
// ============================================================================

/// Requeue interval while backing resources are still converging, in seconds
pub const MODIFYING_REQUEUE_SECS: u64 = 30;

/// Periodic resync interval for `Ready` resources, in seconds
pub const READY_REQUEUE_SECS: u64 = 300;

/// Requeue interval after a retryable error, in seconds
pub const ERROR_REQUEUE_SECS: u64 = 30;

/// Default pod eviction grace period during node drain, in seconds
pub const DEFAULT_DRAIN_GRACE_SECS: u32 = 30;

/// Default time-to-live of the instance-type catalog cache, in seconds
pub const DEFAULT_CATALOG_TTL_SECS: u64 = 3600;

/// Default reconcile concurrency
pub const DEFAULT_WORKERS: usize = 8;
