// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the status condition helpers.

#[cfg(test)]
mod tests {
    use super::super::{
        clear_failure, create_condition, set_condition, set_failure, set_nodes_ready,
        CONDITION_NODES_READY, CONDITION_RECONCILE_FAILED,
    };
    use crate::crd::InstanceGroupStatus;
    use crate::provision_errors::ProvisionError;

    #[test]
    fn test_set_condition_replaces_by_type() {
        let mut status = InstanceGroupStatus::default();
        set_condition(
            &mut status,
            create_condition("NodesReady", "False", "NodesNotReady", "waiting"),
        );
        set_condition(
            &mut status,
            create_condition("NodesReady", "True", "NodesJoined", "all ready"),
        );

        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].status, "True");
    }

    #[test]
    fn test_unchanged_condition_keeps_transition_time() {
        let mut status = InstanceGroupStatus::default();
        set_nodes_ready(&mut status, true);
        let first = status.conditions[0].last_transition_time.clone();

        set_nodes_ready(&mut status, true);
        assert_eq!(status.conditions[0].last_transition_time, first);
    }

    #[test]
    fn test_nodes_ready_condition_shape() {
        let mut status = InstanceGroupStatus::default();
        set_nodes_ready(&mut status, false);

        let condition = &status.conditions[0];
        assert_eq!(condition.r#type, CONDITION_NODES_READY);
        assert_eq!(condition.status, "False");
        assert_eq!(condition.reason.as_deref(), Some("NodesNotReady"));
    }

    #[test]
    fn test_failure_lift_and_clear() {
        let mut status = InstanceGroupStatus::default();
        set_failure(
            &mut status,
            &ProvisionError::cloud("create-scaling-group", "denied"),
        );

        let condition = status
            .conditions
            .iter()
            .find(|c| c.r#type == CONDITION_RECONCILE_FAILED)
            .expect("failure condition present");
        assert_eq!(condition.reason.as_deref(), Some("CloudError"));
        assert!(condition.message.as_deref().unwrap().contains("denied"));

        clear_failure(&mut status);
        assert!(status
            .conditions
            .iter()
            .all(|c| c.r#type != CONDITION_RECONCILE_FAILED));
    }
}
