// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the in-memory cloud provider.

#[cfg(test)]
mod tests {
    use super::super::MemoryCloud;
    use crate::cloud::types::{
        CreateConfigInput, CreateScalingGroupInput, GroupConfigRef, MachineConfig, Tag,
        UpdateScalingGroupInput,
    };
    use crate::cloud::CloudProvider;
    use crate::provision_errors::ProvisionError;

    fn machine(image: &str) -> MachineConfig {
        MachineConfig {
            image_id: image.to_string(),
            instance_type: "m5.large".to_string(),
            ..MachineConfig::default()
        }
    }

    fn group_input(name: &str, config: &str) -> CreateScalingGroupInput {
        CreateScalingGroupInput {
            name: name.to_string(),
            min_size: 2,
            max_size: 4,
            subnets: vec!["subnet-1".to_string()],
            tags: vec![Tag::new("Name", name)],
            config_ref: GroupConfigRef::LaunchConfiguration(config.to_string()),
            mixed_instances: None,
        }
    }

    #[tokio::test]
    async fn test_group_launches_min_size_instances() {
        let cloud = MemoryCloud::new();
        cloud
            .create_scaling_group(&group_input("g1", "cfg-1"))
            .await
            .unwrap();

        let group = cloud.group("g1").await.unwrap();
        assert_eq!(group.instances.len(), 2);
        assert!(group
            .instances
            .iter()
            .all(|i| i.launch_configuration_name.as_deref() == Some("cfg-1")));
    }

    #[tokio::test]
    async fn test_update_keeps_existing_instance_refs() {
        let cloud = MemoryCloud::new();
        cloud
            .create_scaling_group(&group_input("g1", "cfg-1"))
            .await
            .unwrap();

        cloud
            .update_scaling_group(&UpdateScalingGroupInput {
                name: "g1".to_string(),
                min_size: 2,
                max_size: 4,
                config_ref: GroupConfigRef::LaunchConfiguration("cfg-2".to_string()),
                mixed_instances: None,
            })
            .await
            .unwrap();

        let group = cloud.group("g1").await.unwrap();
        assert_eq!(group.launch_configuration_name.as_deref(), Some("cfg-2"));
        // the running instances still reference the superseded configuration
        assert!(group
            .instances
            .iter()
            .all(|i| i.launch_configuration_name.as_deref() == Some("cfg-1")));
    }

    #[tokio::test]
    async fn test_terminate_without_decrement_launches_replacement() {
        let cloud = MemoryCloud::new();
        cloud
            .create_scaling_group(&group_input("g1", "cfg-1"))
            .await
            .unwrap();
        cloud
            .update_scaling_group(&UpdateScalingGroupInput {
                name: "g1".to_string(),
                min_size: 2,
                max_size: 4,
                config_ref: GroupConfigRef::LaunchConfiguration("cfg-2".to_string()),
                mixed_instances: None,
            })
            .await
            .unwrap();

        let stale = cloud.group("g1").await.unwrap().instances[0].clone();
        cloud
            .terminate_instance(&stale.instance_id, false)
            .await
            .unwrap();

        let group = cloud.group("g1").await.unwrap();
        assert_eq!(group.instances.len(), 2);
        // the replacement runs the active configuration
        assert!(group
            .instances
            .iter()
            .any(|i| i.launch_configuration_name.as_deref() == Some("cfg-2")));
    }

    #[tokio::test]
    async fn test_launch_template_versions_grow() {
        let cloud = MemoryCloud::new();
        let input = CreateConfigInput {
            name: "tmpl".to_string(),
            config: machine("ami-0001"),
        };
        cloud.create_launch_template(&input).await.unwrap();
        cloud
            .create_launch_template_version(&CreateConfigInput {
                name: "tmpl".to_string(),
                config: machine("ami-0002"),
            })
            .await
            .unwrap();

        let versions = cloud
            .describe_launch_template_versions("tmpl")
            .await
            .unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[1].version, 2);
        assert_eq!(versions[1].config.image_id, "ami-0002");

        let templates = cloud.describe_launch_templates().await.unwrap();
        assert_eq!(templates[0].latest_version, Some(2));
    }

    #[tokio::test]
    async fn test_creation_times_are_monotonic() {
        let cloud = MemoryCloud::new();
        for n in 0..3 {
            cloud
                .create_launch_configuration(&CreateConfigInput {
                    name: format!("cfg-{n}"),
                    config: machine("ami-0001"),
                })
                .await
                .unwrap();
        }
        let configs = cloud.describe_launch_configurations().await.unwrap();
        let mut times: Vec<_> = configs.iter().map(|c| c.created_time).collect();
        let sorted = {
            let mut s = times.clone();
            s.sort();
            s
        };
        times.sort();
        assert_eq!(times, sorted);
        assert!(times.iter().all(Option::is_some));
    }

    #[tokio::test]
    async fn test_fail_next_fires_once() {
        let cloud = MemoryCloud::new();
        cloud
            .fail_next(
                "describe-scaling-groups",
                ProvisionError::cloud("describe-scaling-groups", "throttled"),
            )
            .await;

        assert!(cloud.describe_scaling_groups().await.is_err());
        assert!(cloud.describe_scaling_groups().await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_missing_group_reports_not_found() {
        let cloud = MemoryCloud::new();
        let err = cloud.delete_scaling_group("absent").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
