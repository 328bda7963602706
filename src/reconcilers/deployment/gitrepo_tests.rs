// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Unit tests for reconcilers/deployment/gitrepo.rs

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::collections::BTreeMap;

    use crate::config::Config;
    use crate::crd::{DeploymentPackageRef, DeploymentSpec, DeploymentType, HelmApp};

    const DEPLOYMENT_ID: &str = "b6d3f1a2-9c41-4d52-a6ce-1f77fa9f8e10";

    fn deployment() -> Deployment {
        let mut d = Deployment::new(
            DEPLOYMENT_ID,
            DeploymentSpec {
                display_name: "wordpress".to_string(),
                project: "acme".to_string(),
                deployment_package_ref: DeploymentPackageRef::default(),
                applications: Vec::new(),
                deployment_type: DeploymentType::AutoScaling,
                child_deployment_list: None,
                network_ref: None,
            },
        );
        d.metadata.namespace = Some("apps".to_string());
        d.metadata.uid = Some("uid-d1".to_string());
        d
    }

    fn app(name: &str) -> Application {
        Application {
            name: name.to_string(),
            version: "1.0".to_string(),
            ..Application::default()
        }
    }

    #[test]
    fn test_git_repo_name_round_trip() {
        let name = git_repo_name("wordpress", DEPLOYMENT_ID);
        assert_eq!(name, format!("wordpress-{DEPLOYMENT_ID}"));
        assert_eq!(app_name_for_git_repo(&name, DEPLOYMENT_ID), "wordpress");
    }

    #[test]
    fn test_app_name_without_suffix_passes_through() {
        assert_eq!(app_name_for_git_repo("stray", DEPLOYMENT_ID), "stray");
    }

    #[test]
    fn test_git_targets_from_selectors() {
        let mut a = app("wordpress");
        a.targets = Some(vec![
            BTreeMap::from([("region".to_string(), "eu".to_string())]),
            BTreeMap::from([("tier".to_string(), "edge".to_string())]),
        ]);
        let targets = git_targets(&a);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].name.as_deref(), Some("match-0"));
        assert_eq!(targets[1].name.as_deref(), Some("match-1"));
        let labels = targets[1]
            .cluster_selector
            .as_ref()
            .unwrap()
            .match_labels
            .as_ref()
            .unwrap();
        assert_eq!(labels.get("tier").map(String::as_str), Some("edge"));
    }

    #[test]
    fn test_git_targets_empty_without_selectors() {
        assert!(git_targets(&app("wordpress")).is_empty());
    }

    #[test]
    fn test_desired_spec_defaults() {
        let config = Config::for_tests();
        let spec = desired_spec(&config, &app("wordpress"), "https://git/adm/d1.git", None);
        assert_eq!(spec.repo, "https://git/adm/d1.git");
        assert_eq!(spec.paths, vec!["wordpress".to_string()]);
        assert_eq!(spec.polling_interval.as_deref(), Some("15s"));
        assert_eq!(spec.client_secret_name.as_deref(), Some(FLEET_GIT_SECRET_NAME));
        assert!(spec.branch.is_none());
        assert!(spec.helm_secret_name.is_none());
        assert!(spec.force_sync_generation.is_none());
    }

    #[test]
    fn test_desired_spec_preserves_unowned_fields() {
        let config = Config::for_tests();
        let previous = GitRepoSpec {
            repo: "https://old/adm/d1.git".to_string(),
            branch: Some("main".to_string()),
            force_sync_generation: Some(4),
            ..GitRepoSpec::default()
        };
        let spec = desired_spec(
            &config,
            &app("wordpress"),
            "https://git/adm/d1.git",
            Some(&previous),
        );
        assert_eq!(spec.repo, "https://git/adm/d1.git");
        assert_eq!(spec.branch.as_deref(), Some("main"));
        assert_eq!(spec.force_sync_generation, Some(4));
    }

    #[test]
    fn test_desired_spec_helm_secret_precedence() {
        let mut config = Config::for_tests();
        config.api_agent_helm_secret_name = Some("agent-helm-cred".to_string());

        let mut a = app("wordpress");
        assert_eq!(
            desired_spec(&config, &a, "u", None).helm_secret_name.as_deref(),
            Some("agent-helm-cred")
        );

        a.helm_app = Some(HelmApp {
            repo_secret_name: Some("chart-cred".to_string()),
            ..HelmApp::default()
        });
        assert_eq!(
            desired_spec(&config, &a, "u", None).helm_secret_name.as_deref(),
            Some("chart-cred")
        );
    }

    #[test]
    fn test_new_git_repo_labels_and_owner() {
        let config = Config::for_tests();
        let d = deployment();
        let repo = new_git_repo(
            &config,
            &d,
            &app("wordpress"),
            "wordpress-d1",
            "apps",
            "https://git/adm/d1.git",
            "b-0123456789abcdef",
            "proj-1",
        );
        let labels = repo.metadata.labels.as_ref().unwrap();
        assert_eq!(
            labels.get(LABEL_BUNDLE_NAME).map(String::as_str),
            Some("b-0123456789abcdef")
        );
        assert_eq!(
            labels.get(LABEL_BUNDLE_TYPE).map(String::as_str),
            Some(BUNDLE_TYPE_APP)
        );
        assert_eq!(
            labels.get(LABEL_ACTIVE_PROJECT_ID).map(String::as_str),
            Some("proj-1")
        );
        let owners = repo.metadata.owner_references.as_ref().unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "Deployment");
        assert_eq!(owners[0].controller, Some(true));
    }

    #[test]
    fn test_is_controlled_by_matches_uid() {
        let config = Config::for_tests();
        let d = deployment();
        let repo = new_git_repo(
            &config,
            &d,
            &app("wordpress"),
            "wordpress-d1",
            "apps",
            "u",
            "b-x",
            "proj-1",
        );
        assert!(is_controlled_by(&repo, &d));

        let mut other = deployment();
        other.metadata.uid = Some("uid-d2".to_string());
        assert!(!is_controlled_by(&repo, &other));
    }
}
