// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Unit tests for reconcilers/deployment/aggregate.rs

#[cfg(test)]
mod tests {
    use super::super::*;
    use k8s_openapi::api::core::v1::{ContainerState, ContainerStateTerminated, ContainerStatus, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, Time};

    use crate::crd::{App, Condition, DeploymentClusterSpec, DeploymentClusterStatus};
    use crate::fleet::{GitRepoDisplay, GitRepoSpec, GitRepoStatus};

    const DEPLOYMENT_ID: &str = "b6d3f1a2-9c41-4d52-a6ce-1f77fa9f8e10";

    fn inputs(generation: i64, created_secs_ago: i64) -> StateInputs {
        StateInputs {
            deployment_id: DEPLOYMENT_ID.to_string(),
            generation,
            created: Some(Utc::now() - Duration::seconds(created_secs_ago)),
        }
    }

    fn status_in_progress(deploy_in_progress: bool) -> DeploymentStatus {
        DeploymentStatus {
            deploy_in_progress,
            ..DeploymentStatus::default()
        }
    }

    fn condition(ctype: &str, status: &str, message: Option<&str>, age_secs: i64) -> Condition {
        Condition {
            r#type: ctype.to_string(),
            status: status.to_string(),
            reason: None,
            message: message.map(ToString::to_string),
            last_transition_time: Some((Utc::now() - Duration::seconds(age_secs)).to_rfc3339()),
        }
    }

    fn row(state: StateType, app_generation: i64, ready_age_secs: i64) -> DeploymentCluster {
        let mut dc = DeploymentCluster::new(
            "dc-row",
            DeploymentClusterSpec {
                deployment_id: DEPLOYMENT_ID.to_string(),
                cluster_id: "cluster-1".to_string(),
                namespace: Some("fleet-default".to_string()),
            },
        );
        dc.status = Some(DeploymentClusterStatus {
            state: Some(state),
            apps: vec![App {
                name: "wordpress".to_string(),
                deployment_generation: app_generation,
                ..App::default()
            }],
            conditions: vec![condition("Ready", "True", None, ready_age_secs)],
            ..DeploymentClusterStatus::default()
        });
        dc
    }

    fn repo(status: Option<GitRepoStatus>) -> GitRepo {
        let mut r = GitRepo::new(
            &format!("wordpress-{DEPLOYMENT_ID}"),
            GitRepoSpec::default(),
        );
        r.status = status;
        r
    }

    #[test]
    fn test_all_rows_running_yields_running() {
        let mut status = status_in_progress(true);
        let rows = vec![row(StateType::Running, 2, 60)];
        let requeue = derive_state(&mut status, &inputs(2, 600), &[repo(None)], &rows, Utc::now());
        assert!(!requeue);
        assert_eq!(status.state, Some(StateType::Running));
        assert!(!status.deploy_in_progress);
        assert_eq!(status.summary.running, 1);
        assert_eq!(status.display.as_deref(), Some("Clusters: 1/1/0/0, Apps: 1"));
    }

    #[test]
    fn test_ready_debounce_requests_requeue() {
        let mut status = status_in_progress(true);
        let rows = vec![row(StateType::Running, 1, 2)];
        let requeue = derive_state(&mut status, &inputs(1, 600), &[], &rows, Utc::now());
        assert!(requeue);
        assert_eq!(status.state, Some(StateType::Deploying));
        assert_eq!(status.summary.down, 1);
        assert!(status.deploy_in_progress);
    }

    #[test]
    fn test_stale_generation_counts_as_down() {
        let mut status = status_in_progress(false);
        let rows = vec![row(StateType::Running, 1, 60)];
        let requeue = derive_state(&mut status, &inputs(2, 600), &[], &rows, Utc::now());
        assert!(!requeue);
        assert_eq!(status.state, Some(StateType::Down));
    }

    #[test]
    fn test_down_during_update_shows_updating() {
        let mut status = status_in_progress(true);
        let rows = vec![row(StateType::Down, 2, 60)];
        let requeue = derive_state(&mut status, &inputs(2, 600), &[], &rows, Utc::now());
        assert!(!requeue);
        assert_eq!(status.state, Some(StateType::Updating));
    }

    #[test]
    fn test_unknown_row_wins() {
        let mut status = status_in_progress(false);
        let rows = vec![
            row(StateType::Unknown, 1, 60),
            row(StateType::Running, 1, 60),
        ];
        derive_state(&mut status, &inputs(1, 600), &[], &rows, Utc::now());
        assert_eq!(status.state, Some(StateType::Unknown));
        assert_eq!(status.summary.unknown, 1);
    }

    #[test]
    fn test_no_rows_within_grace_keeps_deploying() {
        let mut status = status_in_progress(true);
        derive_state(&mut status, &inputs(1, 10), &[], &[], Utc::now());
        assert_eq!(status.state, Some(StateType::Deploying));
    }

    #[test]
    fn test_no_rows_past_grace_is_no_target_clusters() {
        let mut status = status_in_progress(true);
        derive_state(&mut status, &inputs(1, 600), &[], &[], Utc::now());
        assert_eq!(status.state, Some(StateType::NoTargetClusters));
    }

    #[test]
    fn test_progress_deadline_marks_error() {
        let mut status = status_in_progress(false);
        let mut dc = row(StateType::Down, 1, 60);
        dc.status.as_mut().unwrap().message =
            Some("Progress deadline exceeded for wordpress".to_string());
        derive_state(&mut status, &inputs(1, 600), &[], &[dc], Utc::now());
        assert_eq!(status.state, Some(StateType::Error));
        assert!(status
            .message
            .as_deref()
            .unwrap()
            .contains("Progress deadline exceeded"));
    }

    #[test]
    fn test_stalled_binding_marks_error_with_app_message() {
        let mut status = status_in_progress(true);
        let stalled_repo = repo(Some(GitRepoStatus {
            conditions: vec![condition("Stalled", "True", Some("helm install wedged"), 30)],
            ..GitRepoStatus::default()
        }));
        derive_state(
            &mut status,
            &inputs(1, 600),
            &[stalled_repo],
            &[row(StateType::Running, 1, 60)],
            Utc::now(),
        );
        assert_eq!(status.state, Some(StateType::Error));
        assert_eq!(
            status.message.as_deref(),
            Some("App wordpress: helm install wedged")
        );
    }

    #[test]
    fn test_binding_display_message_recorded() {
        let mut status = status_in_progress(false);
        let noisy_repo = repo(Some(GitRepoStatus {
            display: GitRepoDisplay {
                message: Some("clone failed".to_string()),
            },
            ..GitRepoStatus::default()
        }));
        derive_state(
            &mut status,
            &inputs(1, 600),
            &[noisy_repo],
            &[row(StateType::Running, 1, 60)],
            Utc::now(),
        );
        assert_eq!(status.message.as_deref(), Some("App wordpress: clone failed"));
        assert_eq!(status.state, Some(StateType::Running));
    }

    #[test]
    fn test_not_stalled_condition_marks_error_in_progress() {
        let mut status = status_in_progress(true);
        status.conditions = vec![condition(
            "NotStalled",
            "False",
            Some("wordpress: fatal: repository not found"),
            30,
        )];
        derive_state(
            &mut status,
            &inputs(1, 600),
            &[],
            &[row(StateType::Running, 1, 60)],
            Utc::now(),
        );
        assert_eq!(status.state, Some(StateType::Error));
    }

    #[test]
    fn test_apply_not_stalled_failure() {
        let mut conditions = Vec::new();
        let verdicts = HashMap::from([
            ("a-d1".to_string(), JobVerdict::Succeeded),
            ("b-d1".to_string(), JobVerdict::Failed("b: boom".to_string())),
        ]);
        apply_not_stalled(&mut conditions, &verdicts, 3);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].r#type, CONDITION_NOT_STALLED);
        assert_eq!(conditions[0].status, "False");
        assert_eq!(conditions[0].message.as_deref(), Some("b: boom"));
    }

    #[test]
    fn test_apply_not_stalled_all_succeeded() {
        let mut conditions = Vec::new();
        let verdicts = HashMap::from([
            ("a-d1".to_string(), JobVerdict::Succeeded),
            ("b-d1".to_string(), JobVerdict::Succeeded),
        ]);
        apply_not_stalled(&mut conditions, &verdicts, 2);
        assert_eq!(conditions[0].status, "True");
    }

    #[test]
    fn test_apply_not_stalled_partial_picture_is_inconclusive() {
        let mut conditions = Vec::new();
        let verdicts = HashMap::from([("a-d1".to_string(), JobVerdict::Succeeded)]);
        apply_not_stalled(&mut conditions, &verdicts, 2);
        assert!(conditions.is_empty());
    }

    #[test]
    fn test_owned_by_git_job() {
        let mut job = Job::default();
        job.metadata.owner_references = Some(vec![OwnerReference {
            api_version: "fleet.cattle.io/v1alpha1".to_string(),
            kind: "GitJob".to_string(),
            name: "wordpress-d1".to_string(),
            uid: "uid-gj".to_string(),
            ..OwnerReference::default()
        }]);
        assert!(owned_by_git_job(&job, "wordpress-d1"));
        assert!(!owned_by_git_job(&job, "nginx-d1"));
    }

    fn failed_pod(name: &str, age_secs: i64, message: Option<&str>) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.metadata.creation_timestamp = Some(Time(
            k8s_openapi::jiff::Timestamp::now()
                - k8s_openapi::jiff::SignedDuration::from_secs(age_secs),
        ));
        pod.status = Some(PodStatus {
            phase: Some("Failed".to_string()),
            container_statuses: message.map(|m| {
                vec![ContainerStatus {
                    name: "fleet".to_string(),
                    state: Some(ContainerState {
                        terminated: Some(ContainerStateTerminated {
                            exit_code: 1,
                            reason: Some("Error".to_string()),
                            message: Some(m.to_string()),
                            ..ContainerStateTerminated::default()
                        }),
                        ..ContainerState::default()
                    }),
                    ..ContainerStatus::default()
                }]
            }),
            ..PodStatus::default()
        });
        pod
    }

    #[test]
    fn test_latest_failed_pod_picks_newest() {
        let pods = vec![
            failed_pod("old", 600, None),
            failed_pod("new", 10, None),
        ];
        assert_eq!(
            latest_failed_pod(&pods).unwrap().metadata.name.as_deref(),
            Some("new")
        );
    }

    #[test]
    fn test_terminated_error_message() {
        let pod = failed_pod("p", 10, Some("fatal: repository not found"));
        assert_eq!(
            terminated_error_message(&pod).as_deref(),
            Some("fatal: repository not found")
        );
        let silent = failed_pod("p", 10, None);
        assert!(terminated_error_message(&silent).is_none());
    }
}
