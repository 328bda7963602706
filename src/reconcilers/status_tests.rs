// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Unit tests for reconcilers/status.rs

#[cfg(test)]
mod tests {
    use super::super::*;
    use chrono::{Duration, Utc};

    use crate::crd::Condition;

    fn condition(ctype: &str, status: &str, transition: &str) -> Condition {
        Condition {
            r#type: ctype.to_string(),
            status: status.to_string(),
            reason: None,
            message: None,
            last_transition_time: Some(transition.to_string()),
        }
    }

    #[test]
    fn test_update_appends_new_condition() {
        let mut conditions = Vec::new();
        update_status_condition(&mut conditions, "Ready", "True", "Success", None);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].r#type, "Ready");
        assert_eq!(conditions[0].status, "True");
        assert_eq!(conditions[0].reason.as_deref(), Some("Success"));
        assert!(conditions[0].last_transition_time.is_some());
    }

    #[test]
    fn test_update_replaces_condition_of_same_type() {
        let mut conditions = vec![condition("Ready", "False", "2024-01-01T00:00:00Z")];
        update_status_condition(
            &mut conditions,
            "Ready",
            "True",
            "Success",
            Some("all good".to_string()),
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, "True");
        assert_eq!(conditions[0].message.as_deref(), Some("all good"));
    }

    #[test]
    fn test_transition_time_preserved_when_status_unchanged() {
        let mut conditions = vec![condition("Ready", "True", "2024-01-01T00:00:00Z")];
        update_status_condition(&mut conditions, "Ready", "True", "Success", None);
        assert_eq!(
            conditions[0].last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_transition_time_moves_when_status_flips() {
        let mut conditions = vec![condition("Ready", "True", "2024-01-01T00:00:00Z")];
        update_status_condition(&mut conditions, "Ready", "False", "Failed", None);
        assert_ne!(
            conditions[0].last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_update_leaves_other_conditions_alone() {
        let mut conditions = vec![
            condition("GitSynced", "True", "2024-01-01T00:00:00Z"),
            condition("Ready", "False", "2024-01-01T00:00:00Z"),
        ];
        update_status_condition(&mut conditions, "Ready", "True", "Success", None);
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].r#type, "GitSynced");
        assert_eq!(conditions[0].status, "True");
    }

    #[test]
    fn test_find_condition() {
        let conditions = vec![condition("Ready", "True", "2024-01-01T00:00:00Z")];
        assert!(find_condition(&conditions, "Ready").is_some());
        assert!(find_condition(&conditions, "GitSynced").is_none());
    }

    #[test]
    fn test_condition_is_true() {
        let conditions = vec![
            condition("Ready", "True", "2024-01-01T00:00:00Z"),
            condition("GitSynced", "False", "2024-01-01T00:00:00Z"),
        ];
        assert!(condition_is_true(&conditions, "Ready"));
        assert!(!condition_is_true(&conditions, "GitSynced"));
        assert!(!condition_is_true(&conditions, "NotStalled"));
    }

    #[test]
    fn test_append_message_accumulates() {
        let msg = append_message(None, "first failure");
        assert_eq!(msg.as_deref(), Some("first failure"));
        let msg = append_message(msg, "second failure");
        assert_eq!(msg.as_deref(), Some("first failure; second failure"));
    }

    #[test]
    fn test_append_message_skips_empty() {
        let msg = append_message(Some("kept".to_string()), "");
        assert_eq!(msg.as_deref(), Some("kept"));
        assert_eq!(append_message(None, ""), None);
    }

    #[test]
    fn test_seconds_since_transition() {
        let now = Utc::now();
        let earlier = (now - Duration::seconds(42)).to_rfc3339();
        let c = condition("Ready", "True", &earlier);
        let elapsed = seconds_since_transition(&c, now).unwrap();
        assert!((41..=43).contains(&elapsed));
    }

    #[test]
    fn test_seconds_since_transition_bad_timestamp() {
        let c = condition("Ready", "True", "not-a-timestamp");
        assert!(seconds_since_transition(&c, Utc::now()).is_none());
        let mut c = c;
        c.last_transition_time = None;
        assert!(seconds_since_transition(&c, Utc::now()).is_none());
    }
}
