// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Condition bookkeeping shared by all reconcilers.
//!
//! Conditions are updated in memory on the reconciler's working copy; the
//! patch helper writes them out at the end of the reconcile. The
//! `lastTransitionTime` of a condition only moves when its `status` actually
//! flips, so converged reconciles leave the timestamp alone and the
//! ready-debounce in the deployment aggregation stays meaningful.

use chrono::{DateTime, Utc};

use crate::crd::Condition;

/// Look up a condition by type.
#[must_use]
pub fn find_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Whether a condition exists and is currently `"True"`.
#[must_use]
pub fn condition_is_true(conditions: &[Condition], condition_type: &str) -> bool {
    find_condition(conditions, condition_type).is_some_and(|c| c.status == "True")
}

/// Set a condition in place, replacing any existing condition of the same
/// type or appending a new one.
///
/// Preserves `lastTransitionTime` when the status did not change.
pub fn update_status_condition(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: &str,
    reason: &str,
    message: Option<String>,
) {
    let now = Utc::now().to_rfc3339();
    let last_transition_time = match find_condition(conditions, condition_type) {
        Some(existing) if existing.status == status => existing
            .last_transition_time
            .clone()
            .unwrap_or_else(|| now.clone()),
        _ => now,
    };

    let condition = Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message,
        last_transition_time: Some(last_transition_time),
    };

    match conditions.iter_mut().find(|c| c.r#type == condition_type) {
        Some(slot) => *slot = condition,
        None => conditions.push(condition),
    }
}

/// Append a failure message to an accumulator, separating entries with "; ".
#[must_use]
pub fn append_message(accumulated: Option<String>, next: &str) -> Option<String> {
    if next.is_empty() {
        return accumulated;
    }
    match accumulated {
        Some(existing) if !existing.is_empty() => Some(format!("{existing}; {next}")),
        _ => Some(next.to_string()),
    }
}

/// Seconds elapsed since a condition last transitioned. Returns `None` when
/// the timestamp is absent or unparseable.
#[must_use]
pub fn seconds_since_transition(condition: &Condition, now: DateTime<Utc>) -> Option<i64> {
    let raw = condition.last_transition_time.as_deref()?;
    let stamp = DateTime::parse_from_rfc3339(raw).ok()?;
    Some((now - stamp.with_timezone(&Utc)).num_seconds())
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
