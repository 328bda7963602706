// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Snapshot-on-read, diff-on-write patch helper.
//!
//! A [`PatchHelper`] captures a deep copy of an object when reconciliation
//! starts. At the end of the reconcile, [`PatchHelper::patch`] diffs the
//! mutated object against the snapshot and issues at most two merge patches:
//! one over `metadata` + `spec` against the normal endpoint, and one over
//! `status` against the status subresource. Unchanged objects produce zero
//! API calls, which is what makes repeated reconciles of a converged object
//! write-free.

use kube::api::{Api, Patch, PatchParams};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt::Debug;
use tracing::debug;

/// Errors from the patch helper.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// The object handed to `patch` is not the same group-version-kind as the
    /// one captured at construction.
    #[error("unmatched GroupVersionKind, expected {expected} got {got}")]
    GvkMismatch { expected: String, got: String },

    /// The object could not be serialized for diffing.
    #[error("failed to serialize object for patching: {0}")]
    Serialization(#[from] serde_json::Error),

    /// One or both patch requests failed.
    #[error("patch request failed: {0}")]
    Api(#[from] kube::Error),
}

/// Options for [`PatchHelper::patch`].
#[derive(Clone, Copy, Debug, Default)]
pub struct PatchOptions {
    /// Set `status.observedGeneration` from `metadata.generation` before
    /// diffing, when the object carries a status block.
    pub include_status_observed_generation: bool,
}

/// Captures an object's state and later patches only what changed.
pub struct PatchHelper {
    gvk: String,
    before: Value,
}

fn gvk_of(value: &Value) -> String {
    let api_version = value
        .get("apiVersion")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let kind = value.get("kind").and_then(Value::as_str).unwrap_or_default();
    format!("{api_version}/{kind}")
}

impl PatchHelper {
    /// Capture the object's current state.
    ///
    /// # Errors
    ///
    /// Returns an error when the object cannot be serialized.
    pub fn new<K>(obj: &K) -> Result<Self, PatchError>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let mut before = serde_json::to_value(obj)?;
        ensure_type_meta::<K>(&mut before);
        let gvk = gvk_of(&before);
        Ok(PatchHelper { gvk, before })
    }

    /// Diff the mutated object against the snapshot and issue the split
    /// merge patches. Skips any request whose focus did not change.
    ///
    /// # Errors
    ///
    /// Returns an error on GVK mismatch, serialization failure, or when a
    /// patch request fails. Both requests are attempted even if the first
    /// one fails; the first error is returned.
    pub async fn patch<K>(
        &self,
        api: &Api<K>,
        obj: &K,
        options: PatchOptions,
    ) -> Result<(), PatchError>
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned + Clone + Debug,
    {
        let mut after = serde_json::to_value(obj)?;
        ensure_type_meta::<K>(&mut after);

        let gvk = gvk_of(&after);
        if gvk != self.gvk {
            return Err(PatchError::GvkMismatch {
                expected: self.gvk.clone(),
                got: gvk,
            });
        }

        if options.include_status_observed_generation && after.get("status").is_some() {
            let generation = after
                .pointer("/metadata/generation")
                .cloned()
                .unwrap_or(Value::Null);
            if let Some(status) = after.get_mut("status").and_then(Value::as_object_mut) {
                status.insert("observedGeneration".to_string(), generation);
            }
        }

        let diff = merge_diff(&self.before, &after);
        let Some(Value::Object(changes)) = diff else {
            debug!(gvk = %self.gvk, "Object unchanged, skipping patch");
            return Ok(());
        };

        let name = obj.meta().name.clone().unwrap_or_default();
        let pp = PatchParams::default();

        let mut first_err: Option<PatchError> = None;

        let spec_patch = focus_patch(&changes, &["metadata", "spec"]);
        if let Some(body) = spec_patch {
            if let Err(e) = api.patch(&name, &pp, &Patch::Merge(&body)).await {
                first_err = Some(e.into());
            }
        }

        let status_patch = focus_patch(&changes, &["status"]);
        if let Some(body) = status_patch {
            if let Err(e) = api.patch_status(&name, &pp, &Patch::Merge(&body)).await {
                if first_err.is_none() {
                    first_err = Some(e.into());
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Top-level keys that would be patched, for inspection in tests.
    #[must_use]
    pub fn changed_keys<K>(&self, obj: &K) -> Vec<String>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let Ok(mut after) = serde_json::to_value(obj) else {
            return Vec::new();
        };
        ensure_type_meta::<K>(&mut after);
        match merge_diff(&self.before, &after) {
            Some(Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }
}

/// Typed objects do not always serialize their type meta; fill it in so the
/// GVK check and the preserved keys behave like they would for dynamic objects.
fn ensure_type_meta<K>(value: &mut Value)
where
    K: Resource<DynamicType = ()>,
{
    if let Some(map) = value.as_object_mut() {
        map.entry("apiVersion")
            .or_insert_with(|| json!(K::api_version(&()).to_string()));
        map.entry("kind")
            .or_insert_with(|| json!(K::kind(&()).to_string()));
    }
}

/// Compute a JSON merge patch (RFC 7386) turning `before` into `after`.
///
/// Returns `None` when the values are equal.
fn merge_diff(before: &Value, after: &Value) -> Option<Value> {
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            let mut out = Map::new();
            for (key, after_val) in a {
                match b.get(key) {
                    Some(before_val) => {
                        if let Some(child) = merge_diff(before_val, after_val) {
                            out.insert(key.clone(), child);
                        }
                    }
                    None => {
                        out.insert(key.clone(), after_val.clone());
                    }
                }
            }
            for key in b.keys() {
                if !a.contains_key(key) {
                    out.insert(key.clone(), Value::Null);
                }
            }
            if out.is_empty() {
                None
            } else {
                Some(Value::Object(out))
            }
        }
        _ if before == after => None,
        _ => Some(after.clone()),
    }
}

/// Restrict a top-level change map to `focus` keys.
fn focus_patch(changes: &Map<String, Value>, focus: &[&str]) -> Option<Value> {
    let relevant: Map<String, Value> = changes
        .iter()
        .filter(|(k, _)| focus.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    if relevant.is_empty() {
        return None;
    }
    Some(Value::Object(relevant))
}

#[cfg(test)]
#[path = "patch_tests.rs"]
mod patch_tests;
